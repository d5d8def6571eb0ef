/// Test fixtures: representative payloads from the monitoring API and the
/// web playback endpoint.
///
/// Structurally complete but truncated to the minimum needed to exercise the
/// parsers. REST response shapes:
///
///   sites/list.json        sites.site[].{id, type, location.timeZone}
///   site/{id}/inventory    Inventory.inverters[].SN
///   sites/{ids}/dataPeriod datePeriodList.siteEnergyList[].{siteId, dataPeriod.startDate|endDate}
///   powerDetails.json      powerDetails.{unit, meters[].{type, values[].{date, value?}}}
///   energyDetails.json     energyDetails.{...same as power...}
///   equipment/.../data     data.telemetries[].{date, dcVoltage?, L1Data?, L2Data?, L3Data?}
///
/// Timestamps are wall-clock strings in the site's time zone. Values missing
/// from a meter series mean "no measurement", not zero.

/// Two sites: one with optimizers (Brussels), one without (UTC).
#[cfg(test)]
pub(crate) fn fixture_sites_list_json() -> &'static str {
    r#"{
      "sites": {
        "count": 2,
        "site": [
          {
            "id": 1234567,
            "name": "Home",
            "status": "Active",
            "peakPower": 5.6,
            "type": "Optimizers & Inverters",
            "location": { "country": "Belgium", "city": "Gent", "timeZone": "Europe/Brussels" }
          },
          {
            "id": 7654321,
            "name": "Barn",
            "status": "Active",
            "peakPower": 3.0,
            "type": "Inverters",
            "location": { "country": "Netherlands", "city": "Delft", "timeZone": "UTC" }
          }
        ]
      }
    }"#
}

/// Site list entry with a zone name chrono-tz does not know.
#[cfg(test)]
pub(crate) fn fixture_sites_list_bad_zone_json() -> &'static str {
    r#"{ "sites": { "count": 1, "site": [
        { "id": 1, "type": "Inverters", "location": { "timeZone": "Mars/Olympus_Mons" } }
    ] } }"#
}

#[cfg(test)]
pub(crate) fn fixture_inventory_json() -> &'static str {
    r#"{
      "Inventory": {
        "meters": [],
        "sensors": [],
        "gateways": [],
        "batteries": [],
        "inverters": [
          { "name": "Inverter 1", "manufacturer": "SolarEdge", "model": "SE5000H", "SN": "7E123456-AB", "connectedOptimizers": 14 },
          { "name": "Inverter 2", "manufacturer": "SolarEdge", "model": "SE3000H", "SN": "7E654321-CD", "connectedOptimizers": 8 }
        ]
      }
    }"#
}

/// Second site has never produced: both dates null.
#[cfg(test)]
pub(crate) fn fixture_data_period_json() -> &'static str {
    r#"{
      "datePeriodList": {
        "count": 2,
        "siteEnergyList": [
          { "siteId": 1234567, "dataPeriod": { "startDate": "2022-01-01", "endDate": "2022-06-01" } },
          { "siteId": 7654321, "dataPeriod": { "startDate": null, "endDate": null } }
        ]
      }
    }"#
}

/// Production meter in kW with one gap, consumption meter with one value.
#[cfg(test)]
pub(crate) fn fixture_power_details_json() -> &'static str {
    r#"{
      "powerDetails": {
        "timeUnit": "QUARTER_OF_AN_HOUR",
        "unit": "kW",
        "meters": [
          {
            "type": "Production",
            "values": [
              { "date": "2022-01-01 12:00:00", "value": 1.5 },
              { "date": "2022-01-01 12:15:00" },
              { "date": "2022-01-01 12:30:00", "value": 0.25 }
            ]
          },
          {
            "type": "Consumption",
            "values": [
              { "date": "2022-01-01 12:00:00", "value": 420.0 }
            ]
          }
        ]
      }
    }"#
}

#[cfg(test)]
pub(crate) fn fixture_energy_details_json() -> &'static str {
    r#"{
      "energyDetails": {
        "timeUnit": "QUARTER_OF_AN_HOUR",
        "unit": "Wh",
        "meters": [
          {
            "type": "SelfConsumption",
            "values": [
              { "date": "2022-01-01 12:00:00", "value": 312.0 },
              { "date": "2022-01-01 12:15:00", "value": 298.5 }
            ]
          }
        ]
      }
    }"#
}

/// One three-phase sample with cosPhi, one single-phase sample without it
/// and with a null DC voltage.
#[cfg(test)]
pub(crate) fn fixture_equipment_data_json() -> &'static str {
    r#"{
      "data": {
        "count": 2,
        "telemetries": [
          {
            "date": "2022-01-01 12:00:00",
            "totalActivePower": 4200.0,
            "dcVoltage": 750.5,
            "powerLimit": 100.0,
            "totalEnergy": 1000000.0,
            "temperature": 41.2,
            "inverterMode": "MPPT",
            "L1Data": { "acCurrent": 6.1, "acVoltage": 231.0, "acFrequency": 50.01, "apparentPower": 1410.0, "activePower": 1400.0, "reactivePower": 12.0, "cosPhi": 1.0 },
            "L2Data": { "acCurrent": 6.0, "acVoltage": 230.5, "acFrequency": 50.01, "apparentPower": 1405.0, "activePower": 1400.0, "reactivePower": 11.0, "cosPhi": 1.0 },
            "L3Data": { "acCurrent": 6.2, "acVoltage": 229.8, "acFrequency": 50.01, "apparentPower": 1415.0, "activePower": 1400.0, "reactivePower": 13.0, "cosPhi": 0.99 }
          },
          {
            "date": "2022-01-01 12:05:00",
            "dcVoltage": null,
            "L1Data": { "acCurrent": 0.5, "acVoltage": 230.0, "acFrequency": 49.98, "apparentPower": 115.0, "activePower": 110.0, "reactivePower": 3.0 }
          }
        ]
      }
    }"#
}

/// Raw playback payload as served: bare keys, single quotes and `Array`
/// markers, with a locale decimal comma and a zero reading.
#[cfg(test)]
pub(crate) fn fixture_playback_raw() -> &'static str {
    "{reportersData:{'Sat Jan 01 12:00:00 GMT 2022':{'2091':Array[{key:'100123',value:'210,5'},{key:'100124',value:'0'}]},\
'Sat Jan 01 12:15:00 GMT 2022':{'2091':Array[{key:'100123',value:'1.210,25'}]}},timeUnit:'4',fieldData:{}}"
}
