/// InfluxDB line-protocol output.
///
/// One line per [`MetricRecord`]:
///
/// ```text
/// power,site=1234567,type=production w=1500 1641038400000000000
/// ```
///
/// Lines go to stdout for a Telegraf `execd`/`exec` input; diagnostics never
/// do. The sink buffers and is flushed explicitly after every successful
/// fetch and at the end of a cycle.

use crate::model::MetricRecord;
use std::io::{self, Write};

/// Escapes commas, spaces and equals signs in measurement names, tag keys,
/// tag values and field keys.
fn escape_ident(s: &str, out: &mut String) {
    for ch in s.chars() {
        match ch {
            ',' | ' ' | '=' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            '\n' | '\r' => out.push(' '),
            _ => out.push(ch),
        }
    }
}

fn push_tag(out: &mut String, key: &str, value: &str) {
    // Empty tag values are invalid line protocol.
    if value.is_empty() {
        return;
    }
    out.push(',');
    escape_ident(key, out);
    out.push('=');
    escape_ident(value, out);
}

/// Appends the line for `record` (without trailing newline). Returns false
/// and leaves `out` untouched when the record has no finite field value.
pub fn encode_line(record: &MetricRecord, out: &mut String) -> bool {
    let finite: Vec<&(String, f64)> = record.fields.iter().filter(|(_, v)| v.is_finite()).collect();
    if finite.is_empty() {
        return false;
    }

    escape_ident(record.measurement, out);
    push_tag(out, "site", &record.site_id);
    if let Some(dim) = &record.dimension {
        push_tag(out, dim.key, &dim.value);
    }

    out.push(' ');
    for (i, (key, value)) in finite.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        escape_ident(key, out);
        out.push('=');
        out.push_str(&value.to_string());
    }

    out.push(' ');
    out.push_str(&record.timestamp_ns.to_string());
    true
}

/// Buffered line-protocol writer.
pub struct MetricSink<W: Write> {
    writer: io::BufWriter<W>,
    lines_written: u64,
}

impl MetricSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> MetricSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: io::BufWriter::new(writer),
            lines_written: 0,
        }
    }

    /// Buffers one line per record. Records without a usable field are dropped.
    pub fn emit(&mut self, records: &[MetricRecord]) -> io::Result<()> {
        let mut line = String::with_capacity(128);
        for record in records {
            line.clear();
            if !encode_line(record, &mut line) {
                continue;
            }
            line.push('\n');
            self.writer.write_all(line.as_bytes())?;
            self.lines_written += 1;
        }
        Ok(())
    }

    /// Hands every buffered line to the underlying writer.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    /// The underlying writer. Only flushed content is visible through it.
    pub fn get_ref(&self) -> &W {
        self.writer.get_ref()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
