use std::io::Write;

use log::error;
use serde_derive::Serialize;

/// Receives named readings. Delivery is fire-and-forget: implementations
/// deal with their own failures.
pub trait ReportSink {
    fn report(&mut self, name: &str, value: &str);
}

#[derive(Debug, Serialize)]
struct ReportLine<'a> {
    name: &'a str,
    value: &'a str,
}

/// Writes every report as a single line of JSON.
pub struct JsonLinesSink<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        JsonLinesSink { out }
    }

    fn write_line(&mut self, line: &ReportLine<'_>) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.out, line)?;
        self.out.write_all(b"\n")?;
        self.out.flush()
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportSink for JsonLinesSink<W> {
    fn report(&mut self, name: &str, value: &str) {
        if let Err(err) = self.write_line(&ReportLine { name, value }) {
            error!("Error writing report {}={}: {:?}", name, value, err);
        }
    }
}

#[cfg(test)]
impl ReportSink for Vec<(String, String)> {
    fn report(&mut self, name: &str, value: &str) {
        self.push((name.to_string(), value.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_lines() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.report("lock", "1");
        sink.report("temperature", "21.5");
        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(
            output,
            "{\"name\":\"lock\",\"value\":\"1\"}\n{\"name\":\"temperature\",\"value\":\"21.5\"}\n"
        );
    }
}
