//! Raw response envelope.
//!
//! GQTP replies carry only a status code and a body. Clients that speak
//! the HTTP interface get `[[status, start, elapsed], body]` (or the XML
//! equivalent) from the server itself, so the envelope is rebuilt here to
//! make both protocols yield the same text.
//!
//! Elapsed time is measured when [`RawResponse::render`] runs, not when the
//! reply arrived. Render once, right after the reply comes in.

use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::command::{Command, OutputType};
use crate::transport::Reply;

/// Envelope for a request that has been sent but not answered yet
#[derive(Debug)]
pub struct PendingResponse<'a> {
    command: &'a Command,
    start_time: DateTime<Utc>,
    started: Instant,
}

impl<'a> PendingResponse<'a> {
    /// Start timing `command`
    pub fn new(command: &'a Command) -> Self {
        Self {
            command,
            start_time: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Wall-clock time the request started
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Attach the reply. Header and body arrive together, once.
    pub fn complete(self, reply: Reply) -> RawResponse<'a> {
        RawResponse {
            command: self.command,
            start_time: self.start_time,
            started: self.started,
            reply,
        }
    }
}

/// A reply paired with the command that caused it and its start time
#[derive(Debug)]
pub struct RawResponse<'a> {
    command: &'a Command,
    start_time: DateTime<Utc>,
    started: Instant,
    reply: Reply,
}

impl<'a> RawResponse<'a> {
    /// Command this reply answers
    pub fn command(&self) -> &'a Command {
        self.command
    }

    /// The reply as received
    pub fn reply(&self) -> &Reply {
        &self.reply
    }

    /// Start time as fractional Unix seconds
    pub fn start_seconds(&self) -> f64 {
        unix_seconds(&self.start_time)
    }

    /// Seconds since the request started, measured now
    pub fn elapsed_seconds(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Render in the command's output type
    pub fn render(&self) -> String {
        let rendered = match self.command.output_type() {
            OutputType::Json => self.render_json(),
            OutputType::Xml => self.render_xml(),
            OutputType::None => self.reply.body_text().into_owned(),
        };
        debug!(
            "Rendered `{}` reply as {}: {} bytes",
            self.command.name(),
            self.command.output_type(),
            rendered.len()
        );
        rendered
    }

    fn render_json(&self) -> String {
        let header = (self.reply.status(), self.start_seconds(), self.elapsed_seconds());
        // Serializing a tuple of numbers cannot fail.
        let header = serde_json::to_string(&header).unwrap_or_default();
        format!("[{},{}]", header, self.reply.body_text())
    }

    fn render_xml(&self) -> String {
        let code = self.reply.status().to_string();
        let up = self.start_seconds().to_string();
        let elapsed = self.elapsed_seconds().to_string();
        format!(
            "<RESULT CODE=\"{}\" UP=\"{}\" ELAPSED=\"{}\">\n{}\n</RESULT>\n",
            escape_xml(&code),
            escape_xml(&up),
            escape_xml(&elapsed),
            self.reply.body_text()
        )
    }
}

fn unix_seconds(time: &DateTime<Utc>) -> f64 {
    time.timestamp() as f64 + f64::from(time.timestamp_subsec_micros()) / 1_000_000.0
}

/// Escape text for use inside an XML attribute value
pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Header;
    use serde_json::{json, Value};

    fn reply(status: u16, body: &str) -> Reply {
        Reply::new(
            Header {
                status,
                size: body.len() as u32,
                ..Default::default()
            },
            body.to_string(),
        )
    }

    #[test]
    fn test_render_json() {
        let command = Command::new("select");
        let pending = PendingResponse::new(&command);
        let start = unix_seconds(&pending.start_time());
        let raw = pending.complete(reply(0, r#"[[[1],[["_id","UInt32"]],[1]]]"#));

        let rendered: Value = serde_json::from_str(&raw.render()).unwrap();
        let header = rendered[0].as_array().unwrap();
        assert_eq!(header.len(), 3);
        assert_eq!(header[0], json!(0));
        assert!((header[1].as_f64().unwrap() - start).abs() < 1e-6);
        assert!(header[2].as_f64().unwrap() >= 0.0);
        assert_eq!(rendered[1], json!([[[1], [["_id", "UInt32"]], [1]]]));
    }

    #[test]
    fn test_render_xml() {
        let command = Command::new("status").with_output_type(OutputType::Xml);
        let raw = PendingResponse::new(&command).complete(reply(65535, "<STATUS>up</STATUS>"));

        let rendered = raw.render();
        let up = raw.start_seconds().to_string();
        assert!(rendered.starts_with(&format!("<RESULT CODE=\"65535\" UP=\"{}\" ELAPSED=\"", up)));
        assert!(rendered.ends_with("\">\n<STATUS>up</STATUS>\n</RESULT>\n"));

        let elapsed = rendered
            .split("ELAPSED=\"")
            .nth(1)
            .and_then(|rest| rest.split('"').next())
            .unwrap();
        assert!(elapsed.parse::<f64>().unwrap() >= 0.0);
    }

    #[test]
    fn test_render_none_is_identity() {
        let command = Command::new("dump").with_output_type(OutputType::None);
        let body = "table_create Entries TABLE_HASH_KEY ShortText\n";
        let raw = PendingResponse::new(&command).complete(reply(0, body));
        assert_eq!(raw.render(), body);
    }

    #[test]
    fn test_elapsed_is_measured_at_render_time() {
        let command = Command::new("status");
        let raw = PendingResponse::new(&command).complete(reply(0, "{}"));
        let first = raw.elapsed_seconds();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(raw.elapsed_seconds() > first);
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml(r#"a<b>&"c'"#), "a&lt;b&gt;&amp;&quot;c&#39;");
        assert_eq!(escape_xml("1.5"), "1.5");
    }
}
