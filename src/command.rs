//! Commands sent to the Groonga server.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use tracing::warn;

use crate::{Error, Result};

/// Name of the argument the server reads to pick its output encoding
pub const OUTPUT_TYPE_ARGUMENT: &str = "output_type";

/// Name of the `select` argument listing group-by keys
pub const DRILLDOWN_ARGUMENT: &str = "drilldown";

/// Output encoding a command asks the server for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputType {
    /// Structured JSON, decoded into typed responses
    #[default]
    Json,
    /// XML, passed through as text
    Xml,
    /// No wrapping at all, the body is handed back unchanged
    None,
}

impl OutputType {
    /// Name used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputType::Json => "json",
            OutputType::Xml => "xml",
            OutputType::None => "none",
        }
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputType::Json),
            "xml" => Ok(OutputType::Xml),
            "none" => Ok(OutputType::None),
            _ => Err(Error::ProtocolEncoding(s.to_string())),
        }
    }
}

/// An immutable request: verb, arguments and output encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    arguments: BTreeMap<String, String>,
    output_type: OutputType,
}

impl Command {
    /// Create a command with no arguments and JSON output
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: BTreeMap::new(),
            output_type: OutputType::Json,
        }
    }

    /// Build a command from untyped `key`/`value` pairs.
    ///
    /// An `output_type` pair selects the encoding; an unknown encoding is
    /// rejected instead of falling back to JSON.
    pub fn from_arguments<I, K, V>(name: impl Into<String>, arguments: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut command = Self::new(name);
        for (key, value) in arguments {
            let key = key.into();
            let value = value.into();
            command = if key == OUTPUT_TYPE_ARGUMENT {
                command.with_output_type(value.parse()?)
            } else {
                command.with_argument(key, value)
            };
        }
        Ok(command)
    }

    /// Add an argument.
    ///
    /// An `output_type` argument also sets the output encoding. An unknown
    /// encoding is ignored and the current one kept; use
    /// [`from_arguments`](Command::from_arguments) to have it rejected.
    pub fn with_argument(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        let key = key.into();
        let value = value.to_string();
        if key == OUTPUT_TYPE_ARGUMENT {
            return match value.parse() {
                Ok(output_type) => self.with_output_type(output_type),
                Err(_) => {
                    warn!("Ignoring unknown output type `{}`", value);
                    self
                }
            };
        }
        self.arguments.insert(key, value);
        self
    }

    /// Set the output encoding
    pub fn with_output_type(mut self, output_type: OutputType) -> Self {
        self.output_type = output_type;
        self.arguments
            .insert(OUTPUT_TYPE_ARGUMENT.to_string(), output_type.as_str().to_string());
        self
    }

    /// Command verb, e.g. `select`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Output encoding the reply is rendered in
    pub fn output_type(&self) -> OutputType {
        self.output_type
    }

    /// Value of a single argument
    pub fn argument(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).map(String::as_str)
    }

    /// All arguments in key order
    pub fn arguments(&self) -> &BTreeMap<String, String> {
        &self.arguments
    }

    /// Group-by keys requested through `drilldown`, in request order
    pub fn drilldown_keys(&self) -> Vec<&str> {
        self.argument(DRILLDOWN_ARGUMENT)
            .map(|keys| {
                keys.split(',')
                    .map(str::trim)
                    .filter(|key| !key.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Serialize to the command line format the server parses
    pub fn to_command_format(&self) -> String {
        let mut formatted = self.name.clone();
        for (key, value) in &self.arguments {
            formatted.push_str(" --");
            formatted.push_str(key);
            formatted.push_str(" \"");
            for c in value.chars() {
                match c {
                    '\n' => formatted.push_str("\\n"),
                    '"' | '\\' => {
                        formatted.push('\\');
                        formatted.push(c);
                    }
                    _ => formatted.push(c),
                }
            }
            formatted.push('"');
        }
        formatted
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_command_format())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_format() {
        let command = Command::new("select")
            .with_argument("table", "Entries")
            .with_argument("query", "title:@\"Ruby\"");

        assert_eq!(
            command.to_command_format(),
            r#"select --query "title:@\"Ruby\"" --table "Entries""#
        );
    }

    #[test]
    fn test_command_format_escapes_newlines_and_backslashes() {
        let command = Command::new("load").with_argument("values", "a\\b\nc");
        assert_eq!(command.to_command_format(), r#"load --values "a\\b\nc""#);
    }

    #[test]
    fn test_output_type_argument() {
        let command = Command::from_arguments("status", [("output_type", "xml")]).unwrap();
        assert_eq!(command.output_type(), OutputType::Xml);
        assert_eq!(command.to_command_format(), r#"status --output_type "xml""#);

        let command = Command::new("status");
        assert_eq!(command.output_type(), OutputType::Json);
        assert_eq!(command.to_command_format(), "status");
    }

    #[test]
    fn test_output_type_through_with_argument() {
        let command = Command::new("status").with_argument("output_type", "xml");
        assert_eq!(command.output_type(), OutputType::Xml);
        assert_eq!(command.to_command_format(), r#"status --output_type "xml""#);

        let command = command.with_argument("output_type", "msgpack");
        assert_eq!(command.output_type(), OutputType::Xml);
        assert_eq!(command.argument("output_type"), Some("xml"));
    }

    #[test]
    fn test_unknown_output_type_is_rejected() {
        let error = Command::from_arguments("status", [("output_type", "msgpack")]).unwrap_err();
        assert!(matches!(error, Error::ProtocolEncoding(ref name) if name == "msgpack"));
    }

    #[test]
    fn test_drilldown_keys() {
        let command = Command::new("select").with_argument("drilldown", "_key, tag,,");
        assert_eq!(command.drilldown_keys(), vec!["_key", "tag"]);

        assert!(Command::new("select").drilldown_keys().is_empty());
    }
}
