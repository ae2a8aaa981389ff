//! Response decoding.
//!
//! A rendered JSON reply is `[[status, start_time, elapsed(, message)], body]`.
//! [`decode`] turns the header and body into a [`Response`]: a
//! [`SelectResponse`] for `select`, a [`BaseResponse`] carrying the body as
//! JSON for every other verb.

mod select;
mod value;

pub use select::{Drilldown, SelectResponse};
pub use value::{time_from_epoch, Column, ColumnType, Record, Value};

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::command::{Command, OutputType};
use crate::{Error, Result};

/// Status, timing and error message of a reply
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseHeader {
    /// 0 on success, the server's error code otherwise
    pub status: i64,
    /// Request start as fractional Unix seconds
    pub start_time: f64,
    /// Seconds the request took
    pub elapsed_time: f64,
    /// Error message sent with a non-zero status
    pub message: Option<String>,
}

impl ResponseHeader {
    /// Create a header without a message
    pub fn new(status: i64, start_time: f64, elapsed_time: f64) -> Self {
        Self {
            status,
            start_time,
            elapsed_time,
            message: None,
        }
    }

    /// Decode `[status, start_time, elapsed(, message, ...)]`
    pub fn from_json(command: &Command, header: &JsonValue) -> Result<Self> {
        let parse_error = |message: String| Error::response_parse(command.name(), message);

        let fields = header
            .as_array()
            .ok_or_else(|| parse_error(format!("header is not an array: {}", header)))?;
        if fields.len() < 3 {
            return Err(parse_error(format!(
                "header has {} elements, expected at least 3",
                fields.len()
            )));
        }

        let status = fields[0]
            .as_i64()
            .ok_or_else(|| parse_error(format!("status is not an integer: {}", fields[0])))?;
        let start_time = fields[1]
            .as_f64()
            .ok_or_else(|| parse_error(format!("start time is not a number: {}", fields[1])))?;
        let elapsed_time = fields[2]
            .as_f64()
            .ok_or_else(|| parse_error(format!("elapsed time is not a number: {}", fields[2])))?;
        let message = fields.get(3).and_then(JsonValue::as_str).map(str::to_string);

        Ok(Self {
            status,
            start_time,
            elapsed_time,
            message,
        })
    }

    /// Whether the server reported success
    pub fn is_success(&self) -> bool {
        self.status == 0
    }

    /// Request start as a timestamp
    pub fn start_time_utc(&self) -> Option<DateTime<Utc>> {
        time_from_epoch(self.start_time)
    }
}

/// Reply of a verb without a dedicated typed view
#[derive(Debug, Clone, PartialEq)]
pub struct BaseResponse {
    header: ResponseHeader,
    body: JsonValue,
}

impl BaseResponse {
    /// Reply header
    pub fn header(&self) -> &ResponseHeader {
        &self.header
    }

    /// Body as sent by the server
    pub fn body(&self) -> &JsonValue {
        &self.body
    }
}

/// A decoded reply
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// `select` with records and drilldowns
    Select(SelectResponse),
    /// Any other verb with JSON output
    Base(BaseResponse),
    /// XML or unwrapped output, kept as rendered text
    Raw(String),
}

impl Response {
    /// Parse text rendered for `command` (see [`crate::RawResponse::render`])
    pub fn parse(command: &Command, rendered: &str) -> Result<Self> {
        match command.output_type() {
            OutputType::Json => {
                let envelope: JsonValue = serde_json::from_str(rendered).map_err(|e| {
                    Error::response_parse(command.name(), format!("invalid JSON: {}", e))
                })?;
                let parts = envelope.as_array().ok_or_else(|| {
                    Error::response_parse(command.name(), "reply is not a [header, body] array")
                })?;
                let header = parts
                    .first()
                    .ok_or_else(|| Error::response_parse(command.name(), "missing header"))?;
                let header = ResponseHeader::from_json(command, header)?;
                decode(command, header, parts.get(1).unwrap_or(&JsonValue::Null))
            }
            OutputType::Xml | OutputType::None => Ok(Response::Raw(rendered.to_string())),
        }
    }

    /// Header, when the reply was decoded from JSON
    pub fn header(&self) -> Option<&ResponseHeader> {
        match self {
            Response::Select(select) => Some(select.header()),
            Response::Base(base) => Some(base.header()),
            Response::Raw(_) => None,
        }
    }

    /// Borrow as a `select` response
    pub fn as_select(&self) -> Option<&SelectResponse> {
        match self {
            Response::Select(select) => Some(select),
            _ => None,
        }
    }

    /// Convert into a `select` response
    pub fn into_select(self) -> Option<SelectResponse> {
        match self {
            Response::Select(select) => Some(select),
            _ => None,
        }
    }
}

/// Build a typed response for `command` from its header and body.
///
/// A non-zero status is returned as [`Error::Server`]; the body of a
/// failed request is not decoded.
pub fn decode(command: &Command, header: ResponseHeader, body: &JsonValue) -> Result<Response> {
    if !header.is_success() {
        return Err(Error::Server {
            command: command.name().to_string(),
            status: header.status,
            message: header.message.unwrap_or_default(),
        });
    }

    debug!("Decoding `{}` response", command.name());
    match command.name() {
        "select" => SelectResponse::decode(command, header, body).map(Response::Select),
        _ => Ok(Response::Base(BaseResponse {
            header,
            body: body.clone(),
        })),
    }
}
