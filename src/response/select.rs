//! `select` responses.
//!
//! The body is a list of result blocks. The first is the main result set,
//! followed by one block per drilldown key:
//!
//! ```text
//! [
//!   [[n_hits], [[name, type], ...], [value, ...], ...],   // main
//!   [[n_hits], [[name, type], ...], [value, ...], ...],   // drilldown 1
//!   ...
//! ]
//! ```

use serde_json::Value as JsonValue;

use super::value::{Column, ColumnType, Record};
use super::ResponseHeader;
use crate::command::Command;
use crate::{Error, Result};

/// A decoded result block
#[derive(Debug, Clone, PartialEq)]
struct ResultSet {
    n_hits: u64,
    columns: Vec<Column>,
    records: Vec<Record>,
}

/// Decode one `[[n_hits], columns, rows...]` block
fn decode_result_set(command: &str, block: &JsonValue, label: &str) -> Result<ResultSet> {
    let parse_error = |message: String| Error::response_parse(command, format!("{}: {}", label, message));

    let block = block
        .as_array()
        .ok_or_else(|| parse_error(format!("expected an array, got {}", block)))?;

    let n_hits = match block.first() {
        Some(JsonValue::Array(count)) if count.len() == 1 => count[0]
            .as_u64()
            .ok_or_else(|| parse_error(format!("hit count is not a non-negative integer: {}", count[0])))?,
        Some(other) => return Err(parse_error(format!("expected [n_hits], got {}", other))),
        None => return Err(parse_error("missing hit count".to_string())),
    };

    let definitions = block
        .get(1)
        .ok_or_else(|| parse_error("missing column definitions".to_string()))?
        .as_array()
        .ok_or_else(|| parse_error("column definitions are not an array".to_string()))?;
    let columns = definitions
        .iter()
        .map(|definition| decode_column(definition).map_err(&parse_error))
        .collect::<Result<Vec<_>>>()?;

    let records = block[2..]
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let row = row
                .as_array()
                .ok_or_else(|| parse_error(format!("row {} is not an array: {}", i, row)))?;
            if row.len() != columns.len() {
                return Err(parse_error(format!(
                    "row {} has {} values for {} columns",
                    i,
                    row.len(),
                    columns.len()
                )));
            }
            columns
                .iter()
                .zip(row)
                .map(|(column, raw)| {
                    column
                        .column_type
                        .coerce(raw)
                        .map(|value| (column.name.clone(), value))
                        .map_err(|message| parse_error(format!("column `{}`: {}", column.name, message)))
                })
                .collect::<Result<Record>>()
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ResultSet {
        n_hits,
        columns,
        records,
    })
}

fn decode_column(definition: &JsonValue) -> std::result::Result<Column, String> {
    match definition.as_array().map(Vec::as_slice) {
        Some([JsonValue::String(name), JsonValue::String(type_name)]) => {
            let column_type = ColumnType::from_name(type_name)
                .ok_or_else(|| format!("unknown column type `{}` for `{}`", type_name, name))?;
            Ok(Column::new(name.as_str(), column_type))
        }
        _ => Err(format!("malformed column definition: {}", definition)),
    }
}

/// A named group-by result inside a `select` response
#[derive(Debug, Clone, PartialEq)]
pub struct Drilldown {
    name: String,
    n_hits: u64,
    columns: Vec<Column>,
    records: Vec<Record>,
}

impl Drilldown {
    /// The group-by key this drilldown was requested for
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of groups
    pub fn n_hits(&self) -> u64 {
        self.n_hits
    }

    /// Column definitions
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Grouped records, in server order
    pub fn records(&self) -> &[Record] {
        &self.records
    }
}

/// Typed view of a `select` reply
#[derive(Debug, Clone, PartialEq)]
pub struct SelectResponse {
    header: ResponseHeader,
    n_hits: u64,
    columns: Vec<Column>,
    records: Vec<Record>,
    drilldowns: Vec<Drilldown>,
}

impl SelectResponse {
    /// Decode a `select` body. The whole body is walked once, here.
    pub fn decode(command: &Command, header: ResponseHeader, body: &JsonValue) -> Result<Self> {
        let name = command.name();
        let blocks = body
            .as_array()
            .ok_or_else(|| Error::response_parse(name, format!("expected an array body, got {}", body)))?;
        let (main, drilldown_blocks) = blocks
            .split_first()
            .ok_or_else(|| Error::response_parse(name, "missing result set"))?;

        let result_set = decode_result_set(name, main, "result set")?;

        let keys = command.drilldown_keys();
        if keys.len() != drilldown_blocks.len() {
            return Err(Error::response_parse(
                name,
                format!(
                    "{} drilldown keys requested but {} drilldown results returned",
                    keys.len(),
                    drilldown_blocks.len()
                ),
            ));
        }

        let drilldowns = keys
            .iter()
            .zip(drilldown_blocks)
            .map(|(key, block)| {
                let label = format!("drilldown `{}`", key);
                decode_result_set(name, block, &label).map(|set| Drilldown {
                    name: key.to_string(),
                    n_hits: set.n_hits,
                    columns: set.columns,
                    records: set.records,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            header,
            n_hits: result_set.n_hits,
            columns: result_set.columns,
            records: result_set.records,
            drilldowns,
        })
    }

    /// Reply header
    pub fn header(&self) -> &ResponseHeader {
        &self.header
    }

    /// Status code, 0 on success
    pub fn status(&self) -> i64 {
        self.header.status
    }

    /// Request start as fractional Unix seconds
    pub fn start_time(&self) -> f64 {
        self.header.start_time
    }

    /// Seconds the request took
    pub fn elapsed_time(&self) -> f64 {
        self.header.elapsed_time
    }

    /// Total number of matching records, not just the returned ones
    pub fn n_hits(&self) -> u64 {
        self.n_hits
    }

    /// Column definitions of the main result set
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returned records, in server order
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// One entry per drilldown key, in request order
    pub fn drilldowns(&self) -> &[Drilldown] {
        &self.drilldowns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::value::Value;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn header() -> ResponseHeader {
        ResponseHeader::new(0, 1372430096.70991, 0.000522851943969727)
    }

    fn parse(command: &Command, body: JsonValue) -> Result<SelectResponse> {
        SelectResponse::decode(command, header(), &body)
    }

    fn drilldown_body() -> JsonValue {
        json!([
            [[0], []],
            [
                [29],
                [["_key", "ShortText"], ["_nsubrecs", "Int32"]],
                ["groonga", 29],
                ["Ruby", 19],
                ["rroonga", 9]
            ]
        ])
    }

    #[test]
    fn test_single_record() {
        let command = Command::new("select");
        let response = parse(&command, json!([[[1], [["_id", "UInt32"]], [1]]])).unwrap();

        assert_eq!(response.n_hits(), 1);
        assert_eq!(response.status(), 0);
        assert_eq!(response.start_time(), 1372430096.70991);
        let expected: Record = [("_id", Value::UInt(1))].into_iter().collect();
        assert_eq!(response.records(), &[expected]);
        assert!(response.drilldowns().is_empty());
    }

    #[test]
    fn test_n_hits_without_records() {
        let command = Command::new("select");
        let response = parse(&command, json!([[[29], [["_id", "UInt32"]]]])).unwrap();

        assert_eq!(response.n_hits(), 29);
        assert!(response.records().is_empty());
        assert_eq!(response.columns(), &[Column::new("_id", ColumnType::UInt32)]);
    }

    #[test]
    fn test_time_column() {
        let command = Command::new("select");
        let response = parse(&command, json!([[[1], [["updated_at", "Time"]], [1379040474]]])).unwrap();

        let expected: Record = [("updated_at", Value::Time(Utc.timestamp_opt(1379040474, 0).unwrap()))]
            .into_iter()
            .collect();
        assert_eq!(response.records(), &[expected]);
    }

    #[test]
    fn test_drilldowns() {
        let command = Command::new("select")
            .with_argument("drilldown", "_key")
            .with_argument("drilldown_output_columns", "_key,_nsubrecs");
        let response = parse(&command, drilldown_body()).unwrap();

        assert_eq!(response.n_hits(), 0);
        let drilldowns = response.drilldowns();
        assert_eq!(drilldowns.len(), 1);
        assert_eq!(drilldowns[0].name(), "_key");
        assert_eq!(drilldowns[0].n_hits(), 29);

        let expected: Vec<Record> = [("groonga", 29), ("Ruby", 19), ("rroonga", 9)]
            .into_iter()
            .map(|(key, n)| {
                [("_key", Value::from(key)), ("_nsubrecs", Value::Int(n))]
                    .into_iter()
                    .collect()
            })
            .collect();
        assert_eq!(drilldowns[0].records(), expected.as_slice());
    }

    #[test]
    fn test_views_are_stable() {
        let command = Command::new("select").with_argument("drilldown", "_key");
        let response = parse(&command, drilldown_body()).unwrap();

        assert_eq!(response.records(), response.records());
        assert_eq!(response.drilldowns().to_vec(), response.drilldowns().to_vec());
    }

    #[test]
    fn test_missing_column_definitions() {
        let command = Command::new("select");
        let error = parse(&command, json!([[[1]]])).unwrap_err();
        assert!(matches!(error, Error::ResponseParse { ref command, ref message }
            if command == "select" && message.contains("missing column definitions")));
    }

    #[test]
    fn test_row_arity_mismatch() {
        let command = Command::new("select");
        let error = parse(&command, json!([[[1], [["_id", "UInt32"]], [1, "extra"]]])).unwrap_err();
        assert!(matches!(error, Error::ResponseParse { .. }));
    }

    #[test]
    fn test_unknown_column_type() {
        let command = Command::new("select");
        let error = parse(&command, json!([[[1], [["_id", "Bogus"]], [1]]])).unwrap_err();
        assert!(error.to_string().contains("unknown column type `Bogus`"));
    }

    #[test]
    fn test_missing_drilldown_block() {
        let command = Command::new("select").with_argument("drilldown", "_key,tag");
        let error = parse(&command, drilldown_body()).unwrap_err();
        assert!(error.to_string().contains("2 drilldown keys requested but 1"));
    }

    #[test]
    fn test_empty_body() {
        let command = Command::new("select");
        assert!(parse(&command, json!([])).is_err());
        assert!(parse(&command, json!(null)).is_err());
    }
}
