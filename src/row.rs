// ABOUTME: Row and RowBatch data model for fetched source rows
// ABOUTME: Converts dynamically-typed MySQL values into a closed set of scalar kinds

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::NaiveDateTime;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Column the source tables must expose for range queries and offset tracking.
pub const IDENTITY_COLUMN: &str = "id";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// A single scalar value from a source column.
///
/// Serializes to JSON as null / bool / number / string; binary columns are
/// base64-encoded and timestamps are formatted as ISO-8601 text.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Timestamp(NaiveDateTime),
}

impl Serialize for ColumnValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ColumnValue::Null => serializer.serialize_unit(),
            ColumnValue::Bool(b) => serializer.serialize_bool(*b),
            ColumnValue::Int(i) => serializer.serialize_i64(*i),
            ColumnValue::Float(f) => serializer.serialize_f64(*f),
            ColumnValue::String(s) => serializer.serialize_str(s),
            ColumnValue::Bytes(b) => serializer.serialize_str(&BASE64.encode(b)),
            ColumnValue::Timestamp(ts) => {
                serializer.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string())
            }
        }
    }
}

impl From<mysql_async::Value> for ColumnValue {
    fn from(value: mysql_async::Value) -> Self {
        use mysql_async::Value;
        match value {
            Value::NULL => ColumnValue::Null,
            // MySQL text and binary columns both arrive as bytes; keep valid
            // UTF-8 as text and fall back to raw bytes otherwise.
            Value::Bytes(bytes) => match String::from_utf8(bytes) {
                Ok(s) => ColumnValue::String(s),
                Err(e) => ColumnValue::Bytes(e.into_bytes()),
            },
            Value::Int(i) => ColumnValue::Int(i),
            Value::UInt(u) => {
                if u <= i64::MAX as u64 {
                    ColumnValue::Int(u as i64)
                } else {
                    ColumnValue::String(u.to_string())
                }
            }
            Value::Float(f) => ColumnValue::Float(f as f64),
            Value::Double(d) => ColumnValue::Float(d),
            Value::Date(year, month, day, hour, minute, second, micros) => {
                chrono::NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
                    .and_then(|date| {
                        date.and_hms_micro_opt(hour as u32, minute as u32, second as u32, micros)
                    })
                    .map(ColumnValue::Timestamp)
                    .unwrap_or(ColumnValue::Null)
            }
            Value::Time(negative, days, hours, minutes, seconds, micros) => {
                let sign = if negative { "-" } else { "" };
                let total_hours = u32::from(hours) + days * 24;
                ColumnValue::String(format!(
                    "{sign}{total_hours:02}:{minutes:02}:{seconds:02}.{micros:06}"
                ))
            }
        }
    }
}

/// Immutable snapshot of one source row, preserving source column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<(String, ColumnValue)>,
}

impl Row {
    pub fn new(columns: Vec<(String, ColumnValue)>) -> Self {
        Self { columns }
    }

    /// Build a row from a raw `mysql_async` result row.
    pub fn from_mysql(row: mysql_async::Row) -> Self {
        let names: Vec<String> = row
            .columns_ref()
            .iter()
            .map(|col| col.name_str().into_owned())
            .collect();
        let values = row.unwrap();
        Self {
            columns: names
                .into_iter()
                .zip(values.into_iter().map(ColumnValue::from))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ColumnValue> {
        self.columns
            .iter()
            .find(|(col, _)| col == name)
            .map(|(_, value)| value)
    }

    /// The row's identity value, if it carries an integer `id` column.
    pub fn identity(&self) -> Option<i64> {
        match self.get(IDENTITY_COLUMN) {
            Some(ColumnValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn columns(&self) -> &[(String, ColumnValue)] {
        &self.columns
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Rows returned by one fetch cycle, in ascending identity order.
///
/// `max_id` is 0 for an empty batch, meaning "no new rows", not "id 0 seen".
#[derive(Debug, Clone, Default)]
pub struct RowBatch {
    pub rows: Vec<Row>,
    pub max_id: i64,
}

impl RowBatch {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let max_id = rows.iter().filter_map(Row::identity).max().unwrap_or(0);
        Self { rows, max_id }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row(id: i64) -> Row {
        Row::new(vec![
            ("id".to_string(), ColumnValue::Int(id)),
            ("name".to_string(), ColumnValue::String("alice".to_string())),
            ("active".to_string(), ColumnValue::Bool(true)),
            ("balance".to_string(), ColumnValue::Float(12.5)),
            ("note".to_string(), ColumnValue::Null),
        ])
    }

    #[test]
    fn test_row_serializes_as_ordered_object() {
        let json = serde_json::to_string(&sample_row(7)).unwrap();
        assert_eq!(
            json,
            r#"{"id":7,"name":"alice","active":true,"balance":12.5,"note":null}"#
        );
    }

    #[test]
    fn test_bytes_serialize_as_base64() {
        let row = Row::new(vec![(
            "blob".to_string(),
            ColumnValue::Bytes(vec![0xff, 0x00, 0x10]),
        )]);
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["blob"], BASE64.encode([0xff, 0x00, 0x10]));
    }

    #[test]
    fn test_identity_extraction() {
        assert_eq!(sample_row(42).identity(), Some(42));

        let no_id = Row::new(vec![(
            "name".to_string(),
            ColumnValue::String("x".to_string()),
        )]);
        assert_eq!(no_id.identity(), None);
    }

    #[test]
    fn test_mysql_value_conversion() {
        use mysql_async::Value;

        assert_eq!(ColumnValue::from(Value::NULL), ColumnValue::Null);
        assert_eq!(ColumnValue::from(Value::Int(-3)), ColumnValue::Int(-3));
        assert_eq!(ColumnValue::from(Value::UInt(9)), ColumnValue::Int(9));
        assert_eq!(
            ColumnValue::from(Value::UInt(u64::MAX)),
            ColumnValue::String(u64::MAX.to_string())
        );
        assert_eq!(
            ColumnValue::from(Value::Double(1.25)),
            ColumnValue::Float(1.25)
        );
        assert_eq!(
            ColumnValue::from(Value::Bytes(b"hello".to_vec())),
            ColumnValue::String("hello".to_string())
        );
        assert_eq!(
            ColumnValue::from(Value::Bytes(vec![0xff, 0xfe])),
            ColumnValue::Bytes(vec![0xff, 0xfe])
        );
    }

    #[test]
    fn test_mysql_date_conversion() {
        let value = mysql_async::Value::Date(2024, 3, 15, 10, 30, 0, 0);
        match ColumnValue::from(value) {
            ColumnValue::Timestamp(ts) => {
                assert_eq!(ts.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-03-15 10:30:00");
            }
            other => panic!("expected timestamp, got {:?}", other),
        }
    }

    #[test]
    fn test_batch_max_id() {
        let batch = RowBatch::from_rows(vec![sample_row(1), sample_row(5), sample_row(3)]);
        assert_eq!(batch.max_id, 5);
        assert_eq!(batch.len(), 3);

        let empty = RowBatch::from_rows(vec![]);
        assert!(empty.is_empty());
        assert_eq!(empty.max_id, 0);
    }
}
