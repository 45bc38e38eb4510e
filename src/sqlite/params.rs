use rusqlite::types::Value;

use crate::types::RowValues;

/// Convert a single `RowValues` to a rusqlite `Value`.
#[must_use]
pub fn row_value_to_sqlite_value(value: &RowValues) -> Value {
    match value {
        RowValues::Int(i) => Value::Integer(*i),
        RowValues::Float(f) => Value::Real(*f),
        RowValues::Text(s) => Value::Text(s.clone()),
        RowValues::Bool(b) => Value::Integer(i64::from(*b)),
        RowValues::Timestamp(dt) => Value::Text(dt.format("%F %T%.f").to_string()),
        RowValues::Null => Value::Null,
        RowValues::JSON(jval) => Value::Text(jval.to_string()),
        RowValues::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

/// Owned `SQLite` parameters, ready to cross into the worker thread.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(pub Vec<Value>);

impl Params {
    /// Convert row values into `SQLite` values.
    #[must_use]
    pub fn convert(params: &[RowValues]) -> Self {
        Params(params.iter().map(row_value_to_sqlite_value).collect())
    }

    /// Borrow the underlying values.
    #[must_use]
    pub fn as_values(&self) -> &[Value] {
        &self.0
    }

    /// Build a borrowed params slice suitable for rusqlite execution.
    #[must_use]
    pub fn as_refs(&self) -> Vec<&dyn rusqlite::ToSql> {
        values_as_tosql(&self.0)
    }
}

pub(crate) fn values_as_tosql(values: &[Value]) -> Vec<&dyn rusqlite::ToSql> {
    values.iter().map(|v| v as &dyn rusqlite::ToSql).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bools_and_json_are_stored_as_sqlite_primitives() {
        let params = Params::convert(&[
            RowValues::Bool(true),
            RowValues::JSON(serde_json::json!({"a": 1})),
            RowValues::Null,
        ]);
        assert_eq!(
            params.as_values(),
            &[
                Value::Integer(1),
                Value::Text("{\"a\":1}".into()),
                Value::Null
            ]
        );
    }

    #[test]
    fn timestamps_round_trip_through_text() {
        let dt = chrono::NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|d| d.and_hms_milli_opt(12, 30, 15, 250))
            .unwrap();
        let value = row_value_to_sqlite_value(&RowValues::Timestamp(dt));
        assert_eq!(value, Value::Text("2024-05-01 12:30:15.250".into()));
        let back = RowValues::Text("2024-05-01 12:30:15.250".into());
        assert_eq!(back.as_timestamp(), Some(dt));
    }
}
