/// Frame → JSON record conversion.
///
/// Mirrors what a dataframe "reset index, stringify timestamps, to records"
/// produces: one object per row, `time` first, then every column in frame
/// order. Missing values serialize as `null`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::analysis::dates::parse_date_bound;
use crate::model::{Frame, GeoglowsError, ReturnPeriods, TIME_COLUMN};

/// One row of a frame, borrowed. Serializes as an ordered JSON object.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    frame: &'a Frame,
    row: usize,
}

impl<'a> Record<'a> {
    pub fn time(&self) -> DateTime<Utc> {
        self.frame.index[self.row]
    }
}

impl Serialize for Record<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.frame.columns.len() + 1))?;
        map.serialize_entry(TIME_COLUMN, &iso_timestamp(self.time()))?;
        for column in &self.frame.columns {
            // serde_json writes non-finite floats as null anyway; be explicit.
            let value = column.values[self.row].filter(|v| v.is_finite());
            map.serialize_entry(&column.name, &value)?;
        }
        map.end()
    }
}

/// ISO-8601 with an explicit `+00:00` offset, e.g. `2025-10-24T00:00:00+00:00`.
pub fn iso_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

/// Converts a frame into one record per row.
pub fn frame_to_records(frame: &Frame) -> Vec<Record<'_>> {
    (0..frame.len()).map(|row| Record { frame, row }).collect()
}

/// Serializes a frame as a pretty-printed JSON array of records.
pub fn frame_to_json(frame: &Frame) -> Result<String, GeoglowsError> {
    serde_json::to_string_pretty(&frame_to_records(frame))
        .map_err(|e| GeoglowsError::ParseError(e.to_string()))
}

/// Serializes a return-period table as `{"<reach>": {"<years>": flow}}`.
///
/// serde_json quotes integer map keys, and both levels are `BTreeMap`s, so
/// periods come out in numeric order (2, 5, 10, ...), not lexicographic.
pub fn return_periods_to_json(table: &ReturnPeriods) -> Result<String, GeoglowsError> {
    serde_json::to_string(table).map_err(|e| GeoglowsError::ParseError(e.to_string()))
}

/// Rebuilds a frame from JSON records, the inverse of `frame_to_json`.
///
/// Used on the agent side, where the data comes back as text. Every record
/// needs a `time` field; a column missing from a record, or holding a
/// non-number, counts as a missing value. Columns come out in key order,
/// not the order they were written in.
pub fn frame_from_json(text: &str) -> Result<Frame, GeoglowsError> {
    let records: Vec<serde_json::Map<String, serde_json::Value>> =
        serde_json::from_str(text).map_err(|e| GeoglowsError::ParseError(e.to_string()))?;

    let mut index = Vec::with_capacity(records.len());
    let mut names: Vec<&str> = Vec::new();
    for record in &records {
        let time = record
            .get(TIME_COLUMN)
            .and_then(|v| v.as_str())
            .ok_or_else(|| GeoglowsError::ParseError("record without a time field".to_string()))?;
        index.push(parse_date_bound(time)?);

        for key in record.keys() {
            if key != TIME_COLUMN && !names.contains(&key.as_str()) {
                names.push(key);
            }
        }
    }

    let mut frame = Frame::new(index);
    for name in names {
        let values = records
            .iter()
            .map(|r| r.get(name).and_then(|v| v.as_f64()))
            .collect();
        frame.push_column(name, values)?;
    }
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn forecast_frame() -> Frame {
        let index = vec![
            Utc.with_ymd_and_hms(2025, 10, 24, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 10, 24, 3, 0, 0).unwrap(),
        ];
        let mut frame = Frame::new(index);
        frame
            .push_column("flow_uncertainty_upper", vec![Some(3752.61), Some(3773.44)])
            .unwrap();
        frame
            .push_column("flow_median", vec![Some(3752.61), None])
            .unwrap();
        frame
            .push_column("flow_uncertainty_lower", vec![Some(3752.61), Some(f64::NAN)])
            .unwrap();
        frame
    }

    #[test]
    fn test_record_count_matches_row_count() {
        let frame = forecast_frame();
        assert_eq!(frame_to_records(&frame).len(), frame.len());
    }

    #[test]
    fn test_timestamps_serialize_as_iso8601_with_offset() {
        let t = Utc.with_ymd_and_hms(2025, 10, 24, 0, 0, 0).unwrap();
        assert_eq!(iso_timestamp(t), "2025-10-24T00:00:00+00:00");
    }

    #[test]
    fn test_records_keep_time_first_and_column_order() {
        let json = frame_to_json(&forecast_frame()).unwrap();
        let time_at = json.find("\"time\"").unwrap();
        let upper_at = json.find("\"flow_uncertainty_upper\"").unwrap();
        let median_at = json.find("\"flow_median\"").unwrap();
        let lower_at = json.find("\"flow_uncertainty_lower\"").unwrap();
        assert!(time_at < upper_at && upper_at < median_at && median_at < lower_at);
    }

    #[test]
    fn test_missing_and_nan_values_become_null() {
        let json = frame_to_json(&forecast_frame()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed[1]["flow_median"].is_null());
        assert!(parsed[1]["flow_uncertainty_lower"].is_null());
        assert_eq!(parsed[1]["flow_uncertainty_upper"], 3773.44);
        assert_eq!(parsed[1]["time"], "2025-10-24T03:00:00+00:00");
    }

    #[test]
    fn test_json_is_indented_two_spaces() {
        let json = frame_to_json(&forecast_frame()).unwrap();
        assert!(json.starts_with("[\n  {\n    \"time\""));
    }

    #[test]
    fn test_empty_frame_serializes_as_empty_array() {
        assert_eq!(frame_to_json(&Frame::default()).unwrap(), "[]");
    }

    #[test]
    fn test_frame_from_json_reads_back_records() {
        let original = forecast_frame();
        let text = frame_to_json(&original).unwrap();
        let parsed = frame_from_json(&text).unwrap();

        assert_eq!(parsed.index, original.index);
        assert_eq!(
            parsed.column("flow_median").unwrap().values,
            vec![Some(3752.61), None]
        );
        // NaN went out as null and comes back missing
        assert_eq!(parsed.column("flow_uncertainty_lower").unwrap().values[1], None);
    }

    #[test]
    fn test_frame_from_json_requires_time() {
        let err = frame_from_json(r#"[{"flow_median": 1.0}]"#).unwrap_err();
        assert!(err.to_string().contains("time"));
    }

    #[test]
    fn test_frame_from_json_rejects_non_array() {
        assert!(frame_from_json(r#"{"760701588": {"2": 1.0}}"#).is_err());
    }

    #[test]
    fn test_return_periods_keep_numeric_period_order() {
        let mut periods = BTreeMap::new();
        for (years, flow) in [(2, 22801.988), (5, 29457.746), (10, 33551.224), (100, 45235.886)] {
            periods.insert(years, flow);
        }
        let mut table = ReturnPeriods::new();
        table.insert(760701588, periods);

        let json = return_periods_to_json(&table).unwrap();
        assert_eq!(
            json,
            r#"{"760701588":{"2":22801.988,"5":29457.746,"10":33551.224,"100":45235.886}}"#
        );
    }
}
