/// Core data types for the GEOGLOWS streamflow service.
///
/// This module defines the shared domain model imported by all other modules:
/// the time-indexed `Frame` that every time-series product is parsed into,
/// the return-period table, the four request kinds, and the error type.
/// It contains no I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Column names
// ---------------------------------------------------------------------------

/// Name given to the reset index in record output.
pub const TIME_COLUMN: &str = "time";

pub const COL_FLOW_MEDIAN: &str = "flow_median";
pub const COL_FLOW_UNCERTAINTY_UPPER: &str = "flow_uncertainty_upper";
pub const COL_FLOW_UNCERTAINTY_LOWER: &str = "flow_uncertainty_lower";

/// Ensemble average, the series plotted for forecast statistics.
pub const COL_FLOW_AVG: &str = "flow_avg";

// ---------------------------------------------------------------------------
// Time-indexed table
// ---------------------------------------------------------------------------

/// One named series of a `Frame`. Missing values (`NaN` or empty cells in
/// the upstream table) are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// A table of flow series sharing one UTC timestamp index.
///
/// Every column has exactly `index.len()` values. Construct with
/// `Frame::new` + `Frame::push_column` to keep that invariant.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    pub index: Vec<DateTime<Utc>>,
    pub columns: Vec<Column>,
}

impl Frame {
    pub fn new(index: Vec<DateTime<Utc>>) -> Self {
        Self {
            index,
            columns: Vec::new(),
        }
    }

    /// Appends a column. Fails if its length does not match the index.
    pub fn push_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<(), GeoglowsError> {
        let name = name.into();
        if values.len() != self.index.len() {
            return Err(GeoglowsError::ParseError(format!(
                "column '{}' has {} values for {} timestamps",
                name,
                values.len(),
                self.index.len()
            )));
        }
        self.columns.push(Column { name, values });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Keeps the rows whose timestamp lies in `[start, end]`. Either bound
    /// may be omitted.
    pub fn between(&self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Frame {
        let keep: Vec<bool> = self
            .index
            .iter()
            .map(|t| start.is_none_or(|s| *t >= s) && end.is_none_or(|e| *t <= e))
            .collect();

        let index = self
            .index
            .iter()
            .zip(&keep)
            .filter(|(_, k)| **k)
            .map(|(t, _)| *t)
            .collect();

        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                values: c
                    .values
                    .iter()
                    .zip(&keep)
                    .filter(|(_, k)| **k)
                    .map(|(v, _)| *v)
                    .collect(),
            })
            .collect();

        Frame { index, columns }
    }
}

// ---------------------------------------------------------------------------
// Return periods
// ---------------------------------------------------------------------------

/// Flow magnitude per recurrence interval (years), per reach.
///
/// Both levels are ordered maps so serialization is stable: reaches by id,
/// return periods ascending.
pub type ReturnPeriods = BTreeMap<u64, BTreeMap<u32, f64>>;

// ---------------------------------------------------------------------------
// Request kinds
// ---------------------------------------------------------------------------

/// The four data requests the MCP server answers. The serialized form is
/// the tool name, which is also what the data agent reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DataRequest {
    GetForecastedStreamflow,
    GetHistoricalStreamflow,
    GetForecastStats,
    GetReturnPeriods,
}

impl DataRequest {
    pub const ALL: [DataRequest; 4] = [
        DataRequest::GetForecastedStreamflow,
        DataRequest::GetHistoricalStreamflow,
        DataRequest::GetForecastStats,
        DataRequest::GetReturnPeriods,
    ];

    pub fn tool_name(self) -> &'static str {
        match self {
            DataRequest::GetForecastedStreamflow => "get_forecasted_streamflow",
            DataRequest::GetHistoricalStreamflow => "get_historical_streamflow",
            DataRequest::GetForecastStats => "get_forecast_stats",
            DataRequest::GetReturnPeriods => "get_return_periods",
        }
    }

    pub fn from_tool_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.tool_name() == name)
    }

    /// Whether the response is a time series (everything but return periods).
    pub fn is_time_series(self) -> bool {
        !matches!(self, DataRequest::GetReturnPeriods)
    }
}

impl fmt::Display for DataRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tool_name())
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise when fetching or processing GEOGLOWS data.
#[derive(Debug, thiserror::Error)]
pub enum GeoglowsError {
    /// Non-2xx HTTP response from the GEOGLOWS API.
    #[error("HTTP error: {0}")]
    HttpError(u16),
    /// The request never produced a response (DNS, TLS, timeout, ...).
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The response body could not be parsed.
    #[error("Parse error: {0}")]
    ParseError(String),
    /// The service answered but the table was empty.
    #[error("No data available for river {0}")]
    NoDataAvailable(u64),
    /// A caller-supplied date bound could not be understood.
    #[error("Invalid date '{0}': expected YYYYMMDD, YYYY-MM-DD or RFC 3339")]
    InvalidDate(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hourly(n: u32) -> Vec<DateTime<Utc>> {
        (0..n)
            .map(|h| Utc.with_ymd_and_hms(2025, 10, 24, h, 0, 0).unwrap())
            .collect()
    }

    #[test]
    fn test_push_column_rejects_length_mismatch() {
        let mut frame = Frame::new(hourly(3));
        let err = frame
            .push_column(COL_FLOW_MEDIAN, vec![Some(1.0), Some(2.0)])
            .unwrap_err();
        assert!(err.to_string().contains("flow_median"));
        assert!(frame.columns.is_empty());
    }

    #[test]
    fn test_between_is_inclusive_on_both_ends() {
        let mut frame = Frame::new(hourly(5));
        frame
            .push_column("760701588", (0..5).map(|v| Some(v as f64)).collect())
            .unwrap();

        let start = Utc.with_ymd_and_hms(2025, 10, 24, 1, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 10, 24, 3, 0, 0).unwrap();
        let filtered = frame.between(Some(start), Some(end));

        assert_eq!(filtered.len(), 3);
        assert_eq!(filtered.index.first(), Some(&start));
        assert_eq!(filtered.index.last(), Some(&end));
        assert_eq!(
            filtered.column("760701588").unwrap().values,
            vec![Some(1.0), Some(2.0), Some(3.0)]
        );
    }

    #[test]
    fn test_between_without_bounds_keeps_everything() {
        let mut frame = Frame::new(hourly(4));
        frame.push_column("x", vec![None; 4]).unwrap();
        assert_eq!(frame.between(None, None), frame);
    }

    #[test]
    fn test_data_request_serializes_as_tool_name() {
        for request in DataRequest::ALL {
            assert_eq!(DataRequest::from_tool_name(request.tool_name()), Some(request));
            let json = serde_json::to_string(&request).unwrap();
            assert_eq!(json, format!("\"{}\"", request.tool_name()));
        }
        assert_eq!(DataRequest::from_tool_name("get_reach_id"), None);
    }

    #[test]
    fn test_only_return_periods_is_not_a_time_series() {
        assert!(!DataRequest::GetReturnPeriods.is_time_series());
        assert!(DataRequest::GetForecastStats.is_time_series());
    }
}
