/// GEOGLOWS (Group on Earth Observations Global Water Sustainability) REST Client
///
/// Retrieves streamflow forecasts, forecast ensemble statistics, the
/// retrospective (historical) simulation, and return-period thresholds for
/// a river reach from the ECMWF-hosted GEOGLOWS data service.
///
/// API Documentation: https://geoglows.ecmwf.int/
/// Requests: {endpoint}/{version}/{product}/{river_id}?format=csv[&date=YYYYMMDD]
///
/// The service answers every product as CSV whose first column is the
/// index. Time-series products are indexed by `datetime`; return periods
/// come keyed by reach or by return period depending on the product
/// version, so both layouts are accepted.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::analysis::dates::parse_date_bound;
use crate::config::Config;
use crate::logging::log_geoglows_failure;
use crate::model::{Frame, GeoglowsError, ReturnPeriods};

// ============================================================================
// Products
// ============================================================================

/// A GEOGLOWS REST product. The path segment is the product name with
/// underscores dropped, as the service expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Product {
    Forecast,
    ForecastStats,
    Retrospective,
    ReturnPeriods,
}

impl Product {
    pub fn path(self) -> &'static str {
        match self {
            Product::Forecast => "forecast",
            Product::ForecastStats => "forecaststats",
            Product::Retrospective => "retrospective",
            Product::ReturnPeriods => "returnperiods",
        }
    }
}

/// Build a product URL for one reach.
///
/// # Parameters
/// - `api_base`: endpoint including version, e.g. `https://geoglows.ecmwf.int/api/v2`
/// - `date`: forecast initialization date (`YYYYMMDD`); ignored by
///   products that don't take one
pub fn build_url(api_base: &str, product: Product, river_id: u64, date: Option<&str>) -> String {
    let mut url = format!(
        "{}/{}/{}?format=csv",
        api_base.trim_end_matches('/'),
        product.path(),
        river_id
    );
    if let Some(date) = date {
        url.push_str("&date=");
        url.push_str(date);
    }
    url
}

// ============================================================================
// Source abstraction
// ============================================================================

/// The four data-retrieval operations the MCP server exposes.
///
/// `GeoglowsClient` is the live implementation; tests substitute fixed
/// frames.
#[async_trait]
pub trait StreamflowSource: Send + Sync {
    /// Latest (or `date`'s) forecast: median and uncertainty bounds.
    async fn forecast(&self, river_id: u64, date: Option<&str>) -> Result<Frame, GeoglowsError>;

    /// Ensemble statistics for the latest (or `date`'s) forecast.
    async fn forecast_stats(
        &self,
        river_id: u64,
        date: Option<&str>,
    ) -> Result<Frame, GeoglowsError>;

    /// Full retrospective simulation. The single column is named by the reach id.
    async fn retrospective(&self, river_id: u64) -> Result<Frame, GeoglowsError>;

    async fn return_periods(&self, river_id: u64) -> Result<ReturnPeriods, GeoglowsError>;
}

// ============================================================================
// API Client
// ============================================================================

/// Live client for the GEOGLOWS REST API.
#[derive(Debug, Clone)]
pub struct GeoglowsClient {
    http: reqwest::Client,
    api_base: String,
}

impl GeoglowsClient {
    pub fn new(config: &Config) -> Result<Self, GeoglowsError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.geoglows.timeout_secs))
            .user_agent(concat!("geoglows_service/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            api_base: config.api_base(),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Fetch one product as CSV text.
    async fn fetch_csv(
        &self,
        product: Product,
        river_id: u64,
        date: Option<&str>,
    ) -> Result<String, GeoglowsError> {
        let url = build_url(&self.api_base, product, river_id, date);
        tracing::debug!(river_id, %url, "requesting {}", product.path());

        let response = self
            .http
            .get(&url)
            .header("Accept", "text/csv")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GeoglowsError::HttpError(response.status().as_u16()));
        }

        Ok(response.text().await?)
    }

    async fn fetch_frame(
        &self,
        product: Product,
        river_id: u64,
        date: Option<&str>,
    ) -> Result<Frame, GeoglowsError> {
        let result: Result<Frame, GeoglowsError> = async {
            let csv = self.fetch_csv(product, river_id, date).await?;
            let frame = parse_frame_csv(&csv)?;
            if frame.is_empty() {
                return Err(GeoglowsError::NoDataAvailable(river_id));
            }
            Ok(frame)
        }
        .await;

        if let Err(ref e) = result {
            log_geoglows_failure(river_id, product.path(), e);
        }
        result
    }
}

#[async_trait]
impl StreamflowSource for GeoglowsClient {
    async fn forecast(&self, river_id: u64, date: Option<&str>) -> Result<Frame, GeoglowsError> {
        self.fetch_frame(Product::Forecast, river_id, date).await
    }

    async fn forecast_stats(
        &self,
        river_id: u64,
        date: Option<&str>,
    ) -> Result<Frame, GeoglowsError> {
        self.fetch_frame(Product::ForecastStats, river_id, date).await
    }

    async fn retrospective(&self, river_id: u64) -> Result<Frame, GeoglowsError> {
        let frame = self
            .fetch_frame(Product::Retrospective, river_id, None)
            .await?;
        Ok(name_single_column_by_reach(frame, river_id))
    }

    async fn return_periods(&self, river_id: u64) -> Result<ReturnPeriods, GeoglowsError> {
        let result: Result<ReturnPeriods, GeoglowsError> = async {
            let csv = self
                .fetch_csv(Product::ReturnPeriods, river_id, None)
                .await?;
            let table = parse_return_periods_csv(&csv, river_id)?;
            if table.values().all(|periods| periods.is_empty()) {
                return Err(GeoglowsError::NoDataAvailable(river_id));
            }
            Ok(table)
        }
        .await;

        if let Err(ref e) = result {
            log_geoglows_failure(river_id, Product::ReturnPeriods.path(), e);
        }
        result
    }
}

/// Retrospective tables carry one flow column; make sure it is named by
/// the reach so the historical plot can find it.
pub fn name_single_column_by_reach(mut frame: Frame, river_id: u64) -> Frame {
    if let [column] = frame.columns.as_mut_slice() {
        column.name = river_id.to_string();
    }
    frame
}

// ============================================================================
// CSV Parsing
// ============================================================================

/// Split a CSV body into trimmed, non-empty rows of trimmed cells.
fn csv_rows(csv: &str) -> impl Iterator<Item = Vec<&str>> {
    csv.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.split(',').map(|cell| cell.trim().trim_matches('"')).collect())
}

/// Parse a cell that might be empty or "nan"/"null".
fn parse_cell(cell: &str) -> Option<f64> {
    match cell {
        "" => None,
        c if c.eq_ignore_ascii_case("nan") || c.eq_ignore_ascii_case("null") => None,
        c => c.parse::<f64>().ok().filter(|v| v.is_finite()),
    }
}

/// Parse an index timestamp. The service writes `2025-10-24 00:00:00+00:00`;
/// anything `parse_date_bound` understands is accepted as well.
fn parse_timestamp(cell: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(cell, "%Y-%m-%d %H:%M:%S%:z")
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| parse_date_bound(cell).ok())
}

/// Parse a time-indexed CSV product into a `Frame`.
///
/// The first column must be a timestamp; every other column becomes a
/// flow series. A body with only a header yields an empty frame.
pub fn parse_frame_csv(csv: &str) -> Result<Frame, GeoglowsError> {
    let mut rows = csv_rows(csv);
    let header = rows
        .next()
        .ok_or_else(|| GeoglowsError::ParseError("empty response body".to_string()))?;

    if header.len() < 2 {
        return Err(GeoglowsError::ParseError(format!(
            "expected an index and at least one value column, got header {:?}",
            header
        )));
    }

    let mut index = Vec::new();
    let mut values: Vec<Vec<Option<f64>>> = vec![Vec::new(); header.len() - 1];

    for (line_no, fields) in rows.enumerate() {
        if fields.len() != header.len() {
            return Err(GeoglowsError::ParseError(format!(
                "row {} has {} fields, header has {}",
                line_no + 2,
                fields.len(),
                header.len()
            )));
        }

        let timestamp = parse_timestamp(fields[0]).ok_or_else(|| {
            GeoglowsError::ParseError(format!("unparseable timestamp '{}'", fields[0]))
        })?;
        index.push(timestamp);

        for (column, cell) in values.iter_mut().zip(&fields[1..]) {
            column.push(parse_cell(cell));
        }
    }

    let mut frame = Frame::new(index);
    for (name, column) in header[1..].iter().zip(values) {
        frame.push_column(*name, column)?;
    }
    Ok(frame)
}

/// Extract the recurrence interval from a header like `2` or `return_period_2`.
fn parse_period(label: &str) -> Option<u32> {
    label
        .trim_start_matches(|c: char| !c.is_ascii_digit())
        .parse()
        .ok()
}

/// Parse a reach id cell, tolerating a float rendering like `760701588.0`.
fn parse_reach(cell: &str) -> Option<u64> {
    cell.parse::<u64>().ok().or_else(|| {
        cell.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0 && v.fract() == 0.0)
            .map(|v| v as u64)
    })
}

/// Parse the return-period product for `river_id` into reach → (years → flow).
///
/// Accepts either layout:
///   `return_period,<reach>...` with one row per return period, or
///   `river_id,2,5,10,...` with one row per reach.
///
/// The index label is not reliable (an unnamed index leaves it blank), so
/// the layout is chosen by where `river_id` shows up: among the header's
/// value columns, or in the index column. If it is in neither, the body is
/// not the table that was asked for.
pub fn parse_return_periods_csv(csv: &str, river_id: u64) -> Result<ReturnPeriods, GeoglowsError> {
    let mut rows = csv_rows(csv);
    let header = rows
        .next()
        .ok_or_else(|| GeoglowsError::ParseError("empty response body".to_string()))?;

    if header.len() < 2 {
        return Err(GeoglowsError::ParseError(format!(
            "unexpected return period header {:?}",
            header
        )));
    }

    let rows: Vec<Vec<&str>> = rows.collect();
    for (line_no, fields) in rows.iter().enumerate() {
        if fields.len() != header.len() {
            return Err(GeoglowsError::ParseError(format!(
                "row {} has {} fields, header has {}",
                line_no + 2,
                fields.len(),
                header.len()
            )));
        }
    }

    let mut table: ReturnPeriods = BTreeMap::new();
    if rows.is_empty() {
        return Ok(table);
    }

    let in_header = header[1..].iter().any(|h| parse_reach(h) == Some(river_id));
    let in_index = rows.iter().any(|r| parse_reach(r[0]) == Some(river_id));
    let periods_are_rows = match (in_header, in_index) {
        (true, false) => true,
        (false, true) => false,
        // both match only for tiny ids; fall back to the index label
        (true, true) => !header[0].to_ascii_lowercase().contains("river"),
        (false, false) => {
            return Err(GeoglowsError::ParseError(format!(
                "river {} is in neither the header nor the index column",
                river_id
            )));
        }
    };

    if periods_are_rows {
        let reaches = header[1..]
            .iter()
            .map(|h| {
                parse_reach(h)
                    .ok_or_else(|| GeoglowsError::ParseError(format!("bad river id '{}'", h)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        for reach in &reaches {
            table.entry(*reach).or_default();
        }

        for fields in &rows {
            let period = parse_period(fields[0]).ok_or_else(|| {
                GeoglowsError::ParseError(format!("bad return period '{}'", fields[0]))
            })?;
            for (reach, cell) in reaches.iter().zip(&fields[1..]) {
                if let Some(flow) = parse_cell(cell) {
                    table.entry(*reach).or_default().insert(period, flow);
                }
            }
        }
    } else {
        let periods = header[1..]
            .iter()
            .map(|h| {
                parse_period(h)
                    .ok_or_else(|| GeoglowsError::ParseError(format!("bad return period '{}'", h)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        for fields in &rows {
            let reach = parse_reach(fields[0]).ok_or_else(|| {
                GeoglowsError::ParseError(format!("bad river id '{}'", fields[0]))
            })?;
            let entry = table.entry(reach).or_default();
            for (period, cell) in periods.iter().zip(&fields[1..]) {
                if let Some(flow) = parse_cell(cell) {
                    entry.insert(*period, flow);
                }
            }
        }
    }

    Ok(table)
}

// ============================================================================
// Tests
// ============================================================================
