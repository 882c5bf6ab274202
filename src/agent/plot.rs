//! The `plot_streamflow` function tool.
//!
//! Reads the data agent's output from session state, picks the series to
//! draw from the request kind, renders a PNG, and saves it through the
//! artifact store under a fixed name.
//!
//! | request                      | drawn                                         |
//! |------------------------------|-----------------------------------------------|
//! | `get_forecasted_streamflow`  | `flow_median` + silver uncertainty band       |
//! | `get_historical_streamflow`  | the column named by the reach id              |
//! | `get_forecast_stats`         | `flow_avg`                                    |
//! | `get_return_periods`         | nothing (not a time series)                   |

use chrono::{DateTime, Duration, Utc};
use image::ImageEncoder;
use image::codecs::png::PngEncoder;
use plotters::prelude::*;

use crate::agent::ToolContext;
use crate::agent::artifacts::ArtifactError;
use crate::agent::definition::{GeoglowsAgentOutput, OUTPUT_KEY};
use crate::analysis::records::frame_from_json;
use crate::logging::DataSource;
use crate::model::{
    COL_FLOW_AVG, COL_FLOW_MEDIAN, COL_FLOW_UNCERTAINTY_LOWER, COL_FLOW_UNCERTAINTY_UPPER,
    DataRequest, Frame,
};

/// Fixed artifact name the calling agent looks for.
pub const PLOT_ARTIFACT_NAME: &str = "geoglows_plot.png";
pub const PLOT_MIME_TYPE: &str = "image/png";

const WIDTH: u32 = 1024;
const HEIGHT: u32 = 576;

/// matplotlib's default line color.
const LINE_COLOR: RGBColor = RGBColor(31, 119, 180);
const BAND_COLOR: RGBColor = RGBColor(192, 192, 192);
const BAND_ALPHA: f64 = 0.3;

#[derive(Debug, thiserror::Error)]
pub enum PlotError {
    #[error("session state has no '{0}' entry")]
    MissingState(String),
    #[error("malformed agent output: {0}")]
    BadOutput(String),
    #[error("malformed data: {0}")]
    BadData(String),
    #[error("drawing failed: {0}")]
    Draw(String),
    #[error("PNG encoding failed: {0}")]
    Encode(String),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// What gets drawn for one request kind.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotTarget {
    pub column: String,
    pub label: &'static str,
    /// Lower/upper columns of a shaded band, if any.
    pub band: Option<(&'static str, &'static str)>,
}

impl PlotTarget {
    /// `None` for requests that aren't plotted.
    pub fn for_request(request: DataRequest, reach_id: u64) -> Option<Self> {
        match request {
            DataRequest::GetForecastedStreamflow => Some(PlotTarget {
                column: COL_FLOW_MEDIAN.to_owned(),
                label: "Median Flow",
                band: Some((COL_FLOW_UNCERTAINTY_LOWER, COL_FLOW_UNCERTAINTY_UPPER)),
            }),
            // For historical data, the column name is the reach_id
            DataRequest::GetHistoricalStreamflow => Some(PlotTarget {
                column: reach_id.to_string(),
                label: "Historical Flow",
                band: None,
            }),
            DataRequest::GetForecastStats => Some(PlotTarget {
                column: COL_FLOW_AVG.to_owned(),
                label: "Average Flow",
                band: None,
            }),
            DataRequest::GetReturnPeriods => None,
        }
    }
}

/// Result of a successful plot.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotOutcome {
    pub artifact: &'static str,
    pub version: u32,
    pub column: String,
    pub points: usize,
}

/// Reads the data agent's output from a state value. The runtime stores it
/// either as the object itself or as its JSON text; `data` may likewise
/// arrive as text or as already-parsed JSON.
pub fn parse_agent_output(value: &serde_json::Value) -> Result<GeoglowsAgentOutput, PlotError> {
    let mut value = match value {
        serde_json::Value::String(text) => serde_json::from_str::<serde_json::Value>(text)
            .map_err(|e| PlotError::BadOutput(e.to_string()))?,
        other => other.clone(),
    };

    if let Some(data) = value.get_mut("data") {
        if !data.is_string() {
            *data = serde_json::Value::String(data.to_string());
        }
    }

    serde_json::from_value(value).map_err(|e| PlotError::BadOutput(e.to_string()))
}

/// Plots streamflow data after it is received and saves it as an artifact.
///
/// Returns `Ok(None)` when nothing is plotted: return periods, or data
/// lacking the series the request kind calls for.
pub fn plot_streamflow(ctx: &ToolContext<'_>) -> Result<Option<PlotOutcome>, PlotError> {
    let source = DataSource::Agent;
    let value = ctx
        .state
        .get(OUTPUT_KEY)
        .ok_or_else(|| PlotError::MissingState(OUTPUT_KEY.to_string()))?;
    let output = parse_agent_output(value)?;

    // Do not plot for return periods as it is not a time series
    let Some(target) = PlotTarget::for_request(output.data_request, output.reach_id) else {
        tracing::info!(%source, request = %output.data_request, "nothing to plot");
        return Ok(None);
    };

    let frame = frame_from_json(&output.data).map_err(|e| PlotError::BadData(e.to_string()))?;
    if !frame.has_column(&target.column) {
        tracing::warn!(
            %source,
            request = %output.data_request,
            column = %target.column,
            "data has no column to plot"
        );
        return Ok(None);
    }

    let png = render_png(&frame, &target)?;
    let version = ctx
        .artifacts
        .save_artifact(PLOT_ARTIFACT_NAME, &png, PLOT_MIME_TYPE)?;

    let points = series(&frame, &target.column).len();
    tracing::info!(%source, column = %target.column, points, "saved {PLOT_ARTIFACT_NAME}");
    Ok(Some(PlotOutcome {
        artifact: PLOT_ARTIFACT_NAME,
        version,
        column: target.column,
        points,
    }))
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn draw_err(e: impl std::fmt::Display) -> PlotError {
    PlotError::Draw(e.to_string())
}

/// Non-missing points of one column.
fn series(frame: &Frame, column: &str) -> Vec<(DateTime<Utc>, f64)> {
    frame
        .column(column)
        .map(|c| {
            frame
                .index
                .iter()
                .zip(&c.values)
                .filter_map(|(t, v)| v.map(|v| (*t, v)))
                .collect()
        })
        .unwrap_or_default()
}

/// Runs of consecutive rows where `value(row)` is present. Missing values
/// break a line into separate segments instead of bridging the gap.
fn runs<T>(len: usize, mut value: impl FnMut(usize) -> Option<T>) -> Vec<Vec<T>> {
    let mut out = Vec::new();
    let mut current = Vec::new();
    for row in 0..len {
        match value(row) {
            Some(v) => current.push(v),
            None if !current.is_empty() => out.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn line_runs(frame: &Frame, column: &str) -> Vec<Vec<(DateTime<Utc>, f64)>> {
    let Some(col) = frame.column(column) else {
        return Vec::new();
    };
    runs(frame.len(), |row| col.values[row].map(|v| (frame.index[row], v)))
}

/// Band segments as (time, lower, upper), only where both bounds exist.
fn band_runs(frame: &Frame, lower: &str, upper: &str) -> Vec<Vec<(DateTime<Utc>, f64, f64)>> {
    let (Some(lo), Some(hi)) = (frame.column(lower), frame.column(upper)) else {
        return Vec::new();
    };
    runs(frame.len(), |row| match (lo.values[row], hi.values[row]) {
        (Some(l), Some(h)) => Some((frame.index[row], l, h)),
        _ => None,
    })
}

/// Axis ranges covering the line and band, padded so nothing sits on the frame.
fn axis_ranges(
    line: &[Vec<(DateTime<Utc>, f64)>],
    band: &[Vec<(DateTime<Utc>, f64, f64)>],
) -> Result<(std::ops::Range<DateTime<Utc>>, std::ops::Range<f64>), PlotError> {
    let times = line
        .iter()
        .flatten()
        .map(|(t, _)| *t)
        .chain(band.iter().flatten().map(|(t, _, _)| *t));
    let values = line
        .iter()
        .flatten()
        .map(|(_, v)| *v)
        .chain(band.iter().flatten().flat_map(|(_, l, h)| [*l, *h]));

    let (mut t0, mut t1) = times
        .fold(None, |acc: Option<(DateTime<Utc>, DateTime<Utc>)>, t| match acc {
            None => Some((t, t)),
            Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
        })
        .ok_or_else(|| PlotError::BadData("no values to plot".to_string()))?;
    let (mut y0, mut y1) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });

    if t0 == t1 {
        t0 -= Duration::hours(1);
        t1 += Duration::hours(1);
    }
    let pad = if y1 > y0 { (y1 - y0) * 0.05 } else { y0.abs().max(1.0) * 0.05 };
    y0 -= pad;
    y1 += pad;

    Ok((t0..t1, y0..y1))
}

/// Render the chart and encode it as PNG.
pub fn render_png(frame: &Frame, target: &PlotTarget) -> Result<Vec<u8>, PlotError> {
    encode_png(&render_rgb(frame, target)?)
}

/// Render the chart into a `WIDTH` x `HEIGHT` RGB buffer.
fn render_rgb(frame: &Frame, target: &PlotTarget) -> Result<Vec<u8>, PlotError> {
    let line = line_runs(frame, &target.column);
    let band = target
        .band
        .map(|(lower, upper)| band_runs(frame, lower, upper))
        .unwrap_or_default();
    let (x_range, y_range) = axis_ranges(&line, &band)?;

    let mut rgb = vec![0u8; (WIDTH * HEIGHT * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut rgb, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(draw_err)?;

        let mut builder = ChartBuilder::on(&root);
        builder.margin(20);
        #[cfg(feature = "fonts")]
        {
            builder
                .caption(&target.column, ("sans-serif", 22))
                .x_label_area_size(40)
                .y_label_area_size(70);
        }

        let mut chart = builder
            .build_cartesian_2d(x_range, y_range)
            .map_err(draw_err)?;

        #[cfg(feature = "fonts")]
        {
            chart
                .configure_mesh()
                .x_labels(8)
                .x_label_formatter(&|t: &DateTime<Utc>| t.format("%Y-%m-%d").to_string())
                .y_desc("Flow (m³/s)")
                .draw()
                .map_err(draw_err)?;
        }
        let band_style = BAND_COLOR.mix(BAND_ALPHA).filled();
        for (i, segment) in band.iter().enumerate() {
            let polygon: Vec<(DateTime<Utc>, f64)> = segment
                .iter()
                .map(|(t, _, h)| (*t, *h))
                .chain(segment.iter().rev().map(|(t, l, _)| (*t, *l)))
                .collect();
            let anno = chart
                .draw_series(std::iter::once(Polygon::new(polygon, band_style)))
                .map_err(draw_err)?;
            if i == 0 {
                anno.label("Uncertainty Bounds").legend(move |(x, y)| {
                    Rectangle::new([(x, y - 5), (x + 20, y + 5)], band_style)
                });
            }
        }

        for (i, segment) in line.into_iter().enumerate() {
            let anno = chart
                .draw_series(LineSeries::new(segment, LINE_COLOR.stroke_width(2)))
                .map_err(draw_err)?;
            if i == 0 {
                anno.label(target.label).legend(|(x, y)| {
                    PathElement::new(vec![(x, y), (x + 20, y)], LINE_COLOR.stroke_width(2))
                });
            }
        }

        #[cfg(feature = "fonts")]
        {
            if target.band.is_some() {
                chart
                    .configure_series_labels()
                    .position(plotters::chart::SeriesLabelPosition::UpperRight)
                    .background_style(WHITE.mix(0.8))
                    .border_style(BLACK)
                    .draw()
                    .map_err(draw_err)?;
            }
        }

        root.present().map_err(draw_err)?;
    }

    Ok(rgb)
}

fn encode_png(rgb: &[u8]) -> Result<Vec<u8>, PlotError> {
    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(rgb, WIDTH, HEIGHT, image::ColorType::Rgb8)
        .map_err(|e| PlotError::Encode(e.to_string()))?;
    Ok(png)
}
