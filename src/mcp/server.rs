//! MCP server exposing the four GEOGLOWS data-retrieval tools.
//!
//! Each tool forwards to a [`StreamflowSource`], converts the result to
//! JSON text, and returns it as a single text content item. Data-service
//! failures come back as tool errors carrying the upstream message, so the
//! calling agent sees them verbatim.

use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, ServerHandler, ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
    transport::stdio,
};
use serde::Deserialize;

use crate::analysis::dates::{normalize_forecast_date, parse_optional_bound};
use crate::analysis::records::{frame_to_json, return_periods_to_json};
use crate::ingest::StreamflowSource;
use crate::logging::DataSource;
use crate::model::{DataRequest, GeoglowsError};

const INSTRUCTIONS: &str = "Streamflow data from the GEOGLOWS global hydrology service. \
Every tool takes a river reach id (`river_id`). Forecast tools accept an optional \
`date` (YYYYMMDD) and default to the latest forecast; the historical tool accepts \
optional `start_date`/`end_date` bounds. Time series are returned as JSON arrays \
of records with an ISO-8601 `time` field.";

/// Arguments for the forecast and forecast-statistics tools.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ForecastArgs {
    /// The ID of the river reach.
    pub river_id: u64,
    /// The date for the forecast in YYYYMMDD format. Defaults to the latest forecast.
    #[serde(default)]
    pub date: Option<String>,
}

/// Arguments for the historical streamflow tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct HistoricalArgs {
    /// The ID of the river reach.
    pub river_id: u64,
    /// The start date for the historical data in YYYYMMDD format.
    #[serde(default)]
    pub start_date: Option<String>,
    /// The end date for the historical data in YYYYMMDD format.
    #[serde(default)]
    pub end_date: Option<String>,
}

/// Arguments for the return-period tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ReturnPeriodArgs {
    /// The ID of the river reach.
    pub river_id: u64,
}

/// The GEOGLOWS MCP server.
#[derive(Clone)]
pub struct GeoglowsServer {
    name: String,
    source: Arc<dyn StreamflowSource>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl GeoglowsServer {
    pub fn new(name: impl Into<String>, source: Arc<dyn StreamflowSource>) -> Self {
        Self {
            name: name.into(),
            source,
            tool_router: Self::tool_router(),
        }
    }

    /// Get the forecasted streamflow for a given river_id.
    #[tool(description = "Get the forecasted streamflow (median and uncertainty bounds) for a given river_id.")]
    async fn get_forecasted_streamflow(
        &self,
        Parameters(args): Parameters<ForecastArgs>,
    ) -> Result<CallToolResult, McpError> {
        let request = DataRequest::GetForecastedStreamflow;
        let date = forecast_date(args.date.as_deref())?;
        log_call(request, args.river_id);

        let result = self.source.forecast(args.river_id, date.as_deref()).await;
        Ok(respond(request, result.and_then(|frame| frame_to_json(&frame))))
    }

    #[tool(description = "Get the historical streamflow for a given river_id, optionally limited to start_date..end_date (YYYYMMDD, inclusive).")]
    async fn get_historical_streamflow(
        &self,
        Parameters(args): Parameters<HistoricalArgs>,
    ) -> Result<CallToolResult, McpError> {
        let request = DataRequest::GetHistoricalStreamflow;
        let start = parse_optional_bound(args.start_date.as_deref()).map_err(invalid_params)?;
        let end = parse_optional_bound(args.end_date.as_deref()).map_err(invalid_params)?;
        log_call(request, args.river_id);

        let result = self
            .source
            .retrospective(args.river_id)
            .await
            .and_then(|frame| frame_to_json(&frame.between(start, end)));
        Ok(respond(request, result))
    }

    #[tool(description = "Get the forecast ensemble statistics (min, 25th percentile, average, median, 75th percentile, max, high resolution) for a given river_id.")]
    async fn get_forecast_stats(
        &self,
        Parameters(args): Parameters<ForecastArgs>,
    ) -> Result<CallToolResult, McpError> {
        let request = DataRequest::GetForecastStats;
        let date = forecast_date(args.date.as_deref())?;
        log_call(request, args.river_id);

        let result = self
            .source
            .forecast_stats(args.river_id, date.as_deref())
            .await;
        Ok(respond(request, result.and_then(|frame| frame_to_json(&frame))))
    }

    #[tool(description = "Get the return periods (recurrence interval in years to flow) for a given river_id.")]
    async fn get_return_periods(
        &self,
        Parameters(args): Parameters<ReturnPeriodArgs>,
    ) -> Result<CallToolResult, McpError> {
        let request = DataRequest::GetReturnPeriods;
        log_call(request, args.river_id);

        let result = self.source.return_periods(args.river_id).await;
        Ok(respond(
            request,
            result.and_then(|table| return_periods_to_json(&table)),
        ))
    }
}

#[tool_handler]
impl ServerHandler for GeoglowsServer {
    fn get_info(&self) -> ServerInfo {
        let mut info = ServerInfo::default();
        info.capabilities = ServerCapabilities::builder().enable_tools().build();
        info.server_info.name = self.name.clone();
        info.server_info.version = env!("CARGO_PKG_VERSION").to_string();
        info.instructions = Some(INSTRUCTIONS.to_string());
        info
    }
}

impl GeoglowsServer {
    /// Serve over stdin/stdout until the client disconnects.
    pub async fn serve_stdio(self) -> anyhow::Result<()> {
        let source = DataSource::Mcp;
        tracing::info!(%source, name = %self.name, "serving MCP over stdio");
        let service = self.serve(stdio()).await?;
        service.waiting().await?;
        tracing::info!(%source, "client disconnected");
        Ok(())
    }
}

fn forecast_date(date: Option<&str>) -> Result<Option<String>, McpError> {
    match date {
        Some(d) if !d.trim().is_empty() => normalize_forecast_date(d)
            .map(Some)
            .map_err(invalid_params),
        _ => Ok(None),
    }
}

fn invalid_params(err: GeoglowsError) -> McpError {
    McpError::invalid_params(err.to_string(), None)
}

fn log_call(request: DataRequest, river_id: u64) {
    let source = DataSource::Mcp;
    tracing::info!(%source, river_id, tool = %request, "tool call");
}

/// Wrap a tool outcome: JSON text on success, the error message as a tool
/// error otherwise.
fn respond(request: DataRequest, result: Result<String, GeoglowsError>) -> CallToolResult {
    match result {
        Ok(json) => CallToolResult::success(vec![Content::text(json)]),
        Err(e) => {
            let source = DataSource::Mcp;
            tracing::warn!(%source, tool = %request, "tool failed: {e}");
            CallToolResult::error(vec![Content::text(e.to_string())])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_forecast_date_means_latest() {
        assert_eq!(forecast_date(None).unwrap(), None);
        assert_eq!(forecast_date(Some("")).unwrap(), None);
    }

    #[test]
    fn test_forecast_date_is_normalized() {
        assert_eq!(
            forecast_date(Some("2025-10-24")).unwrap().as_deref(),
            Some("20251024")
        );
    }

    #[test]
    fn test_bad_forecast_date_is_invalid_params() {
        let err = forecast_date(Some("tomorrow")).unwrap_err();
        assert!(err.message.contains("tomorrow"));
    }

    #[test]
    fn test_tool_args_schema_documents_river_id() {
        let schema = serde_json::to_value(schemars::schema_for!(HistoricalArgs)).unwrap();
        let props = &schema["properties"];
        assert_eq!(props["river_id"]["description"], "The ID of the river reach.");
        assert!(props["start_date"].is_object());
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required, &vec![serde_json::json!("river_id")]);
    }

    #[test]
    fn test_tool_args_accept_missing_optional_dates() {
        let args: ForecastArgs = serde_json::from_str(r#"{"river_id": 760701588}"#).unwrap();
        assert_eq!(args.river_id, 760701588);
        assert!(args.date.is_none());
    }
}
