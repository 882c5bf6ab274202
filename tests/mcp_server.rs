//! MCP Server Integration Tests
//!
//! Drives the GEOGLOWS server through a real MCP client over an in-memory
//! pipe, with a fixed data source behind it.

mod common;

use common::{KNOWN_REACH, connect_fake_server};
use geoglows_service::mcp::toolset::ToolsetError;
use serde_json::{Value, json};

#[tokio::test]
async fn test_server_advertises_the_four_tools() {
    let toolset = connect_fake_server().await;
    let names: Vec<&str> = toolset.tools().map(|t| t.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "get_forecast_stats",
            "get_forecasted_streamflow",
            "get_historical_streamflow",
            "get_return_periods",
        ]
    );

    for tool in toolset.tools() {
        assert!(!tool.description.is_empty(), "{} has no description", tool.name);
        assert_eq!(
            tool.input_schema["required"],
            json!(["river_id"]),
            "{} should require only river_id",
            tool.name
        );
    }
    toolset.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_forecast_is_returned_as_records() {
    let toolset = connect_fake_server().await;
    let text = toolset
        .call("get_forecasted_streamflow", json!({ "river_id": KNOWN_REACH }))
        .await
        .unwrap();

    let records: Vec<Value> = serde_json::from_str(&text).unwrap();
    assert_eq!(records.len(), 4);
    assert_eq!(records[0]["time"], "2025-10-24T00:00:00+00:00");
    assert_eq!(records[0]["flow_median"], 3752.5);
    // missing bounds come back as null, not dropped
    assert!(records[3]["flow_uncertainty_upper"].is_null());

    // time leads each record
    let time_at = text.find("\"time\"").unwrap();
    let upper_at = text.find("\"flow_uncertainty_upper\"").unwrap();
    assert!(time_at < upper_at);
    toolset.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_historical_honors_inclusive_date_bounds() {
    let toolset = connect_fake_server().await;
    let text = toolset
        .call(
            "get_historical_streamflow",
            json!({ "river_id": KNOWN_REACH, "start_date": "19400102", "end_date": "1940-01-04T07:00:00+00:00" }),
        )
        .await
        .unwrap();

    let records: Vec<Value> = serde_json::from_str(&text).unwrap();
    let times: Vec<&str> = records.iter().map(|r| r["time"].as_str().unwrap()).collect();
    assert_eq!(
        times,
        vec![
            "1940-01-02T07:00:00+00:00",
            "1940-01-03T07:00:00+00:00",
            "1940-01-04T07:00:00+00:00",
        ]
    );
    assert_eq!(records[0][KNOWN_REACH.to_string()], 4108.75);
    toolset.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_return_periods_are_keyed_by_reach_then_years() {
    let toolset = connect_fake_server().await;
    let text = toolset
        .call("get_return_periods", json!({ "river_id": KNOWN_REACH }))
        .await
        .unwrap();

    let table: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(table[KNOWN_REACH.to_string()]["2"], 22801.988);
    assert_eq!(table[KNOWN_REACH.to_string()]["100"], 45235.886);
    toolset.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_reach_is_a_tool_error_with_the_upstream_message() {
    let toolset = connect_fake_server().await;
    let err = toolset
        .call("get_forecast_stats", json!({ "river_id": 1 }))
        .await
        .unwrap_err();

    match err {
        ToolsetError::Tool(message) => assert!(message.contains("404"), "got {message}"),
        other => panic!("expected a tool error, got {other:?}"),
    }
    toolset.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_malformed_date_is_rejected_before_fetching() {
    let toolset = connect_fake_server().await;
    let err = toolset
        .call(
            "get_forecasted_streamflow",
            json!({ "river_id": KNOWN_REACH, "date": "next tuesday" }),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ToolsetError::Call(_)), "got {err:?}");
    toolset.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unadvertised_tool_is_not_sent() {
    let toolset = connect_fake_server().await;
    let err = toolset
        .call("get_reach_id", json!({ "lat": 40.0, "lon": -89.6 }))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolsetError::UnknownTool(name) if name == "get_reach_id"));
    toolset.shutdown().await.unwrap();
}
