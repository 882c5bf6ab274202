//! Shared fixtures: an in-memory streamflow source and an in-process MCP
//! connection to a server backed by it.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rmcp::ServiceExt;

use geoglows_service::ingest::StreamflowSource;
use geoglows_service::mcp::{GeoglowsServer, McpToolset};
use geoglows_service::model::{
    COL_FLOW_AVG, COL_FLOW_MEDIAN, COL_FLOW_UNCERTAINTY_LOWER, COL_FLOW_UNCERTAINTY_UPPER, Frame,
    GeoglowsError, ReturnPeriods,
};

pub const KNOWN_REACH: u64 = 760701588;

/// Answers for `KNOWN_REACH` with small fixed tables; every other reach
/// gets the 404 the live service returns for unknown ids.
pub struct FakeSource;

fn check_reach(river_id: u64) -> Result<(), GeoglowsError> {
    if river_id == KNOWN_REACH {
        Ok(())
    } else {
        Err(GeoglowsError::HttpError(404))
    }
}

fn three_hourly(n: u32) -> Vec<chrono::DateTime<Utc>> {
    (0..n)
        .map(|i| Utc.with_ymd_and_hms(2025, 10, 24, 0, 0, 0).unwrap() + chrono::Duration::hours(3 * i as i64))
        .collect()
}

#[async_trait]
impl StreamflowSource for FakeSource {
    async fn forecast(&self, river_id: u64, _date: Option<&str>) -> Result<Frame, GeoglowsError> {
        check_reach(river_id)?;
        let mut frame = Frame::new(three_hourly(4));
        frame.push_column(COL_FLOW_UNCERTAINTY_UPPER, vec![Some(3760.0), Some(3790.0), Some(3830.0), None])?;
        frame.push_column(COL_FLOW_MEDIAN, vec![Some(3752.5), Some(3773.25), Some(3799.75), Some(3810.0)])?;
        frame.push_column(COL_FLOW_UNCERTAINTY_LOWER, vec![Some(3745.0), Some(3760.0), Some(3770.0), None])?;
        Ok(frame)
    }

    async fn forecast_stats(&self, river_id: u64, _date: Option<&str>) -> Result<Frame, GeoglowsError> {
        check_reach(river_id)?;
        let mut frame = Frame::new(three_hourly(3));
        frame.push_column(COL_FLOW_AVG, vec![Some(3752.5), None, Some(3773.25)])?;
        frame.push_column("high_res", vec![Some(3746.75), Some(3752.5), Some(3765.5)])?;
        Ok(frame)
    }

    async fn retrospective(&self, river_id: u64) -> Result<Frame, GeoglowsError> {
        check_reach(river_id)?;
        let index: Vec<_> = (1..=5)
            .map(|day| Utc.with_ymd_and_hms(1940, 1, day, 7, 0, 0).unwrap())
            .collect();
        let mut frame = Frame::new(index);
        frame.push_column(
            KNOWN_REACH.to_string(),
            vec![Some(4099.5), Some(4108.75), Some(4120.0), Some(4131.25), Some(4140.0)],
        )?;
        Ok(frame)
    }

    async fn return_periods(&self, river_id: u64) -> Result<ReturnPeriods, GeoglowsError> {
        check_reach(river_id)?;
        let periods = BTreeMap::from([(2, 22801.988), (5, 29457.746), (100, 45235.886)]);
        Ok(BTreeMap::from([(KNOWN_REACH, periods)]))
    }
}

/// Start a server backed by `FakeSource` and connect a toolset to it.
pub async fn connect_fake_server() -> McpToolset {
    connect_server(Arc::new(FakeSource)).await
}

/// Start a server over an in-memory pipe and connect a toolset to it.
pub async fn connect_server(source: Arc<dyn StreamflowSource>) -> McpToolset {
    let (server_io, client_io) = tokio::io::duplex(64 * 1024);
    let server = GeoglowsServer::new("geoglows-test", source);
    tokio::spawn(async move {
        if let Ok(service) = server.serve(server_io).await {
            let _ = service.waiting().await;
        }
    });

    let peer = ().serve(client_io).await.expect("client handshake");
    McpToolset::from_peer(peer, Duration::from_secs(30))
        .await
        .expect("tool listing")
}

/// A one-shot HTTP server standing in for the GEOGLOWS API. Answers the
/// first request with `status` and `body`, and hands back its request line.
pub struct StubApi {
    pub endpoint: String,
    request_line: tokio::task::JoinHandle<String>,
}

impl StubApi {
    pub async fn start(status: &'static str, body: &'static str) -> Self {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());

        let request_line = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: text/csv\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();

            String::from_utf8_lossy(&request)
                .lines()
                .next()
                .unwrap_or_default()
                .to_string()
        });

        Self {
            endpoint,
            request_line,
        }
    }

    /// Config pointing the live client at this stub.
    pub fn config(&self) -> geoglows_service::config::Config {
        let mut config = geoglows_service::config::Config::default();
        config.geoglows.endpoint = self.endpoint.clone();
        config.geoglows.timeout_secs = 10;
        config
    }

    /// The request line the stub received, e.g. `GET /v2/forecast/1?format=csv HTTP/1.1`.
    pub async fn request_line(self) -> String {
        self.request_line.await.unwrap()
    }
}
