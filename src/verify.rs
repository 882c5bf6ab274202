//! Data Source Verification Module
//!
//! Probes the configured reaches against the live GEOGLOWS API to determine
//! which products are reachable and returning data for each of them.
//!
//! Run this before pointing an agent at a new set of reaches.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::ingest::StreamflowSource;
use crate::logging::{DataSource, log_geoglows_failure, log_verification_summary};
use crate::model::{DataRequest, GeoglowsError};

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub timestamp: String,
    pub reaches: Vec<ReachVerification>,
    pub summary: VerificationSummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VerificationSummary {
    pub total: usize,
    pub working: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReachVerification {
    pub reach_id: u64,
    pub status: VerificationStatus,
    pub products: Vec<ProductVerification>,
}

/// Outcome of one product request for one reach.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductVerification {
    pub request: DataRequest,
    pub responsive: bool,
    /// Time-series rows, or return periods listed.
    pub sample_data_count: usize,
    pub columns: Vec<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum VerificationStatus {
    Success,
    PartialSuccess,
    Failed,
}

impl ProductVerification {
    fn failed(request: DataRequest, err: &GeoglowsError) -> Self {
        Self {
            request,
            responsive: false,
            sample_data_count: 0,
            columns: Vec::new(),
            error_message: Some(err.to_string()),
        }
    }

    fn working(&self) -> bool {
        self.responsive && self.sample_data_count > 0
    }
}

// ============================================================================
// Per-reach verification
// ============================================================================

async fn verify_product(
    source: &dyn StreamflowSource,
    reach_id: u64,
    request: DataRequest,
) -> ProductVerification {
    let result = match request {
        DataRequest::GetForecastedStreamflow => source.forecast(reach_id, None).await,
        DataRequest::GetForecastStats => source.forecast_stats(reach_id, None).await,
        DataRequest::GetHistoricalStreamflow => source.retrospective(reach_id).await,
        DataRequest::GetReturnPeriods => {
            return match source.return_periods(reach_id).await {
                Ok(table) => {
                    let periods = table.get(&reach_id);
                    ProductVerification {
                        request,
                        responsive: true,
                        sample_data_count: periods.map(|p| p.len()).unwrap_or(0),
                        columns: periods
                            .map(|p| p.keys().map(|y| y.to_string()).collect())
                            .unwrap_or_default(),
                        error_message: None,
                    }
                }
                Err(e) => {
                    log_geoglows_failure(reach_id, request.tool_name(), &e);
                    ProductVerification::failed(request, &e)
                }
            };
        }
    };

    match result {
        Ok(frame) => ProductVerification {
            request,
            responsive: true,
            sample_data_count: frame.len(),
            columns: frame.column_names().into_iter().map(String::from).collect(),
            error_message: None,
        },
        Err(e) => {
            log_geoglows_failure(reach_id, request.tool_name(), &e);
            ProductVerification::failed(request, &e)
        }
    }
}

/// Requests every product for `reach_id`. Success means all four returned
/// data; partial success means at least one did.
pub async fn verify_reach(source: &dyn StreamflowSource, reach_id: u64) -> ReachVerification {
    let mut products = Vec::with_capacity(DataRequest::ALL.len());
    for request in DataRequest::ALL {
        products.push(verify_product(source, reach_id, request).await);
    }

    let working = products.iter().filter(|p| p.working()).count();
    let status = if working == products.len() {
        VerificationStatus::Success
    } else if working > 0 {
        VerificationStatus::PartialSuccess
    } else {
        VerificationStatus::Failed
    };

    ReachVerification {
        reach_id,
        status,
        products,
    }
}

// ============================================================================
// Full Verification Runner
// ============================================================================

pub async fn run_verification(source: &dyn StreamflowSource, reaches: &[u64]) -> VerificationReport {
    let log_source = DataSource::Geoglows;
    let mut report = VerificationReport {
        timestamp: Utc::now().to_rfc3339(),
        reaches: Vec::with_capacity(reaches.len()),
        summary: VerificationSummary {
            total: reaches.len(),
            ..Default::default()
        },
    };

    for &reach_id in reaches {
        let result = verify_reach(source, reach_id).await;
        match result.status {
            VerificationStatus::Success | VerificationStatus::PartialSuccess => {
                tracing::info!(source = %log_source, reach_id, status = ?result.status, "reach verified");
                report.summary.working += 1;
            }
            VerificationStatus::Failed => {
                tracing::warn!(source = %log_source, reach_id, "reach verification failed");
                report.summary.failed += 1;
            }
        }
        report.reaches.push(result);
    }

    log_verification_summary(
        report.summary.total,
        report.summary.working,
        report.summary.failed,
    );
    report
}

pub fn print_summary(report: &VerificationReport) {
    println!("═══════════════════════════════════════════════════════════");
    println!("GEOGLOWS VERIFICATION SUMMARY ({})", report.timestamp);
    println!("═══════════════════════════════════════════════════════════");
    for reach in &report.reaches {
        println!("\nReach {}: {:?}", reach.reach_id, reach.status);
        for product in &reach.products {
            match &product.error_message {
                None => println!(
                    "  ✓ {:<28} {} rows [{}]",
                    product.request.tool_name(),
                    product.sample_data_count,
                    product.columns.join(", ")
                ),
                Some(err) => println!("  ✗ {:<28} {}", product.request.tool_name(), err),
            }
        }
    }

    let success_rate = if report.summary.total > 0 {
        (report.summary.working as f64 / report.summary.total as f64) * 100.0
    } else {
        0.0
    };
    println!();
    println!(
        "Reaches: {}/{} working ({} failed), {:.1}%",
        report.summary.working, report.summary.total, report.summary.failed, success_rate
    );
    println!("═══════════════════════════════════════════════════════════");
}
