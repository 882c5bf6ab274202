//! Live GEOGLOWS API Tests
//!
//! These hit the public service and are ignored by default:
//!
//!     cargo test --test geoglows_live -- --ignored

use geoglows_service::config::Config;
use geoglows_service::ingest::{GeoglowsClient, StreamflowSource};
use geoglows_service::model::{COL_FLOW_MEDIAN, GeoglowsError};
use geoglows_service::verify::{VerificationStatus, run_verification};

const MISSISSIPPI_REACH: u64 = 760701588;

fn client() -> GeoglowsClient {
    GeoglowsClient::new(&Config::default()).unwrap()
}

#[tokio::test]
#[ignore]
async fn test_live_forecast_has_median_series() {
    let frame = client().forecast(MISSISSIPPI_REACH, None).await.unwrap();
    println!("forecast: {} rows, columns {:?}", frame.len(), frame.column_names());
    assert!(frame.has_column(COL_FLOW_MEDIAN));
    assert!(!frame.is_empty());
}

#[tokio::test]
#[ignore]
async fn test_live_retrospective_column_is_named_by_reach() {
    let frame = client().retrospective(MISSISSIPPI_REACH).await.unwrap();
    assert!(frame.has_column(&MISSISSIPPI_REACH.to_string()));
}

#[tokio::test]
#[ignore]
async fn test_live_return_periods_for_reach() {
    let table = client().return_periods(MISSISSIPPI_REACH).await.unwrap();
    let periods = table.get(&MISSISSIPPI_REACH).expect("reach missing from table");
    println!("return periods: {periods:?}");
    assert!(periods.contains_key(&2));
}

#[tokio::test]
#[ignore]
async fn test_live_unknown_reach_fails() {
    let err = client().forecast_stats(1, None).await.unwrap_err();
    println!("unknown reach: {err}");
    assert!(matches!(
        err,
        GeoglowsError::HttpError(_) | GeoglowsError::NoDataAvailable(_) | GeoglowsError::ParseError(_)
    ));
}

#[tokio::test]
#[ignore]
async fn test_live_verification_of_default_reaches() {
    let config = Config::default();
    let report = run_verification(&client(), &config.verify.reaches).await;
    for reach in &report.reaches {
        println!("{}: {:?}", reach.reach_id, reach.status);
    }
    assert!(
        report
            .reaches
            .iter()
            .any(|r| r.status != VerificationStatus::Failed),
        "no default reach is working"
    );
}
