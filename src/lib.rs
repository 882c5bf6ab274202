pub mod agent;
pub mod analysis;
pub mod config;
pub mod ingest;
pub mod logging;
pub mod mcp;
pub mod model;
pub mod verify;
