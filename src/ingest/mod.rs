/// Upstream data-service clients.
///
/// Submodules:
/// - `geoglows`: GEOGLOWS REST API client and CSV parsing.

pub mod geoglows;

pub use geoglows::{GeoglowsClient, StreamflowSource};
