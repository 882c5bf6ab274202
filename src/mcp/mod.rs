//! MCP plumbing: the streamflow tool server, and the client-side toolset
//! that launches it as a subprocess.

pub mod server;
pub mod toolset;

pub use server::GeoglowsServer;
pub use toolset::{McpToolset, StdioConnectionParams};
