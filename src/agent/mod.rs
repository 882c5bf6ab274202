//! Agent wiring: the definitions handed to the agent runtime, the plot
//! function tool, and where its artifacts go.

pub mod artifacts;
pub mod definition;
pub mod plot;

use artifacts::ArtifactStore;

/// What a function tool sees when the runtime invokes it: the session
/// state written by earlier agents, and somewhere to save files.
pub struct ToolContext<'a> {
    pub state: &'a serde_json::Map<String, serde_json::Value>,
    pub artifacts: &'a dyn ArtifactStore,
}

impl<'a> ToolContext<'a> {
    pub fn new(
        state: &'a serde_json::Map<String, serde_json::Value>,
        artifacts: &'a dyn ArtifactStore,
    ) -> Self {
        Self { state, artifacts }
    }
}
