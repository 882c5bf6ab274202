//! Agent definitions handed to the external agent runtime.
//!
//! Two agents: a data agent that picks one of the MCP tools and reports the
//! raw result in a fixed structure, and a root agent that delegates to it
//! and then plots. Only configuration lives here; tool selection and
//! instruction following belong to the runtime.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::AgentConfig;
use crate::mcp::toolset::StdioConnectionParams;
use crate::model::DataRequest;

pub const DATA_AGENT_NAME: &str = "geoglows_data_agent";
pub const ROOT_AGENT_NAME: &str = "geoglows_agent";
/// Session-state key the data agent writes its structured output under.
pub const OUTPUT_KEY: &str = "streamflow_out";
pub const PLOT_TOOL_NAME: &str = "plot_streamflow";

/// Structured output of the data agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GeoglowsAgentOutput {
    /// The type of data request to the MCP server.
    pub data_request: DataRequest,
    /// ID for the reach or river the data is valid for.
    pub reach_id: u64,
    /// Raw JSON data returned from the MCP server.
    pub data: String,
}

/// A tool entry in an agent definition.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolSpec {
    /// Every tool of an MCP server launched over stdio.
    McpToolset { connection: StdioConnectionParams },
    /// Another agent, callable as a tool.
    AgentTool { agent: Box<AgentDefinition> },
    /// A function implemented by this crate.
    Function { name: String, description: String },
}

/// One agent as the runtime should construct it.
#[derive(Debug, Clone, Serialize)]
pub struct AgentDefinition {
    pub name: String,
    pub model: String,
    pub instruction: String,
    pub tools: Vec<ToolSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
}

const DATA_AGENT_PREAMBLE: &str = "\
Help the user access streamflow data from geoglows service.
You must first use one of the MCP tools based on the user query and
return all of the data from the service.
Provide what type of data that was requested from geoglows.
When returning the data, return only the raw json string to
the data structure.

The following are examples of schemas for the different methods and must
be formatted as shown below:
";

const FORECAST_EXAMPLE: &str = r#"[
  {
    "time": "2025-10-24T00:00:00+00:00",
    "flow_uncertainty_upper": 3752.610107421875,
    "flow_median": 3752.610107421875,
    "flow_uncertainty_lower": 3752.610107421875
  },
  {
    "time": "2025-10-24T03:00:00+00:00",
    "flow_uncertainty_upper": 3773.43994140625,
    "flow_median": 3773.43994140625,
    "flow_uncertainty_lower": 3773.43994140625
  }
]"#;

const HISTORICAL_EXAMPLE: &str = r#"[
  {
    "time": "1940-01-01T07:00:00+00:00",
    "760701588": 4099.68994140625
  },
  {
    "time": "1940-01-01T08:00:00+00:00",
    "760701588": 4108.91015625
  }
]"#;

const FORECAST_STATS_EXAMPLE: &str = r#"[
  {
    "time": "2025-10-24T00:00:00+00:00",
    "flow_min": 3752.610107421875,
    "flow_25p": 3752.610107421875,
    "flow_avg": 3752.610107421875,
    "flow_med": 3752.610107421875,
    "flow_75p": 3752.610107421875,
    "flow_max": 3752.610107421875,
    "high_res": 3746.75
  },
  {
    "time": "2025-10-24T01:00:00+00:00",
    "flow_min": null,
    "flow_25p": null,
    "flow_avg": null,
    "flow_med": null,
    "flow_75p": null,
    "flow_max": null,
    "high_res": 3752.389892578125
  }
]"#;

const RETURN_PERIODS_EXAMPLE: &str = r#"{
  "760701588": {
    "2": 22801.988,
    "5": 29457.746,
    "10": 33551.224,
    "25": 38436.758,
    "50": 41900.588,
    "100": 45235.886
  }
}"#;

const ROOT_AGENT_INSTRUCTION: &str = "\
Help the user access and plot streamflow data from geoglows service.
You must first retrieve data from the subagent before attempting to plot anything.";

const PLOT_TOOL_DESCRIPTION: &str =
    "Plots streamflow data after it is received and saves it as an artifact.";

fn example_for(request: DataRequest) -> &'static str {
    match request {
        DataRequest::GetForecastedStreamflow => FORECAST_EXAMPLE,
        DataRequest::GetHistoricalStreamflow => HISTORICAL_EXAMPLE,
        DataRequest::GetForecastStats => FORECAST_STATS_EXAMPLE,
        DataRequest::GetReturnPeriods => RETURN_PERIODS_EXAMPLE,
    }
}

/// The data agent's instruction: task, one example per tool, and the
/// closed list of `data_request` values.
pub fn data_agent_instruction() -> String {
    let mut text = String::from(DATA_AGENT_PREAMBLE);
    for request in DataRequest::ALL {
        text.push_str(&format!("\n--- {} ---\n{}\n", request, example_for(request)));
    }

    let options = DataRequest::ALL
        .iter()
        .map(|r| format!("  `{r}`"))
        .collect::<Vec<_>>()
        .join(",\n");
    text.push_str(&format!(
        "\nFor the `data_request` field in the response, you must choose one of\n\
         the following options:\n[\n{options}\n]\n"
    ));
    text
}

/// JSON schema of [`GeoglowsAgentOutput`].
pub fn output_schema() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(GeoglowsAgentOutput))
        .unwrap_or(serde_json::Value::Null)
}

/// The data agent, wired to the MCP server described by `connection`.
pub fn data_agent(config: &AgentConfig, connection: StdioConnectionParams) -> AgentDefinition {
    AgentDefinition {
        name: DATA_AGENT_NAME.to_owned(),
        model: config.model.clone(),
        instruction: data_agent_instruction(),
        tools: vec![ToolSpec::McpToolset { connection }],
        output_key: Some(OUTPUT_KEY.to_owned()),
        output_schema: Some(output_schema()),
    }
}

/// The root agent: delegates retrieval to the data agent, then plots.
pub fn root_agent(config: &AgentConfig, connection: StdioConnectionParams) -> AgentDefinition {
    AgentDefinition {
        name: ROOT_AGENT_NAME.to_owned(),
        model: config.model.clone(),
        instruction: ROOT_AGENT_INSTRUCTION.to_owned(),
        tools: vec![
            ToolSpec::AgentTool {
                agent: Box::new(data_agent(config, connection)),
            },
            ToolSpec::Function {
                name: PLOT_TOOL_NAME.to_owned(),
                description: PLOT_TOOL_DESCRIPTION.to_owned(),
            },
        ],
        output_key: None,
        output_schema: None,
    }
}
