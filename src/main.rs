use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};

use geoglows_service::agent::ToolContext;
use geoglows_service::agent::artifacts::FsArtifactStore;
use geoglows_service::agent::definition::{GeoglowsAgentOutput, OUTPUT_KEY, root_agent};
use geoglows_service::agent::plot::plot_streamflow;
use geoglows_service::config::Config;
use geoglows_service::ingest::GeoglowsClient;
use geoglows_service::logging::{DataSource, init_logger};
use geoglows_service::mcp::{GeoglowsServer, McpToolset, StdioConnectionParams};
use geoglows_service::model::DataRequest;
use geoglows_service::verify::{print_summary, run_verification};

#[derive(Parser)]
#[command(name = "geoglows", version, about = "GEOGLOWS streamflow tools for agents")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the MCP server on stdin/stdout.
    Serve,
    /// Call one tool through the MCP server and save the result as agent state.
    Fetch {
        /// get_forecasted_streamflow, get_historical_streamflow,
        /// get_forecast_stats or get_return_periods.
        #[arg(value_parser = parse_request)]
        tool: DataRequest,
        #[arg(long)]
        river_id: u64,
        /// Forecast date (YYYYMMDD).
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        start_date: Option<String>,
        #[arg(long)]
        end_date: Option<String>,
        /// Where to write the state file; stdout if omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Plot a saved state file into the artifact directory.
    Plot {
        #[arg(long)]
        state: PathBuf,
    },
    /// Print the agent definitions as JSON.
    Agents,
    /// Probe the configured reaches against the live API.
    Verify {
        /// Print the report as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

fn parse_request(name: &str) -> Result<DataRequest, String> {
    DataRequest::from_tool_name(name).ok_or_else(|| {
        let known: Vec<_> = DataRequest::ALL.iter().map(|r| r.tool_name()).collect();
        format!("unknown tool '{name}' (expected one of {})", known.join(", "))
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    init_logger(&config.logging)?;

    let source = DataSource::System;
    tracing::debug!(%source, endpoint = %config.api_base(), "configuration loaded");

    match cli.command {
        Command::Serve => {
            let client = GeoglowsClient::new(&config)?;
            GeoglowsServer::new(config.server.name.clone(), Arc::new(client))
                .serve_stdio()
                .await
        }
        Command::Fetch {
            tool,
            river_id,
            date,
            start_date,
            end_date,
            out,
        } => {
            let arguments = tool_arguments(tool, river_id, date, start_date, end_date);
            fetch(&config, cli.config.as_deref(), tool, river_id, arguments, out).await
        }
        Command::Plot { state } => plot(&config, &state),
        Command::Agents => {
            let connection = StdioConnectionParams::from_config(&config.agent)?;
            let agent = root_agent(&config.agent, connection);
            println!("{}", serde_json::to_string_pretty(&agent)?);
            Ok(())
        }
        Command::Verify { json } => {
            let client = GeoglowsClient::new(&config)?;
            let report = run_verification(&client, &config.verify.reaches).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_summary(&report);
            }
            if report.summary.working == 0 && report.summary.total > 0 {
                bail!("no configured reach is returning data");
            }
            Ok(())
        }
    }
}

fn tool_arguments(
    tool: DataRequest,
    river_id: u64,
    date: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
) -> serde_json::Value {
    let mut args = serde_json::Map::new();
    args.insert("river_id".into(), river_id.into());
    match tool {
        DataRequest::GetForecastedStreamflow | DataRequest::GetForecastStats => {
            if let Some(date) = date {
                args.insert("date".into(), date.into());
            }
        }
        DataRequest::GetHistoricalStreamflow => {
            if let Some(start) = start_date {
                args.insert("start_date".into(), start.into());
            }
            if let Some(end) = end_date {
                args.insert("end_date".into(), end.into());
            }
        }
        DataRequest::GetReturnPeriods => {}
    }
    serde_json::Value::Object(args)
}

async fn fetch(
    config: &Config,
    config_path: Option<&Path>,
    tool: DataRequest,
    river_id: u64,
    arguments: serde_json::Value,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut params = StdioConnectionParams::from_config(&config.agent)?;
    // a relaunched copy of this binary should see the same configuration
    if let (None, Some(path)) = (&config.agent.server_command, config_path) {
        params.args.push("--config".into());
        params.args.push(path.display().to_string());
    }
    let toolset = McpToolset::connect_stdio(&params).await?;
    let result = toolset.call(tool.tool_name(), arguments).await;
    toolset.shutdown().await?;
    let data = result?;

    let output = GeoglowsAgentOutput {
        data_request: tool,
        reach_id: river_id,
        data,
    };
    let mut state = serde_json::Map::new();
    state.insert(OUTPUT_KEY.to_string(), serde_json::to_value(&output)?);
    let text = serde_json::to_string_pretty(&state)?;

    match out {
        Some(path) => {
            tokio::fs::write(&path, text)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            let source = DataSource::Agent;
            tracing::info!(%source, path = %path.display(), "state saved");
        }
        None => println!("{text}"),
    }
    Ok(())
}

fn plot(config: &Config, state_path: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(state_path)
        .with_context(|| format!("reading {}", state_path.display()))?;
    let state: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&text).context("state file must be a JSON object")?;

    let store = FsArtifactStore::new(&config.agent.artifact_dir);
    match plot_streamflow(&ToolContext::new(&state, &store))? {
        Some(outcome) => println!("{}", store.path_for(outcome.artifact).display()),
        None => println!("nothing to plot"),
    }
    Ok(())
}
