//! `info` command implementation.

use anyhow::{Context, Result};
use config_loader::{applicable_knobs, SinkBlueprint};
use contracts::SinkConfig;
use serde::Serialize;
use tracing::info;

use super::load_blueprint;
use crate::cli::InfoArgs;
use crate::error::CliError;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    sinks: Vec<SinkInfo>,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    serialized: bool,
    flavor: &'static str,
    policy: String,
    knobs: &'static [&'static str],
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let blueprint = load_blueprint(&args.config)?;
    let info = build_config_info(&blueprint)?;

    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn build_config_info(blueprint: &SinkBlueprint) -> Result<ConfigInfo, CliError> {
    let sinks = blueprint
        .sinks
        .iter()
        .map(describe_sink)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ConfigInfo {
        version: format!("{:?}", blueprint.version),
        sinks,
    })
}

/// Resolve the flavor without allocating it; `default_value` is kept as raw JSON
fn describe_sink(config: &SinkConfig) -> Result<SinkInfo, CliError> {
    let flavor = dispatcher::flavor_from_config::<serde_json::Value>(config)
        .map_err(|e| CliError::sink_build(&config.name, e))?;

    Ok(SinkInfo {
        name: config.name.clone(),
        serialized: config.mode.is_serialized(),
        flavor: flavor.label(),
        policy: format!("{:?}", flavor),
        knobs: applicable_knobs(config.flavor),
    })
}

fn print_config_info(info: &ConfigInfo) {
    println!("Sink configuration ({:?})", info.version);
    println!("\n📤 Sinks ({})", info.sinks.len());

    for (i, sink) in info.sinks.iter().enumerate() {
        let is_last = i == info.sinks.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };
        let mode = if sink.serialized { "safe" } else { "unsafe" };

        println!("   {} {} [{}] {}", prefix, sink.name, mode, sink.flavor);
        println!("   {}  ├─ policy: {}", child_prefix, sink.policy);
        if sink.knobs.is_empty() {
            println!("   {}  └─ knobs: (none)", child_prefix);
        } else {
            println!("   {}  └─ knobs: {}", child_prefix, sink.knobs.join(", "));
        }
    }

    println!();
}
