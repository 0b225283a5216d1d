//! tokon is the deployment orchestrator CLI for the TOKON contract suite.
//!
//! `plan` orders the artifacts, `deploy` creates and wires them on a
//! network (resuming any prior partial run), `status` shows recorded
//! progress and `export` republishes interface descriptors for consumers.

mod cli;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};

use cli::{Cli, Command, StatusFormat};
use tokon_deploy::{
    ArtifactSpec, ArtifactStore, DeployError, DeploymentState, HttpGateway, LedgerGateway,
    NetworkConfig, OrchestratorConfig, ResolveContext, RunStatus, RunSummary, StateRecorder,
    TOKON_CONFIG_FILENAME, TxRequest, apply_wiring, artifact_table, encode_creation, export,
    format_units, plan, run_creations, tokon_artifacts, wiring_sequence, wiring_table,
};

// Exit codes beyond plain failure, so operators and scripts can react to
// the specific outcome.
const EXIT_PLANNING: u8 = 2;
const EXIT_INSUFFICIENT_FUNDS: u8 = 3;
const EXIT_DEPLOY: u8 = 4;
const EXIT_PARTIAL: u8 = 5;
const EXIT_EXPORT: u8 = 6;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config = load_config(&cli.config)?;

    match cli.command {
        Command::Plan => cmd_plan(),
        Command::Deploy {
            network,
            reset,
            no_export,
        } => cmd_deploy(&config, &network, reset, no_export).await,
        Command::Status {
            network,
            probe,
            format,
        } => cmd_status(&config, &network, probe, format).await,
        Command::Export { network } => cmd_export(&config, &network),
    }
}

/// Load the configuration file, letting `TOKON_`-prefixed environment
/// variables override individual values (e.g.
/// `TOKON_NETWORKS__FUJI__RPC_URL`).
fn load_config(path: &str) -> Result<OrchestratorConfig> {
    let path = PathBuf::from(path);
    let file = if path.is_dir() {
        path.join(TOKON_CONFIG_FILENAME)
    } else {
        path
    };

    Figment::new()
        .merge(Toml::file(&file))
        .merge(Env::prefixed("TOKON_").split("__"))
        .extract()
        .with_context(|| format!("Failed to load configuration from {}", file.display()))
}

fn cmd_plan() -> Result<ExitCode> {
    let specs = tokon_artifacts();
    let planned = match plan(&specs) {
        Ok(planned) => planned,
        Err(err) => {
            eprintln!("Planning failed: {err}");
            return Ok(ExitCode::from(EXIT_PLANNING));
        }
    };

    println!("Deployment plan ({} artifacts):", planned.len());
    for (position, spec) in planned.iter().enumerate() {
        let deps = spec.dependencies();
        if deps.is_empty() {
            println!("  {}. {}", position + 1, spec.name);
        } else {
            println!(
                "  {}. {} (needs {})",
                position + 1,
                spec.name,
                deps.into_iter().collect::<Vec<_>>().join(", ")
            );
        }
    }

    let actions = wiring_sequence(&planned);
    println!();
    println!("Wiring actions ({}):", actions.len());
    for action in actions {
        println!("  - {}: {} on {}", action.name, action.signature, action.target);
    }

    Ok(ExitCode::SUCCESS)
}

async fn cmd_deploy(
    config: &OrchestratorConfig,
    network_name: &str,
    reset: bool,
    no_export: bool,
) -> Result<ExitCode> {
    let network = config.network(network_name)?;
    let specs = tokon_artifacts();
    let planned = match plan(&specs) {
        Ok(planned) => planned,
        Err(err) => {
            eprintln!("Planning failed: {err}");
            return Ok(ExitCode::from(EXIT_PLANNING));
        }
    };

    if reset && StateRecorder::reset(&config.state_dir, network_name)? {
        tracing::warn!(network = network_name, "Recorded state discarded, deploying from scratch");
    }

    let store = ArtifactStore::load(&config.artifacts_dir, &specs)?;
    let gateway = HttpGateway::connect(network).await?;
    let mut recorder = StateRecorder::open(&config.state_dir, network_name, network.chain_id)?;

    let balance = gateway.balance(network.deployer).await?;
    tracing::info!(
        network = network_name,
        chain_id = network.chain_id,
        deployer = %network.deployer,
        balance = %format_units(balance, &network.currency),
        "Starting deployment run..."
    );

    let creation_result = run_creations(&planned, &store, &mut recorder, &gateway, network).await;

    let (wiring_report, export_report) = match &creation_result {
        Ok(_) => {
            let wiring =
                apply_wiring(&wiring_sequence(&planned), &mut recorder, &gateway).await?;
            let exported = if no_export {
                None
            } else {
                Some(export(
                    recorder.state(),
                    &store,
                    network,
                    &config.export.destinations,
                ))
            };
            (Some(wiring), exported)
        }
        Err(_) => (None, None),
    };

    let summary = RunSummary::build(
        recorder.state(),
        &specs,
        network,
        wiring_report,
        export_report,
    );
    println!("{summary}");

    match creation_result {
        Err(err @ DeployError::InsufficientFunds { .. }) => {
            eprintln!("{err}");
            return Ok(ExitCode::from(EXIT_INSUFFICIENT_FUNDS));
        }
        Err(err) => {
            eprintln!("Deployment aborted: {err}");
            return Ok(ExitCode::from(EXIT_DEPLOY));
        }
        Ok(_) => {}
    }

    match summary.status {
        RunStatus::Complete => Ok(ExitCode::SUCCESS),
        RunStatus::Partial => {
            let wiring_complete = summary
                .wiring
                .as_ref()
                .is_none_or(|report| report.is_complete());
            if wiring_complete {
                Ok(ExitCode::from(EXIT_EXPORT))
            } else {
                Ok(ExitCode::from(EXIT_PARTIAL))
            }
        }
        RunStatus::Failed => Ok(ExitCode::from(EXIT_DEPLOY)),
    }
}

async fn cmd_status(
    config: &OrchestratorConfig,
    network_name: &str,
    probe: bool,
    format: StatusFormat,
) -> Result<ExitCode> {
    let network = config.network(network_name)?;
    let specs = tokon_artifacts();
    let state = StateRecorder::peek(&config.state_dir, network_name)?
        .unwrap_or_else(|| DeploymentState::new(network_name, network.chain_id));

    match format {
        StatusFormat::Json => println!("{}", serde_json::to_string_pretty(&state)?),
        StatusFormat::Table => {
            println!("Network {} (chain {})", state.network, state.chain_id);
            println!("{}", artifact_table(&state, &specs));
            println!();
            println!("{}", wiring_table(&state, &specs));
        }
    }

    if probe {
        probe_network(config, &state, &specs, network).await?;
    }

    Ok(ExitCode::SUCCESS)
}

/// Live enrichment for `status --probe`: the account balance plus a cost
/// estimate for every creation still outstanding.
async fn probe_network(
    config: &OrchestratorConfig,
    state: &DeploymentState,
    specs: &[ArtifactSpec],
    network: &NetworkConfig,
) -> Result<()> {
    let gateway = HttpGateway::connect(network).await?;
    let balance = gateway.balance(network.deployer).await?;
    println!();
    println!(
        "Deployer balance: {}",
        format_units(balance, &network.currency)
    );

    let store = ArtifactStore::load(&config.artifacts_dir, specs)?;
    let addresses = state.deployed_addresses();
    let ctx = ResolveContext {
        deployer: network.deployer,
        addresses: &addresses,
    };

    for spec in specs {
        if state.deployed_record(&spec.name).is_some() {
            continue;
        }
        let Some(contract) = store.get(&spec.name) else {
            continue;
        };
        let bytecode = contract.creation_bytecode()?;
        let Ok(args) = ctx.resolve_all(&spec.constructor_args) else {
            println!(
                "  {}: estimate unavailable until its dependencies deploy",
                spec.name
            );
            continue;
        };

        let tx = TxRequest::creation(encode_creation(&bytecode, &args));
        match gateway.estimate_gas(&tx).await {
            Ok(estimate) => println!(
                "  {}: estimated creation cost {} gas (submitted limit {})",
                spec.name,
                estimate,
                network.buffered_gas_limit(estimate)
            ),
            Err(err) => println!("  {}: estimate failed: {err}", spec.name),
        }
    }

    Ok(())
}

fn cmd_export(config: &OrchestratorConfig, network_name: &str) -> Result<ExitCode> {
    let network = config.network(network_name)?;
    let specs = tokon_artifacts();

    let Some(state) = StateRecorder::peek(&config.state_dir, network_name)? else {
        eprintln!("No recorded deployment for network {network_name}; run deploy first");
        return Ok(ExitCode::from(EXIT_EXPORT));
    };

    let store = ArtifactStore::load(&config.artifacts_dir, &specs)?;
    let report = export(&state, &store, network, &config.export.destinations);

    for destination in &report.destinations {
        match &destination.result {
            Ok(files) => println!(
                "Exported {} files to {}",
                files,
                destination.destination.display()
            ),
            Err(err) => eprintln!(
                "Export to {} failed: {err}",
                destination.destination.display()
            ),
        }
    }

    if report.is_complete() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_EXPORT))
    }
}
