use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use clap::Subcommand;
use rointed::Config;
use rointed::Engine;
use rointed::config::LoadableConfig;
use rointed::format_diagnostics;
use rointed::integrations::rointe::BUNDLED_FIXTURE;
use rointed::integrations::rointe::setup_flow::SetupFlow;
use rointed::integrations::rointe::simulator::SimulatedCloud;

/// rointed - Rointe radiators as local entities
#[derive(Parser, Debug)]
#[command(name = "rointed")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the daemon.
    Run {
        /// Configuration file.
        #[arg(short, long, default_value = "rointed.toml")]
        config: PathBuf,
    },
    /// Validate a configuration file and exit.
    CheckConfig {
        /// Configuration file.
        #[arg(short, long, default_value = "rointed.toml")]
        config: PathBuf,
    },
    /// Log in to a Rointe account and print its configuration table.
    Setup {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        /// Installation id; lists the account's installations when omitted.
        #[arg(long)]
        installation: Option<String>,
        /// Fixture for the simulated cloud instead of the bundled one.
        #[arg(long)]
        fixture: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    match args.command {
        Command::Run { config } => {
            let Some(config) = load_config(&config) else {
                return Ok(ExitCode::FAILURE);
            };
            run(config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::CheckConfig { config: path } => match load_config(&path) {
            Some(_) => {
                println!("{} is valid", path.display());
                Ok(ExitCode::SUCCESS)
            }
            None => Ok(ExitCode::FAILURE),
        },
        Command::Setup {
            username,
            password,
            installation,
            fixture,
        } => setup(&username, &password, installation.as_deref(), fixture.as_deref()).await,
    }
}

/// Load the config, printing every diagnostic to stderr
fn load_config(path: &Path) -> Option<Config> {
    match Config::from_file(path) {
        Ok((config, diagnostics)) => {
            if !diagnostics.0.is_empty() {
                eprint!("{}", format_diagnostics(&diagnostics.0));
            }
            Some(config)
        }
        Err(diagnostics) => {
            eprint!("{}", format_diagnostics(&diagnostics.0));
            None
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    config.logging.init();
    tracing::info!("rointed {} starting", env!("CARGO_PKG_VERSION"));

    let engine = Arc::new(Engine::new());
    engine.register_integrations_from_config(&config);

    let runner = engine.clone();
    let engine_task = tokio::spawn(async move {
        if let Err(e) = runner.run().await {
            tracing::error!("Engine stopped: {}", e);
        }
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let addr = SocketAddr::new(config.api.listen, config.api.port);
    let server = tokio::spawn(rointed::api::serve(addr, engine.clone(), shutdown_rx));

    tracing::info!("Press Ctrl+C to exit");
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received shutdown signal"),
        Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
    }

    let _ = shutdown_tx.send(());
    match server.await {
        Ok(Err(e)) => tracing::error!("HTTP API server failed: {}", e),
        Err(e) => tracing::error!("HTTP API task failed: {}", e),
        Ok(Ok(())) => {}
    }

    engine.shutdown().await;
    engine_task.abort();
    tracing::info!("rointed shutdown complete");
    Ok(())
}

async fn setup(
    username: &str,
    password: &str,
    installation: Option<&str>,
    fixture: Option<&Path>,
) -> anyhow::Result<ExitCode> {
    let cloud = match fixture {
        Some(path) => SimulatedCloud::from_fixture_file(path)?,
        None => SimulatedCloud::from_json(BUNDLED_FIXTURE)
            .context("Bundled Rointe fixture is invalid")?,
    };

    let step = SetupFlow::new(cloud.session(username, password), username, password)
        .login()
        .await?;

    let chosen = match installation {
        Some(id) => id.to_string(),
        None => match step.sole_installation()? {
            Some(only) => only.id.clone(),
            None => {
                println!("Installations on this account:");
                for i in &step.installations {
                    println!("  {}  {}", i.id, i.name);
                }
                println!("Run again with --installation <ID>");
                return Ok(ExitCode::FAILURE);
            }
        },
    };

    let entry = step.select(&chosen)?;
    print!("{}", entry.to_toml()?);
    if let Some(path) = fixture {
        println!(
            "fixture = {}",
            toml::Value::String(path.display().to_string())
        );
    }
    Ok(ExitCode::SUCCESS)
}
