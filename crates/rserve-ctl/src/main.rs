//! rserve-ctl - command-line front end for rserve-launcher.
//!
//! Checks, installs and starts the local Rserve daemon from a shell.

mod report;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use report::{format_pids, PidReport, StatusReport};
use rserve_launcher::config::AppConfig;
use rserve_launcher::{platform, DaemonConfig, Supervisor};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "rserve-ctl")]
#[command(about = "Install, start and inspect a local Rserve daemon")]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Private application directory (defaults to the per-user data dir)
    #[arg(long, global = true)]
    app_dir: Option<PathBuf>,

    /// Directory holding a bundled Rserve archive
    #[arg(long, global = true)]
    resources_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report whether a daemon answers and what is installed
    Status {
        #[arg(short, long, default_value_t = DaemonConfig::DEFAULT_PORT)]
        port: u16,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Start a daemon unless one already answers on the port
    Start {
        #[arg(short, long, default_value_t = DaemonConfig::DEFAULT_PORT)]
        port: u16,

        /// Install Rserve first if it is missing
        #[arg(long)]
        install: bool,

        /// HTTP proxy used while installing
        #[arg(long)]
        proxy: Option<String>,

        /// Package repository used while installing
        #[arg(long)]
        repository: Option<String>,
    },

    /// Install Rserve into the private library
    Install {
        /// HTTP proxy for the download
        #[arg(long)]
        proxy: Option<String>,

        /// Package repository (defaults to the CRAN cloud mirror)
        #[arg(long)]
        repository: Option<String>,
    },

    /// List Rserve processes
    Pids {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let app_dir = match args.app_dir {
        Some(path) => path,
        None => platform::app_dir()?,
    };
    info!("{} directory: {}", AppConfig::APP_NAME, app_dir.display());

    let mut builder = Supervisor::builder(&app_dir).auto_create_dirs(true);
    if let Some(resources) = args.resources_dir {
        builder = builder.resources_dir(resources);
    }
    let supervisor = builder.build()?;

    match args.command {
        Command::Status { port, json } => {
            let report = StatusReport::collect(&supervisor, port).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report);
            }
        }
        Command::Start {
            port,
            install,
            proxy,
            repository,
        } => {
            let started = if install {
                supervisor
                    .provision(port, proxy.as_deref(), repository.as_deref())
                    .await
            } else {
                supervisor.ensure_running(port).await
            };
            if !started {
                bail!("Rserve is not reachable on port {}", port);
            }
            println!("Rserve is running on port {}", port);
        }
        Command::Install { proxy, repository } => {
            if !supervisor
                .install(proxy.as_deref(), repository.as_deref())
                .await?
            {
                bail!("Rserve could not be installed");
            }
            println!(
                "Rserve installed in {}",
                supervisor.installer().library_dir().display()
            );
        }
        Command::Pids { json } => {
            let snapshot = supervisor.daemon_pids().await;
            if json {
                let report = PidReport {
                    pids: snapshot.pids().to_vec(),
                    newest: snapshot.newest(),
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", format_pids(snapshot.pids()));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start_with_install() {
        let args = Args::parse_from([
            "rserve-ctl",
            "start",
            "--port",
            "6400",
            "--install",
            "--proxy",
            "http://proxy:3128",
        ]);
        match args.command {
            Command::Start {
                port,
                install,
                proxy,
                repository,
            } => {
                assert_eq!(port, 6400);
                assert!(install);
                assert_eq!(proxy.as_deref(), Some("http://proxy:3128"));
                assert!(repository.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_default_port_and_global_flags() {
        let args = Args::parse_from(["rserve-ctl", "status", "--json", "--debug"]);
        assert!(args.debug);
        match args.command {
            Command::Status { port, json } => {
                assert_eq!(port, DaemonConfig::DEFAULT_PORT);
                assert!(json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
