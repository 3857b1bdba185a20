//! Steward administrator CLI - main entry point.
//!
//! Drives a deployment described by a manifest file:
//! - `build`: prepare the install tree and write a component's conf files
//! - `start`: build, configure and run one component standalone
//! - `status`: configure everything and print the pool's states

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use steward_core::admin::Administrator;
use steward_core::manifest::Manifest;
use steward_core::settings::FileProvider;
use steward_core::types::{ComponentName, Config};

#[derive(Debug, Parser)]
#[command(name = "steward-admin", about = "Component-pool administrator")]
struct Cli {
    /// Installation settings file (JSON).
    #[arg(long, env = "STEWARD_SETTINGS")]
    settings: PathBuf,

    /// Deployment manifest file (JSON).
    #[arg(long, env = "STEWARD_MANIFEST")]
    manifest: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Prepare the install tree and write a component's conf files.
    Build {
        /// Component name.
        component: String,
    },
    /// Build, configure and run one component standalone (signals handled
    /// by the component itself).
    Start {
        /// Component name.
        component: String,
    },
    /// Configure every component and print the pool's states.
    Status,
}

#[tokio::main]
async fn main() -> steward_core::Result<()> {
    let cli = Cli::parse();
    let config = Config::default();

    steward_core::observability::init_tracing(&config.observability);

    let manifest = Manifest::from_file(&cli.manifest)?;
    let mut admin = Administrator::from_manifest(config.admin, manifest)?;

    // settings errors are fatal: nothing runs without them
    admin.awaken(&FileProvider::new(&cli.settings)).await?;

    match cli.command {
        Command::Build { component } => {
            let name = component_name(component)?;
            admin.configure(&name)?;
            let conf_dir = admin.build(&name)?;
            println!("{}", conf_dir.display());
        }
        Command::Start { component } => {
            let name = component_name(component)?;
            admin.configure(&name)?;
            admin.build(&name)?;
            let mut runtime = admin.release(&name)?.into_standalone();
            #[cfg(unix)]
            runtime.run_standalone().await?;
            #[cfg(not(unix))]
            {
                runtime.start().await?;
                runtime.stop().await?;
            }
        }
        Command::Status => {
            let names: Vec<ComponentName> = admin.status_all().into_keys().collect();
            for name in names {
                // configure failures are reported per component, not fatal
                let _ = admin.configure(&name);
            }
            for (name, state) in admin.status_all() {
                println!("{:<24} {:?}", name.as_str(), state);
            }
        }
    }
    Ok(())
}

fn component_name(raw: String) -> steward_core::Result<ComponentName> {
    ComponentName::from_string(raw).map_err(steward_core::Error::not_found)
}
