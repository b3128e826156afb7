//! powerctl - command-line client for the powerd daemon

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use powerd_core::ipc::{
    default_socket_path, DaemonRequest, DaemonResponse, Interface, PropertyValue,
    PROP_ACTIVE_PROFILE, PROP_ACTIVE_PROFILE_HOLDS, PROP_PERFORMANCE_DEGRADED, PROP_PROFILES,
};

mod client;

use client::DaemonClient;

/// Query and control the powerd daemon
#[derive(Parser, Debug)]
#[command(name = "powerctl")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the daemon control socket
    #[arg(long)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the currently active profile
    Get,
    /// Select a profile
    Set {
        /// One of power-saver, balanced, performance
        profile: String,
    },
    /// List available profiles and the drivers supplying them
    List,
    /// List active profile holds
    ListHolds,
    /// Print the daemon version
    Version,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let socket = cli.socket.unwrap_or_else(default_socket_path);
    let mut client = DaemonClient::connect(&socket).await?;
    let interface = Interface::Primary.name().to_string();

    match cli.command {
        Command::Get => {
            let response = client
                .call(DaemonRequest::GetProperty {
                    interface,
                    property: PROP_ACTIVE_PROFILE.to_string(),
                })
                .await?;
            let DaemonResponse::Property {
                value: PropertyValue::String(profile),
            } = response
            else {
                bail!("unexpected response: {response:?}");
            };
            println!("{profile}");
        },

        Command::Set { profile } => {
            client
                .call(DaemonRequest::SetProperty {
                    interface,
                    property: PROP_ACTIVE_PROFILE.to_string(),
                    value: profile,
                })
                .await?;
        },

        Command::List => {
            let response = client
                .call(DaemonRequest::GetAllProperties { interface })
                .await?;
            let DaemonResponse::Properties { values } = response else {
                bail!("unexpected response: {response:?}");
            };

            let active = match values.get(PROP_ACTIVE_PROFILE) {
                Some(PropertyValue::String(profile)) => profile.clone(),
                _ => String::new(),
            };
            let degraded = match values.get(PROP_PERFORMANCE_DEGRADED) {
                Some(PropertyValue::String(reason)) => reason.clone(),
                _ => String::new(),
            };
            let Some(PropertyValue::Profiles(entries)) = values.get(PROP_PROFILES) else {
                bail!("daemon reported no profiles");
            };

            for entry in entries {
                let marker = if entry.profile.as_str() == active { "*" } else { " " };
                println!("{marker} {}:", entry.profile);
                if let Some(driver) = &entry.cpu_driver {
                    println!("    CpuDriver:      {driver}");
                }
                if let Some(driver) = &entry.platform_driver {
                    println!("    PlatformDriver: {driver}");
                }
                if entry.profile.as_str() == "performance" && !degraded.is_empty() {
                    println!("    Degraded:       {degraded}");
                }
                println!();
            }
        },

        Command::ListHolds => {
            let response = client
                .call(DaemonRequest::GetProperty {
                    interface,
                    property: PROP_ACTIVE_PROFILE_HOLDS.to_string(),
                })
                .await?;
            let DaemonResponse::Property {
                value: PropertyValue::Holds(holds),
            } = response
            else {
                bail!("unexpected response: {response:?}");
            };

            if holds.is_empty() {
                println!("No active profile holds");
            }
            for hold in holds {
                println!("Application: {}", hold.application_id);
                println!("  Profile:   {}", hold.profile);
                println!("  Reason:    {}", hold.reason);
            }
        },

        Command::Version => {
            let response = client.call(DaemonRequest::Ping).await?;
            let DaemonResponse::Pong { version, .. } = response else {
                bail!("unexpected response: {response:?}");
            };
            println!("{version}");
        },
    }

    Ok(())
}
