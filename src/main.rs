//! CLI entry point for the Mercury iTC operator tool.
//!
//! # Usage
//!
//! ```bash
//! mercury-itc list
//! mercury-itc get VTI_temp
//! mercury-itc set probe_setpoint 4.2
//! mercury-itc set probe_ramp_mode on
//! mercury-itc --config lab.toml snapshot
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use daq_core::capabilities::Parameterized;
use daq_core::driver::{DeviceComponents, DriverFactory};
use daq_driver_oxford::MercuryItcFactory;
use mercury_itc::commands;
use mercury_itc::config::{AppConfig, InstrumentDefinition, DEFAULT_CONFIG_PATH};
use mercury_itc::logging::{self, TracingConfig};

#[derive(Parser)]
#[command(name = "mercury-itc")]
#[command(about = "Read and set Oxford Instruments Mercury iTC parameters", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List parameters with units and ranges (no device traffic)
    List,

    /// Read one parameter from the controller
    Get {
        /// Parameter name, e.g. VTI_temp
        name: String,
    },

    /// Write one parameter
    Set {
        /// Parameter name, e.g. probe_setpoint
        name: String,
        /// New value: a number, true/false or ON/OFF
        value: String,
    },

    /// Read the primary temperature channel
    Read,

    /// Read every parameter and print them as JSON
    Snapshot,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    if let Some(level) = cli.log_level {
        config.application.log_level = level;
    }
    config.validate().map_err(|e| anyhow!(e))?;
    logging::init(&TracingConfig::from_app_config(&config)?)?;

    daq_driver_oxford::link();
    let factory = MercuryItcFactory;
    let instrument = &config.instrument;
    if instrument.r#type != factory.driver_type() {
        bail!(
            "Unsupported instrument type '{}' (expected '{}')",
            instrument.r#type,
            factory.driver_type()
        );
    }

    if let Commands::List = cli.command {
        for row in commands::describe(&instrument.config)? {
            let units = row.units.unwrap_or_default();
            let access = if row.read_only { "ro" } else { "rw" };
            match row.range {
                Some((min, max)) => {
                    println!("{:<28} {:<2} {:<6} [{}, {}]", row.name, access, units, min, max)
                }
                None => println!("{:<28} {:<2} {}", row.name, access, units),
            }
        }
        return Ok(());
    }

    let device = connect(&factory, instrument).await?;

    match cli.command {
        Commands::List => {}
        Commands::Get { name } => {
            let value = commands::get(parameterized(&device)?.parameters(), &name).await?;
            println!("{}", value);
        }
        Commands::Set { name, value } => {
            commands::set(parameterized(&device)?.parameters(), &name, &value).await?;
            tracing::info!(parameter = %name, %value, "Parameter set");
        }
        Commands::Read => {
            let readable = device
                .readable
                .as_ref()
                .ok_or_else(|| anyhow!("No primary_channel configured"))?;
            let value = readable.read().await?;
            println!("{} {}", value, readable.units().unwrap_or_default());
        }
        Commands::Snapshot => {
            let values = commands::snapshot(parameterized(&device)?.parameters()).await;
            println!("{}", serde_json::to_string_pretty(&values)?);
        }
    }

    Ok(())
}

async fn connect(
    factory: &MercuryItcFactory,
    instrument: &InstrumentDefinition,
) -> Result<DeviceComponents> {
    factory
        .validate(&instrument.config)
        .with_context(|| format!("Invalid config for '{}'", instrument.id))?;
    tracing::info!(id = %instrument.id, driver = factory.name(), "Connecting");
    let device = factory
        .build(instrument.config.clone())
        .await
        .with_context(|| format!("Failed to connect to '{}'", instrument.id))?;
    let capabilities: Vec<&str> = device.capabilities().iter().map(|c| c.name()).collect();
    tracing::info!(id = %instrument.id, ?capabilities, "Connected");
    Ok(device)
}

fn parameterized(device: &DeviceComponents) -> Result<&Arc<dyn Parameterized>> {
    device
        .parameterized
        .as_ref()
        .ok_or_else(|| anyhow!("Device exposes no parameters"))
}
