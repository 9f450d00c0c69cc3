use std::fs::File;
use std::io::{self, BufReader, Read as _};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use btleplug::api::Manager as _;
use btleplug::platform::Manager;
use clap::{Parser, Subcommand};
use log::info;

mod advertisement;
mod config;
mod decoder;
mod dispatcher;
mod manager;
mod mqtt;
mod presence;
mod replay;
mod sink;

use dispatcher::{Dispatcher, RoleMap};
use presence::PresenceTracker;

#[derive(Parser, Debug)]
#[command(version, about = "Reports door lock state and sensor readings from BLE advertisements")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan with the first Bluetooth adapter and publish to MQTT
    Scan,
    /// Replay a recorded HCI event dump and print reports as JSON lines
    Replay {
        /// Dump file, `-` for stdin
        input: PathBuf,
    },
}

fn load_config(path: &Path) -> anyhow::Result<config::AppConfig> {
    let mut file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut config_contents = String::new();
    file.read_to_string(&mut config_contents)?;

    config::AppConfig::from_toml(&config_contents)
        .with_context(|| format!("parsing {}", path.display()))
}

fn dispatcher_for<S: sink::ReportSink>(config: &config::AppConfig, sink: S) -> Dispatcher<S> {
    Dispatcher::new(
        RoleMap::from_devices(config.devices()),
        PresenceTracker::new(config.window_micros()),
        sink,
    )
    .with_forward_combined(config.forward_combined())
}

async fn run_scan(config: &config::AppConfig) -> anyhow::Result<()> {
    let (mqtt_client, eventloop) = mqtt::MqttClient::new(&config.mqtt);
    let dispatcher = dispatcher_for(config, mqtt_client.clone());

    let bt_manager = Manager::new().await?;

    // get the first bluetooth adapter
    let adapters = bt_manager.adapters().await?;
    let central = adapters
        .into_iter()
        .next()
        .context("no Bluetooth adapter found")?;

    let core = manager::Manager::new(
        central,
        mqtt_client,
        eventloop,
        dispatcher,
        Duration::from_millis(config.tick_millis()),
    );
    core.run_loop().await
}

fn run_replay(config: &config::AppConfig, input: &Path) -> anyhow::Result<()> {
    let mut dispatcher = dispatcher_for(config, sink::JsonLinesSink::new(io::stdout()));

    let stats = if input.as_os_str() == "-" {
        replay::replay(io::stdin().lock(), &mut dispatcher)?
    } else {
        let file = File::open(input).with_context(|| format!("opening {}", input.display()))?;
        replay::replay(BufReader::new(file), &mut dispatcher)?
    };

    info!(
        "Replayed {} records ({} skipped)",
        stats.records, stats.skipped
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut builder = pretty_env_logger::formatted_timed_builder();
    builder.parse_filters(&std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()));
    builder.init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match &cli.command {
        Command::Scan => run_scan(&config).await,
        Command::Replay { input } => run_replay(&config, input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli() {
        Cli::command().debug_assert();

        let cli = Cli::parse_from(["lockwatch-rs", "replay", "-"]);
        assert_eq!(cli.config, PathBuf::from("config.toml"));
        assert!(matches!(&cli.command, Command::Replay { input } if input.as_os_str() == "-"));

        let cli = Cli::parse_from(["lockwatch-rs", "--config", "/etc/lockwatch.toml", "scan"]);
        assert_eq!(cli.config, PathBuf::from("/etc/lockwatch.toml"));
        assert!(matches!(cli.command, Command::Scan));
    }
}
