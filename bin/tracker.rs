use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use dirs::home_dir;
use eyre::Result;
use figment::{providers::Serialized, value::Value};

use rstream::config::Config;
use rstream::listener::ListenerBus;
use rstream::telemetry;
use rstream::tracker::{LocalTaskLauncher, ReceiverTracker, ReceiverTrackerConfig};
use rstream::version::Version;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.verbose, "tracker")?;
    tracing::info!(version = %Version::build().to_string(), "rstream-tracker starting");

    let shutdown_flag = Arc::new(AtomicBool::new(false));
    telemetry::shutdown::register_shutdown(shutdown_flag.clone());

    let config = cli.to_config();
    if config.metrics_enable {
        telemetry::metrics::init(&config.metrics_addr)?;
    }

    let tracker_config = ReceiverTrackerConfig {
        wal_enabled: config.wal_enable,
        checkpoint_dir: config.checkpoint_dir.clone(),
        block_interval: config.block_interval(),
        block_queue_size: config.block_queue_size,
        ask_timeout: config.ask_timeout(),
    };

    // No input streams are declared from the CLI: this binary hosts the
    // coordinator's RPC endpoint and batch-generator API for an embedding
    // application to drive; input stream declaration is a library-level
    // concern (spec §4.E construction), not a CLI flag.
    let tracker = ReceiverTracker::new(
        Vec::new(),
        tracker_config,
        Arc::new(LocalTaskLauncher),
        ListenerBus::default(),
    )?;

    tracing::info!(addr = %config.coordinator_addr(), "starting receiver tracker");
    tracker.start(&config.coordinator_addr(), cli.skip_receiver_launch).await?;

    while !shutdown_flag.load(std::sync::atomic::Ordering::SeqCst) {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }

    tracker.stop(true).await;
    Ok(())
}

#[derive(Parser)]
pub struct Cli {
    #[clap(long, default_value_t = default_data_dir())]
    data_dir: String,
    #[clap(long)]
    coordinator_host: Option<String>,
    #[clap(long)]
    coordinator_port: Option<u16>,
    #[clap(long)]
    checkpoint_dir: Option<PathBuf>,
    #[clap(long)]
    wal_enable: bool,
    #[clap(long)]
    skip_receiver_launch: bool,
    #[clap(short, long)]
    verbose: bool,
}

impl Cli {
    pub fn to_config(&self) -> Config {
        let config_path = home_dir().unwrap().join(".rstream/tracker.toml");
        Config::new(&config_path, self.as_provider())
    }

    pub fn as_provider(&self) -> Serialized<HashMap<&str, Value>> {
        let mut user_dict = HashMap::new();

        if let Some(host) = &self.coordinator_host {
            user_dict.insert("coordinator_host", Value::from(host.clone()));
        }
        if let Some(port) = self.coordinator_port {
            user_dict.insert("coordinator_port", Value::from(port));
        }
        if let Some(dir) = &self.checkpoint_dir {
            user_dict.insert("checkpoint_dir", Value::from(dir.to_string_lossy().to_string()));
        }
        if self.wal_enable {
            user_dict.insert("wal_enable", Value::from(true));
        }

        Serialized::from(user_dict, "default".to_string())
    }
}

fn default_data_dir() -> String {
    let dir = home_dir().unwrap().join(".rstream/data");
    dir.to_str().unwrap().to_string()
}
