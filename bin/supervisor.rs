use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use dirs::home_dir;
use eyre::Result;
use figment::{providers::Serialized, value::Value};
use tokio::io::{AsyncBufReadExt, BufReader};

use rstream::block::{BlockGeneratorConfig, DirectBlockHandler, ReceivedBlockHandler, WalBlockHandler};
use rstream::config::Config;
use rstream::model::StreamId;
use rstream::receiver::{Receiver, SupervisorHandle};
use rstream::rpc::server::run_supervisor_command_server;
use rstream::rpc::TrackerClient;
use rstream::store::InMemoryBlockStore;
use rstream::supervisor::{ReceiverSupervisor, SupervisorConfig};
use rstream::telemetry;
use rstream::version::Version;
use rstream::wal::{SledWalStore, WalStore};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.verbose, "supervisor")?;
    tracing::info!(version = %Version::build().to_string(), "rstream-supervisor starting");

    let shutdown_flag = Arc::new(AtomicBool::new(false));
    telemetry::shutdown::register_shutdown(shutdown_flag.clone());

    let config = cli.to_config();
    if config.metrics_enable {
        telemetry::metrics::init(&config.metrics_addr)?;
    }

    let handler: Arc<dyn ReceivedBlockHandler> = if config.wal_enable {
        let dir = config
            .checkpoint_dir
            .clone()
            .expect("checkpoint.dir is required when receiver.writeAheadLog.enable is set");
        std::fs::create_dir_all(&dir)?;
        let db = sled::open(dir.join("wal"))?;
        let wal_store: Arc<dyn WalStore> = Arc::new(SledWalStore::open(&db).map_err(|e| eyre::eyre!(e))?);
        Arc::new(WalBlockHandler::new(Arc::new(InMemoryBlockStore::new()), wal_store))
    } else {
        Arc::new(DirectBlockHandler::new(Arc::new(InMemoryBlockStore::new())))
    };

    let tracker_client = Arc::new(TrackerClient::connect(&config.coordinator_addr(), config.ask_timeout())?);

    let supervisor_config = SupervisorConfig {
        stream_id: cli.stream_id,
        host: cli.host.clone(),
        endpoint: cli.bind_addr.clone(),
        coordinator_addr: config.coordinator_addr(),
        ask_timeout: config.ask_timeout(),
        block_generator: BlockGeneratorConfig {
            block_interval: config.block_interval(),
            block_queue_size: config.block_queue_size,
        },
    };

    let receiver: Arc<dyn Receiver> = Arc::new(StdinLineReceiver::default());
    let supervisor = Arc::new(ReceiverSupervisor::new(
        supervisor_config,
        receiver,
        handler,
        tracker_client,
    ));

    run_supervisor_command_server(&cli.bind_addr, supervisor.command_sender()).await?;

    tracing::info!(stream_id = cli.stream_id, "starting receiver supervisor");
    supervisor.start().await?;

    let run_handle = tokio::spawn({
        let supervisor = supervisor.clone();
        async move { supervisor.run().await }
    });

    while !shutdown_flag.load(std::sync::atomic::Ordering::SeqCst) {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }

    supervisor.stop("stopped by signal".to_string(), None).await;
    let _ = run_handle.await;
    Ok(())
}

/// Demo [`Receiver`] reading newline-delimited records from standard input,
/// shipped so this binary is runnable end to end without a real external
/// source. A production deployment supplies its own `Receiver`; this crate
/// treats receiver implementations as out of scope (spec §1).
#[derive(Default)]
struct StdinLineReceiver;

#[async_trait]
impl Receiver for StdinLineReceiver {
    fn name(&self) -> String {
        "stdin-line-receiver".to_string()
    }

    async fn on_start(&self, handle: Arc<dyn SupervisorHandle>) {
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if let Err(err) = handle.push_single(line.into_bytes()).await {
                            handle
                                .report_error(format!("failed to push record: {err}"), None)
                                .await;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        handle.report_error(format!("stdin read failed: {err}"), None).await;
                        break;
                    }
                }
            }
        });
    }

    async fn on_stop(&self) {}
}

#[derive(Parser)]
pub struct Cli {
    #[clap(long, default_value_t = default_data_dir())]
    data_dir: String,
    #[clap(long)]
    stream_id: StreamId,
    #[clap(long, default_value = "127.0.0.1")]
    host: String,
    #[clap(long)]
    bind_addr: String,
    #[clap(long)]
    coordinator_host: Option<String>,
    #[clap(long)]
    coordinator_port: Option<u16>,
    #[clap(long)]
    checkpoint_dir: Option<PathBuf>,
    #[clap(long)]
    wal_enable: bool,
    #[clap(short, long)]
    verbose: bool,
}

impl Cli {
    pub fn to_config(&self) -> Config {
        let config_path = home_dir().unwrap().join(".rstream/supervisor.toml");
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
