use std::rc::Rc;

use anyhow::Context;
use clap::Parser;
use metrics_collector::{
    config::{Config, StorageConfig, read_config_file},
    mail::{LogMailTransport, MailManager, QueuedMailManager, SmtpMailTransport},
    server::Server,
    storage::{MemoryMonitoringStorage, MonitoringStorage},
    util::get_config_path,
};
use tokio::{runtime, task::LocalSet};
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file, defaults to $COLLECTOR_CONFIG
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("metrics_collector", LevelFilter::DEBUG),
        ("collector_hub", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let path = get_config_path(args.file).context("no config file given (-f or COLLECTOR_CONFIG)")?;
    let config = Rc::new(read_config_file(&path)?);
    info!("loaded {} clients from {path}", config.clients().count());

    let mail = start_mail(&config)?;

    let runtime = runtime::Builder::new_current_thread().enable_all().build()?;
    let local = LocalSet::new();
    local.block_on(&runtime, async move {
        let storage = open_storage(&config.storage).await?;
        let server = Server::bind(config, storage, mail)
            .await
            .context("failed to bind collector socket")?;

        server
            .run(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("failed to listen for ctrl-c: {e}");
                    std::future::pending::<()>().await;
                }
                info!("received ctrl-c");
            })
            .await;

        anyhow::Ok(())
    })
}

fn start_mail(config: &Config) -> anyhow::Result<Rc<dyn MailManager>> {
    let manager = match &config.mail.smtp {
        Some(smtp) => QueuedMailManager::start(SmtpMailTransport::new(smtp)?)?,
        None => {
            warn!("no SMTP relay configured, notification mails are only logged");
            QueuedMailManager::start(LogMailTransport)?
        }
    };
    Ok(Rc::new(manager))
}

async fn open_storage(config: &StorageConfig) -> anyhow::Result<Rc<dyn MonitoringStorage>> {
    match config {
        StorageConfig::None => {
            info!("using in-memory storage, samples are not persisted");
            Ok(Rc::new(MemoryMonitoringStorage::new()))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            info!("using sqlite storage at {}", path.display());
            let storage = metrics_collector::storage::SqliteMonitoringStorage::open(path).await?;
            Ok(Rc::new(storage))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => {
            anyhow::bail!("sqlite storage requested but the storage-sqlite feature is disabled")
        }
    }
}
