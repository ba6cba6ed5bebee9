use anyhow::Context;
use clap::Parser;
use metrics_collector::{
    agent::{Agent, PlatformSystemMetrics},
    config::read_agent_config_file,
    util::get_config_path,
};
use tracing::{level_filters::LevelFilter, trace};
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
        ("collector_agent", LevelFilter::TRACE),
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

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let path = get_config_path(args.file).context("no config file given (-f or COLLECTOR_CONFIG)")?;
    let config = read_agent_config_file(&path)?;

    Agent::new(config, PlatformSystemMetrics::new()).run().await;

    Ok(())
}
