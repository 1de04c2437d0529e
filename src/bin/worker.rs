use clap::Parser;
use crawler_core::platform::{WorkerConfig, WorkerPlatform};
use dotenvy::dotenv;
use tracing::error;

/// Priority-tiered crawl worker process. All tuning comes from the
/// environment (spec.md §6); flags here only override the worker identity
/// so a single image can be started under different names/tiers without
/// re-templating the environment.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Overrides WORKER_ID from the environment.
    #[arg(long)]
    worker_id: Option<String>,

    /// Overrides PRIORITY_LEVEL from the environment (CRITICAL/HIGH/NORMAL).
    #[arg(long)]
    tier: Option<String>,
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    let args = Args::parse();

    let mut config = WorkerConfig::from_env();
    if let Some(worker_id) = args.worker_id {
        config.worker_id = worker_id;
    }
    if let Some(raw_tier) = args.tier {
        match crawler_core::task::Tier::parse(&raw_tier) {
            Some(tier) => config.tier = tier,
            None => {
                eprintln!("invalid --tier value: {raw_tier}");
                std::process::exit(crawler_core::supervisor::exit_code::STARTUP_FAILURE);
            }
        }
    }

    if let Err(errors) = config.validate() {
        for err in &errors {
            eprintln!("config error: {err}");
        }
        std::process::exit(crawler_core::supervisor::exit_code::STARTUP_FAILURE);
    }

    let platform = WorkerPlatform::new(config);
    let exit_code = platform.run().await;
    if exit_code != crawler_core::supervisor::exit_code::CLEAN_SHUTDOWN {
        error!(exit_code, "worker exiting non-zero");
    }
    std::process::exit(exit_code);
}
