//! Reliq CLI - Command line tool for inspecting and sweeping task queues

mod client;
mod commands;

use clap::{Parser, Subcommand};
use commands::task::TaskAction;
use reliq::observability::QueueMetrics;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "reliq")]
#[command(about = "Reliq CLI - Inspect and drive reliable task queues", long_about = None)]
#[command(version)]
struct Cli {
    /// Redis connection URL
    #[arg(long, env = "REDIS_URL", default_value = "redis://localhost:6379", global = true)]
    redis_url: String,

    /// Queue name
    #[arg(long, default_value = reliq::config::DEFAULT_QUEUE, global = true)]
    queue: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Statistics
    Stats,
    /// Enqueue a JSON payload and print its task ID
    Enqueue {
        /// Payload as JSON
        data: String,
        /// Task timeout in seconds
        #[arg(long)]
        timeout: Option<f64>,
        /// Seconds before the task becomes visible
        #[arg(long, default_value = "0")]
        delay: f64,
    },
    /// Task operations
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// Run one sweep pass
    Sweep,
    /// Sweep periodically until Ctrl+C
    Sweeper {
        /// Sweep interval in seconds
        #[arg(short, long, default_value = "60")]
        interval: f64,
        /// Serve Prometheus metrics on this address
        #[arg(long)]
        metrics_addr: Option<SocketAddr>,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Stats => {
            let queue = client::create_queue(&cli.redis_url, &cli.queue, None).await?;
            commands::stats::show(&queue).await?;
        }
        Commands::Enqueue {
            data,
            timeout,
            delay,
        } => {
            let queue = client::create_queue(&cli.redis_url, &cli.queue, None).await?;
            commands::task::enqueue(&queue, data, timeout, delay).await?;
        }
        Commands::Task { action } => {
            let queue = client::create_queue(&cli.redis_url, &cli.queue, None).await?;
            commands::task::handle(&queue, action).await?;
        }
        Commands::Sweep => {
            let queue = client::create_queue(&cli.redis_url, &cli.queue, None).await?;
            commands::sweep::once(&queue).await?;
        }
        Commands::Sweeper {
            interval,
            metrics_addr,
        } => {
            let metrics = match metrics_addr {
                Some(_) => Some(Arc::new(QueueMetrics::new()?)),
                None => None,
            };
            let queue = client::create_queue(&cli.redis_url, &cli.queue, metrics.clone()).await?;
            let interval = commands::task::seconds(interval)?;
            commands::sweep::run(queue, metrics, interval, metrics_addr).await?;
        }
    }

    Ok(())
}
