use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use decibel_recorder::{
    create_router, AppState, Config, CsvFileSink, SessionController, SyntheticMeter,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "decibel-recorder")]
#[command(about = "Sample input levels and save them to CSV at a fixed interval")]
struct Args {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/decibel-recorder")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP control API
    Serve {
        /// Address to bind (overrides service.http.bind)
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on (overrides service.http.port)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Record for a fixed time, then stop and print a summary
    Record {
        /// Duration to record in seconds
        #[arg(short, long, default_value = "30")]
        duration: u64,

        /// Flush interval in seconds (overrides recorder.flush_interval_secs)
        #[arg(short, long)]
        interval: Option<String>,

        /// Output directory (overrides recorder.output_dir)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (RUST_LOG overrides the default level)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Serve { bind, port } => {
            let controller = build_controller(&cfg, None)?;
            let bind = bind.unwrap_or_else(|| cfg.service.http.bind.clone());
            let port = port.unwrap_or(cfg.service.http.port);
            serve(controller, &bind, port).await
        }
        Command::Record {
            duration,
            interval,
            output_dir,
        } => {
            let controller = build_controller(&cfg, output_dir)?;
            if let Some(interval) = interval {
                controller
                    .set_interval_str(&interval)
                    .context("Invalid --interval")?;
            }
            record(controller, Duration::from_secs(duration)).await
        }
    }
}

fn build_controller(cfg: &Config, output_dir: Option<PathBuf>) -> Result<Arc<SessionController>> {
    let session_config = cfg.recorder.session_config()?;
    let output_dir = output_dir.unwrap_or_else(|| cfg.recorder.output_dir());

    info!("Output directory: {}", output_dir.display());

    let meter = SyntheticMeter::new(cfg.meter.synthetic(), session_config.poll_period);
    let sink = CsvFileSink::new(output_dir)?;

    Ok(Arc::new(SessionController::new(
        session_config,
        Arc::new(meter),
        Arc::new(sink),
    )?))
}

async fn serve(controller: Arc<SessionController>, bind: &str, port: u16) -> Result<()> {
    let app = create_router(AppState::new(Arc::clone(&controller)));
    let listener = tokio::net::TcpListener::bind((bind, port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", bind, port))?;

    info!("HTTP control API listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    // Persist whatever the running session still holds
    if controller.stop().await {
        info!("Final record written on shutdown");
    }

    Ok(())
}

async fn record(controller: Arc<SessionController>, duration: Duration) -> Result<()> {
    info!(
        "Recording for {:?}, flushing every {:?}",
        duration,
        controller.flush_interval()
    );

    let mut status = controller.subscribe_status();
    let printer = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            info!("{}", *status.borrow_and_update());
        }
    });

    controller.start().await;

    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted, stopping early"),
    }

    controller.stop().await;
    let stats = controller.stats();
    printer.abort();

    info!("Recording complete!");
    info!(
        "Saved {} records ({} readings) over {:.1}s",
        stats.records_written, stats.readings_persisted, stats.duration_secs
    );
    if stats.persist_failures > 0 {
        info!(
            "{} flushes failed, {} readings dropped",
            stats.persist_failures, stats.readings_dropped
        );
    }
    if let Some(last) = &stats.last_record {
        info!("Last record: {}", last);
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
    }
    info!("Shutting down");
}
