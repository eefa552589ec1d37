//! louped - demo host for the loupe debug controller
//!
//! Runs several named services in one process, all logging through one
//! shared [`Logger`]. Debug verbosity is toggled at runtime from stdin and
//! reverts on its own after the idle timeout.

mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use commands::{Command, HELP};
use loupe_config::{LogFormat, Settings};
use loupe_logger::{init_tracing, Logger};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Heartbeats between INFO lines from each service
const HEARTBEATS_PER_INFO: u64 = 30;

/// louped - runtime debug toggling demo
#[derive(Parser, Debug)]
#[command(name = "louped")]
#[command(about = "Hosts named services under one runtime debug controller", long_about = None)]
struct Args {
    /// Common name for lines logged by shared components
    #[arg(short, long, default_value = "louped")]
    name: String,

    /// Services to start (comma separated)
    #[arg(short, long, value_delimiter = ',', default_value = "ingest,router,broker")]
    services: Vec<String>,

    /// Idle minutes before debug reverts (overrides the debugtimer env var)
    #[arg(long)]
    debug_timer: Option<i64>,

    /// Heartbeat period for each service, in milliseconds
    #[arg(long, default_value_t = 1000)]
    heartbeat_ms: u64,

    /// Log format: json, pretty or compact (overrides LOUPE_LOG_FORMAT)
    #[arg(long)]
    log_format: Option<LogFormat>,
}

/// Main service state
struct Service {
    logger: Logger,
    services: Vec<String>,
    heartbeat: Duration,
}

impl Service {
    fn new(args: &Args, settings: &Settings) -> Self {
        Self {
            logger: Logger::configure(settings),
            services: args.services.clone(),
            heartbeat: Duration::from_millis(args.heartbeat_ms.max(1)),
        }
    }

    async fn run(self) -> Result<()> {
        self.logger
            .start()
            .await
            .context("Failed to start debug controller")?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut workers = Vec::new();
        for name in &self.services {
            workers.push(self.spawn_worker(name, shutdown_rx.clone()));
        }

        info!(
            services = ?self.services,
            idle_timeout = %loupe_util::format_duration(self.idle_timeout()),
            "Service running"
        );
        println!("{HELP}");

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }

                line = stdin.next_line(), if stdin_open => {
                    match line {
                        Ok(Some(line)) => {
                            if self.handle_line(&line, &mut workers, &shutdown_rx) {
                                break;
                            }
                        }
                        Ok(None) => {
                            info!("stdin closed, waiting for a signal to stop");
                            stdin_open = false;
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to read stdin");
                            stdin_open = false;
                        }
                    }
                }
            }
        }

        info!("Shutting down louped");

        let _ = shutdown_tx.send(true);
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Service task failed");
            }
        }

        settle_stop(self.logger.stop().await)?;

        info!("Shutdown complete");
        Ok(())
    }

    fn idle_timeout(&self) -> Duration {
        self.logger
            .controller()
            .map(|c| c.idle_timeout())
            .unwrap_or_default()
    }

    fn spawn_worker(&self, name: &str, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        if !self.logger.register_service(name) {
            warn!(service = name, "Service already registered");
        }
        tokio::spawn(run_worker(
            self.logger.clone(),
            name.to_string(),
            self.heartbeat,
            shutdown,
        ))
    }

    /// Handle one console line. Returns true when the service should quit.
    fn handle_line(
        &self,
        line: &str,
        workers: &mut Vec<JoinHandle<()>>,
        shutdown: &watch::Receiver<bool>,
    ) -> bool {
        let command = match Command::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => return false,
            Err(e) => {
                println!("{e}; {HELP}");
                return false;
            }
        };

        match command {
            Command::Enable(service) => {
                if !self.logger.enable_debug(service.as_deref()) {
                    println!("service not registered: {}", service.unwrap_or_default());
                }
            }
            Command::Disable(service) => {
                if !self.logger.disable_debug(service.as_deref()) {
                    println!("service not registered: {}", service.unwrap_or_default());
                }
            }
            Command::Register(name) => {
                if self.logger.controller().is_some_and(|c| c.exists(&name)) {
                    println!("already registered: {name}");
                } else {
                    workers.push(self.spawn_worker(&name, shutdown.clone()));
                }
            }
            Command::Status => {
                if let Some(controller) = self.logger.controller() {
                    match serde_json::to_string_pretty(&controller.status()) {
                        Ok(json) => println!("{json}"),
                        Err(e) => warn!(error = %e, "Failed to render status"),
                    }
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => return true,
        }

        false
    }
}

/// A controller that is already stopped is not a shutdown failure.
fn settle_stop(result: loupe_util::Result<()>) -> Result<()> {
    match result {
        Err(e) if e.is_lifecycle_misuse() => {
            warn!(error = %e, "Debug controller was not running at shutdown");
            Ok(())
        }
        other => other.context("Failed to stop debug controller"),
    }
}

async fn run_worker(
    logger: Logger,
    name: String,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    let mut beats: u64 = 0;

    logger.info_service(&name, "service started");

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }

            _ = ticker.tick() => {
                beats += 1;
                if logger.is_debug_enabled(Some(&name)) {
                    logger.debug_service(&name, &format!("heartbeat {beats}"));
                }
                if beats % HEARTBEATS_PER_INFO == 0 {
                    logger.info_service(&name, &format!("{beats} heartbeats"));
                }
            }
        }
    }

    logger.info_service(&name, "service stopped");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = Settings::from_process_env(&args.name);
    if let Some(minutes) = args.debug_timer {
        settings = settings.with_idle_minutes(minutes);
    }
    if let Some(format) = args.log_format {
        settings = settings.with_log_format(format);
    }

    init_tracing(&settings).context("Failed to initialize logging")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "louped starting"
    );

    let service = Service::new(&args, &settings);
    service.run().await
}
