//! pmemstat entry point: config resolution, logging, and the tick loop.

use std::io::Write;
use std::time::{Duration, Instant};

use chrono::Local;
use clap::Parser;
use tokio::signal;
use tracing::{error, info, Level};

use pmemstat::cli::{Args, LogLevel};
use pmemstat::config::{resolve_config, show_config, validate_effective_config, Config};
use pmemstat::report::Formatter;
use pmemstat::sampler::Sampler;
use pmemstat::{startup_checks, ProcFs};

/// Initializes tracing with the configured log level, writing to stderr so
/// the report table on stdout stays clean.
fn setup_logging(args: &Args) {
    let log_level = match args.log_level {
        LogLevel::Off | LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

fn build_formatter(config: &Config) -> Formatter {
    let mut formatter = Formatter::new(config.effective_units(), config.effective_group_by());
    formatter.show_cpu = config.show_cpu.unwrap_or(false);
    formatter.collapse_other = config.collapse_other.unwrap_or(false);
    formatter.debug = config.debug.unwrap_or(false);
    formatter
}

/// Resolves when the user asks for shutdown; the tick loop only honors it at
/// tick boundaries, but a pending sleep is interrupted promptly.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;
        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("Configuration invalid: {e}");
                std::process::exit(1);
            }
            println!("Configuration is valid");
            return Ok(());
        }
        return show_config(&config, args.config_format);
    }

    let config = resolve_config(&args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("Configuration invalid: {e}");
        std::process::exit(1);
    }

    setup_logging(&args);
    startup_checks::report_privileges();

    let formatter = build_formatter(&config);
    let interval = config.loop_interval_s.unwrap_or(0);
    let mut sampler = Sampler::new(ProcFs::new(), config.to_options());

    let mut shutdown = std::pin::pin!(shutdown_signal());
    let mut stdout = std::io::stdout();

    loop {
        let tick_start = Instant::now();
        let report = match sampler.tick(Local::now()) {
            Ok(report) => report,
            Err(e) => {
                error!("tick aborted: {e}");
                return Err(e.into());
            }
        };

        if report.grand.number == 0 {
            println!("DONE: no pids to report ... exiting now");
            break;
        }

        stdout.write_all(formatter.render(&report).as_bytes())?;
        stdout.flush()?;

        if interval <= 0 {
            break;
        }

        // Sleep until the next tick deadline, but never negative.
        let period = Duration::from_secs(interval as u64);
        let remaining = period.saturating_sub(tick_start.elapsed());
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested, exiting");
                break;
            }
            _ = tokio::time::sleep(remaining) => {}
        }
    }

    Ok(())
}
