use crate::config::AppConfig;
use crate::heartbeat::Heartbeat;
use crate::influx::InfluxClient;
use crate::poller::Poller;
use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod config;
mod heartbeat;
mod influx;
mod nut;
mod poller;

/// Polls UPS statistics through NUT and forwards them to InfluxDB.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load(Some(cli.config))?;

    let mut log_builder = env_logger::Builder::new();
    log_builder
        .filter_level(log::LevelFilter::Info)
        .parse_env(env_logger::Env::default());

    let _guard = if let Some(ref sentry_dsn) = config.sentry.sentry_dsn {
        // Ensure Sentry can capture error logs.
        let logger = sentry_log::SentryLogger::with_dest(log_builder.build());
        log::set_boxed_logger(Box::new(logger))
            .context("Failed to set Sentry logger as boxed logger!")?;
        log::set_max_level(log::LevelFilter::Trace);

        let panic_integration = sentry_panic::PanicIntegration::default().add_extractor(|_| None);
        Some(sentry::init((
            sentry_dsn.clone(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                integrations: vec![std::sync::Arc::new(panic_integration)],
                ..Default::default()
            },
        )))
    } else {
        // Initialize default logger.
        let logger = log_builder.build();
        log::set_boxed_logger(Box::new(logger))
            .context("Failed to set non Sentry logger as boxed logger!")?;
        log::set_max_level(log::LevelFilter::Trace);
        warn!("Sentry DSN is unset! Not initializing.");
        None
    };

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async {
            let influx = InfluxClient::new(&config.influx)?;
            influx.health().await?;
            info!("InfluxDB passed its health check.");

            let heartbeat = match &config.heartbeat {
                Some(heartbeat_config) => {
                    let heartbeat = Heartbeat::new(crate::heartbeat::HeartbeatConfig {
                        interval: Duration::from_secs(heartbeat_config.interval),
                        liveness_threshold: Duration::from_secs(
                            heartbeat_config.liveness_threshold,
                        ),
                        url: heartbeat_config.url.clone(),
                        on_error: Some(Arc::new(|e| error!("Heartbeat error: {e:#}"))),
                    })
                    .context("Failed to create heartbeat client!")?;
                    heartbeat.start().await;
                    Some(heartbeat)
                }
                None => {
                    warn!("Heartbeat URL is unset! Not initializing.");
                    None
                }
            };

            let poller = Poller::new(
                &config.ups,
                config.influx.measurement.clone(),
                influx,
                heartbeat,
            );
            let poller_handle = tokio::spawn(async move { poller.run().await });

            tokio::select! {
                _ = poller_handle => warn!("The poller has stopped unexpectedly!"),
                _ = tokio::signal::ctrl_c() => warn!("Received shutdown signal!")
            }

            info!("Shutting down...");
            anyhow::Ok(())
        })?;

    info!("Finished!");
    Ok(())
}
