//! Validator Monitor - Main Entry Point

use anyhow::{bail, Context};
use beacon_client::BeaconClient;
use daemon::{
    listen_for_signals, shutdown, watching_message, AppConfig, ExitReason, Runner, RunnerConfig,
    ShutdownSignal, FAREWELL_MESSAGE, RESTARTED_MESSAGE,
};
use notifier::{announce_identity, LogNotifier, Notifier, TelegramNotifier};
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_logging(telemetry::log_level_from_env())?;

    info!("=== Validator Monitor v{} ===", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load().context("Unable to load the configuration")?;
    let telegram = config.telegram_config();

    match &config.prometheus {
        Some(prometheus) => {
            telemetry::install_prometheus(prometheus.port)?;
            telemetry::describe_metrics();
        }
        None => warn!(
            "Prometheus metrics won't be exposed. To expose them, add prometheus configuration"
        ),
    }
    telemetry::record_config_info(&config.beacon_chain.base_url, telegram.is_some());

    let notifier: Arc<dyn Notifier> = match telegram {
        Some(telegram) => {
            let bot = TelegramNotifier::new(telegram)?;
            announce_identity(&bot).await;
            Arc::new(bot)
        }
        None => Arc::new(LogNotifier),
    };

    let (trigger, signal) = shutdown::channel();
    tokio::spawn(async move {
        if let Err(e) = listen_for_signals(trigger).await {
            error!("Unable to listen for shutdown signals: {}", e);
        }
    });

    let outcome = monitor(&config, notifier.clone(), signal).await;

    info!("Have a good day Ser!");
    send(notifier.as_ref(), FAREWELL_MESSAGE).await;

    match outcome? {
        ExitReason::Shutdown => Ok(()),
        reason => std::process::exit(reason.exit_code()),
    }
}

/// Resolve the validators and run the main loop until it stops
async fn monitor(
    config: &AppConfig,
    notifier: Arc<dyn Notifier>,
    signal: ShutdownSignal,
) -> anyhow::Result<ExitReason> {
    send(notifier.as_ref(), RESTARTED_MESSAGE).await;

    let client = BeaconClient::new(config.client_config())?;
    let validators = client
        .resolve_validators(&config.validators)
        .await
        .context("Unable to resolve the monitored validators")?;
    if validators.is_empty() {
        bail!("The configured selection did not match any validator");
    }

    telemetry::record_validators_total(validators.len());
    info!(
        "Monitoring {} validators: {}",
        validators.len(),
        validators
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
    send(notifier.as_ref(), &watching_message(validators.len())).await;

    let mut runner = Runner::new(
        client,
        notifier,
        validators,
        &config.monitor_config(),
        RunnerConfig::from(config),
    );
    Ok(runner.run(signal).await)
}

async fn send(notifier: &dyn Notifier, message: &str) {
    if let Err(e) = notifier.send(message).await {
        error!("Error sending message: {}", e);
    }
}
