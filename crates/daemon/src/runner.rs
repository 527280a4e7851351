//! Main loop
//!
//! Drives one check cycle per polling interval: status first, then
//! effectiveness. Consecutive failures are escalated to operators at the
//! configured milestones, and the watchdog stops the loop once no cycle has
//! succeeded for the kill switch duration.

use crate::settings::AppConfig;
use crate::shutdown::ShutdownSignal;
use alerting::{EscalationPolicy, Watchdog};
use beacon_client::{EffectivenessSource, StatusSource, ValidatorIndex};
use chrono::{DateTime, Utc};
use monitor::{EffectivenessMonitor, MonitorConfig, MonitorError, StatusMonitor};
use notifier::{markdown, Notifier};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

/// Sent once the daemon is up
pub const RESTARTED_MESSAGE: &str = "☀️ Validator Monitor *RESTARTED*";

/// Sent on the way out, whatever the reason
pub const FAREWELL_MESSAGE: &str = "💤 Validator Monitor *SHUTDOWN*\\. Have a nice day Ser\\!";

/// Announces how many validators are being watched
pub fn watching_message(total: usize) -> String {
    format!("Will keep an 👀 on {} validators", markdown::code(&total.to_string()))
}

/// Why the main loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Shutdown was requested
    Shutdown,
    /// No successful cycle within the kill switch; the supervisor should restart us
    Watchdog,
}

impl ExitReason {
    pub fn exit_code(self) -> i32 {
        match self {
            ExitReason::Shutdown => 0,
            ExitReason::Watchdog => 100,
        }
    }
}

/// Main loop settings
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Pause between cycles
    pub polling_wait: Duration,
    /// Maximum time without a successful cycle
    pub kill_switch: Duration,
    /// Time an in-flight cycle gets to finish on shutdown
    pub shutdown_grace: Duration,
    /// When consecutive failures are notified
    pub escalation: EscalationPolicy,
}

impl From<&AppConfig> for RunnerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            polling_wait: config.polling_wait(),
            kill_switch: config.kill_switch(),
            shutdown_grace: config.shutdown_grace(),
            escalation: config.escalation(),
        }
    }
}

/// Owns every piece of loop state: monitors, failure counter and watchdog
pub struct Runner<S> {
    source: S,
    notifier: Arc<dyn Notifier>,
    status: StatusMonitor,
    effectiveness: EffectivenessMonitor,
    config: RunnerConfig,
    watchdog: Watchdog,
    failures: u64,
    last_success_at: DateTime<Utc>,
}

impl<S: StatusSource + EffectivenessSource> Runner<S> {
    pub fn new(
        source: S,
        notifier: Arc<dyn Notifier>,
        validators: Vec<ValidatorIndex>,
        monitor_config: &MonitorConfig,
        config: RunnerConfig,
    ) -> Self {
        Self {
            source,
            notifier,
            status: StatusMonitor::new(validators.clone(), monitor_config),
            effectiveness: EffectivenessMonitor::new(validators, monitor_config),
            watchdog: Watchdog::new(config.kill_switch),
            config,
            failures: 0,
            last_success_at: Utc::now(),
        }
    }

    /// Failed cycles since the last successful one
    pub fn consecutive_failures(&self) -> u64 {
        self.failures
    }

    /// Run until shutdown is requested or the watchdog fires
    pub async fn run(&mut self, mut shutdown: ShutdownSignal) -> ExitReason {
        info!(
            "Starting main loop. Checking every {:?}, watchdog after {:?}",
            self.config.polling_wait, self.config.kill_switch
        );

        loop {
            if shutdown.is_triggered() {
                return ExitReason::Shutdown;
            }

            if self.watchdog.is_expired() {
                self.bark().await;
                return ExitReason::Watchdog;
            }

            let grace = self.config.shutdown_grace;
            let started = Instant::now();
            let (result, interrupted) = {
                let cycle = self.run_cycle();
                tokio::pin!(cycle);

                tokio::select! {
                    result = &mut cycle => (Some(result), false),
                    _ = shutdown.triggered() => {
                        info!("Shutdown requested. Giving the current check {:?} to finish", grace);
                        match time::timeout(grace, &mut cycle).await {
                            Ok(result) => (Some(result), true),
                            Err(_) => {
                                warn!("The current check did not finish in time. Abandoning it");
                                (None, true)
                            }
                        }
                    }
                }
            };

            if let Some(result) = result {
                telemetry::record_check_duration(started.elapsed());
                self.record_outcome(result).await;
            }
            if interrupted {
                return ExitReason::Shutdown;
            }

            debug!("Next check in {:?}", self.config.polling_wait);
            tokio::select! {
                _ = time::sleep(self.config.polling_wait) => {}
                _ = shutdown.triggered() => return ExitReason::Shutdown,
            }
        }
    }

    /// One full check: status, then effectiveness
    async fn run_cycle(&mut self) -> Result<(), MonitorError> {
        self.status.check(&self.source, self.notifier.as_ref()).await?;
        self.effectiveness
            .check(&self.source, self.notifier.as_ref())
            .await?;
        Ok(())
    }

    async fn record_outcome(&mut self, result: Result<(), MonitorError>) {
        match result {
            Ok(()) => {
                self.failures = 0;
                self.watchdog.record_success();
                self.last_success_at = Utc::now();
            }
            Err(e) => {
                self.failures += 1;
                telemetry::record_loop_error();
                error!(
                    "Error checking the state of validators (error_count={}): {}. Retrying in {:?}",
                    self.failures, e, self.config.polling_wait
                );

                if self.config.escalation.should_alert(self.failures) {
                    let message = format!(
                        "🔥 {}: The check has been failing for {} times in a row\\! Cause: {}",
                        markdown::bold("ERROR"),
                        markdown::code(&self.failures.to_string()),
                        markdown::escape(&e.to_string())
                    );
                    self.alert(&message).await;
                }
            }
        }
        telemetry::record_consecutive_errors(self.failures);
    }

    async fn bark(&self) {
        let minutes = self.watchdog.kill_switch().as_secs_f64() / 60.0;
        error!(
            "🐶 WATCH DOG: Last success was more than {} minutes ago ({}). Restarting!",
            minutes,
            self.last_success_at.to_rfc3339()
        );
        let message = format!(
            "🐶 {}: Last success was more than {} minutes ago\\. Restarting\\!",
            markdown::bold("WATCH DOG"),
            markdown::escape(&minutes.to_string())
        );
        self.alert(&message).await;
    }

    async fn alert(&self, message: &str) {
        if let Err(e) = self.notifier.send(message).await {
            error!("Nested error. Error sending the Error message: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown;
    use async_trait::async_trait;
    use beacon_client::{EffectivenessRecord, FetchError, StatusRecord, ValidatorStatus};
    use notifier::NotifyError;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;
    use telemetry::testing::MetricCapture;

    /// Status source failing its first `fail_first` calls, each call taking `latency`
    struct FlakySource {
        calls: AtomicU64,
        fail_first: u64,
        latency: Duration,
    }

    impl FlakySource {
        fn failing(fail_first: u64) -> Self {
            Self {
                calls: AtomicU64::new(0),
                fail_first,
                latency: Duration::ZERO,
            }
        }

        fn slow(latency: Duration) -> Self {
            Self {
                calls: AtomicU64::new(0),
                fail_first: 0,
                latency,
            }
        }
    }

    #[async_trait]
    impl StatusSource for FlakySource {
        async fn fetch_status(
            &self,
            validators: &[ValidatorIndex],
        ) -> Result<Vec<StatusRecord>, FetchError> {
            if !self.latency.is_zero() {
                time::sleep(self.latency).await;
            }
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.fail_first {
                return Err(FetchError::Status {
                    url: "http://explorer/dashboard/data/validators".to_string(),
                    status: 503,
                });
            }
            Ok(validators
                .iter()
                .map(|index| StatusRecord {
                    index: *index,
                    status: ValidatorStatus::ActiveOnline,
                })
                .collect())
        }
    }

    #[async_trait]
    impl EffectivenessSource for FlakySource {
        async fn fetch_effectiveness(
            &self,
            validators: &[ValidatorIndex],
        ) -> Result<Vec<EffectivenessRecord>, FetchError> {
            Ok(validators
                .iter()
                .map(|index| EffectivenessRecord {
                    index: *index,
                    effectiveness: 1.0,
                })
                .collect())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingNotifier {
        fn messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, message: &str) -> Result<(), NotifyError> {
            self.messages.lock().unwrap().push(message.to_string());
            if self.fail {
                return Err(NotifyError::Api {
                    code: 502,
                    description: "Bad Gateway".to_string(),
                });
            }
            Ok(())
        }
    }

    fn runner_config() -> RunnerConfig {
        RunnerConfig {
            polling_wait: Duration::from_secs(60),
            kill_switch: Duration::from_secs(30 * 60),
            shutdown_grace: Duration::from_secs(10),
            escalation: EscalationPolicy::default(),
        }
    }

    fn runner(source: FlakySource, notifier: Arc<RecordingNotifier>, config: RunnerConfig) -> Runner<FlakySource> {
        Runner::new(
            source,
            notifier,
            vec![ValidatorIndex(1), ValidatorIndex(2)],
            &MonitorConfig::default(),
            config,
        )
    }

    fn paused_runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap()
    }

    /// Run `fail_first` failing cycles, then successful ones, until `stop_after`
    fn run_captured(capture: &MetricCapture, fail_first: u64, stop_after: Duration) -> u64 {
        let notifier = Arc::new(RecordingNotifier::default());
        let mut runner = runner(FlakySource::failing(fail_first), notifier, runner_config());
        let (trigger, signal) = shutdown::channel();

        capture.record(|| {
            paused_runtime().block_on(async {
                let (reason, _) = tokio::join!(runner.run(signal), async {
                    time::sleep(stop_after).await;
                    trigger.trigger();
                });
                assert_eq!(reason, ExitReason::Shutdown);
            })
        });
        runner.consecutive_failures()
    }

    #[test]
    fn test_failures_are_published() {
        let capture = MetricCapture::new();
        // Cycles at t=0, 60 and 120s fail
        let failures = run_captured(&capture, 3, Duration::from_secs(150));

        assert_eq!(failures, 3);
        assert_eq!(capture.counter("eth2monitor_main_loop_errors", &[]), Some(3));
        assert_eq!(
            capture.gauge("eth2monitor_main_loop_consecutive_errors", &[]),
            Some(3.0)
        );
        assert_eq!(capture.series("eth2monitor_check_seconds"), 1);
    }

    #[test]
    fn test_success_clears_consecutive_errors_gauge() {
        let capture = MetricCapture::new();
        // Three failures, then a success at t=180s
        let failures = run_captured(&capture, 3, Duration::from_secs(200));

        assert_eq!(failures, 0);
        assert_eq!(capture.counter("eth2monitor_main_loop_errors", &[]), Some(3));
        assert_eq!(
            capture.gauge("eth2monitor_main_loop_consecutive_errors", &[]),
            Some(0.0)
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitReason::Shutdown.exit_code(), 0);
        assert_eq!(ExitReason::Watchdog.exit_code(), 100);
    }

    #[test]
    fn test_lifecycle_messages() {
        assert_eq!(watching_message(3), "Will keep an 👀 on `3` validators");
        assert!(FAREWELL_MESSAGE.contains("*SHUTDOWN*\\."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_fires_once() {
        let notifier = Arc::new(RecordingNotifier::default());
        let mut runner = runner(FlakySource::failing(u64::MAX), notifier.clone(), runner_config());
        let (_trigger, signal) = shutdown::channel();

        let reason = runner.run(signal).await;

        assert_eq!(reason, ExitReason::Watchdog);
        assert_eq!(reason.exit_code(), 100);
        // Cycles at t=0..=1740s fail; the watchdog fires before the one at 1800s
        assert_eq!(runner.consecutive_failures(), 30);

        let messages = notifier.messages();
        let barks: Vec<_> = messages.iter().filter(|m| m.contains("*WATCH DOG*")).collect();
        assert_eq!(barks.len(), 1);
        assert_eq!(
            barks[0],
            "🐶 *WATCH DOG*: Last success was more than 30 minutes ago\\. Restarting\\!"
        );
        assert_eq!(messages.last(), Some(barks[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_milestone_failure_is_notified() {
        let notifier = Arc::new(RecordingNotifier::default());
        let mut runner = runner(FlakySource::failing(16), notifier.clone(), runner_config());
        let (trigger, signal) = shutdown::channel();

        // 16 failed cycles (t=0..=900s), a successful one at t=960s
        let (reason, _) = tokio::join!(runner.run(signal), async {
            time::sleep(Duration::from_secs(990)).await;
            trigger.trigger();
        });

        assert_eq!(reason, ExitReason::Shutdown);
        assert_eq!(runner.consecutive_failures(), 0);

        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("🔥 *ERROR*: The check has been failing for `15` times in a row\\! Cause: "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failures_and_watchdog() {
        let notifier = Arc::new(RecordingNotifier::default());
        let mut config = runner_config();
        config.kill_switch = Duration::from_secs(5 * 60);
        let mut runner = runner(FlakySource::failing(4), notifier.clone(), config);
        let (trigger, signal) = shutdown::channel();

        // Four failures take 240s, then every cycle succeeds past the kill switch
        let (reason, _) = tokio::join!(runner.run(signal), async {
            time::sleep(Duration::from_secs(20 * 60)).await;
            trigger.trigger();
        });

        assert_eq!(reason, ExitReason::Shutdown);
        assert_eq!(runner.consecutive_failures(), 0);
        assert!(notifier.messages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_alert_delivery_failure_keeps_running() {
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let mut config = runner_config();
        config.escalation = EscalationPolicy::new([1, 2]);
        let mut runner = runner(FlakySource::failing(u64::MAX), notifier.clone(), config);
        let (trigger, signal) = shutdown::channel();

        let (reason, _) = tokio::join!(runner.run(signal), async {
            time::sleep(Duration::from_secs(150)).await;
            trigger.trigger();
        });

        assert_eq!(reason, ExitReason::Shutdown);
        assert_eq!(runner.consecutive_failures(), 3);
        assert_eq!(notifier.messages().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_before_first_cycle() {
        let notifier = Arc::new(RecordingNotifier::default());
        let source = FlakySource::failing(0);
        let mut runner = runner(source, notifier.clone(), runner_config());
        let (trigger, signal) = shutdown::channel();
        trigger.trigger();

        assert_eq!(runner.run(signal).await, ExitReason::Shutdown);
        assert_eq!(runner.source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_cycle_finishes_within_grace() {
        let notifier = Arc::new(RecordingNotifier::default());
        let mut runner = runner(FlakySource::slow(Duration::from_secs(5)), notifier.clone(), runner_config());
        let (trigger, signal) = shutdown::channel();
        let started = Instant::now();

        let (reason, _) = tokio::join!(runner.run(signal), async {
            time::sleep(Duration::from_secs(2)).await;
            trigger.trigger();
        });

        assert_eq!(reason, ExitReason::Shutdown);
        assert_eq!(started.elapsed(), Duration::from_secs(5));
        assert_eq!(runner.source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(runner.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_cycle_is_abandoned_after_grace() {
        let notifier = Arc::new(RecordingNotifier::default());
        let mut runner = runner(FlakySource::slow(Duration::from_secs(120)), notifier.clone(), runner_config());
        let (trigger, signal) = shutdown::channel();
        let started = Instant::now();

        let (reason, _) = tokio::join!(runner.run(signal), async {
            time::sleep(Duration::from_secs(2)).await;
            trigger.trigger();
        });

        assert_eq!(reason, ExitReason::Shutdown);
        assert_eq!(started.elapsed(), Duration::from_secs(12));
        assert_eq!(runner.consecutive_failures(), 0);
        assert!(notifier.messages().is_empty());
    }
}
