//! Executes every registered check with bounded parallelism.
//!
//! Each check runs on its own task under a supervisor that enforces the
//! check's timeout, contains panics and converts every ending into exactly one
//! [`CheckRecord`]. A check that overruns is signalled through its
//! cancellation token, given a short grace period to unwind and then aborted.

use std::any::Any;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context::{CheckContext, RunContext, RunScope};
use crate::error::{CheckError, InventoryError, RunError};
use crate::finding::Finding;
use crate::registry::{Check, CheckRegistry};
use crate::report::{aggregate, CheckFailure, CheckOutcome, CheckRecord, FailureKind, RunReport};

/// Default timeout applied to checks without an override.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of checks running at once.
pub const DEFAULT_WORKERS: usize = 8;

/// Default time a cancelled check gets to unwind before it is aborted.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(500);

/// Default deadline of the pre-run connectivity probe.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Executor tuning.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Timeout of checks registered without their own.
    pub per_check_timeout: Duration,
    /// Maximum number of checks running concurrently.
    pub workers: usize,
    /// How long a timed out or cancelled check may keep running before it
    /// is aborted.
    pub grace_period: Duration,
    /// Deadline of the connectivity probe made before any check runs.
    pub connect_timeout: Duration,
    /// Serialise remote client calls across checks.
    pub serialize_client: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            per_check_timeout: DEFAULT_CHECK_TIMEOUT,
            workers: DEFAULT_WORKERS,
            grace_period: DEFAULT_GRACE_PERIOD,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            serialize_client: false,
        }
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> Result<(), RunError> {
        if self.workers == 0 {
            return Err(RunError::InvalidConfig("workers must be at least 1".into()));
        }
        if self.per_check_timeout.is_zero() {
            return Err(RunError::InvalidConfig(
                "per-check timeout must be greater than zero".into(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(RunError::InvalidConfig(
                "connect timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Runs a [`CheckRegistry`] and produces a [`RunReport`].
#[derive(Debug, Clone, Default)]
pub struct Executor {
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run every check in `registry` once.
    ///
    /// Fails only when the infrastructure endpoint is unreachable before any
    /// check starts; every other failure is recorded against its check.
    pub async fn run(
        &self,
        registry: &CheckRegistry,
        base: RunContext,
    ) -> Result<RunReport, RunError> {
        self.config.validate()?;

        let run_token = base.cancellation().child_token();
        let deadline = base.deadline();
        let watchdog = deadline.map(|deadline| {
            let token = run_token.clone();
            tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                debug!("run deadline exceeded, cancelling checks");
                token.cancel();
            })
        });

        if let Err(err) = self.probe(&base, &run_token).await {
            run_token.cancel();
            if let Some(watchdog) = watchdog {
                watchdog.abort();
            }
            return Err(err);
        }

        let scope = Arc::new(RunScope::new(
            base.collaborators().clone(),
            run_token.clone(),
            deadline,
            self.config.serialize_client,
        ));
        scope.activate();

        info!(
            checks = registry.len(),
            workers = self.config.workers,
            timeout_ms = self.config.per_check_timeout.as_millis() as u64,
            "Starting check run"
        );
        let started = Instant::now();

        let workers = Arc::new(Semaphore::new(self.config.workers));
        let mut pending: BTreeSet<String> = registry.names().map(str::to_string).collect();
        let mut set = JoinSet::new();
        for (name, entry) in registry.iter() {
            let supervisor = Supervisor {
                name: Arc::from(name),
                check: entry.check(),
                timeout: entry.timeout().unwrap_or(self.config.per_check_timeout),
                grace: self.config.grace_period,
                scope: Arc::clone(&scope),
            };
            let workers = Arc::clone(&workers);
            set.spawn(supervisor.run(workers));
        }

        let mut records = Vec::with_capacity(registry.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(record) => {
                    pending.remove(&record.name);
                    records.push(record);
                }
                Err(err) => error!(error = %err, "Check supervisor terminated"),
            }
        }
        // Every scheduled check must appear in the report.
        for name in pending {
            records.push(CheckRecord {
                name,
                outcome: CheckOutcome::Failed(CheckFailure::new(
                    FailureKind::Panicked,
                    "check supervisor terminated unexpectedly",
                )),
                elapsed: Duration::ZERO,
            });
        }

        scope.close();
        run_token.cancel();
        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }

        let report = aggregate(records);
        info!(
            status = %report.summarize(),
            checks = report.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Check run complete"
        );
        Ok(report)
    }

    /// Pre-run connectivity probe. Cancellation is not a probe failure: the
    /// checks are then recorded as cancelled instead.
    async fn probe(&self, base: &RunContext, token: &CancellationToken) -> Result<(), RunError> {
        let inventory = &base.collaborators().inventory;
        tokio::select! {
            biased;
            () = token.cancelled() => {
                debug!("Run cancelled before connectivity probe finished");
                Ok(())
            }
            result = tokio::time::timeout(self.config.connect_timeout, inventory.ping()) => match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => {
                    error!(error = %err, "Infrastructure endpoint unreachable, skipping all checks");
                    Err(RunError::Unreachable(err))
                }
                Err(_) => {
                    error!(
                        timeout_ms = self.config.connect_timeout.as_millis() as u64,
                        "Connectivity probe timed out, skipping all checks"
                    );
                    Err(RunError::ProbeTimeout(self.config.connect_timeout))
                }
            },
        }
    }
}

/// Drives one check from queueing to its record.
struct Supervisor {
    name: Arc<str>,
    check: Arc<dyn Check>,
    timeout: Duration,
    grace: Duration,
    scope: Arc<RunScope>,
}

type CheckResult = Result<Finding, CheckError>;

impl Supervisor {
    async fn run(self, workers: Arc<Semaphore>) -> CheckRecord {
        let queued = Instant::now();
        let run_token = self.scope.cancellation().clone();

        let permit = tokio::select! {
            biased;
            () = run_token.cancelled() => {
                return self.record(self.interrupted(), queued.elapsed());
            }
            permit = workers.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return self.record(self.interrupted(), queued.elapsed()),
            },
        };

        let started = Instant::now();
        let deadline = started + self.timeout;
        let check_token = run_token.child_token();
        let ctx = CheckContext::new(
            Arc::clone(&self.name),
            Arc::clone(&self.scope),
            check_token.clone(),
            deadline,
        );
        let check = Arc::clone(&self.check);
        let mut task = tokio::spawn(async move { check.run(ctx).await });
        debug!(check = %self.name, "Check started");

        let outcome = tokio::select! {
            joined = &mut task => self.joined(joined),
            () = tokio::time::sleep_until(deadline) => {
                check_token.cancel();
                warn!(
                    check = %self.name,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Check timed out"
                );
                self.stop(task).await;
                CheckOutcome::Failed(CheckFailure::new(
                    FailureKind::Timeout,
                    format!("check did not finish within {:?}", self.timeout),
                ))
            }
            () = run_token.cancelled() => {
                let outcome = self.interrupted();
                warn!(check = %self.name, reason = %outcome.message(), "Check interrupted");
                self.stop(task).await;
                outcome
            }
        };
        drop(permit);

        self.record(outcome, started.elapsed())
    }

    fn joined(&self, joined: Result<CheckResult, JoinError>) -> CheckOutcome {
        match joined {
            Ok(Ok(finding)) => {
                debug!(check = %self.name, kind = %finding.kind(), "Check finished");
                CheckOutcome::Completed(finding)
            }
            // Context calls made after the run deadline fail with ContextClosed.
            Ok(Err(CheckError::Inventory(InventoryError::ContextClosed)))
                if self.scope.deadline_exceeded() =>
            {
                warn!(check = %self.name, "Check stopped by the run deadline");
                self.interrupted()
            }
            Ok(Err(err)) => {
                let failure = CheckFailure::from_error(&err);
                if failure.kind == FailureKind::Timeout {
                    warn!(check = %self.name, error = %err, "Check timed out");
                } else {
                    warn!(check = %self.name, error = %err, "Check failed");
                }
                CheckOutcome::Failed(failure)
            }
            Err(err) if err.is_panic() => {
                let message = panic_message(err.into_panic());
                error!(check = %self.name, panic = %message, "Check panicked");
                CheckOutcome::Failed(CheckFailure::new(
                    FailureKind::Panicked,
                    format!("check panicked: {message}"),
                ))
            }
            Err(_) => CheckOutcome::Failed(CheckFailure::new(
                FailureKind::Cancelled,
                "check task was aborted",
            )),
        }
    }

    /// Give a signalled check its grace period, then abort it.
    async fn stop(&self, mut task: JoinHandle<CheckResult>) {
        if tokio::time::timeout(self.grace, &mut task).await.is_err() {
            debug!(check = %self.name, "Check ignored cancellation, aborting");
            task.abort();
        }
    }

    fn interrupted(&self) -> CheckOutcome {
        if self.scope.deadline_exceeded() {
            CheckOutcome::Failed(CheckFailure::new(
                FailureKind::Timeout,
                "run deadline exceeded before the check finished",
            ))
        } else {
            CheckOutcome::Failed(CheckFailure::new(
                FailureKind::Cancelled,
                "run cancelled before the check finished",
            ))
        }
    }

    fn record(&self, outcome: CheckOutcome, elapsed: Duration) -> CheckRecord {
        CheckRecord {
            name: self.name.to_string(),
            outcome,
            elapsed,
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
