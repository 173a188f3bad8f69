use std::{sync::Arc, time::Duration};

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    commands::{CommandSurface, RegisterError},
    config::Settings,
    credentials::CredentialSource,
    session::{ConnectError, DisconnectReason, Session, SessionConnector},
    tasks::TaskRunner,
};

/// Final outcome of the supervisor loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitStatus {
    CleanShutdown,
    BudgetExhausted,
    FatalTransportError,
    NoCredentialAvailable,
}

impl ExitStatus {
    /// Stable process exit code.
    pub fn code(self) -> u8 {
        match self {
            ExitStatus::CleanShutdown => 0,
            ExitStatus::BudgetExhausted => 2,
            ExitStatus::FatalTransportError => 3,
            ExitStatus::NoCredentialAvailable => 4,
        }
    }
}

/// Cumulative retry budget shared by every retryable failure kind.
///
/// The count never resets, not even after a successful connect, so repeated
/// flapping still terminates within the budget.
#[derive(Clone, Copy, Debug)]
pub struct RetryState {
    attempt_count: u32,
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryState {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempt_count: 0,
            max_attempts,
            base_delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempt_count
    }

    pub fn exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }

    /// `base_delay * 2^attempt_count`, for the current (pre-increment) count.
    pub fn next_delay(&self) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(self.attempt_count))
    }

    pub fn record_failure(&mut self) {
        self.attempt_count += 1;
    }
}

/// Connection lifecycle supervisor.
///
/// Owns the retry state machine, orchestrates the credential source, the
/// session connector and the background task runner, and funnels every exit
/// path through one shutdown sequence.
pub struct Supervisor {
    max_attempts: u32,
    base_delay: Duration,
    shutdown: CancellationToken,
    tasks: TaskRunner,
}

impl Supervisor {
    pub fn new(settings: &Settings, shutdown: CancellationToken, tasks: TaskRunner) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            base_delay: settings.base_delay,
            shutdown,
            tasks,
        }
    }

    pub async fn run(
        &self,
        credentials: &dyn CredentialSource,
        connector: &dyn SessionConnector,
        commands: &dyn CommandSurface,
    ) -> ExitStatus {
        let mut retry = RetryState::new(self.max_attempts, self.base_delay);

        let mut token = match self.acquire_token(credentials) {
            Ok(t) => t,
            Err(status) => return self.terminate(status, None).await,
        };

        loop {
            if retry.exhausted() {
                eprintln!(
                    "[SUPERVISOR] Retry budget exhausted after {} attempts",
                    retry.attempts()
                );
                return self.terminate(ExitStatus::BudgetExhausted, None).await;
            }

            match commands.register().await {
                Ok(()) => {}
                Err(RegisterError::DuplicateInitialization(msg)) => {
                    println!("[SUPERVISOR] {msg}; continuing with the connection attempt");
                }
                Err(RegisterError::Failed(msg)) => {
                    eprintln!("[SUPERVISOR] Command registration failed: {msg}");
                    return self.terminate(ExitStatus::FatalTransportError, None).await;
                }
            }

            println!("[SUPERVISOR] Connecting to Discord...");
            let outcome = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    println!("[SUPERVISOR] Shutdown requested during connect");
                    return self.terminate(ExitStatus::CleanShutdown, None).await;
                }
                res = connector.connect(&token) => res,
            };

            match outcome {
                Ok(session) => return self.run_live(session).await,

                Err(ConnectError::RateLimited { retry_after }) => {
                    if let Some(hint) = retry_after {
                        debug!(?hint, "server-suggested retry delay ignored for backoff policy");
                    }
                    let delay = retry.next_delay();
                    retry.record_failure();
                    eprintln!("{}", retry_line("Rate limited by Discord", &retry, delay));
                    if retry.exhausted() {
                        return self.terminate(ExitStatus::BudgetExhausted, None).await;
                    }
                    if !self.backoff(delay).await {
                        return self.terminate(ExitStatus::CleanShutdown, None).await;
                    }
                }

                Err(ConnectError::Connectivity(msg)) => {
                    let delay = retry.next_delay();
                    retry.record_failure();
                    eprintln!(
                        "{}",
                        retry_line(&format!("Failed to connect: {msg}"), &retry, delay)
                    );
                    if retry.exhausted() {
                        return self.terminate(ExitStatus::BudgetExhausted, None).await;
                    }
                    if !self.backoff(delay).await {
                        return self.terminate(ExitStatus::CleanShutdown, None).await;
                    }
                }

                Err(ConnectError::AuthFailed) => {
                    eprintln!("[SUPERVISOR] Failed to login. Discarding the stored token.");
                    retry.record_failure();
                    if let Err(e) = credentials.invalidate() {
                        eprintln!("[SUPERVISOR] Could not invalidate credentials: {e}");
                    }
                    if retry.exhausted() {
                        return self.terminate(ExitStatus::BudgetExhausted, None).await;
                    }
                    token = match self.acquire_token(credentials) {
                        Ok(t) => t,
                        Err(status) => return self.terminate(status, None).await,
                    };
                }

                Err(ConnectError::Fatal(msg)) => {
                    eprintln!("[SUPERVISOR] Fatal transport error: {msg}");
                    return self.terminate(ExitStatus::FatalTransportError, None).await;
                }
            }
        }
    }

    async fn run_live(&self, session: Arc<dyn Session>) -> ExitStatus {
        println!("[SUPERVISOR] Connected. Session is live.");
        self.tasks.start(session.clone()).await;

        let status = tokio::select! {
            _ = self.shutdown.cancelled() => {
                println!("[SUPERVISOR] Shutdown signal received. Closing session...");
                ExitStatus::CleanShutdown
            }
            reason = session.wait_disconnected() => match reason {
                DisconnectReason::Closed => {
                    println!("[SUPERVISOR] Session closed by the platform");
                    ExitStatus::CleanShutdown
                }
                DisconnectReason::Errored(msg) => {
                    eprintln!("[SUPERVISOR] Session ended with an unrecoverable error: {msg}");
                    ExitStatus::FatalTransportError
                }
            }
        };

        self.terminate(status, Some(session)).await
    }

    /// Single shutdown funnel: background tasks are always cancelled before
    /// the session handle is closed.
    async fn terminate(&self, status: ExitStatus, session: Option<Arc<dyn Session>>) -> ExitStatus {
        self.tasks.stop().await;
        if let Some(session) = session {
            session.close().await;
        }
        println!("[SUPERVISOR] Final status: {status:?}");
        status
    }

    fn acquire_token(&self, credentials: &dyn CredentialSource) -> Result<String, ExitStatus> {
        match credentials.get() {
            Ok(token) if !token.trim().is_empty() => Ok(token),
            Ok(_) => {
                eprintln!("[SUPERVISOR] Credential source returned an empty token");
                Err(ExitStatus::NoCredentialAvailable)
            }
            Err(e) => {
                eprintln!("[SUPERVISOR] No token could be obtained: {e}");
                Err(ExitStatus::NoCredentialAvailable)
            }
        }
    }

    /// Cancellable backoff wait. Returns false when shutdown arrived mid-wait.
    async fn backoff(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = sleep(delay) => true,
        }
    }
}

/// Operator line after a retryable failure was recorded. Promises a retry
/// only when the budget actually has one left.
fn retry_line(context: &str, retry: &RetryState, delay: Duration) -> String {
    if retry.exhausted() {
        format!(
            "[SUPERVISOR] {context}. Retry budget exhausted after {} attempts",
            retry.attempts()
        )
    } else {
        format!(
            "[SUPERVISOR] {context}. Retrying in {} seconds...",
            delay.as_secs()
        )
    }
}
