use std::{sync::Arc, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{interval, timeout},
};
use tokio_util::sync::CancellationToken;

use crate::{
    botlog::BotLog,
    config::Settings,
    session::Session,
};

/// Runs the periodic maintenance tasks while a session is live.
///
/// Both tasks share one cancellation token and are stopped as a unit; the
/// supervisor always stops the runner before closing the session handle, so
/// no task observes a closed handle at the top of its loop. An in-flight
/// action may still complete after cancellation is requested and contains its
/// own failure.
pub struct TaskRunner {
    presence_prefix: String,
    presence_interval: Duration,
    log_reset_interval: Duration,
    stop_grace: Duration,
    log: BotLog,
    running: tokio::sync::Mutex<Option<Running>>,
}

struct Running {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl TaskRunner {
    pub fn new(settings: &Settings, log: BotLog) -> Self {
        Self {
            presence_prefix: settings.presence_prefix.clone(),
            presence_interval: settings.presence_interval,
            log_reset_interval: settings.log_reset_interval,
            stop_grace: settings.task_stop_grace,
            log,
            running: tokio::sync::Mutex::new(None),
        }
    }

    /// Spawn both periodic tasks against the live session. No-op when the
    /// runner is already started.
    pub async fn start(&self, session: Arc<dyn Session>) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let mut handles = Vec::new();

        {
            let cancel = cancel.clone();
            let session = session.clone();
            let prefix = self.presence_prefix.clone();
            let every = self.presence_interval;
            handles.push(tokio::spawn(async move {
                presence_loop(session, prefix, every, cancel).await;
            }));
        }
        {
            let cancel = cancel.clone();
            let log = self.log.clone();
            let every = self.log_reset_interval;
            handles.push(tokio::spawn(async move {
                rotation_loop(log, every, cancel).await;
            }));
        }

        *running = Some(Running { cancel, handles });
        println!("[TASKS] Started presence-refresh and log-rotation tasks");
    }

    /// Cancel both tasks and wait for them to wind down. No-op when idle.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };

        running.cancel.cancel();
        for mut handle in running.handles {
            if timeout(self.stop_grace, &mut handle).await.is_err() {
                handle.abort();
            }
        }
        println!("[TASKS] Background tasks stopped");
    }
}

async fn presence_loop(
    session: Arc<dyn Session>,
    prefix: String,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut tick = interval(every);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {
                let scope = session.scope().await;
                let text = format!(
                    "{prefix} | {} servers | {} users",
                    scope.guild_count(),
                    scope.total_members()
                );
                if let Err(e) = session.update_presence(&text).await {
                    eprintln!("[TASKS] Presence update failed: {e}");
                }
            }
        }
    }
}

async fn rotation_loop(log: BotLog, every: Duration, cancel: CancellationToken) {
    let mut tick = interval(every);
    // The first interval tick fires immediately; rotation waits a full period.
    tick.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {
                if let Err(e) = log.rotate() {
                    eprintln!("[TASKS] Log rotation failed: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::domain::{GuildId, GuildInfo, ScopeSnapshot};
    use crate::session::DisconnectReason;

    struct CountingSession {
        pushes: Mutex<Vec<String>>,
        push_count: AtomicUsize,
        fail_presence: bool,
    }

    impl CountingSession {
        fn new(fail_presence: bool) -> Arc<Self> {
            Arc::new(Self {
                pushes: Mutex::new(Vec::new()),
                push_count: AtomicUsize::new(0),
                fail_presence,
            })
        }
    }

    #[async_trait]
    impl Session for CountingSession {
        async fn wait_disconnected(&self) -> DisconnectReason {
            std::future::pending().await
        }

        async fn close(&self) {}

        async fn update_presence(&self, text: &str) -> crate::Result<()> {
            self.push_count.fetch_add(1, Ordering::SeqCst);
            if self.fail_presence {
                return Err(crate::Error::Session("push refused".to_string()));
            }
            self.pushes.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn scope(&self) -> ScopeSnapshot {
            ScopeSnapshot {
                guilds: vec![
                    GuildInfo {
                        id: GuildId(1 << 22),
                        name: "one".to_string(),
                        member_count: 3,
                        owner: "1".to_string(),
                    },
                    GuildInfo {
                        id: GuildId(2 << 22),
                        name: "two".to_string(),
                        member_count: 4,
                        owner: "2".to_string(),
                    },
                ],
            }
        }
    }

    fn settings(presence_ms: u64, rotation_ms: u64, log_path: PathBuf) -> Settings {
        Settings {
            admin_user_id: 1,
            env_path: PathBuf::from("/tmp/unused.env"),
            log_path,
            presence_prefix: "/help_toram".to_string(),
            presence_interval: Duration::from_millis(presence_ms),
            log_reset_interval: Duration::from_millis(rotation_ms),
            max_attempts: 5,
            base_delay: Duration::from_secs(5),
            chunk_limit: 1900,
            denial_delete_after: Duration::from_secs(10),
            task_stop_grace: Duration::from_secs(1),
        }
    }

    fn tmp_log(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        PathBuf::from(format!("/tmp/{prefix}-{}-{ts}.log", std::process::id()))
    }

    #[tokio::test]
    async fn presence_refresh_pushes_formatted_status() {
        let path = tmp_log("skillbot-tasks-presence");
        let cfg = settings(20, 60_000, path.clone());
        let runner = TaskRunner::new(&cfg, BotLog::new(&path));
        let session = CountingSession::new(false);

        runner.start(session.clone()).await;
        tokio::time::sleep(Duration::from_millis(70)).await;
        runner.stop().await;

        let pushes = session.pushes.lock().unwrap().clone();
        assert!(pushes.len() >= 2, "expected repeated pushes, got {pushes:?}");
        assert_eq!(pushes[0], "/help_toram | 2 servers | 7 users");

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn presence_failure_is_contained_and_schedule_continues() {
        let path = tmp_log("skillbot-tasks-presence-fail");
        let cfg = settings(20, 60_000, path.clone());
        let runner = TaskRunner::new(&cfg, BotLog::new(&path));
        let session = CountingSession::new(true);

        runner.start(session.clone()).await;
        tokio::time::sleep(Duration::from_millis(70)).await;
        runner.stop().await;

        // Each push failed, yet the task kept its schedule.
        assert!(session.push_count.load(Ordering::SeqCst) >= 2);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn rotation_writes_reset_marker_after_one_period() {
        let path = tmp_log("skillbot-tasks-rotation");
        let cfg = settings(60_000, 30, path.clone());
        let log = BotLog::new(&path);
        log.log(crate::botlog::LogLevel::Info, "before rotation")
            .unwrap();

        let runner = TaskRunner::new(&cfg, log);
        let session = CountingSession::new(false);
        runner.start(session).await;
        tokio::time::sleep(Duration::from_millis(90)).await;
        runner.stop().await;

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("Log file reset at "));
        assert!(!written.contains("before rotation"));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn no_task_runs_after_stop() {
        let path = tmp_log("skillbot-tasks-stop");
        let cfg = settings(10, 60_000, path.clone());
        let runner = TaskRunner::new(&cfg, BotLog::new(&path));
        let session = CountingSession::new(false);

        runner.start(session.clone()).await;
        tokio::time::sleep(Duration::from_millis(35)).await;
        runner.stop().await;

        let after_stop = session.push_count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(session.push_count.load(Ordering::SeqCst), after_stop);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn stop_without_start_is_a_noop() {
        let path = tmp_log("skillbot-tasks-idle");
        let cfg = settings(10, 10, path.clone());
        let runner = TaskRunner::new(&cfg, BotLog::new(&path));
        runner.stop().await;
        runner.stop().await;
    }
}
