//! Discord adapter (serenity).
//!
//! This crate implements the `skillbot-core` session and command ports over
//! the Discord gateway. The connector owns the handshake; once the gateway
//! reports ready, the live connection is handed back as a [`DiscordSession`]
//! and the supervisor takes over its lifetime.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex as StdMutex,
};

use async_trait::async_trait;
use serenity::{
    gateway::{ActivityData, ShardManager},
    model::user::OnlineStatus,
    prelude::*,
};
use tokio::sync::{oneshot, Mutex};

use skillbot_core::{
    botlog::BotLog,
    commands::{CommandSurface, RegisterError},
    config::Settings,
    domain::ScopeSnapshot,
    errors::Error,
    session::{ConnectError, DisconnectReason, Session, SessionConnector},
    Result,
};

pub mod handlers;

use handlers::Handler;

/// Gateway context shared between the event handler and the session handle.
///
/// The `Context` only exists once the ready event has fired; presence and
/// scope calls before that point are answered conservatively.
#[derive(Default)]
pub struct SessionShared {
    ctx: Mutex<Option<Context>>,
}

/// Builds one fresh gateway connection per call.
pub struct DiscordConnector {
    admin_user_id: u64,
    chunk_limit: usize,
    denial_delete_after: std::time::Duration,
    log: BotLog,
}

impl DiscordConnector {
    pub fn new(settings: &Settings, log: BotLog) -> Self {
        Self {
            admin_user_id: settings.admin_user_id,
            chunk_limit: settings.chunk_limit,
            denial_delete_after: settings.denial_delete_after,
            log,
        }
    }

    fn intents() -> GatewayIntents {
        GatewayIntents::non_privileged()
            | GatewayIntents::MESSAGE_CONTENT
            | GatewayIntents::GUILD_MEMBERS
            | GatewayIntents::GUILD_VOICE_STATES
    }
}

#[async_trait]
impl SessionConnector for DiscordConnector {
    async fn connect(
        &self,
        token: &str,
    ) -> std::result::Result<Arc<dyn Session>, ConnectError> {
        let shared = Arc::new(SessionShared::default());
        let (ready_tx, ready_rx) = oneshot::channel();

        let handler = Handler::new(
            shared.clone(),
            ready_tx,
            self.admin_user_id,
            self.chunk_limit,
            self.denial_delete_after,
            self.log.clone(),
        );

        let mut client = Client::builder(token, Self::intents())
            .event_handler(handler)
            .await
            .map_err(classify_error)?;

        let shard_manager = client.shard_manager.clone();
        let (done_tx, mut done_rx) = oneshot::channel();
        tokio::spawn(async move {
            let res = client.start().await;
            let _ = done_tx.send(res);
        });

        tokio::select! {
            // Gateway handshake completed; the session is live.
            _ = ready_rx => Ok(Arc::new(DiscordSession {
                shared,
                shard_manager,
                closed: CloseOnce::new(),
                done: Mutex::new(Some(done_rx)),
                reason: StdMutex::new(None),
            }) as Arc<dyn Session>),
            // The client ended before ever reaching ready.
            res = &mut done_rx => match res {
                Ok(Ok(())) => Err(ConnectError::Connectivity(
                    "gateway closed before ready".to_string(),
                )),
                Ok(Err(e)) => Err(classify_error(e)),
                Err(_) => Err(ConnectError::Fatal(
                    "gateway task dropped before ready".to_string(),
                )),
            },
        }
    }
}

/// One-shot latch guarding the gateway teardown.
///
/// `first()` is true for exactly one caller; later calls (including
/// concurrent ones) see the session as already closed. This is what makes
/// `Session::close` idempotent over `ShardManager::shutdown_all`.
pub struct CloseOnce(AtomicBool);

impl CloseOnce {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn first(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for CloseOnce {
    fn default() -> Self {
        Self::new()
    }
}

/// A live gateway connection.
pub struct DiscordSession {
    shared: Arc<SessionShared>,
    shard_manager: Arc<ShardManager>,
    closed: CloseOnce,
    done: Mutex<Option<oneshot::Receiver<std::result::Result<(), serenity::Error>>>>,
    reason: StdMutex<Option<DisconnectReason>>,
}

#[async_trait]
impl Session for DiscordSession {
    async fn wait_disconnected(&self) -> DisconnectReason {
        let mut done = self.done.lock().await;
        if let Some(rx) = done.take() {
            let reason = match rx.await {
                Ok(Ok(())) => DisconnectReason::Closed,
                Ok(Err(e)) => {
                    if self.closed.is_closed() {
                        DisconnectReason::Closed
                    } else {
                        DisconnectReason::Errored(e.to_string())
                    }
                }
                Err(_) => DisconnectReason::Closed,
            };
            *self.reason.lock().unwrap_or_else(|p| p.into_inner()) = Some(reason.clone());
            return reason;
        }
        self.reason
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .unwrap_or(DisconnectReason::Closed)
    }

    async fn close(&self) {
        if self.closed.first() {
            self.shard_manager.shutdown_all().await;
        }
    }

    async fn update_presence(&self, text: &str) -> Result<()> {
        let ctx = self.shared.ctx.lock().await;
        let Some(ctx) = ctx.as_ref() else {
            return Err(Error::Session("gateway context not available".to_string()));
        };
        ctx.set_presence(Some(ActivityData::playing(text)), OnlineStatus::Online);
        Ok(())
    }

    async fn scope(&self) -> ScopeSnapshot {
        let ctx = self.shared.ctx.lock().await;
        match ctx.as_ref() {
            Some(ctx) => handlers::snapshot_scope(&ctx.cache),
            None => ScopeSnapshot::default(),
        }
    }
}

/// Map a serenity error into the supervisor's connect taxonomy.
pub fn classify_error(e: serenity::Error) -> ConnectError {
    use serenity::gateway::GatewayError;
    use serenity::http::HttpError;

    match e {
        serenity::Error::Gateway(GatewayError::InvalidAuthentication) => ConnectError::AuthFailed,
        serenity::Error::Gateway(GatewayError::InvalidGatewayIntents)
        | serenity::Error::Gateway(GatewayError::DisallowedGatewayIntents) => {
            ConnectError::Fatal(format!("gateway configuration rejected: {e}"))
        }
        serenity::Error::Gateway(other) => ConnectError::Connectivity(other.to_string()),
        serenity::Error::Tungstenite(ws) => ConnectError::Connectivity(ws.to_string()),
        serenity::Error::Io(io) => ConnectError::Connectivity(io.to_string()),
        serenity::Error::Http(HttpError::UnsuccessfulRequest(resp)) => {
            let status = resp.status_code;
            if status.as_u16() == 429 {
                ConnectError::RateLimited { retry_after: None }
            } else if status.as_u16() == 401 || status.as_u16() == 403 {
                ConnectError::AuthFailed
            } else if status.is_server_error() {
                ConnectError::Connectivity(format!("discord api returned {status}"))
            } else {
                ConnectError::Fatal(format!("discord api returned {status}"))
            }
        }
        serenity::Error::Http(other) => ConnectError::Connectivity(other.to_string()),
        other => ConnectError::Fatal(other.to_string()),
    }
}

/// Process-wide guard for the command handler set.
///
/// The handlers themselves are installed per connection through the event
/// handler; registering twice in one process is reported as a duplicate so
/// the supervisor can log it and move on.
pub struct SkillCommands {
    registered: AtomicBool,
}

impl SkillCommands {
    pub fn new() -> Self {
        Self {
            registered: AtomicBool::new(false),
        }
    }
}

impl Default for SkillCommands {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandSurface for SkillCommands {
    async fn register(&self) -> std::result::Result<(), RegisterError> {
        if self.registered.swap(true, Ordering::SeqCst) {
            return Err(RegisterError::DuplicateInitialization(
                "skill command set already loaded".to_string(),
            ));
        }
        println!("[DISCORD] Skill command set registered");
        Ok(())
    }
}
