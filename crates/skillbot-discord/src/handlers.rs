//! Gateway event handlers.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serenity::{
    async_trait,
    cache::Cache,
    model::{channel::Message, gateway::Ready},
    prelude::*,
};
use tokio::sync::oneshot;

use skillbot_core::{
    botlog::{BotLog, LogLevel},
    commands::{admin_server_list, CommandReply},
    domain::{GuildId, GuildInfo, ScopeSnapshot, UserId},
};

use crate::SessionShared;

const SERVER_LIST_COMMAND: &str = "-s";

pub struct Handler {
    shared: Arc<SessionShared>,
    ready_tx: StdMutex<Option<oneshot::Sender<()>>>,
    admin_user_id: u64,
    chunk_limit: usize,
    denial_delete_after: Duration,
    log: BotLog,
}

impl Handler {
    pub fn new(
        shared: Arc<SessionShared>,
        ready_tx: oneshot::Sender<()>,
        admin_user_id: u64,
        chunk_limit: usize,
        denial_delete_after: Duration,
        log: BotLog,
    ) -> Self {
        Self {
            shared,
            ready_tx: StdMutex::new(Some(ready_tx)),
            admin_user_id,
            chunk_limit,
            denial_delete_after,
            log,
        }
    }

    fn botlog(&self, level: LogLevel, message: &str) {
        if let Err(e) = self.log.log(level, message) {
            eprintln!("[DISCORD] Command log write failed: {e}");
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        println!("[DISCORD] Logged in as {}", ready.user.name);
        *self.shared.ctx.lock().await = Some(ctx);

        let tx = self
            .ready_tx
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(tx) = tx {
            let _ = tx.send(());
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        if msg.content.trim() != SERVER_LIST_COMMAND {
            return;
        }

        let caller = UserId(msg.author.id.get());
        let scope = snapshot_scope(&ctx.cache);
        let reply = admin_server_list(
            caller,
            UserId(self.admin_user_id),
            &scope,
            self.chunk_limit,
            self.denial_delete_after,
        );

        match reply {
            CommandReply::Denied { text, delete_after } => {
                self.botlog(
                    LogLevel::Warning,
                    &format!("Server list denied for user {}", caller.0),
                );
                match msg.channel_id.say(&ctx.http, text).await {
                    Ok(sent) => {
                        let http = ctx.http.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(delete_after).await;
                            if let Err(e) = sent.delete(&http).await {
                                eprintln!("[DISCORD] Could not delete denial message: {e}");
                            }
                        });
                    }
                    Err(e) => eprintln!("[DISCORD] Could not send denial message: {e}"),
                }
            }
            CommandReply::Chunks(chunks) => {
                self.botlog(
                    LogLevel::Info,
                    &format!(
                        "Server list sent to admin {} ({} servers)",
                        caller.0,
                        scope.guild_count()
                    ),
                );
                for chunk in chunks {
                    if let Err(e) = msg.channel_id.say(&ctx.http, chunk).await {
                        eprintln!("[DISCORD] Could not send server list chunk: {e}");
                        break;
                    }
                }
            }
        }
    }
}

/// Snapshot the guilds visible in the gateway cache.
pub fn snapshot_scope(cache: &Cache) -> ScopeSnapshot {
    let mut guilds = Vec::new();
    for id in cache.guilds() {
        let Some(guild) = cache.guild(id) else {
            continue;
        };
        guilds.push(GuildInfo {
            id: GuildId(id.get()),
            name: guild.name.to_string(),
            member_count: guild.member_count,
            owner: guild.owner_id.get().to_string(),
        });
    }
    ScopeSnapshot { guilds }
}
