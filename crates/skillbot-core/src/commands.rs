use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{GuildInfo, ScopeSnapshot, UserId};

/// Failure from the command-registration layer.
#[derive(Clone, Debug, thiserror::Error)]
pub enum RegisterError {
    /// The handler set was already installed for this process. The supervisor
    /// logs this and proceeds with the connection attempt.
    #[error("command surface already initialized: {0}")]
    DuplicateInitialization(String),

    #[error("command registration failed: {0}")]
    Failed(String),
}

/// Registration seam invoked once per connection attempt.
#[async_trait]
pub trait CommandSurface: Send + Sync {
    async fn register(&self) -> Result<(), RegisterError>;
}

pub const DENIAL_TEXT: &str = "This command is for administrators only.";

/// Outcome of the admin server-list command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandReply {
    /// Caller is not the configured administrator. The adapter deletes the
    /// sent message after the delay.
    Denied {
        text: String,
        delete_after: Duration,
    },
    /// Paginated listing; every chunk stays within the transport size
    /// ceiling, with the totals header in the first chunk.
    Chunks(Vec<String>),
}

/// Build the `-s` server listing, gated on the administrator id.
pub fn admin_server_list(
    caller: UserId,
    admin_user_id: UserId,
    scope: &ScopeSnapshot,
    chunk_limit: usize,
    delete_after: Duration,
) -> CommandReply {
    if caller != admin_user_id {
        return CommandReply::Denied {
            text: DENIAL_TEXT.to_string(),
            delete_after,
        };
    }

    let footer = "```";
    let mut header = format!("```\nTotal servers: {}\n", scope.guild_count());
    header.push_str(&format!("Total members: {}\n", scope.total_members()));
    header.push_str(&"=".repeat(40));
    header.push('\n');

    let mut chunks = Vec::new();
    let mut message = header;
    for guild in &scope.guilds {
        let info = format_guild(guild);
        if message.len() + info.len() + footer.len() > chunk_limit {
            chunks.push(format!("{message}{footer}"));
            message = format!("```\n{info}");
        } else {
            message.push_str(&info);
        }
    }
    chunks.push(format!("{message}{footer}"));

    CommandReply::Chunks(chunks)
}

fn format_guild(guild: &GuildInfo) -> String {
    let mut info = format!("Server name: {}\n", guild.name);
    info.push_str(&format!("Server ID: {}\n", guild.id.0));
    info.push_str(&format!("Members: {}\n", guild.member_count));
    info.push_str(&format!("Owner: {}\n", guild.owner));
    info.push_str(&format!(
        "Created: {}\n",
        guild.id.created_at().format("%Y/%m/%d")
    ));
    info.push_str(&"-".repeat(40));
    info.push('\n');
    info
}
