use chrono::{DateTime, TimeZone, Utc};

/// Discord user id (snowflake).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub u64);

/// Discord guild id (snowflake).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GuildId(pub u64);

/// Discord epoch (2015-01-01T00:00:00Z) in Unix milliseconds.
const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;

impl GuildId {
    /// Creation time encoded in the snowflake's timestamp bits.
    pub fn created_at(&self) -> DateTime<Utc> {
        let ms = (self.0 >> 22) as i64 + DISCORD_EPOCH_MS;
        Utc.timestamp_millis_opt(ms)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// A guild visible to the live session.
#[derive(Clone, Debug)]
pub struct GuildInfo {
    pub id: GuildId,
    pub name: String,
    pub member_count: u64,
    pub owner: String,
}

/// Snapshot of the session's visible scope at one instant.
#[derive(Clone, Debug, Default)]
pub struct ScopeSnapshot {
    pub guilds: Vec<GuildInfo>,
}

impl ScopeSnapshot {
    pub fn guild_count(&self) -> usize {
        self.guilds.len()
    }

    pub fn total_members(&self) -> u64 {
        self.guilds.iter().map(|g| g.member_count).sum()
    }
}
