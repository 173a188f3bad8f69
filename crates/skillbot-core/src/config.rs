use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::Result;

/// Administrator identity written into a freshly created credential file.
pub const DEFAULT_ADMIN_USER_ID: u64 = 589_736_597_935_620_097;

/// Typed runtime configuration.
///
/// Everything is env-driven with inline defaults; the `.env` file next to the
/// process is loaded first without overriding the existing environment.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Caller id allowed to run the privileged `-s` command.
    pub admin_user_id: u64,
    /// Persisted credential file (`DISCORD_TOKEN` / `ADMIN_USER_ID` lines).
    pub env_path: PathBuf,
    /// Append-only command log, truncated by the log-rotation task.
    pub log_path: PathBuf,

    // Presence
    pub presence_prefix: String,
    pub presence_interval: Duration,
    pub log_reset_interval: Duration,

    // Connect retry policy
    pub max_attempts: u32,
    pub base_delay: Duration,

    // Command surface limits
    pub chunk_limit: usize,
    pub denial_delete_after: Duration,

    // Shutdown
    pub task_stop_grace: Duration,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let env_path = PathBuf::from(env_str("ENV_FILE").unwrap_or(".env".to_string()));
        load_dotenv_if_present(&env_path);

        let admin_user_id = env_u64("ADMIN_USER_ID").unwrap_or(DEFAULT_ADMIN_USER_ID);

        let log_path =
            PathBuf::from(env_str("BOT_LOG_FILE").unwrap_or("bot_commands.log".to_string()));

        let presence_prefix = env_str("PRESENCE_PREFIX").unwrap_or("/help_toram".to_string());
        let presence_interval =
            Duration::from_secs(env_u64("PRESENCE_INTERVAL_SECS").unwrap_or(5 * 60));
        let log_reset_interval =
            Duration::from_secs(env_u64("LOG_RESET_INTERVAL_SECS").unwrap_or(500 * 60));

        let max_attempts = env_u32("MAX_CONNECT_ATTEMPTS").unwrap_or(5);
        let base_delay = Duration::from_secs(env_u64("CONNECT_BASE_DELAY_SECS").unwrap_or(5));

        // 1900 leaves headroom under Discord's 2000-character message ceiling.
        let chunk_limit = env_usize("MESSAGE_CHUNK_LIMIT").unwrap_or(1900);
        let denial_delete_after =
            Duration::from_secs(env_u64("DENIAL_DELETE_AFTER_SECS").unwrap_or(10));

        let task_stop_grace = Duration::from_secs(env_u64("TASK_STOP_GRACE_SECS").unwrap_or(5));

        Ok(Self {
            admin_user_id,
            env_path,
            log_path,
            presence_prefix,
            presence_interval,
            log_reset_interval,
            max_attempts,
            base_delay,
            chunk_limit,
            denial_delete_after,
            task_stop_grace,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_file(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_nanos();
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}"))
    }

    #[test]
    fn dotenv_sets_missing_keys_and_strips_quotes() {
        let path = tmp_file("skillbot-dotenv-test");
        fs::write(
            &path,
            "# comment\nSKILLBOT_TEST_A=\"hello\"\nSKILLBOT_TEST_B=world\n",
        )
        .unwrap();

        load_dotenv_if_present(&path);
        assert_eq!(env::var("SKILLBOT_TEST_A").unwrap(), "hello");
        assert_eq!(env::var("SKILLBOT_TEST_B").unwrap(), "world");

        let _ = fs::remove_file(&path);
        env::remove_var("SKILLBOT_TEST_A");
        env::remove_var("SKILLBOT_TEST_B");
    }

    #[test]
    fn dotenv_does_not_override_existing_env() {
        let path = tmp_file("skillbot-dotenv-override-test");
        env::set_var("SKILLBOT_TEST_C", "kept");
        fs::write(&path, "SKILLBOT_TEST_C=replaced\n").unwrap();

        load_dotenv_if_present(&path);
        assert_eq!(env::var("SKILLBOT_TEST_C").unwrap(), "kept");

        let _ = fs::remove_file(&path);
        env::remove_var("SKILLBOT_TEST_C");
    }
}
