use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
};

use crate::{errors::Error, Result};

/// Prompt used when no persisted token exists.
pub trait TokenPrompt: Send + Sync {
    fn request_token(&self) -> io::Result<String>;
}

/// Interactive prompt on the controlling terminal.
pub struct StdinPrompt;

impl TokenPrompt for StdinPrompt {
    fn request_token(&self) -> io::Result<String> {
        println!("Discord bot token not found.");
        print!("Enter the Discord bot token: ");
        io::stdout().flush()?;

        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}

/// Source of the session token.
///
/// Never invoked concurrently; the supervisor is the only caller.
pub trait CredentialSource: Send + Sync {
    /// Returns a token, prompting for and persisting a new one when none is
    /// stored.
    fn get(&self) -> Result<String>;

    /// Drops the persisted token so the next `get()` re-prompts.
    fn invalidate(&self) -> Result<()>;
}

/// Token storage backed by a `KEY=value` credential file.
pub struct FileCredentials {
    path: PathBuf,
    admin_user_id: u64,
    prompt: Box<dyn TokenPrompt>,
}

impl FileCredentials {
    pub fn new(path: impl Into<PathBuf>, admin_user_id: u64, prompt: Box<dyn TokenPrompt>) -> Self {
        Self {
            path: path.into(),
            admin_user_id,
            prompt,
        }
    }

    fn stored_token(&self) -> Option<String> {
        let contents = fs::read_to_string(&self.path).ok()?;
        for raw in contents.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((k, v)) = line.split_once('=') else {
                continue;
            };
            if k.trim() == "DISCORD_TOKEN" {
                let v = v.trim();
                if !v.is_empty() {
                    return Some(v.to_string());
                }
            }
        }
        None
    }

    fn persist(&self, token: &str) -> Result<()> {
        let contents = format!(
            "DISCORD_TOKEN={token}\nADMIN_USER_ID={}\n",
            self.admin_user_id
        );
        fs::write(&self.path, contents)?;
        println!("Credential file written to {}", self.path.display());
        Ok(())
    }
}

impl CredentialSource for FileCredentials {
    fn get(&self) -> Result<String> {
        if let Some(token) = self.stored_token() {
            return Ok(token);
        }

        let token = self
            .prompt
            .request_token()
            .map_err(|e| Error::Credential(format!("token prompt failed: {e}")))?;
        if token.trim().is_empty() {
            return Err(Error::Credential("empty token supplied".to_string()));
        }

        self.persist(&token)?;
        Ok(token)
    }

    fn invalidate(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct QueuePrompt {
        tokens: Vec<String>,
        calls: Arc<AtomicUsize>,
    }

    impl TokenPrompt for QueuePrompt {
        fn request_token(&self) -> io::Result<String> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .tokens
                .get(idx)
                .cloned()
                .unwrap_or_else(|| "out-of-tokens".to_string()))
        }
    }

    fn tmp_file(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}.env"))
    }

    #[test]
    fn get_returns_stored_token_without_prompting() {
        let path = tmp_file("skillbot-creds-stored");
        fs::write(&path, "DISCORD_TOKEN=abc123\nADMIN_USER_ID=1\n").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let creds = FileCredentials::new(
            &path,
            1,
            Box::new(QueuePrompt {
                tokens: vec![],
                calls: calls.clone(),
            }),
        );

        assert_eq!(creds.get().unwrap(), "abc123");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn get_prompts_and_persists_with_default_admin() {
        let path = tmp_file("skillbot-creds-prompt");
        let calls = Arc::new(AtomicUsize::new(0));
        let creds = FileCredentials::new(
            &path,
            589736597935620097,
            Box::new(QueuePrompt {
                tokens: vec!["fresh-token".to_string()],
                calls: calls.clone(),
            }),
        );

        assert_eq!(creds.get().unwrap(), "fresh-token");
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("DISCORD_TOKEN=fresh-token"));
        assert!(written.contains("ADMIN_USER_ID=589736597935620097"));

        // Subsequent gets read the persisted copy, no further prompting.
        assert_eq!(creds.get().unwrap(), "fresh-token");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn invalidate_forces_reprompt() {
        let path = tmp_file("skillbot-creds-invalidate");
        let calls = Arc::new(AtomicUsize::new(0));
        let creds = FileCredentials::new(
            &path,
            1,
            Box::new(QueuePrompt {
                tokens: vec!["first".to_string(), "second".to_string()],
                calls: calls.clone(),
            }),
        );

        assert_eq!(creds.get().unwrap(), "first");
        creds.invalidate().unwrap();
        assert!(!path.exists());
        assert_eq!(creds.get().unwrap(), "second");
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn invalidate_without_store_is_a_noop() {
        let path = tmp_file("skillbot-creds-missing");
        let creds = FileCredentials::new(
            &path,
            1,
            Box::new(QueuePrompt {
                tokens: vec![],
                calls: Arc::new(AtomicUsize::new(0)),
            }),
        );
        creds.invalidate().unwrap();
        creds.invalidate().unwrap();
    }
}
