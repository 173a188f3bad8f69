/// Core error type for the bot.
///
/// The adapter crate maps its client-library errors into this type (or into
/// the connect-time taxonomy in [`crate::session`]) so the core can handle
/// failures without inspecting error text.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("credential error: {0}")]
    Credential(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
