use std::process::ExitCode;

use tokio_util::sync::CancellationToken;

use skillbot_core::{
    botlog::BotLog,
    config::Settings,
    credentials::{FileCredentials, StdinPrompt},
    supervisor::Supervisor,
    tasks::TaskRunner,
};
use skillbot_discord::{DiscordConnector, SkillCommands};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = skillbot_core::logging::init("skillbot") {
        eprintln!("logging init failed: {e}");
        return ExitCode::from(1);
    }

    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(1);
        }
    };

    let shutdown = CancellationToken::new();
    spawn_signal_listener(shutdown.clone());

    let log = BotLog::new(settings.log_path.clone());
    let credentials = FileCredentials::new(
        settings.env_path.clone(),
        settings.admin_user_id,
        Box::new(StdinPrompt),
    );
    let connector = DiscordConnector::new(&settings, log.clone());
    let commands = SkillCommands::new();
    let tasks = TaskRunner::new(&settings, log);

    let supervisor = Supervisor::new(&settings, shutdown, tasks);
    let status = supervisor.run(&credentials, &connector, &commands).await;

    println!("Bot has been shut down.");
    ExitCode::from(status.code())
}

/// First SIGINT/SIGTERM (or ctrl-c elsewhere) cancels the token; the
/// supervisor drains from there.
fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        println!("[SIGNAL] Termination signal received");
        shutdown.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("[SIGNAL] Could not install SIGINT handler: {e}");
            return std::future::pending().await;
        }
    };
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("[SIGNAL] Could not install SIGTERM handler: {e}");
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("[SIGNAL] Could not install ctrl-c handler: {e}");
        std::future::pending::<()>().await;
    }
}
