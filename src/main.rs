//! psbot - chat bot for Showdown-style servers.

use psbot::commands;
use psbot::config::{Config, LogFormat, RoomsFile, validate};
use psbot::network::{ConnectOptions, ReconnectPolicy};
use psbot::{Bot, BotSettings};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = Config::load(&config_path)
        .map_err(|e| anyhow::anyhow!("failed to load {config_path}: {e}"))?;

    // Initialize tracing; RUST_LOG overrides the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match config.log.format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Text => subscriber.init(),
    }

    if let Err(errors) = validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("{} configuration error(s) in {config_path}", errors.len());
    }

    let options = ConnectOptions::from_config(&config.server);
    info!(
        name = %config.bot.name,
        url = %options.url,
        rooms = ?config.bot.rooms,
        "Starting psbot"
    );

    let rooms_file = config
        .bot
        .rooms_file
        .clone()
        .map(RoomsFile::new)
        .unwrap_or_else(|| RoomsFile::beside(&config_path));
    info!(path = %rooms_file.path().display(), "Saved rooms file");
    let bot = Bot::builder(BotSettings::from_config(&config))
        .rooms_file(rooms_file)
        .build();
    commands::builtin::register(&bot);

    // Ctrl-C stops the supervisor
    let shutdown = bot.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C");
                shutdown.shutdown();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    let policy = ReconnectPolicy::new(config.server.reconnect_delay());
    bot.supervise(options, policy).await?;

    info!("Stopped");
    Ok(())
}
