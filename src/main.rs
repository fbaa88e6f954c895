//! rtchat CLI
//!
//! Terminal front end for the chat core, running against the in-process
//! identity service and store:
//! - `chat`: interactive session; each input line is sent as a message
//! - `config`: print or write the default config file

use clap::{Parser, Subcommand};
use rtchat::{
    generate_default_config, render_feed, ChatSession, Composer, Config, LoggingConfig,
    MemoryIdentityService, MemoryStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Input line that ends the chat
const QUIT_COMMAND: &str = "/quit";

#[derive(Parser)]
#[command(name = "rtchat")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Real-time chat client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: searched in the user config dir, then ./config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Application id, overrides the config file
    #[arg(long, global = true)]
    pub app_id: Option<String>,

    /// Credential token, overrides the config file
    #[arg(long, global = true)]
    pub token: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat session
    Chat {
        /// User id the credential token signs in as
        #[arg(long, default_value = "local-user")]
        user: String,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)?;
                    println!("Config written to {:?}", path);
                }
                None => print!("{}", content),
            }
            Ok(())
        }
        Commands::Chat { user } => {
            let mut config = match &cli.config {
                Some(path) => Config::load_with_env(path)?,
                None => Config::load_default(),
            };
            if let Some(app_id) = cli.app_id {
                config.app.app_id = app_id;
            }
            if let Some(token) = cli.token {
                config.app.initial_auth_token = Some(token);
            }

            init_logging(&config.logging);
            run_chat(config, user).await
        }
    }
}

fn init_logging(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("rtchat={}", config.level).into());
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so they don't interleave with the feed
    if config.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run_chat(config: Config, user: String) -> anyhow::Result<()> {
    tracing::info!("rtchat v{}", env!("CARGO_PKG_VERSION"));

    let mut identity = MemoryIdentityService::new();
    if let Some(token) = config.app.initial_auth_token.as_deref() {
        identity = identity.grant_token(token, user);
    }

    let session = ChatSession::start(&config, Arc::new(identity), Arc::new(MemoryStore::new()));

    let me = match session.wait_ready().await {
        Ok(me) => me,
        Err(e) => {
            session.shutdown().await;
            return Err(e.into());
        }
    };

    println!("Real-time Chat");
    println!("Your User ID: {}", me.id);
    println!("Type a message and press enter; {} to leave.", QUIT_COMMAND);

    let mut feed = session.watch_feed();
    let state = session.watch_state();
    let printer = tokio::spawn(async move {
        while feed.changed().await.is_ok() {
            let view = feed.borrow_and_update().clone();
            let current_id = state.borrow().identity().map(|i| i.id.clone());

            println!("{}", "-".repeat(60));
            for line in render_feed(&view, current_id.as_deref()) {
                println!("{}", line);
            }
        }
    });

    let mut composer = Composer::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim() == QUIT_COMMAND {
            break;
        }

        composer.set_draft(line);
        if !composer.can_submit(session.is_ready()) {
            continue;
        }

        if let Err(e) = composer.submit(&session).await {
            eprintln!("Message not sent: {} (draft kept: {:?})", e, composer.draft());
        }
    }

    session.shutdown().await;
    let _ = printer.await;

    tracing::info!("rtchat shutdown complete");
    Ok(())
}
