//! sesh-cache demo server — entry point.

use chrono::Utc;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use sesh_cache::{SessionToken, SetCookie, SESSION_COOKIE};
use sesh_cache_server::config::{ConfigOverrides, ServerConfig};
use sesh_cache_server::transport::{AppState, HttpTransport};

#[derive(Parser)]
#[command(
    name = "sesh-cache-server",
    about = "Demo host for session-scoped query caching",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    /// Also reads from SESH_LOG env var.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default).
    Serve {
        /// Listen address (host:port). Also reads from SESH_ADDR.
        #[arg(long)]
        addr: Option<String>,

        /// Host cache revalidation window in seconds. Also reads from
        /// SESH_REVALIDATE_SECS.
        #[arg(long)]
        revalidate_secs: Option<u64>,

        /// Simulated user directory latency in milliseconds. Also reads from
        /// SESH_LOOKUP_DELAY_MS.
        #[arg(long)]
        lookup_delay_ms: Option<u64>,
    },

    /// Mint a session token and print its Set-Cookie line.
    Token {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print server routes and cookie settings as JSON.
    Info,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   sesh-cache-server completions bash > ~/.local/share/bash-completion/completions/sesh-cache-server
    ///   sesh-cache-server completions zsh > ~/.zfunc/_sesh-cache-server
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Commands::Serve {
        addr: None,
        revalidate_secs: None,
        lookup_delay_ms: None,
    });

    let mut overrides = ConfigOverrides {
        log_level: cli.log_level,
        ..Default::default()
    };
    if let Commands::Serve {
        addr,
        revalidate_secs,
        lookup_delay_ms,
    } = &command
    {
        overrides.addr = addr.clone();
        overrides.revalidate_secs = *revalidate_secs;
        overrides.lookup_delay_ms = *lookup_delay_ms;
    }
    let config = ServerConfig::resolve(&overrides)?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match command {
        Commands::Serve { .. } => {
            tracing::info!("sesh-cache demo server");
            tracing::info!(
                "Revalidate: {}s, lookup delay: {}ms",
                config.revalidate.as_secs(),
                config.lookup_delay.as_millis()
            );
            let transport = HttpTransport::new(AppState::from_config(&config));
            transport.run(&config.addr).await?;
        }

        Commands::Token { json } => {
            let token = SessionToken::generate();
            let cookie = SetCookie::session(&token, Utc::now());
            if json {
                let out = serde_json::json!({
                    "token": token,
                    "set_cookie": cookie.to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("Set-Cookie: {cookie}");
            }
        }

        Commands::Info => {
            let info = serde_json::json!({
                "server": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION"),
                },
                "addr": config.addr,
                "cookie": SESSION_COOKIE,
                "revalidate_secs": config.revalidate.as_secs(),
                "routes": [
                    "GET /users/:id",
                    "GET /users/:id/shared",
                    "GET /users/:id/direct",
                    "GET /api/users/:id",
                    "POST /revalidate/:tag",
                    "GET /health",
                ],
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "sesh-cache-server", &mut std::io::stdout());
        }
    }

    Ok(())
}
