use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use stellantis_oauth::{
    ConfigProvider, ConfigSource, HttpLogin, LoginAutomator, LoginMode, OAuthClient,
    OAuthClientConfig, OAuthError, OAuthRequest, OAuthResponse, Progress, ServerConfig,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(
    name = "stellantis-oauth",
    version,
    about = "Retrieve OAuth authorization codes from Stellantis brand portals."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the web form and the /oauth endpoint.
    Serve {
        #[arg(long, env = "HTTP_ADDRESS", default_value = "0.0.0.0")]
        address: String,

        #[arg(long, env = "PORT", default_value_t = 8080)]
        port: u16,

        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Run a single login and print the result as JSON.
    Login {
        #[arg(long)]
        brand: String,

        #[arg(long)]
        country: String,

        #[arg(long)]
        email: String,

        #[arg(long, env = "OAUTH_PASSWORD", hide_env_values = true)]
        password: String,

        #[command(flatten)]
        engine: EngineArgs,
    },
}

#[derive(Debug, Args)]
struct EngineArgs {
    /// Login automation backend (browser or http).
    #[arg(long, env = "LOGIN_MODE", default_value_t = LoginMode::default())]
    login_mode: LoginMode,

    /// Upper bound for a single login, in seconds.
    #[arg(long, env = "OAUTH_TIMEOUT_SECS", default_value_t = 120)]
    timeout_secs: u64,

    /// Fetch brand configs from this URL instead of the bundled copy.
    #[arg(long, env = "CONFIGS_URL")]
    configs_url: Option<String>,

    /// How long a fetched config document stays cached, in seconds.
    #[arg(long, env = "CONFIGS_TTL_SECS", default_value_t = 3600)]
    configs_ttl_secs: u64,

    /// Chromium executable; detected automatically when unset.
    #[cfg(feature = "browser")]
    #[arg(long, env = "CHROME_PATH")]
    chrome_path: Option<std::path::PathBuf>,
}

impl EngineArgs {
    fn client(&self) -> OAuthClient {
        let configs = match &self.configs_url {
            Some(url) => ConfigProvider::new(
                ConfigSource::remote(url.clone())
                    .with_ttl(Duration::from_secs(self.configs_ttl_secs)),
            ),
            None => ConfigProvider::embedded(),
        };
        let config = OAuthClientConfig::new().with_timeout(Duration::from_secs(self.timeout_secs));
        OAuthClient::with_shared(Arc::new(configs), self.automator(), config)
    }

    fn automator(&self) -> Arc<dyn LoginAutomator> {
        match self.login_mode {
            #[cfg(feature = "browser")]
            LoginMode::Browser => Arc::new(
                stellantis_oauth::BrowserLogin::new().with_executable(self.chrome_path.clone()),
            ),
            LoginMode::Http => Arc::new(HttpLogin::new()),
        }
    }
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), OAuthError> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    match cli.command {
        Command::Serve {
            address,
            port,
            engine,
        } => {
            info!(
                version = env!("CARGO_PKG_VERSION"),
                login_mode = %engine.login_mode,
                "stellantis-oauth starting"
            );
            stellantis_oauth::serve(ServerConfig::new(address, port), engine.client()).await
        }
        Command::Login {
            brand,
            country,
            email,
            password,
            engine,
        } => {
            let request = OAuthRequest {
                brand,
                country,
                email,
                password,
            };
            run_login(engine.client(), request).await
        }
    }
}

async fn run_login(client: OAuthClient, request: OAuthRequest) -> Result<(), OAuthError> {
    let progress = Progress::new(|step| eprintln!("{step}"));
    let (response, failed) = match client.authorize(&request, &progress).await {
        Ok(code) => (OAuthResponse::success(code), false),
        Err(err) => {
            if let Ok(snapshot) = client.configs().snapshot().await {
                if let Some(hint) = snapshot.hint(&err) {
                    eprintln!("{hint}");
                }
            }
            (OAuthResponse::error(err.to_string()), true)
        }
    };

    println!("{}", serde_json::to_string_pretty(&response)?);
    if failed {
        std::process::exit(1);
    }
    Ok(())
}
