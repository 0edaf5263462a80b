use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueHint};
use team_dashboard::config::{
    AuthenticatorConfig, DEFAULT_CACHE_TTL_SECS, DEFAULT_HISTOGRAM_COLUMN,
    DEFAULT_REMOTE_TIMEOUT_SECS, Secrets, Settings,
};
use team_dashboard::{app, login};

#[derive(Parser, Debug)]
#[command(author, version, about = "Athlete tracking dashboards", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the dashboard web server
    Serve(ServeArgs),
    /// Print an argon2 hash for the `password` field of the authenticator config
    Hash {
        password: String,
    },
}

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "DASHBOARD_BIND", default_value = "127.0.0.1:8501")]
    bind: SocketAddr,

    /// Secrets file with passwords, team mappings and connections
    #[arg(long, env = "DASHBOARD_SECRETS", default_value = ".streamlit/secrets.toml", value_hint = ValueHint::FilePath)]
    secrets: PathBuf,

    /// Authenticator config with hashed credentials and cookie settings
    #[arg(long, env = "DASHBOARD_AUTH_CONFIG", value_hint = ValueHint::FilePath)]
    auth_config: Option<PathBuf>,

    /// Data file for teams without a connection
    #[arg(long, env = "DASHBOARD_DATA", value_hint = ValueHint::FilePath)]
    data: Option<PathBuf>,

    /// CSV shown on the explore page
    #[arg(long, env = "DASHBOARD_EXPLORE_DATA", value_hint = ValueHint::FilePath)]
    explore_data: Option<PathBuf>,

    /// Column histogrammed on the explore page
    #[arg(long, default_value = DEFAULT_HISTOGRAM_COLUMN)]
    histogram_column: String,

    /// Seconds before cached data is reloaded
    #[arg(long, env = "DASHBOARD_CACHE_TTL", default_value_t = DEFAULT_CACHE_TTL_SECS)]
    cache_ttl: u64,

    /// Seconds before a remote spreadsheet download is abandoned
    #[arg(long, env = "DASHBOARD_REMOTE_TIMEOUT", default_value_t = DEFAULT_REMOTE_TIMEOUT_SECS)]
    remote_timeout: u64,
}

impl ServeArgs {
    fn into_settings(self) -> team_dashboard::Result<Settings> {
        let secrets = if self.secrets.exists() || self.auth_config.is_none() {
            Secrets::load(&self.secrets)?
        } else {
            Secrets::default()
        };

        let mut settings = Settings::new(self.bind, secrets);
        settings.authenticator = match &self.auth_config {
            Some(path) => Some(AuthenticatorConfig::load(path)?),
            None => None,
        };
        settings.default_data = self.data;
        settings.explore_data = self.explore_data;
        settings.histogram_column = self.histogram_column;
        settings.cache_ttl = Duration::from_secs(self.cache_ttl);
        settings.remote_timeout = Duration::from_secs(self.remote_timeout);
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Command::Serve(args) => {
            let settings = args.into_settings()?;
            app::run(settings).await?;
        }
        Command::Hash { password } => {
            println!("{}", login::hash_password(&password)?);
        }
    }

    Ok(())
}
