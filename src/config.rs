// Secrets (TOML), authenticator config (YAML) and runtime settings.

use crate::error::{DashboardError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// secrets.toml
// ---------------------------------------------------------------------------

/// Contents of the secrets file
///
/// ```toml
/// [passwords]
/// sherbrooke = "..."
///
/// [teams]
/// sherbrooke = "sher"
///
/// [connections.sher]
/// spreadsheet = "https://docs.google.com/spreadsheets/d/<id>/edit"
/// worksheet = "0"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub passwords: HashMap<String, String>,
    /// Authenticated username → connection name.
    #[serde(default)]
    pub teams: HashMap<String, String>,
    #[serde(default)]
    pub connections: HashMap<String, Connection>,
}

/// A named data source: either a local file or a remote spreadsheet.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Connection {
    pub path: Option<PathBuf>,
    pub spreadsheet: Option<String>,
    pub worksheet: Option<String>,
}

impl Secrets {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = read(path)?;
        Self::parse(&contents, path)
    }

    pub fn parse(contents: &str, path: &Path) -> Result<Self> {
        toml::from_str(contents).map_err(|e| DashboardError::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// config.yaml (hashed credentials + cookie settings)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AuthenticatorConfig {
    pub credentials: CredentialsSection,
    pub cookie: CookieSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsSection {
    pub usernames: HashMap<String, UserEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserEntry {
    pub name: String,
    #[serde(default)]
    pub email: String,
    /// argon2 PHC string or bcrypt hash.
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CookieSection {
    pub name: String,
    pub key: String,
    pub expiry_days: f64,
}

/// Longest cookie lifetime accepted from the config, in days.
pub const MAX_EXPIRY_DAYS: f64 = 36_500.0;

impl CookieSection {
    /// Cookie lifetime; `None` for zero, negative or unrepresentable values.
    pub fn expiry(&self) -> Option<Duration> {
        if self.expiry_days > 0.0 && self.expiry_days <= MAX_EXPIRY_DAYS {
            Duration::try_from_secs_f64(self.expiry_days * 24.0 * 60.0 * 60.0).ok()
        } else {
            None
        }
    }
}

impl AuthenticatorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = read(path)?;
        Self::parse(&contents, path)
    }

    pub fn parse(contents: &str, path: &Path) -> Result<Self> {
        let config: AuthenticatorConfig =
            serde_yaml::from_str(contents).map_err(|e| DashboardError::Config {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        if config.cookie.name.trim().is_empty() {
            return Err(DashboardError::Config {
                path: path.display().to_string(),
                message: "cookie.name must not be empty".to_string(),
            });
        }
        if config.cookie.expiry_days > 0.0 && config.cookie.expiry().is_none() {
            return Err(DashboardError::Config {
                path: path.display().to_string(),
                message: format!(
                    "cookie.expiry_days must be at most {}, got {}",
                    MAX_EXPIRY_DAYS, config.cookie.expiry_days
                ),
            });
        }
        Ok(config)
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| DashboardError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

// ---------------------------------------------------------------------------
// Data source selection
// ---------------------------------------------------------------------------

/// Where a team's table comes from
#[derive(Debug, Clone, PartialEq)]
pub enum DataSource {
    File(PathBuf),
    Remote { url: String },
}

impl DataSource {
    /// Cache key for this source.
    pub fn key(&self) -> String {
        match self {
            DataSource::File(path) => format!("file:{}", path.display()),
            DataSource::Remote { url } => format!("remote:{}", url),
        }
    }
}

impl Connection {
    fn source(&self, name: &str) -> Result<DataSource> {
        match (&self.path, &self.spreadsheet) {
            (Some(path), _) => Ok(DataSource::File(path.clone())),
            (None, Some(spreadsheet)) => Ok(DataSource::Remote {
                url: crate::loader::export_url(spreadsheet, self.worksheet.as_deref()),
            }),
            (None, None) => Err(DashboardError::Config {
                path: format!("connections.{}", name),
                message: "needs either `path` or `spreadsheet`".to_string(),
            }),
        }
    }
}

/// Pick the data source for an authenticated team
///
/// The team maps to a connection through `[teams]`; a team without a
/// mapping falls back to `default`, if one is configured.
pub fn source_for_team(secrets: &Secrets, team: &str, default: Option<&Path>) -> Result<DataSource> {
    if let Some(name) = secrets.teams.get(team) {
        let connection = secrets.connections.get(name).ok_or_else(|| DashboardError::Config {
            path: format!("teams.{}", team),
            message: format!("connection `{}` is not defined", name),
        })?;
        return connection.source(name);
    }

    match default {
        Some(path) => Ok(DataSource::File(path.to_path_buf())),
        None => Err(DashboardError::UnknownTeam(team.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Runtime settings
// ---------------------------------------------------------------------------

pub const DEFAULT_CACHE_TTL_SECS: u64 = 600;
pub const DEFAULT_HISTOGRAM_COLUMN: &str = "CVE";
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 30;

/// Everything the server needs to start, assembled from CLI flags.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind: SocketAddr,
    pub secrets: Secrets,
    pub authenticator: Option<AuthenticatorConfig>,
    pub default_data: Option<PathBuf>,
    pub explore_data: Option<PathBuf>,
    pub histogram_column: String,
    pub cache_ttl: Duration,
    /// Upper bound on a remote spreadsheet download.
    pub remote_timeout: Duration,
}

impl Settings {
    pub fn new(bind: SocketAddr, secrets: Secrets) -> Self {
        Settings {
            bind,
            secrets,
            authenticator: None,
            default_data: None,
            explore_data: None,
            histogram_column: DEFAULT_HISTOGRAM_COLUMN.to_string(),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            remote_timeout: Duration::from_secs(DEFAULT_REMOTE_TIMEOUT_SECS),
        }
    }
}
