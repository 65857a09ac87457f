use anyhow::Context;
use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_DB: &str = "salesdesk.db";
const DEFAULT_MAX_UPLOAD_MB: usize = 25;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub db_path: PathBuf,
    /// TOML file overriding the built-in alias and header tables.
    pub aliases_path: Option<PathBuf>,
    /// `code,name,branch,region` CSV.
    pub executives_path: Option<PathBuf>,
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind = get("SALESDESK_BIND")
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .parse()
            .context("SALESDESK_BIND is not a socket address")?;

        let max_upload_mb = match get("SALESDESK_MAX_UPLOAD_MB") {
            Some(v) => v
                .trim()
                .parse::<usize>()
                .context("SALESDESK_MAX_UPLOAD_MB is not a whole number")?,
            None => DEFAULT_MAX_UPLOAD_MB,
        };

        Ok(Self {
            bind,
            db_path: get("SALESDESK_DB").map_or_else(|| PathBuf::from(DEFAULT_DB), PathBuf::from),
            aliases_path: get("SALESDESK_ALIASES").map(PathBuf::from),
            executives_path: get("SALESDESK_EXECUTIVES").map(PathBuf::from),
            max_upload_bytes: max_upload_mb * 1024 * 1024,
        })
    }
}
