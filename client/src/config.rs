use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, time::Duration};
use tracing::warn;
use url::Url;

const PLACEHOLDER_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Client configuration. Missing fields take their defaults, so a config
/// file only needs to name what differs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Match API root.
    pub api_url: String,
    /// Real-time channel endpoint. Must speak `{"event", "data"}` JSON text
    /// frames over a plain websocket.
    pub realtime_url: String,
    pub rpc_url: String,
    pub chain_id: u64,

    // Contract addresses
    pub stable_token: String,
    pub game_token: String,
    pub token_store: String,
    pub match_contract: String,

    pub discovery_interval_secs: u64,

    /// Signing key for the EVM wallet. Only ever read from the environment.
    #[serde(skip)]
    pub private_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "https://trix-system.onrender.com/api/".to_string(),
            realtime_url: "ws://127.0.0.1:3001/ws".to_string(),
            rpc_url: "http://127.0.0.1:8545".to_string(),
            chain_id: 31337,
            stable_token: PLACEHOLDER_ADDRESS.to_string(),
            game_token: PLACEHOLDER_ADDRESS.to_string(),
            token_store: PLACEHOLDER_ADDRESS.to_string(),
            match_contract: PLACEHOLDER_ADDRESS.to_string(),
            discovery_interval_secs: 5,
            private_key: None,
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

impl Config {
    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path)
            .map_err(|err| Error::Config(format!("failed to read {}: {err}", path.display())))?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Defaults overridden by `TRIX_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    pub fn with_env(mut self) -> Self {
        if let Some(value) = env_string("TRIX_API_URL") {
            self.api_url = value;
        }
        if let Some(value) = env_string("TRIX_REALTIME_URL") {
            self.realtime_url = value;
        }
        if let Some(value) = env_string("TRIX_RPC_URL") {
            self.rpc_url = value;
        }
        if let Some(value) = env_u64("TRIX_CHAIN_ID") {
            self.chain_id = value;
        }
        if let Some(value) = env_string("TRIX_STABLE_TOKEN") {
            self.stable_token = value;
        }
        if let Some(value) = env_string("TRIX_GAME_TOKEN") {
            self.game_token = value;
        }
        if let Some(value) = env_string("TRIX_TOKEN_STORE") {
            self.token_store = value;
        }
        if let Some(value) = env_string("TRIX_MATCH_CONTRACT") {
            self.match_contract = value;
        }
        if let Some(value) = env_u64("TRIX_DISCOVERY_INTERVAL_SECS") {
            self.discovery_interval_secs = value;
        }
        if let Some(value) = env_string("TRIX_PRIVATE_KEY") {
            self.private_key = Some(value);
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        check_scheme(&self.api_url, &["http", "https"])?;
        check_scheme(&self.rpc_url, &["http", "https"])?;
        check_scheme(&self.realtime_url, &["ws", "wss"])?;
        if self.discovery_interval_secs == 0 {
            return Err(Error::Config("discovery_interval_secs must be > 0".into()));
        }

        for (name, address) in [
            ("stable token", &self.stable_token),
            ("game token", &self.game_token),
            ("token store", &self.token_store),
            ("match contract", &self.match_contract),
        ] {
            if address.eq_ignore_ascii_case(PLACEHOLDER_ADDRESS) {
                warn!("Using placeholder {name} address");
            }
        }
        Ok(())
    }

    /// Discovery poll period, never shorter than one second.
    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_secs.max(1))
    }
}

fn check_scheme(raw: &str, allowed: &[&str]) -> Result<()> {
    let url = Url::parse(raw)?;
    if !allowed.contains(&url.scheme()) {
        return Err(Error::InvalidScheme(url.scheme().to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.discovery_interval(), Duration::from_secs(5));
        assert!(config.api_url.ends_with("/api/"));
        assert_eq!(Url::parse(&config.realtime_url).unwrap().scheme(), "ws");
    }

    #[test]
    fn test_discovery_interval_floor() {
        let config = Config {
            discovery_interval_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.discovery_interval(), Duration::from_secs(1));
        let config = Config {
            discovery_interval_secs: 30,
            ..Config::default()
        };
        assert_eq!(config.discovery_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_file() {
        let dir = env::temp_dir().join(format!("trix-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        fs::write(
            &path,
            r#"{"api_url": "http://localhost:3000/api", "chain_id": 8453, "private_key": "ignored"}"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.api_url, "http://localhost:3000/api");
        assert_eq!(config.chain_id, 8453);
        assert_eq!(config.realtime_url, Config::default().realtime_url);
        assert!(config.private_key.is_none());

        fs::remove_dir_all(&dir).unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        let config = Config {
            realtime_url: "https://example.com/socket".into(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidScheme(ref s)) if s == "https"));

        let config = Config {
            api_url: "localhost:3000".into(),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            discovery_interval_secs: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
