use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Public base URL for media links (e.g., "https://videos.example.com").
    /// Defaults to the bind address when not set.
    pub public_base_url: Option<String>,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("tubecast.db")
    }

    #[must_use]
    pub fn media_base_url(&self) -> String {
        self.public_base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.host, self.port))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            public_base_url: None,
        }
    }
}

/// Credential signing configuration. Secrets come from the environment
/// so they never land on the command line or in shell history.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl AuthConfig {
    pub fn from_env() -> Self {
        Self {
            access_secret: std::env::var("TUBECAST_ACCESS_SECRET")
                .unwrap_or_else(|_| "tubecast-dev-access-secret".to_string()),
            refresh_secret: std::env::var("TUBECAST_REFRESH_SECRET")
                .unwrap_or_else(|_| "tubecast-dev-refresh-secret".to_string()),
            access_ttl: Duration::days(1),
            refresh_ttl: Duration::days(10),
        }
    }
}
