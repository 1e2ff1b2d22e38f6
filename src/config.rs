use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "foro", about = "A discussion forum backend")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Secret used to sign access and refresh tokens
    #[arg(long, env = "FORO_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub avatars: AvatarConfig,
    pub cors: CorsConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: Option<String>,
    pub access_cookie: String,
    pub refresh_cookie: String,
    pub access_token_days: i64,
    pub refresh_token_days: i64,
    /// Adds `Secure` to auth cookies; enable behind HTTPS.
    pub secure_cookies: bool,
    pub bcrypt_cost: u32,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AvatarConfig {
    pub max_bytes: usize,
    /// Edge length in pixels of the square stored avatar.
    pub size: u32,
    pub jpeg_quality: u8,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            access_cookie: "access_token".to_string(),
            refresh_cookie: "refresh_token".to_string(),
            access_token_days: 7,
            refresh_token_days: 30,
            secure_cookies: false,
            bcrypt_cost: 10,
        }
    }
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            max_bytes: 5 * 1024 * 1024,
            size: 200,
            jpeg_quality: 90,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origin: "http://localhost:3000".to_string(),
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }
        if let Some(ref secret) = cli.jwt_secret {
            config.auth.jwt_secret = Some(secret.clone());
        }

        // Resolve paths relative to data dir
        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("foro.db"));
        }
        if config.storage.path.is_none() {
            config.storage.path = Some(data_dir.join("uploads"));
        }

        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".foro")
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("foro.db"))
    }

    pub fn uploads_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("uploads"))
    }

    pub fn avatars_path(&self) -> PathBuf {
        self.uploads_path().join("avatars")
    }

    /// Returns the configured signing secret, generating a random one if none is set.
    /// Tokens signed with a generated secret do not survive a restart.
    pub fn ensure_jwt_secret(&mut self) -> &str {
        if self.auth.jwt_secret.is_none() {
            tracing::warn!("No JWT secret configured; generating an ephemeral one");
            self.auth.jwt_secret = Some(crate::auth::random_hex(32));
        }
        self.auth.jwt_secret.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(data_dir: Option<PathBuf>) -> Cli {
        Cli {
            config: None,
            host: None,
            port: None,
            data_dir,
            jwt_secret: None,
        }
    }

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.auth.access_cookie, "access_token");
        assert_eq!(config.auth.refresh_cookie, "refresh_token");
        assert_eq!(config.auth.access_token_days, 7);
        assert_eq!(config.auth.refresh_token_days, 30);
        assert_eq!(config.avatars.max_bytes, 5 * 1024 * 1024);
        assert_eq!(config.avatars.size, 200);
        assert!(config.database.path.is_none());
        assert!(config.storage.path.is_none());
    }

    #[test]
    fn data_dir_uses_cli_override() {
        let cli = cli(Some(PathBuf::from("/tmp/test-foro")));
        assert_eq!(Config::data_dir(&cli), PathBuf::from("/tmp/test-foro"));
    }

    #[test]
    fn data_dir_defaults_to_home_dot_foro() {
        let dir = Config::data_dir(&cli(None));
        assert!(dir.ends_with(".foro"));
    }

    #[test]
    fn load_with_no_config_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load(&cli(Some(tmp.path().to_path_buf()))).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.db_path(), tmp.path().join("foro.db"));
        assert_eq!(config.uploads_path(), tmp.path().join("uploads"));
        assert_eq!(config.avatars_path(), tmp.path().join("uploads/avatars"));
        assert!(config.auth.jwt_secret.is_none());
    }

    #[test]
    fn load_reads_toml_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[server]
port = 9000

[auth]
jwt_secret = "from-file"
secure_cookies = true

[avatars]
size = 128

[cors]
allowed_origin = "https://forum.example"
"#,
        )
        .unwrap();

        let mut cli = cli(Some(tmp.path().to_path_buf()));
        cli.config = Some(config_path);
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.auth.jwt_secret.as_deref(), Some("from-file"));
        assert!(config.auth.secure_cookies);
        assert_eq!(config.auth.access_cookie, "access_token");
        assert_eq!(config.avatars.size, 128);
        assert_eq!(config.cors.allowed_origin, "https://forum.example");
    }

    #[test]
    fn cli_overrides_beat_toml_values() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[server]
host = "192.168.1.1"
port = 9000

[auth]
jwt_secret = "from-file"
"#,
        )
        .unwrap();

        let cli = Cli {
            config: Some(config_path),
            host: Some("10.0.0.1".to_string()),
            port: Some(4000),
            data_dir: Some(tmp.path().to_path_buf()),
            jwt_secret: Some("from-cli".to_string()),
        };
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.server.host, "10.0.0.1");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.auth.jwt_secret.as_deref(), Some("from-cli"));
    }

    #[test]
    fn ensure_jwt_secret_generates_when_missing() {
        let mut config = Config::default();
        let secret = config.ensure_jwt_secret().to_string();
        assert_eq!(secret.len(), 64);
        assert_eq!(config.ensure_jwt_secret(), secret);
    }
}
