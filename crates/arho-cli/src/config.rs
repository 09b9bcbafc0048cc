//! Configuration file management for arho.
//!
//! Provides a TOML-based config file at `~/.config/arho/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default. The API
//! section is optional; only `validate` and `post` need it.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use arho_core::client::{ApiSettings, DEFAULT_PUBLIC_BASE_URL, DEFAULT_XROAD_PORT};
use arho_db::config::DbConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<ApiSection>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

/// National API connection settings as stored on disk. The secrets can be
/// left out of the file and supplied through `ARHO_PUBLIC_API_KEY` and
/// `ARHO_XROAD_CLIENT_SECRET` instead.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiSection {
    pub public_base_url: Option<String>,
    pub public_api_key: Option<String>,
    pub xroad_server_address: String,
    pub xroad_port: Option<u16>,
    pub xroad_instance: String,
    pub xroad_member_class: String,
    pub xroad_member_code: String,
    pub xroad_subsystem: String,
    pub xroad_client_id: String,
    pub xroad_client_secret: Option<String>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the arho config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/arho` or `~/.config/arho`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("arho");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("arho")
}

/// Return the path to the arho config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix; the API section carries secrets.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct ArhoConfig {
    pub db_config: DbConfig,
    api: Option<ApiSection>,
}

impl ArhoConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config
    /// file > default.
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let file_config = load_config().ok();

        let db_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Ok(url) = std::env::var("ARHO_DATABASE_URL") {
            url
        } else if let Some(ref cfg) = file_config {
            cfg.database.url.clone()
        } else {
            DbConfig::DEFAULT_URL.to_string()
        };

        Ok(Self {
            db_config: DbConfig::new(db_url),
            api: file_config.and_then(|cfg| cfg.api),
        })
    }

    /// Build the national API settings, or fail when the config file has no
    /// API section or the secrets are missing everywhere.
    pub fn api_settings(&self) -> Result<ApiSettings> {
        let Some(api) = &self.api else {
            bail!(
                "no [api] section in {}; add one to use validate/post",
                config_path().display()
            );
        };

        let public_api_key = match std::env::var("ARHO_PUBLIC_API_KEY") {
            Ok(key) => key,
            Err(_) => api
                .public_api_key
                .clone()
                .context("public_api_key not set; put it in the [api] section or ARHO_PUBLIC_API_KEY")?,
        };
        let xroad_client_secret = match std::env::var("ARHO_XROAD_CLIENT_SECRET") {
            Ok(secret) => secret,
            Err(_) => api.xroad_client_secret.clone().context(
                "xroad_client_secret not set; put it in the [api] section or ARHO_XROAD_CLIENT_SECRET",
            )?,
        };

        Ok(ApiSettings {
            public_base_url: api
                .public_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_owned()),
            public_api_key,
            xroad_server_address: api.xroad_server_address.clone(),
            xroad_port: api.xroad_port.unwrap_or(DEFAULT_XROAD_PORT),
            xroad_instance: api.xroad_instance.clone(),
            xroad_member_class: api.xroad_member_class.clone(),
            xroad_member_code: api.xroad_member_code.clone(),
            xroad_subsystem: api.xroad_subsystem.clone(),
            xroad_client_id: api.xroad_client_id.clone(),
            xroad_client_secret,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_roundtrips_through_toml() {
        let original = ConfigFile {
            database: DatabaseSection {
                url: "postgresql://testhost:5432/testdb".to_string(),
            },
            api: Some(ApiSection {
                public_base_url: None,
                public_api_key: Some("key".to_string()),
                xroad_server_address: "ss1.example.fi".to_string(),
                xroad_port: None,
                xroad_instance: "FI-TEST".to_string(),
                xroad_member_class: "MUN".to_string(),
                xroad_member_code: "0000000-0".to_string(),
                xroad_subsystem: "arho".to_string(),
                xroad_client_id: "client".to_string(),
                xroad_client_secret: Some("secret".to_string()),
            }),
        };

        let contents = toml::to_string_pretty(&original).unwrap();
        let loaded: ConfigFile = toml::from_str(&contents).unwrap();
        assert_eq!(loaded.database.url, original.database.url);
        let api = loaded.api.unwrap();
        assert_eq!(api.xroad_instance, "FI-TEST");
        assert_eq!(api.public_base_url, None);
    }

    #[test]
    fn config_without_api_section_parses() {
        let loaded: ConfigFile =
            toml::from_str("[database]\nurl = \"postgresql://localhost:5432/arho\"\n").unwrap();
        assert!(loaded.api.is_none());
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("arho/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
