// Configuration loading and parsing (challenge.toml, credentials.toml).

use serde::Deserialize;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::schema::DomainKind;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub endpoints: EndpointsConfig,
    pub credentials: CredentialsConfig,
}

// ---------------------------------------------------------------------------
// challenge.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire challenge.toml file.
#[derive(Debug, Clone, Deserialize)]
struct ChallengeFile {
    server: ServerConfig,
    storage: StorageConfig,
    endpoints: EndpointsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file, relative to the base directory.
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointsConfig {
    pub games: EndpointSet,
    pub penalties: EndpointSet,
}

impl EndpointsConfig {
    pub fn for_domain(&self, kind: DomainKind) -> &EndpointSet {
        match kind {
            DomainKind::Games => &self.games,
            DomainKind::Penalties => &self.penalties,
        }
    }
}

/// Server paths for one domain's four sync operations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EndpointSet {
    pub save_tab: String,
    pub delete_tab: String,
    pub load_saved_tabs: String,
    pub load_defaults: String,
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub csrf_token: Option<String>,
    pub session_cookie: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/challenge.toml` and
/// (optionally) `config/credentials.toml`, relative to `base_dir`.
///
/// Does not copy defaults; `load_config` does.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- challenge.toml (required) ---
    let challenge_path = config_dir.join("challenge.toml");
    let challenge_text = read_file(&challenge_path)?;
    let file: ChallengeFile =
        toml::from_str(&challenge_text).map_err(|e| ConfigError::ParseError {
            path: challenge_path.clone(),
            source: e,
        })?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };

    let config = Config {
        server: file.server,
        storage: file.storage,
        endpoints: file.endpoints,
        credentials,
    };

    validate(&config)?;

    Ok(config)
}

/// Files written into `config/` when missing. Credentials are never seeded.
const DEFAULT_FILES: &[(&str, &str)] = &[("challenge.toml", include_str!("../defaults/challenge.toml"))];

/// Write every missing default file into `<base_dir>/config/`, leaving
/// existing files untouched. Returns the paths that were written.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let config_dir = base_dir.join("config");
    fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create {}: {e}", config_dir.display()),
    })?;

    let mut written = Vec::new();
    for (name, content) in DEFAULT_FILES {
        let target = config_dir.join(name);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&target) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                })
            }
        };
        file.write_all(content.as_bytes()).map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to write {}: {e}", target.display()),
        })?;
        written.push(target);
    }
    Ok(written)
}

/// Load config relative to `base_dir`, writing built-in defaults into
/// `config/` first.
pub fn load_config(base_dir: &Path) -> Result<Config, ConfigError> {
    ensure_config_files(base_dir)?;
    load_config_from(base_dir)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let url = config.server.base_url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::ValidationError {
            field: "server.base_url".into(),
            message: format!("must start with http:// or https://, got `{url}`"),
        });
    }

    if config.storage.path.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "storage.path".into(),
            message: "must not be empty".into(),
        });
    }

    for kind in [DomainKind::Games, DomainKind::Penalties] {
        let set = config.endpoints.for_domain(kind);
        let paths: &[(&str, &str)] = &[
            ("save_tab", &set.save_tab),
            ("delete_tab", &set.delete_tab),
            ("load_saved_tabs", &set.load_saved_tabs),
            ("load_defaults", &set.load_defaults),
        ];
        for (name, path) in paths {
            if !path.starts_with('/') {
                return Err(ConfigError::ValidationError {
                    field: format!("endpoints.{}.{name}", kind.as_str()),
                    message: format!("must start with '/', got `{path}`"),
                });
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn defaults_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("defaults")
    }

    /// Fresh scratch directory containing a `config/` folder.
    fn scratch(name: &str) -> (PathBuf, PathBuf) {
        let tmp = std::env::temp_dir().join(format!("challenge_config_{name}"));
        let _ = fs::remove_dir_all(&tmp);
        let config_dir = tmp.join("config");
        fs::create_dir_all(&config_dir).unwrap();
        (tmp, config_dir)
    }

    fn default_challenge_toml() -> String {
        fs::read_to_string(defaults_dir().join("challenge.toml")).unwrap()
    }

    #[test]
    fn load_valid_config_from_default_files() {
        let (tmp, config_dir) = scratch("valid");
        fs::write(config_dir.join("challenge.toml"), default_challenge_toml()).unwrap();

        let config = load_config_from(&tmp).expect("should load valid config");
        assert_eq!(config.server.base_url, "http://127.0.0.1:8000");
        assert_eq!(config.storage.path, "challenge-store.db");
        assert_eq!(config.endpoints.games.save_tab, "/save_tab/");
        assert_eq!(config.endpoints.games.load_defaults, "/load_default_entries/");
        assert_eq!(config.endpoints.penalties.delete_tab, "/delete_penalty_tab/");
        assert_eq!(
            config.endpoints.for_domain(DomainKind::Penalties).load_saved_tabs,
            "/load_saved_penalty_tabs/"
        );
        assert!(config.credentials.csrf_token.is_none());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn credentials_toml_is_read_when_present() {
        let (tmp, config_dir) = scratch("creds");
        fs::write(config_dir.join("challenge.toml"), default_challenge_toml()).unwrap();
        fs::write(
            config_dir.join("credentials.toml"),
            "csrf_token = \"tok123\"\nsession_cookie = \"sessionid=abc\"\n",
        )
        .unwrap();

        let config = load_config_from(&tmp).expect("should load with credentials.toml");
        assert_eq!(config.credentials.csrf_token.as_deref(), Some("tok123"));
        assert_eq!(
            config.credentials.session_cookie.as_deref(),
            Some("sessionid=abc")
        );

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_challenge_toml_is_file_not_found() {
        let (tmp, _) = scratch("missing");
        let err = load_config_from(&tmp).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let (tmp, config_dir) = scratch("malformed");
        fs::write(config_dir.join("challenge.toml"), "[server\nbase_url = 1").unwrap();
        let err = load_config_from(&tmp).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_non_http_base_url() {
        let (tmp, config_dir) = scratch("bad_url");
        let modified = default_challenge_toml().replace(
            "base_url = \"http://127.0.0.1:8000\"",
            "base_url = \"ftp://example.com\"",
        );
        fs::write(config_dir.join("challenge.toml"), modified).unwrap();

        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ValidationError { field, .. } => {
                assert_eq!(field, "server.base_url");
            }
            other => panic!("expected ValidationError, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_relative_endpoint_path() {
        let (tmp, config_dir) = scratch("bad_path");
        let modified = default_challenge_toml().replace(
            "delete_tab = \"/delete_penalty_tab/\"",
            "delete_tab = \"delete_penalty_tab/\"",
        );
        fs::write(config_dir.join("challenge.toml"), modified).unwrap();

        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ValidationError { field, .. } => {
                assert_eq!(field, "endpoints.penalties.delete_tab");
            }
            other => panic!("expected ValidationError, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_empty_storage_path() {
        let (tmp, config_dir) = scratch("empty_db");
        let modified = default_challenge_toml().replace(
            "path = \"challenge-store.db\"",
            "path = \"  \"",
        );
        fs::write(config_dir.join("challenge.toml"), modified).unwrap();

        let err = load_config_from(&tmp).unwrap_err();
        assert!(
            matches!(&err, ConfigError::ValidationError { field, .. } if field == "storage.path"),
            "got {err}"
        );

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_writes_missing_defaults_once() {
        let tmp = std::env::temp_dir().join("challenge_config_ensure");
        let _ = fs::remove_dir_all(&tmp);

        let written = ensure_config_files(&tmp).unwrap();
        assert_eq!(written, vec![tmp.join("config").join("challenge.toml")]);
        assert_eq!(
            fs::read_to_string(tmp.join("config/challenge.toml")).unwrap(),
            default_challenge_toml()
        );
        assert!(!tmp.join("config/credentials.toml").exists());

        // Second run leaves user edits alone.
        fs::write(tmp.join("config/challenge.toml"), "edited").unwrap();
        assert!(ensure_config_files(&tmp).unwrap().is_empty());
        assert_eq!(
            fs::read_to_string(tmp.join("config/challenge.toml")).unwrap(),
            "edited"
        );

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn load_config_works_from_an_empty_home() {
        let tmp = std::env::temp_dir().join("challenge_config_seed");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        let config = load_config(&tmp).expect("should load from built-in defaults");
        assert_eq!(config.server.base_url, "http://127.0.0.1:8000");
        assert_eq!(config.endpoints.penalties.save_tab, "/save_penalty_tab/");
        assert!(config.credentials.csrf_token.is_none());
        assert!(tmp.join("config/challenge.toml").exists());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_reports_unwritable_home() {
        let tmp = std::env::temp_dir().join("challenge_config_blocked");
        let _ = fs::remove_dir_all(&tmp);
        let _ = fs::remove_file(&tmp);
        fs::write(&tmp, "not a directory").unwrap();
        let err = ensure_config_files(&tmp).unwrap_err();
        assert!(matches!(err, ConfigError::DefaultsCopyError { .. }));
        let _ = fs::remove_file(&tmp);
    }
}
