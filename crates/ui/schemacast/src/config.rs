//! Connection profiles.
//!
//! Profiles live in `<base>/config.toml`:
//!
//! ```toml
//! default = "local"
//!
//! [profiles.local]
//! name = "Local Development"
//!
//! [profiles.local.schema_registry]
//! url = "http://localhost:8081"
//!
//! [profiles.local.kafka]
//! bootstrap_servers = "localhost:9092"
//! security_protocol = "PLAINTEXT"
//! ```
//!
//! When no usable profile exists the environment is consulted instead
//! (`SCHEMA_REGISTRY_URL`, `KAFKA_BOOTSTRAP_SERVERS`, ...).

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_PROFILE: &str = "local";
const ENV_LABEL: &str = "environment";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("loading configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("writing {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serializing default configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("profile `{0}` not found")]
    ProfileNotFound(String),
    #[error("profile `{0}` has no schema registry url")]
    MissingProfileUrl(String),
    #[error("SCHEMA_REGISTRY_URL environment variable is required")]
    MissingRegistryUrl,
}

/// How the broker connection is secured.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(try_from = "String", into = "String")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum SecurityProtocol {
    #[default]
    Plaintext,
    Ssl,
    SaslPlaintext,
    SaslSsl,
}

impl SecurityProtocol {
    pub fn uses_tls(self) -> bool {
        matches!(self, Self::Ssl | Self::SaslSsl)
    }

    pub fn uses_sasl(self) -> bool {
        matches!(self, Self::SaslPlaintext | Self::SaslSsl)
    }
}

impl TryFrom<String> for SecurityProtocol {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        Self::from_str(trimmed).map_err(|_| format!("unsupported security protocol `{value}`"))
    }
}

impl From<SecurityProtocol> for String {
    fn from(value: SecurityProtocol) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaRegistryConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_secret: String,
}

impl SchemaRegistryConfig {
    /// Basic auth is only sent when both halves are present.
    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        (!self.api_key.is_empty() && !self.api_secret.is_empty())
            .then_some((self.api_key.as_str(), self.api_secret.as_str()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KafkaConfig {
    #[serde(default)]
    pub bootstrap_servers: String,
    #[serde(default)]
    pub security_protocol: SecurityProtocol,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sasl_username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sasl_password: String,
}

impl KafkaConfig {
    pub fn is_configured(&self) -> bool {
        !self.bootstrap_servers.trim().is_empty()
    }

    /// Comma-separated bootstrap list, blanks dropped.
    pub fn brokers(&self) -> Vec<String> {
        self.bootstrap_servers
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub schema_registry: SchemaRegistryConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub default: String,
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
}

impl ConfigFile {
    pub fn starter() -> Self {
        let local = ProfileConfig {
            name: "Local Development".into(),
            schema_registry: SchemaRegistryConfig {
                url: "http://localhost:8081".into(),
                ..Default::default()
            },
            kafka: KafkaConfig {
                bootstrap_servers: "localhost:9092".into(),
                ..Default::default()
            },
        };
        Self {
            default: DEFAULT_PROFILE.into(),
            profiles: BTreeMap::from([(DEFAULT_PROFILE.to_string(), local)]),
        }
    }

    pub fn profile(&self, key: &str) -> Result<&ProfileConfig, SettingsError> {
        self.profiles
            .get(key)
            .ok_or_else(|| SettingsError::ProfileNotFound(key.to_string()))
    }

    /// Store `profile` under `key`. Editing under a new key drops the old
    /// entry and carries the default along with it.
    pub fn upsert_profile(&mut self, key: &str, replaces: Option<&str>, profile: ProfileConfig) {
        if let Some(old) = replaces.filter(|old| *old != key) {
            self.profiles.remove(old);
            if self.default == old {
                self.default = key.to_string();
            }
        }
        if self.default.is_empty() || !self.profiles.contains_key(&self.default) {
            self.default = key.to_string();
        }
        self.profiles.insert(key.to_string(), profile);
    }

    /// Profile keys for the picker: the default first, the rest alphabetically.
    pub fn ordered_profiles(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        keys.sort_by_key(|key| (*key != self.default, *key));
        keys
    }
}

/// The connection settings the session runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Profile key, or `environment` for the env fallback.
    pub label: String,
    pub registry: SchemaRegistryConfig,
    pub kafka: KafkaConfig,
}

impl Settings {
    fn from_profile(key: &str, profile: &ProfileConfig) -> Result<Self, SettingsError> {
        if profile.schema_registry.url.trim().is_empty() {
            return Err(SettingsError::MissingProfileUrl(key.to_string()));
        }
        Ok(Self {
            label: key.to_string(),
            registry: profile.schema_registry.clone(),
            kafka: profile.kafka.clone(),
        })
    }
}

/// Read the profile file at `path`, creating the starter file when it is missing.
pub fn ensure_config_file(path: &Path) -> Result<ConfigFile, SettingsError> {
    if !path.exists() {
        write_config_file(path, &ConfigFile::starter())?;
        info!(path = %path.display(), "created default configuration");
    }
    load_config_file(path)
}

pub fn load_config_file(path: &Path) -> Result<ConfigFile, SettingsError> {
    let cfg = config::Config::builder()
        .add_source(config::File::from(path).format(config::FileFormat::Toml))
        .build()?;
    Ok(cfg.try_deserialize()?)
}

pub fn write_config_file(path: &Path, file: &ConfigFile) -> Result<(), SettingsError> {
    let write_err = |source| SettingsError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(write_err)?;
    }
    let body = toml::to_string_pretty(file)?;
    fs::write(path, body).map_err(write_err)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(write_err)?;
    }
    Ok(())
}

/// Flat view over the process environment.
#[derive(Debug, Default, Deserialize)]
struct EnvSettings {
    schema_registry_url: Option<String>,
    schema_registry_api_key: Option<String>,
    schema_registry_api_secret: Option<String>,
    kafka_bootstrap_servers: Option<String>,
    kafka_security_protocol: Option<String>,
    kafka_sasl_username: Option<String>,
    kafka_sasl_password: Option<String>,
}

/// Settings from environment variables. `source` replaces the process
/// environment (tests).
pub fn settings_from_env(source: Option<HashMap<String, String>>) -> Result<Settings, SettingsError> {
    let env: EnvSettings = config::Config::builder()
        .add_source(config::Environment::default().source(source))
        .build()?
        .try_deserialize()?;

    let url = env
        .schema_registry_url
        .filter(|u| !u.trim().is_empty())
        .ok_or(SettingsError::MissingRegistryUrl)?;
    let security_protocol = SecurityProtocol::try_from(env.kafka_security_protocol.unwrap_or_default())
        .map_err(|msg| SettingsError::Load(config::ConfigError::Message(msg)))?;

    Ok(Settings {
        label: ENV_LABEL.into(),
        registry: SchemaRegistryConfig {
            url,
            api_key: env.schema_registry_api_key.unwrap_or_default(),
            api_secret: env.schema_registry_api_secret.unwrap_or_default(),
        },
        kafka: KafkaConfig {
            bootstrap_servers: env.kafka_bootstrap_servers.unwrap_or_default(),
            security_protocol,
            sasl_username: env.kafka_sasl_username.unwrap_or_default(),
            sasl_password: env.kafka_sasl_password.unwrap_or_default(),
        },
    })
}

/// Pick the settings for this session.
///
/// An explicit selection must exist. Otherwise the file's default profile is
/// used, and the environment when that is missing too.
pub fn resolve(
    file: Option<&ConfigFile>,
    selected: Option<&str>,
    env: Option<HashMap<String, String>>,
) -> Result<Settings, SettingsError> {
    if let Some(key) = selected {
        let file = file.ok_or_else(|| SettingsError::ProfileNotFound(key.to_string()))?;
        return Settings::from_profile(key, file.profile(key)?);
    }
    if let Some(file) = file {
        match file.profile(&file.default) {
            Ok(profile) => return Settings::from_profile(&file.default, profile),
            Err(_) => warn!(default = %file.default, "default profile missing, using environment"),
        }
    }
    settings_from_env(env)
}
