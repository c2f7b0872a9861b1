use config::{Config, ConfigError};
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use crate::auth::{AssertionSettings, Identity, KeySource};
use crate::target::Target;

pub const DEFAULT_CONFIG_FILE: &str = "assetpub.toml";
pub const ENV_PREFIX: &str = "ASSETPUB";

const MAX_ASSERTION_LIFETIME_SECS: u64 = 3600;

static ENV_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").expect("valid pattern"));

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub identity: IdentitySettings,
    #[serde(default)]
    pub auth: AuthSettings,
    pub storage: StorageSettings,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub build: BuildSettings,
}

#[derive(Deserialize, Clone, Default)]
pub struct IdentitySettings {
    /// Service account email (optional with a JSON key file)
    #[serde(default)]
    pub email: Option<String>,
    /// Path to a PEM or JSON key file
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
    /// Inline PEM key, usually supplied as "${SOME_ENV_VAR}"
    #[serde(default)]
    pub private_key: Option<String>,
    /// Passphrase for an encrypted PKCS#8 key
    #[serde(default)]
    pub passphrase: Option<String>,
}

impl fmt::Debug for IdentitySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentitySettings")
            .field("email", &self.email)
            .field("private_key_path", &self.private_key_path)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthSettings {
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default = "default_assertion_lifetime_secs")]
    pub assertion_lifetime_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            token_url: default_token_url(),
            scope: default_scope(),
            assertion_lifetime_secs: default_assertion_lifetime_secs(),
        }
    }
}

fn default_token_url() -> String {
    "https://www.googleapis.com/oauth2/v4/token".to_string()
}

fn default_scope() -> String {
    "https://www.googleapis.com/auth/devstorage.read_write".to_string()
}

fn default_assertion_lifetime_secs() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    pub bucket: String,
    #[serde(default = "default_upload_base_url")]
    pub upload_base_url: String,
}

fn default_upload_base_url() -> String {
    "https://www.googleapis.com/upload/storage/v1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpSettings {
    /// Wait budget for each request, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct BuildSettings {
    /// Base directory; each target builds into `<output_dir>/<target>`
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_targets")]
    pub targets: Vec<Target>,
    /// Build tool executable
    #[serde(default)]
    pub program: Option<String>,
    /// Build tool arguments; `{target}` and `{output_dir}` are substituted
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            targets: default_targets(),
            program: None,
            args: Vec::new(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("AssetBundles")
}

fn default_targets() -> Vec<Target> {
    vec![Target::Ios, Target::Android]
}

impl Settings {
    /// Load settings from the config file and `ASSETPUB__*` environment variables.
    ///
    /// An explicit path must exist. Otherwise `./assetpub.toml` is tried, then
    /// `<user config dir>/assetpub/config.toml`.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        match Self::resolve_config_file(explicit_path)? {
            Some(path) => {
                tracing::info!("Loading config file: {}", path.display());
                builder = builder.add_source(
                    config::File::from(path.as_path()).format(config::FileFormat::Toml),
                );
            }
            None => tracing::debug!("No config file found, using environment only"),
        }

        builder = builder.add_source(Self::environment());

        let config = builder.build()?;
        let mut settings = Self::from_config(config)?;
        settings.apply_raw_secret_overrides(|name| env::var(name).ok());
        Ok(settings)
    }

    /// `ASSETPUB__SECTION__KEY` overrides; list keys take comma-separated values
    fn environment() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("build.targets")
            .with_list_parse_key("build.args")
    }

    /// Secrets from the environment are taken verbatim. `try_parsing` would
    /// otherwise turn a passphrase like "007" into the number 7.
    fn apply_raw_secret_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(passphrase) = lookup("ASSETPUB__IDENTITY__PASSPHRASE") {
            self.identity.passphrase = Some(passphrase);
        }
        if let Some(private_key) = lookup("ASSETPUB__IDENTITY__PRIVATE_KEY") {
            self.identity.private_key = Some(private_key);
        }
    }

    fn resolve_config_file(explicit_path: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
        if let Some(path) = explicit_path {
            if !path.exists() {
                return Err(ConfigError::Message(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            return Ok(Some(path.to_path_buf()));
        }

        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Ok(Some(local));
        }

        Ok(dirs::config_dir()
            .map(|dir| dir.join("assetpub").join("config.toml"))
            .filter(|path| path.exists()))
    }

    fn from_config(config: Config) -> Result<Self, ConfigError> {
        // Substitute environment variables in every string value
        let mut root = config.cache;
        substitute_env_vars_in_value(&mut root);

        // Deserialize and collect any unused fields
        let mut unused_fields = Vec::new();
        let settings: Settings = serde_ignored::deserialize(root, |path| {
            unused_fields.push(path.to_string());
        })
        .map_err(|e| ConfigError::Message(format!("Failed to deserialize settings: {}", e)))?;

        for field in &unused_fields {
            tracing::warn!("Unknown configuration field: {}", field);
        }

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match (&self.identity.private_key_path, &self.identity.private_key) {
            (None, None) => {
                return Err(ConfigError::Message(
                    "No private key configured. Set [identity] private_key_path or private_key"
                        .to_string(),
                ))
            }
            (Some(_), Some(_)) => {
                return Err(ConfigError::Message(
                    "Set only one of [identity] private_key_path and private_key".to_string(),
                ))
            }
            _ => {}
        }

        if self.storage.bucket.trim().is_empty() {
            return Err(ConfigError::Message(
                "Bucket not configured. Set [storage] bucket or ASSETPUB__STORAGE__BUCKET"
                    .to_string(),
            ));
        }

        let lifetime = self.auth.assertion_lifetime_secs;
        if lifetime == 0 || lifetime > MAX_ASSERTION_LIFETIME_SECS {
            return Err(ConfigError::Message(format!(
                "[auth] assertion_lifetime_secs must be between 1 and {}, got {}",
                MAX_ASSERTION_LIFETIME_SECS, lifetime
            )));
        }

        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Message(
                "[http] timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.build.targets.is_empty() {
            return Err(ConfigError::Message(
                "[build] targets must list at least one target".to_string(),
            ));
        }

        Ok(())
    }

    pub fn identity(&self) -> Identity {
        let key_source = match (&self.identity.private_key_path, &self.identity.private_key) {
            (Some(path), _) => KeySource::Path(path.clone()),
            (None, Some(pem)) => KeySource::Inline(pem.clone()),
            // Rejected by validate()
            (None, None) => KeySource::Inline(String::new()),
        };

        Identity {
            email: self.identity.email.clone(),
            key_source,
            passphrase: self.identity.passphrase.clone(),
        }
    }

    pub fn assertion_settings(&self) -> AssertionSettings {
        AssertionSettings {
            token_url: self.auth.token_url.clone(),
            scope: self.auth.scope.clone(),
            lifetime: Duration::from_secs(self.auth.assertion_lifetime_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }
}

/// Walks tables and arrays, substituting environment variables in string leaves
fn substitute_env_vars_in_value(value: &mut config::Value) {
    use config::ValueKind;

    match &mut value.kind {
        ValueKind::String(s) => *s = substitute_env_vars_in_string(s),
        ValueKind::Table(table) => table.values_mut().for_each(substitute_env_vars_in_value),
        ValueKind::Array(array) => array.iter_mut().for_each(substitute_env_vars_in_value),
        _ => {}
    }
}

/// Replaces ${VAR_NAME} or ${VAR_NAME:-default} with environment variable values
fn substitute_env_vars_in_string(s: &str) -> String {
    ENV_REF
        .replace_all(s, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str());

            match env::var(var_name) {
                Ok(val) => val,
                Err(_) => default_value.unwrap_or("").to_string(),
            }
        })
        .to_string()
}
