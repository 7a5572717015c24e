//! Layered configuration: defaults, then the YAML file, then `RLSKIT__*`
//! environment variables (`RLSKIT__RLS__ENFORCE_FIELDS`, ...).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use rlskit_db::{ConnectOpts, SqlType};
use rlskit_security::RlsSettings;
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "RLSKIT__";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub rls: RlsSettings,
    pub policy: PolicyConfig,
    pub database: DatabaseConfig,
}

/// Defaults for `add-rls`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// Cast type per field; unlisted fields compare as `text`.
    pub field_types: BTreeMap<String, SqlType>,
    pub out_dir: PathBuf,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            field_types: BTreeMap::new(),
            out_dir: PathBuf::from("migrations"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub dsn: Option<String>,
    pub pool: ConnectOpts,
}

impl AppConfig {
    /// # Errors
    /// Fails if the file is missing or any layer does not deserialize or
    /// validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            anyhow::ensure!(
                path.is_file(),
                "config file does not exist: {}",
                path.display()
            );
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Self = figment.extract().context("invalid configuration")?;
        config.rls.validate().context("invalid rls settings")?;
        for field in config.policy.field_types.keys() {
            rlskit_security::check_identifier("policy.field_types", field)?;
        }
        tracing::debug!(
            fields = ?config.rls.enforce_fields,
            file = ?path,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Effective configuration as YAML. Secrets are never serialized.
    ///
    /// # Errors
    /// Fails if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        serde_saphyr::to_string(self).context("failed to render configuration")
    }
}
