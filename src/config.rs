//! Reporter configuration.
//!
//! Configuration is layered: built-in defaults, then a JSON file (`applause.json`
//! in the working directory unless another file is named), then programmatic
//! overrides. Only fields that are set in a layer override the layer below it.

use crate::errors::ConfigError;
use crate::model::TestRailOptions;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_AUTO_API_URL: &str = "https://prod-auto-api.cloud.applause.com/";
pub const DEFAULT_PUBLIC_API_URL: &str = "https://api.applause.com/";
pub const DEFAULT_CONFIG_FILE: &str = "applause.json";
pub const DEFAULT_AUTO_API_TIMEOUT: Duration = Duration::from_secs(300);
pub const PUBLIC_API_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for the Automation API client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoApiConfig {
    pub auto_api_base_url: String,
    pub api_key: String,
    pub product_id: u64,
    pub test_rail_options: Option<TestRailOptions>,
    pub applause_test_cycle_id: Option<u64>,
    /// Per-call timeout.
    pub timeout: Duration,
}

impl AutoApiConfig {
    pub fn new(api_key: impl Into<String>, product_id: u64) -> Self {
        Self {
            auto_api_base_url: DEFAULT_AUTO_API_URL.to_string(),
            api_key: api_key.into(),
            product_id,
            test_rail_options: None,
            applause_test_cycle_id: None,
            timeout: DEFAULT_AUTO_API_TIMEOUT,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_product_id(i64::try_from(self.product_id).unwrap_or(i64::MAX))?;
        validate_base_url("autoApiBaseUrl", &self.auto_api_base_url)?;
        validate_api_key(&self.api_key)
    }
}

/// Settings for the Public API client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicApiConfig {
    pub public_api_base_url: String,
    pub api_key: String,
    pub product_id: u64,
    pub applause_test_cycle_id: Option<u64>,
}

impl PublicApiConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_product_id(i64::try_from(self.product_id).unwrap_or(i64::MAX))?;
        validate_base_url("publicApiBaseUrl", &self.public_api_base_url)?;
        validate_api_key(&self.api_key)
    }
}

/// Fully resolved configuration for both APIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplauseConfig {
    pub auto_api: AutoApiConfig,
    pub public_api: PublicApiConfig,
}

/// One configuration layer. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialApplauseConfig {
    pub auto_api_base_url: Option<String>,
    pub public_api_base_url: Option<String>,
    pub api_key: Option<String>,
    pub product_id: Option<i64>,
    pub test_rail_options: Option<TestRailOptions>,
    pub applause_test_cycle_id: Option<u64>,
    /// Automation API call timeout in milliseconds.
    pub timeout: Option<u64>,
}

impl PartialApplauseConfig {
    pub fn defaults() -> Self {
        Self {
            auto_api_base_url: Some(DEFAULT_AUTO_API_URL.to_string()),
            public_api_base_url: Some(DEFAULT_PUBLIC_API_URL.to_string()),
            ..Default::default()
        }
    }

    /// Layer `overrides` on top of `self`; set fields in `overrides` win.
    pub fn overridden_by(self, overrides: PartialApplauseConfig) -> Self {
        Self {
            auto_api_base_url: overrides.auto_api_base_url.or(self.auto_api_base_url),
            public_api_base_url: overrides.public_api_base_url.or(self.public_api_base_url),
            api_key: overrides.api_key.or(self.api_key),
            product_id: overrides.product_id.or(self.product_id),
            test_rail_options: overrides.test_rail_options.or(self.test_rail_options),
            applause_test_cycle_id: overrides
                .applause_test_cycle_id
                .or(self.applause_test_cycle_id),
            timeout: overrides.timeout.or(self.timeout),
        }
    }

    /// Names of the required fields that are still unset.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.auto_api_base_url.is_none() {
            missing.push("autoApiBaseUrl");
        }
        if self.public_api_base_url.is_none() {
            missing.push("publicApiBaseUrl");
        }
        if self.api_key.is_none() {
            missing.push("apiKey");
        }
        if self.product_id.is_none() {
            missing.push("productId");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Checks only the fields that are present.
    pub fn validate_partial(&self) -> Result<(), ConfigError> {
        if let Some(product_id) = self.product_id {
            validate_product_id(product_id)?;
        }
        Ok(())
    }

    /// Resolve into a complete, validated configuration.
    pub fn resolve(self) -> Result<ApplauseConfig, ConfigError> {
        let missing = self.missing_fields();
        let (Some(auto_api_base_url), Some(public_api_base_url), Some(api_key), Some(product_id)) = (
            self.auto_api_base_url,
            self.public_api_base_url,
            self.api_key,
            self.product_id,
        ) else {
            return Err(ConfigError::Incomplete { missing });
        };
        let product_id = validate_product_id(product_id)?;

        let config = ApplauseConfig {
            auto_api: AutoApiConfig {
                auto_api_base_url,
                api_key: api_key.clone(),
                product_id,
                test_rail_options: self.test_rail_options,
                applause_test_cycle_id: self.applause_test_cycle_id,
                timeout: self
                    .timeout
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_AUTO_API_TIMEOUT),
            },
            public_api: PublicApiConfig {
                public_api_base_url,
                api_key,
                product_id,
                applause_test_cycle_id: self.applause_test_cycle_id,
            },
        };
        config.auto_api.validate()?;
        config.public_api.validate()?;
        Ok(config)
    }
}

/// Where to load configuration from.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoadProperties {
    /// Config file, relative to the working directory.
    pub config_file: Option<PathBuf>,
    /// Overrides applied after the file.
    pub properties: Option<PartialApplauseConfig>,
}

/// Load, merge, and validate the configuration.
pub fn load_config(load: &ConfigLoadProperties) -> Result<ApplauseConfig, ConfigError> {
    let cwd = std::env::current_dir().map_err(|err| ConfigError::Read {
        path: PathBuf::from("."),
        err,
    })?;
    load_config_in(&cwd, load)
}

/// Like [`load_config`], resolving file paths against `base_dir`.
pub fn load_config_in(
    base_dir: &Path,
    load: &ConfigLoadProperties,
) -> Result<ApplauseConfig, ConfigError> {
    let file = match &load.config_file {
        Some(path) => base_dir.join(path),
        None => base_dir.join(DEFAULT_CONFIG_FILE),
    };

    let mut config = PartialApplauseConfig::defaults().overridden_by(load_config_from_file(&file)?);
    if let Some(properties) = &load.properties {
        config = config.overridden_by(properties.clone());
    }
    config.resolve()
}

/// Read one layer from a JSON file. A missing file is an empty layer.
pub fn load_config_from_file(path: &Path) -> Result<PartialApplauseConfig, ConfigError> {
    if !path.exists() {
        return Ok(PartialApplauseConfig::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|err| ConfigError::Read {
        path: path.to_path_buf(),
        err,
    })?;
    serde_json::from_str(&contents).map_err(|err| ConfigError::Parse {
        path: path.to_path_buf(),
        err,
    })
}

fn validate_product_id(product_id: i64) -> Result<u64, ConfigError> {
    if product_id <= 0 {
        return Err(ConfigError::InvalidProductId(product_id));
    }
    Ok(product_id as u64)
}

fn validate_api_key(api_key: &str) -> Result<(), ConfigError> {
    if api_key.is_empty() {
        return Err(ConfigError::EmptyApiKey);
    }
    Ok(())
}

fn validate_base_url(field: &'static str, url: &str) -> Result<(), ConfigError> {
    let invalid = || ConfigError::InvalidUrl {
        field,
        url: url.to_string(),
    };
    let parsed = Url::parse(url).map_err(|_| invalid())?;
    let host_ok = parsed
        .host_str()
        .is_some_and(|host| !host.is_empty() && !host.ends_with('.'));
    let ok = matches!(parsed.scheme(), "http" | "https")
        && host_ok
        && parsed.username().is_empty()
        && parsed.password().is_none()
        && parsed.query().is_none()
        && parsed.fragment().is_none();
    if ok {
        Ok(())
    } else {
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn overrides() -> PartialApplauseConfig {
        PartialApplauseConfig {
            api_key: Some("key".into()),
            product_id: Some(12),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_plus_required_fields_resolve() {
        let config = PartialApplauseConfig::defaults()
            .overridden_by(overrides())
            .resolve()
            .unwrap();
        assert_eq!(config.auto_api.auto_api_base_url, DEFAULT_AUTO_API_URL);
        assert_eq!(config.public_api.public_api_base_url, DEFAULT_PUBLIC_API_URL);
        assert_eq!(config.auto_api.product_id, 12);
        assert_eq!(config.auto_api.timeout, DEFAULT_AUTO_API_TIMEOUT);
    }

    #[test]
    fn incomplete_config_names_missing_fields() {
        let err = PartialApplauseConfig::defaults().resolve().unwrap_err();
        match err {
            ConfigError::Incomplete { missing } => {
                assert_eq!(missing, vec!["apiKey", "productId"])
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unset_override_fields_do_not_clobber() {
        let base = PartialApplauseConfig::defaults().overridden_by(overrides());
        let merged = base.clone().overridden_by(PartialApplauseConfig {
            applause_test_cycle_id: Some(3),
            ..Default::default()
        });
        assert_eq!(merged.api_key, base.api_key);
        assert_eq!(merged.applause_test_cycle_id, Some(3));
    }

    #[test_case(0; "zero")]
    #[test_case(-4; "negative")]
    fn rejects_bad_product_id(product_id: i64) {
        let config = PartialApplauseConfig {
            product_id: Some(product_id),
            ..overrides()
        };
        assert!(matches!(
            config.validate_partial(),
            Err(ConfigError::InvalidProductId(id)) if id == product_id
        ));
    }

    #[test_case("http://localhost:8080/", true; "localhost")]
    #[test_case("https://prod-auto-api.cloud.applause.com/", true; "default")]
    #[test_case("ftp://example.com/", false; "wrong scheme")]
    #[test_case("localhost", false; "no scheme")]
    #[test_case("https://user:pw@example.com/", false; "credentials")]
    #[test_case("https://example.com/?a=b", false; "query")]
    #[test_case("https://example.com/#frag", false; "fragment")]
    #[test_case("https://example.com./", false; "trailing dot")]
    fn base_url_validation(url: &str, ok: bool) {
        assert_eq!(validate_base_url("autoApiBaseUrl", url).is_ok(), ok, "{url}");
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let err = PartialApplauseConfig::defaults()
            .overridden_by(PartialApplauseConfig {
                api_key: Some(String::new()),
                ..overrides()
            })
            .resolve()
            .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyApiKey), "{err}");
    }

    #[test]
    fn file_then_properties_layering() {
        let dir = Utf8TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("custom.json"),
            r#"{"apiKey": "from-file", "productId": 5, "timeout": 1500}"#,
        )
        .unwrap();

        let config = load_config_in(
            dir.path().as_std_path(),
            &ConfigLoadProperties {
                config_file: Some("custom.json".into()),
                properties: Some(PartialApplauseConfig {
                    product_id: Some(9),
                    ..Default::default()
                }),
            },
        )
        .unwrap();

        assert_eq!(config.auto_api.api_key, "from-file");
        assert_eq!(config.auto_api.product_id, 9);
        assert_eq!(config.auto_api.timeout, Duration::from_millis(1500));
    }

    #[test]
    fn missing_default_file_is_empty_layer() {
        let dir = Utf8TempDir::new().unwrap();
        let err = load_config_in(dir.path().as_std_path(), &ConfigLoadProperties::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Incomplete { .. }), "{err}");
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = Utf8TempDir::new().unwrap();
        std::fs::write(dir.path().join(DEFAULT_CONFIG_FILE), "{ not json").unwrap();
        let err = load_config_in(dir.path().as_std_path(), &ConfigLoadProperties::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "{err}");
    }
}
