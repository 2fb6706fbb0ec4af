//! Provider-declared defaults
//!
//! Read-only after construction. Three layers are kept apart so the resolver can
//! tag each hit with its own source:
//! - global defaults (`SettingSource::Default`)
//! - per-provider defaults (`SettingSource::AccountDefault`)
//! - per-service templates (`SettingSource::ServiceTemplate`)
//!
//! Templates may also declare a service type (e.g. `e-mail`, `sync`), which is
//! how callers find the services of an account that speak a given protocol.

use super::table::SettingsTable;
use super::validation::{validate_key, validate_name, DEFAULT_MAX_KEY_LENGTH};
use super::value::ValueCell;
use crate::contract::{AccountsError, Result, SettingSource, SettingValue};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// A provider type with its declared defaults
#[derive(Debug, Clone, Default)]
pub struct Provider {
    pub name: String,
    pub display_name: Option<String>,
    pub defaults: SettingsTable,
}

/// A service template with its declared defaults
#[derive(Debug, Clone, Default)]
pub struct ServiceTemplate {
    pub name: String,
    pub provider: Option<String>,
    pub service_type: Option<String>,
    pub defaults: SettingsTable,
}

impl ServiceTemplate {
    /// Whether accounts of `provider` offer this service
    pub fn offered_by(&self, provider: &str) -> bool {
        self.provider.as_deref().map_or(true, |p| p == provider)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    global: SettingsTable,
    providers: HashMap<String, Provider>,
    services: HashMap<String, ServiceTemplate>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse provider definitions from YAML
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let file: ProvidersFile = serde_yaml::from_str(yaml)
            .map_err(|e| AccountsError::config(format!("Invalid provider definitions: {}", e)))?;

        let mut registry = Self::new();
        for (key, value) in &file.defaults {
            registry = registry.with_default(key, setting_from_yaml(key, value)?)?;
        }
        for (name, def) in file.providers {
            validate_name("provider", &name)?;
            let provider = registry.providers.entry(name.clone()).or_default();
            provider.name = name;
            provider.display_name = def.display_name;
            for (key, value) in &def.settings {
                validate_key(key, DEFAULT_MAX_KEY_LENGTH)?;
                let cell = ValueCell::new(setting_from_yaml(key, value)?, SettingSource::AccountDefault)?;
                provider.defaults.set(key.clone(), cell);
            }
        }
        for (name, def) in file.services {
            validate_name("service", &name)?;
            let template = registry.services.entry(name.clone()).or_default();
            template.name = name;
            template.provider = def.provider;
            if let Some(service_type) = def.service_type {
                validate_name("service type", &service_type)?;
                template.service_type = Some(service_type);
            }
            for (key, value) in &def.settings {
                validate_key(key, DEFAULT_MAX_KEY_LENGTH)?;
                let cell = ValueCell::new(setting_from_yaml(key, value)?, SettingSource::ServiceTemplate)?;
                template.defaults.set(key.clone(), cell);
            }
        }

        tracing::debug!(
            providers = registry.providers.len(),
            services = registry.services.len(),
            globals = registry.global.len(),
            "Loaded provider definitions"
        );
        Ok(registry)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            AccountsError::config(format!("Cannot read provider file {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn with_default(mut self, key: &str, value: impl Into<SettingValue>) -> Result<Self> {
        validate_key(key, DEFAULT_MAX_KEY_LENGTH)?;
        self.global
            .set(key, ValueCell::new(value, SettingSource::Default)?);
        Ok(self)
    }

    pub fn with_provider_default(
        mut self,
        provider: &str,
        key: &str,
        value: impl Into<SettingValue>,
    ) -> Result<Self> {
        validate_name("provider", provider)?;
        validate_key(key, DEFAULT_MAX_KEY_LENGTH)?;
        let entry = self
            .providers
            .entry(provider.to_string())
            .or_insert_with(|| Provider {
                name: provider.to_string(),
                ..Provider::default()
            });
        entry
            .defaults
            .set(key, ValueCell::new(value, SettingSource::AccountDefault)?);
        Ok(self)
    }

    pub fn with_service_default(
        mut self,
        service: &str,
        key: &str,
        value: impl Into<SettingValue>,
    ) -> Result<Self> {
        validate_name("service", service)?;
        validate_key(key, DEFAULT_MAX_KEY_LENGTH)?;
        let entry = self
            .services
            .entry(service.to_string())
            .or_insert_with(|| ServiceTemplate {
                name: service.to_string(),
                ..ServiceTemplate::default()
            });
        entry
            .defaults
            .set(key, ValueCell::new(value, SettingSource::ServiceTemplate)?);
        Ok(self)
    }

    /// Declare the service type of a template, creating the template if needed
    pub fn with_service_type(mut self, service: &str, service_type: &str) -> Result<Self> {
        validate_name("service", service)?;
        validate_name("service type", service_type)?;
        let entry = self
            .services
            .entry(service.to_string())
            .or_insert_with(|| ServiceTemplate {
                name: service.to_string(),
                ..ServiceTemplate::default()
            });
        entry.service_type = Some(service_type.to_string());
        Ok(self)
    }

    /// Check every declared key against `max_len`
    ///
    /// Keys are parsed against [`DEFAULT_MAX_KEY_LENGTH`]; a store configured
    /// with a tighter limit re-checks them here so defaults never hold a key the
    /// store would refuse to read.
    pub fn validate_keys(&self, max_len: usize) -> Result<()> {
        let tables = std::iter::once(&self.global)
            .chain(self.providers.values().map(|p| &p.defaults))
            .chain(self.services.values().map(|t| &t.defaults));
        for table in tables {
            for (key, _) in table.iter() {
                validate_key(key, max_len).map_err(|e| {
                    AccountsError::config(format!("Invalid provider definitions: {}", e))
                })?;
            }
        }
        Ok(())
    }

    pub fn provider(&self, name: &str) -> Option<&Provider> {
        self.providers.get(name)
    }

    pub fn service_template(&self, name: &str) -> Option<&ServiceTemplate> {
        self.services.get(name)
    }

    pub fn provider_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Services of type `service_type` offered to accounts of `provider`, sorted
    pub fn services_of_type(&self, provider: &str, service_type: &str) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .services
            .values()
            .filter(|t| t.service_type.as_deref() == Some(service_type) && t.offered_by(provider))
            .map(|t| t.name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    pub fn supports_service_type(&self, provider: &str, service_type: &str) -> bool {
        self.services
            .values()
            .any(|t| t.service_type.as_deref() == Some(service_type) && t.offered_by(provider))
    }

    pub fn global_defaults(&self) -> &SettingsTable {
        &self.global
    }

    pub fn global_default(&self, key: &str) -> Option<&ValueCell> {
        self.global.get(key)
    }

    pub fn provider_default(&self, provider: &str, key: &str) -> Option<&ValueCell> {
        self.providers.get(provider)?.defaults.get(key)
    }

    pub fn service_default(&self, service: &str, key: &str) -> Option<&ValueCell> {
        self.services.get(service)?.defaults.get(key)
    }
}

// ===== YAML Deserialization Helpers =====

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProvidersFile {
    #[serde(default)]
    defaults: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    providers: BTreeMap<String, ProviderDef>,
    #[serde(default)]
    services: BTreeMap<String, ServiceDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProviderDef {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    settings: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServiceDef {
    #[serde(default)]
    provider: Option<String>,
    #[serde(default, rename = "type")]
    service_type: Option<String>,
    #[serde(default)]
    settings: BTreeMap<String, serde_yaml::Value>,
}

fn setting_from_yaml(key: &str, value: &serde_yaml::Value) -> Result<SettingValue> {
    use serde_yaml::Value;

    let unsupported = || {
        AccountsError::config(format!(
            "Unsupported value for '{}': expected string, integer, boolean or list of strings",
            key
        ))
    };

    match value {
        Value::String(s) => Ok(SettingValue::String(s.clone())),
        Value::Bool(b) => Ok(SettingValue::Boolean(*b)),
        Value::Number(n) => {
            let v = n.as_i64().ok_or_else(unsupported)?;
            Ok(i32::try_from(v).map_or(SettingValue::Integer64(v), SettingValue::Integer))
        }
        Value::Sequence(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .map(SettingValue::StringList)
            .ok_or_else(unsupported),
        _ => Err(unsupported()),
    }
}
