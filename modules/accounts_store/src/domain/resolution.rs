//! Resolution engine - effective value of a key across precedence layers
//!
//! Lookup order, first hit wins:
//! 1. application override for (service, key)
//! 2. service table entry with source >= ServiceOverride
//! 3. account table entry
//! 4. lower-source service entries, then the service template default
//! 5. provider default for the account's provider type
//! 6. global default
//!
//! Nothing found means the caller's default with `SettingSource::None`.

use super::account::AccountData;
use super::providers::ProviderRegistry;
use super::table::SettingsTable;
use super::value::ValueCell;
use crate::contract::{AccountsError, Result, SettingSource, SettingType, SettingValue};
use std::collections::{BTreeSet, HashMap};

/// Application-level overrides keyed by service, then key
#[derive(Debug, Clone, Default)]
pub struct ApplicationOverrides {
    by_service: HashMap<String, SettingsTable>,
}

impl ApplicationOverrides {
    pub fn get(&self, service: &str, key: &str) -> Option<&ValueCell> {
        self.by_service.get(service)?.get(key)
    }

    pub fn set(&mut self, service: &str, key: &str, value: SettingValue) -> Result<()> {
        let cell = ValueCell::new(value, SettingSource::Application)?;
        self.by_service
            .entry(service.to_string())
            .or_default()
            .set(key, cell);
        Ok(())
    }

    pub fn remove(&mut self, service: &str, key: &str) -> bool {
        self.by_service
            .get_mut(service)
            .is_some_and(|table| table.remove(key))
    }

    fn table(&self, service: &str) -> Option<&SettingsTable> {
        self.by_service.get(service)
    }
}

/// A resolved value together with the layer that supplied it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    pub value: T,
    pub source: SettingSource,
}

/// Walks the precedence chain for one account
pub struct Resolver<'a> {
    providers: &'a ProviderRegistry,
    overrides: &'a ApplicationOverrides,
}

impl<'a> Resolver<'a> {
    pub fn new(providers: &'a ProviderRegistry, overrides: &'a ApplicationOverrides) -> Self {
        Self {
            providers,
            overrides,
        }
    }

    /// First defined cell for `key`, or an unset cell
    pub fn lookup(&self, account: &AccountData, service: Option<&str>, key: &str) -> ValueCell {
        let bound = service.and_then(|name| account.services.get(name));

        if let Some(name) = service {
            if let Some(cell) = self.overrides.get(name, key) {
                return cell.clone();
            }
        }

        if let Some(cell) = bound
            .and_then(|svc| svc.settings.get(key))
            .filter(|cell| cell.source() >= SettingSource::ServiceOverride)
        {
            return cell.clone();
        }

        if let Some(cell) = account.settings.get(key) {
            return cell.clone();
        }

        if let Some(name) = service {
            if let Some(cell) = bound.and_then(|svc| svc.settings.get(key)) {
                return cell.clone();
            }
            if let Some(cell) = self.providers.service_default(name, key) {
                return cell.with_source(SettingSource::ServiceTemplate);
            }
        }

        if let Some(cell) = self.providers.provider_default(&account.provider, key) {
            return cell.with_source(SettingSource::AccountDefault);
        }

        self.providers
            .global_default(key)
            .map_or_else(ValueCell::unset, |cell| cell.with_source(SettingSource::Default))
    }

    /// Resolve `key` as `T`, falling back to `default` when no layer defines it
    ///
    /// A value present under another kind is a `TypeMismatch`, never the default.
    pub fn resolve<T: SettingType>(
        &self,
        account: &AccountData,
        service: Option<&str>,
        key: &str,
        default: T,
    ) -> Result<Resolved<T>> {
        let cell = self.lookup(account, service, key);
        let Some(value) = cell.read(key, T::KIND)? else {
            return Ok(Resolved {
                value: default,
                source: SettingSource::None,
            });
        };

        let found = value.kind();
        let value = T::from_setting(value).ok_or_else(|| AccountsError::TypeMismatch {
            key: key.to_string(),
            expected: T::KIND,
            found,
        })?;

        Ok(Resolved {
            value,
            source: cell.source(),
        })
    }

    /// Merged view of every layer for one scope, each key resolved as `lookup` would
    pub fn effective_settings(
        &self,
        account: &AccountData,
        service: Option<&str>,
        prefix: Option<&str>,
    ) -> SettingsTable {
        let mut keys: BTreeSet<&str> = BTreeSet::new();

        keys.extend(self.providers.global_defaults().iter().map(|(k, _)| k));
        if let Some(provider) = self.providers.provider(&account.provider) {
            keys.extend(provider.defaults.iter().map(|(k, _)| k));
        }
        keys.extend(account.settings.iter().map(|(k, _)| k));

        if let Some(name) = service {
            if let Some(template) = self.providers.service_template(name) {
                keys.extend(template.defaults.iter().map(|(k, _)| k));
            }
            if let Some(svc) = account.services.get(name) {
                keys.extend(svc.settings.iter().map(|(k, _)| k));
            }
            if let Some(table) = self.overrides.table(name) {
                keys.extend(table.iter().map(|(k, _)| k));
            }
        }

        keys.into_iter()
            .filter(|key| prefix.map_or(true, |p| key.starts_with(p)))
            .map(|key| (key.to_string(), self.lookup(account, service, key)))
            .collect()
    }
}
