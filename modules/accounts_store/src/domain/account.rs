//! Account and service model
//!
//! `Account` and `ServiceHandle` are cheap, cloneable handles. The state they
//! point at is owned by the store; once the account is deleted every handle
//! operation fails with `StaleHandle`, so callers re-fetch by id instead of
//! holding on to handles across a delete.

use super::auth::{AuthData, CREDENTIALS_ID_KEY, MECHANISM_KEY, METHOD_KEY};
use super::providers::ProviderRegistry;
use super::resolution::{Resolved, Resolver};
use super::store::StoreShared;
use super::table::{SettingsKeys, SettingsTable};
use super::value::ValueCell;
use crate::contract::{
    AccountFilter, AccountId, AccountState, AccountsError, Result, SettingSource, SettingType,
    SettingValue,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A named service binding under an account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub(crate) name: String,
    pub(crate) provider_type: String,
    pub(crate) enabled: bool,
    pub(crate) settings: SettingsTable,
}

impl Service {
    /// New bindings start disabled with an empty table
    pub fn new(name: impl Into<String>, provider_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider_type: provider_type.into(),
            enabled: false,
            settings: SettingsTable::new(),
        }
    }
}

/// Mutable state of one account, guarded by the account's lock
#[derive(Debug, Clone)]
pub struct AccountData {
    pub(crate) provider: String,
    pub(crate) state: AccountState,
    pub(crate) display_name: Option<String>,
    pub(crate) enabled: bool,
    pub(crate) settings: SettingsTable,
    pub(crate) services: BTreeMap<String, Service>,
    /// Bumped on every mutation; equal to `saved_revision` when clean
    pub(crate) revision: u64,
    pub(crate) saved_revision: u64,
    /// Uncommitted keys and services, with the revision of their latest change
    pub(crate) changed_keys: BTreeMap<String, u64>,
    pub(crate) changed_services: BTreeMap<String, u64>,
}

impl AccountData {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            state: AccountState::Unsaved,
            display_name: None,
            enabled: false,
            settings: SettingsTable::new(),
            services: BTreeMap::new(),
            revision: 0,
            saved_revision: 0,
            changed_keys: BTreeMap::new(),
            changed_services: BTreeMap::new(),
        }
    }

    pub(crate) fn ensure_live(&self, account_id: AccountId) -> Result<()> {
        if self.state == AccountState::Deleted {
            return Err(AccountsError::StaleHandle { account_id });
        }
        Ok(())
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.revision != self.saved_revision
    }

    fn touch(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    fn touch_key(&mut self, key: &str) {
        let revision = self.touch();
        self.changed_keys.insert(key.to_string(), revision);
    }

    fn touch_service(&mut self, service: &str, key: Option<&str>) {
        let revision = self.touch();
        self.changed_services.insert(service.to_string(), revision);
        if let Some(key) = key {
            self.changed_keys.insert(key.to_string(), revision);
        }
    }

    /// Record a successful save of `revision`; later changes stay pending
    pub(crate) fn mark_saved(&mut self, revision: u64) {
        self.state = AccountState::Saved;
        self.saved_revision = revision;
        self.changed_keys.retain(|_, changed| *changed > revision);
        self.changed_services.retain(|_, changed| *changed > revision);
    }

    fn service_mut(&mut self, name: &str) -> &mut Service {
        let provider = &self.provider;
        self.services
            .entry(name.to_string())
            .or_insert_with(|| Service::new(name, provider.clone()))
    }

    pub(crate) fn matches(&self, filter: &AccountFilter, providers: &ProviderRegistry) -> bool {
        if self.state == AccountState::Deleted {
            return false;
        }
        if filter
            .provider
            .as_deref()
            .is_some_and(|provider| provider != self.provider)
        {
            return false;
        }
        if filter.enabled.is_some_and(|enabled| enabled != self.enabled) {
            return false;
        }
        if filter
            .service_type
            .as_deref()
            .is_some_and(|service_type| !providers.supports_service_type(&self.provider, service_type))
        {
            return false;
        }
        match filter.service.as_deref() {
            Some(name) => self.services.get(name).is_some_and(|svc| svc.enabled),
            None => true,
        }
    }
}

/// Store-owned slot for one account
pub(crate) struct AccountEntry {
    pub(crate) id: AccountId,
    pub(crate) data: RwLock<AccountData>,
    /// Serializes commit and delete so events for one account keep commit order
    pub(crate) commit_lock: tokio::sync::Mutex<()>,
}

impl AccountEntry {
    pub(crate) fn new(id: AccountId, data: AccountData) -> Self {
        Self {
            id,
            data: RwLock::new(data),
            commit_lock: tokio::sync::Mutex::new(()),
        }
    }
}

/// Handle to an account owned by an `AccountStore`
#[derive(Clone)]
pub struct Account {
    entry: Arc<AccountEntry>,
    store: Arc<StoreShared>,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.entry.id)
            .field("state", &self.state())
            .finish()
    }
}

impl Account {
    pub(crate) fn new(entry: Arc<AccountEntry>, store: Arc<StoreShared>) -> Self {
        Self { entry, store }
    }

    pub(crate) fn entry(&self) -> &Arc<AccountEntry> {
        &self.entry
    }

    pub(crate) fn belongs_to(&self, store: &Arc<StoreShared>) -> bool {
        Arc::ptr_eq(&self.store, store)
    }

    fn read<R>(&self, f: impl FnOnce(&AccountData) -> Result<R>) -> Result<R> {
        let data = self.entry.data.read();
        data.ensure_live(self.entry.id)?;
        f(&data)
    }

    fn write<R>(&self, f: impl FnOnce(&mut AccountData) -> Result<R>) -> Result<R> {
        let mut data = self.entry.data.write();
        data.ensure_live(self.entry.id)?;
        f(&mut data)
    }

    pub fn id(&self) -> AccountId {
        self.entry.id
    }

    pub fn provider(&self) -> String {
        self.entry.data.read().provider.clone()
    }

    pub fn state(&self) -> AccountState {
        self.entry.data.read().state
    }

    /// Whether there are changes not yet committed
    pub fn is_dirty(&self) -> Result<bool> {
        self.read(|data| Ok(data.is_dirty()))
    }

    pub fn display_name(&self) -> Result<Option<String>> {
        self.read(|data| Ok(data.display_name.clone()))
    }

    pub fn set_display_name(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.write(|data| {
            if data.display_name.as_deref() != Some(name.as_str()) {
                data.display_name = Some(name);
                data.touch();
            }
            Ok(())
        })
    }

    pub fn is_enabled(&self) -> Result<bool> {
        self.read(|data| Ok(data.enabled))
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.write(|data| {
            if data.enabled != enabled {
                data.enabled = enabled;
                data.touch();
            }
            Ok(())
        })
    }

    // ===== Settings =====

    /// Effective value of `key` at account scope, or `default` if no layer defines it
    pub fn get_typed<T: SettingType>(&self, key: &str, default: T) -> Result<T> {
        Ok(self.resolve(key, default)?.value)
    }

    /// Like `get_typed`, also reporting which layer supplied the value
    pub fn resolve<T: SettingType>(&self, key: &str, default: T) -> Result<Resolved<T>> {
        self.store.validate_key(key)?;
        self.read(|data| {
            let overrides = self.store.overrides.read();
            Resolver::new(&self.store.providers, &overrides).resolve(data, None, key, default)
        })
    }

    pub fn get_string(&self, key: &str, default: &str) -> Result<String> {
        self.get_typed(key, default.to_string())
    }

    pub fn get_int(&self, key: &str, default: i64) -> Result<i64> {
        self.get_typed(key, default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        self.get_typed(key, default)
    }

    /// Raw cell stored in the account table, without consulting other layers
    pub fn get_value(&self, key: &str) -> Result<Option<ValueCell>> {
        self.read(|data| Ok(data.settings.get(key).cloned()))
    }

    /// Write `key` at account scope
    pub fn set_typed(&self, key: &str, value: impl Into<SettingValue>) -> Result<()> {
        self.set_value(key, value, SettingSource::Account)
    }

    /// Write `key` into the account table with an explicit source
    pub fn set_value(
        &self,
        key: &str,
        value: impl Into<SettingValue>,
        source: SettingSource,
    ) -> Result<()> {
        self.store.validate_key(key)?;
        let cell = ValueCell::new(value, source)?;
        self.write(|data| {
            data.settings.set(key, cell);
            data.touch_key(key);
            Ok(())
        })
    }

    /// Returns whether the key was present
    pub fn remove_value(&self, key: &str) -> Result<bool> {
        self.store.validate_key(key)?;
        self.write(|data| {
            let removed = data.settings.remove(key);
            if removed {
                data.touch_key(key);
            }
            Ok(removed)
        })
    }

    /// Keys of the account table, optionally restricted to a prefix
    pub fn settings_keys(&self, prefix: Option<&str>) -> Result<SettingsKeys> {
        self.read(|data| {
            Ok(match prefix {
                Some(prefix) => data.settings.keys_with_prefix(prefix),
                None => data.settings.keys(),
            })
        })
    }

    /// Every key visible at account scope (or at `service` scope), resolved
    pub fn effective_settings(
        &self,
        service: Option<&str>,
        prefix: Option<&str>,
    ) -> Result<SettingsTable> {
        self.read(|data| {
            let overrides = self.store.overrides.read();
            Ok(Resolver::new(&self.store.providers, &overrides)
                .effective_settings(data, service, prefix))
        })
    }

    // ===== Services =====

    /// Handle to the named service, creating a disabled binding if absent
    ///
    /// Creating the binding does not mark the account dirty.
    pub fn service(&self, name: &str) -> Result<ServiceHandle> {
        super::validation::validate_name("service", name)?;
        self.write(|data| {
            data.service_mut(name);
            Ok(())
        })?;
        Ok(ServiceHandle {
            account: self.clone(),
            name: name.to_string(),
        })
    }

    pub fn enable_service(&self, name: &str) -> Result<()> {
        self.service(name)?.set_enabled(true)
    }

    pub fn disable_service(&self, name: &str) -> Result<()> {
        self.service(name)?.set_enabled(false)
    }

    pub fn list_services(&self) -> Result<Vec<String>> {
        self.read(|data| Ok(data.services.keys().cloned().collect()))
    }

    /// Service templates of `service_type` available to this account's provider
    pub fn list_services_by_type(&self, service_type: &str) -> Result<Vec<String>> {
        self.read(|data| {
            Ok(self
                .store
                .providers
                .services_of_type(&data.provider, service_type)
                .into_iter()
                .map(str::to_string)
                .collect())
        })
    }

    pub fn supports_service_type(&self, service_type: &str) -> Result<bool> {
        self.read(|data| {
            Ok(self
                .store
                .providers
                .supports_service_type(&data.provider, service_type))
        })
    }

    pub fn list_enabled_services(&self) -> Result<Vec<String>> {
        self.read(|data| {
            Ok(data
                .services
                .values()
                .filter(|svc| svc.enabled)
                .map(|svc| svc.name.clone())
                .collect())
        })
    }

    // ===== Lifecycle =====

    /// Persist this account; assigns the `Saved` state on success
    pub async fn commit(&self) -> Result<()> {
        self.store.commit_entry(&self.entry).await
    }

    /// Delete this account; the handle is stale afterwards
    pub async fn delete(&self) -> Result<()> {
        self.store.delete_entry(&self.entry).await
    }
}

/// Handle to one service binding of an account
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    account: Account,
    name: String,
}

impl ServiceHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn provider_type(&self) -> Result<String> {
        self.account.read(|data| {
            Ok(data
                .services
                .get(&self.name)
                .map_or_else(|| data.provider.clone(), |svc| svc.provider_type.clone()))
        })
    }

    pub fn is_enabled(&self) -> Result<bool> {
        self.account
            .read(|data| Ok(data.services.get(&self.name).is_some_and(|svc| svc.enabled)))
    }

    pub fn enable(&self) -> Result<()> {
        self.set_enabled(true)
    }

    pub fn disable(&self) -> Result<()> {
        self.set_enabled(false)
    }

    fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.account.write(|data| {
            let svc = data.service_mut(&self.name);
            if svc.enabled != enabled {
                svc.enabled = enabled;
                data.touch_service(&self.name, None);
            }
            Ok(())
        })
    }

    /// Effective value of `key` at this service's scope
    pub fn get_typed<T: SettingType>(&self, key: &str, default: T) -> Result<T> {
        Ok(self.resolve(key, default)?.value)
    }

    pub fn resolve<T: SettingType>(&self, key: &str, default: T) -> Result<Resolved<T>> {
        let store = &self.account.store;
        store.validate_key(key)?;
        self.account.read(|data| {
            let overrides = store.overrides.read();
            Resolver::new(&store.providers, &overrides).resolve(
                data,
                Some(self.name.as_str()),
                key,
                default,
            )
        })
    }

    pub fn get_string(&self, key: &str, default: &str) -> Result<String> {
        self.get_typed(key, default.to_string())
    }

    pub fn get_int(&self, key: &str, default: i64) -> Result<i64> {
        self.get_typed(key, default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        self.get_typed(key, default)
    }

    /// Raw cell stored in this service's table
    pub fn get_value(&self, key: &str) -> Result<Option<ValueCell>> {
        self.account.read(|data| {
            Ok(data
                .services
                .get(&self.name)
                .and_then(|svc| svc.settings.get(key).cloned()))
        })
    }

    /// Write `key` at service scope with `SettingSource::ServiceOverride`
    pub fn set_typed(&self, key: &str, value: impl Into<SettingValue>) -> Result<()> {
        self.set_value(key, value, SettingSource::ServiceOverride)
    }

    pub fn set_value(
        &self,
        key: &str,
        value: impl Into<SettingValue>,
        source: SettingSource,
    ) -> Result<()> {
        self.account.store.validate_key(key)?;
        let cell = ValueCell::new(value, source)?;
        self.account.write(|data| {
            data.service_mut(&self.name).settings.set(key, cell);
            data.touch_service(&self.name, Some(key));
            Ok(())
        })
    }

    pub fn remove_value(&self, key: &str) -> Result<bool> {
        self.account.store.validate_key(key)?;
        self.account.write(|data| {
            let removed = data.service_mut(&self.name).settings.remove(key);
            if removed {
                data.touch_service(&self.name, Some(key));
            }
            Ok(removed)
        })
    }

    pub fn settings_keys(&self, prefix: Option<&str>) -> Result<SettingsKeys> {
        self.account.read(|data| {
            let table = data
                .services
                .get(&self.name)
                .map(|svc| svc.settings.clone())
                .unwrap_or_default();
            Ok(match prefix {
                Some(prefix) => table.keys_with_prefix(prefix),
                None => table.keys(),
            })
        })
    }

    pub fn effective_settings(&self, prefix: Option<&str>) -> Result<SettingsTable> {
        self.account.effective_settings(Some(self.name.as_str()), prefix)
    }

    /// Authentication data for this service, or `None` without a method and mechanism
    ///
    /// Credentials id, method and mechanism fall back from the service to the
    /// account. Parameters under `auth.<method>.<mechanism>.` are read at account
    /// scope first, then overridden by the service's own values; the returned
    /// keys have that prefix stripped.
    pub fn auth_data(&self) -> Result<Option<AuthData>> {
        let store = &self.account.store;
        let service = Some(self.name.as_str());
        self.account.read(|data| {
            let overrides = store.overrides.read();
            let resolver = Resolver::new(&store.providers, &overrides);

            let method = resolver.resolve(data, service, METHOD_KEY, String::new())?;
            let mechanism = resolver.resolve(data, service, MECHANISM_KEY, String::new())?;
            if method.source == SettingSource::None || mechanism.source == SettingSource::None {
                return Ok(None);
            }
            let credentials_id = resolver
                .resolve(data, service, CREDENTIALS_ID_KEY, 0i64)?
                .value;

            let mut auth = AuthData::new(credentials_id, method.value, mechanism.value)?;
            let prefix = auth.parameters_prefix();
            for scope in [None, service] {
                let table = resolver.effective_settings(data, scope, Some(prefix.as_str()));
                for key in table.keys_with_prefix(prefix.as_str()).iter() {
                    if let Some(value) = table.get(key).and_then(ValueCell::value) {
                        auth.insert_parameter(&key[prefix.len()..], value.clone());
                    }
                }
            }
            Ok(Some(auth))
        })
    }
}
