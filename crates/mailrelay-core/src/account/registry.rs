//! In-memory account registry.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use serde_json::Value;
use tracing::{debug, error};

use super::model::AccountConfig;
use crate::{Error, Result};

/// Named SMTP accounts keyed by login, plus the default account name.
///
/// Filled once at startup and read on every send request. Shared read-only
/// behind an `Arc` afterwards, so no locking is involved.
#[derive(Debug, Clone, Default)]
pub struct AccountRegistry {
    accounts: HashMap<String, AccountConfig>,
    default_login: String,
}

impl AccountRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an account from the fields of an account file.
    ///
    /// Failures are logged at error level and leave the registry untouched.
    /// Returns whether the account was registered.
    pub fn add_account(&mut self, fields: Value) -> bool {
        match self.try_add_account(fields) {
            Ok(_) => true,
            Err(e) => {
                error!("add_account: {e}");
                false
            }
        }
    }

    /// Registers an account from the fields of an account file.
    ///
    /// The first account added becomes the default unless one is already
    /// set. An existing account with the same login is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `fields` is not an object, has no
    /// `login`, or does not describe a valid account.
    pub fn try_add_account(&mut self, fields: Value) -> Result<&AccountConfig> {
        let Value::Object(map) = fields else {
            return Err(Error::Config("account definition must be a JSON object".into()));
        };
        if !map.contains_key("login") {
            return Err(Error::Config("account definition has no login value".into()));
        }

        let config: AccountConfig = serde_json::from_value(Value::Object(map))
            .map_err(|e| Error::Config(format!("invalid account definition: {e}")))?;
        self.insert(config)
    }

    /// Registers an already-typed account, with the same rules as
    /// [`try_add_account`](Self::try_add_account).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the account fails validation.
    pub fn insert(&mut self, config: AccountConfig) -> Result<&AccountConfig> {
        config.validate()?;

        if self.default_login.is_empty() {
            self.default_login.clone_from(&config.login);
        }

        match self.accounts.entry(config.login.clone()) {
            Entry::Occupied(mut slot) => {
                debug!(login = %config.login, "replaced existing account");
                slot.insert(config);
                Ok(slot.into_mut())
            }
            Entry::Vacant(slot) => Ok(slot.insert(config)),
        }
    }

    /// Name an account request resolves to: `account` itself, or the
    /// default login when `account` is empty.
    #[must_use]
    pub fn resolve_name<'a>(&'a self, account: &'a str) -> &'a str {
        if account.is_empty() {
            &self.default_login
        } else {
            account
        }
    }

    /// Looks up an account, substituting the default for an empty name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownAccount`] if nothing is registered under the
    /// resolved name.
    pub fn resolve(&self, account: &str) -> Result<&AccountConfig> {
        let name = self.resolve_name(account);
        self.accounts
            .get(name)
            .ok_or_else(|| Error::UnknownAccount(name.to_string()))
    }

    /// Looks up an account like [`resolve`](Self::resolve), logging a miss at
    /// error level instead of returning it.
    #[must_use]
    pub fn get_config(&self, account: &str) -> Option<&AccountConfig> {
        self.resolve(account)
            .inspect_err(|e| error!("{e}"))
            .ok()
    }

    /// Name of the default account (empty when none is set).
    #[must_use]
    pub fn default_login(&self) -> &str {
        &self.default_login
    }

    /// Overrides the default account.
    ///
    /// The name is not checked against the registered accounts; an unknown
    /// name only fails later lookups.
    pub fn set_default_login(&mut self, login: impl Into<String>) {
        self.default_login = login.into();
    }

    /// Number of registered accounts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Returns true if no account is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Registered logins, sorted.
    #[must_use]
    pub fn logins(&self) -> Vec<&str> {
        let mut logins: Vec<&str> = self.accounts.keys().map(String::as_str).collect();
        logins.sort_unstable();
        logins
    }
}
