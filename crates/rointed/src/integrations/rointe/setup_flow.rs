//! Interactive setup for a Rointe account.
//!
//! Logs in, resolves the account's local id, lists its installations and
//! produces the `[integrations.rointe]` table for the chosen one.

use serde::Serialize;
use tracing::debug;

use super::api::ApiError;
use super::api::InstallationSummary;
use super::api::RointeApi;

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("invalid username or password")]
    InvalidAuth,

    #[error("cannot connect to the Rointe cloud: {0}")]
    CannotConnect(String),

    #[error("installation {0} is not on this account")]
    UnknownInstallation(String),

    #[error("this account has no installations")]
    NoInstallations,
}

impl From<ApiError> for SetupError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Authentication(_) => SetupError::InvalidAuth,
            other => SetupError::CannotConnect(other.to_string()),
        }
    }
}

/// Persisted entry configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub username: String,
    pub password: String,
    pub installation: String,
    pub local_id: String,
}

#[derive(Serialize)]
struct EntryFile<'a> {
    integrations: EntryTable<'a>,
}

#[derive(Serialize)]
struct EntryTable<'a> {
    rointe: &'a Entry,
}

impl Entry {
    /// The entry as a config file fragment
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(&EntryFile {
            integrations: EntryTable { rointe: self },
        })
    }
}

/// First step: credentials
pub struct SetupFlow<A: RointeApi> {
    api: A,
    username: String,
    password: String,
}

/// Second step: the account is valid, pick an installation
#[derive(Debug)]
pub struct InstallationStep {
    username: String,
    password: String,
    pub local_id: String,
    pub installations: Vec<InstallationSummary>,
}

impl<A: RointeApi> SetupFlow<A> {
    pub fn new(api: A, username: &str, password: &str) -> Self {
        Self {
            api,
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    pub async fn login(mut self) -> Result<InstallationStep, SetupError> {
        self.api.initialize_authentication().await?;
        if !self.api.is_logged_in() {
            return Err(SetupError::InvalidAuth);
        }

        let local_id = self.api.get_local_id().await?;
        let installations = self.api.get_installations(&local_id).await?;
        debug!(
            "[rointe] Account {} has {} installation(s)",
            local_id,
            installations.len()
        );

        Ok(InstallationStep {
            username: self.username,
            password: self.password,
            local_id,
            installations,
        })
    }
}

impl InstallationStep {
    /// The installation to use when none was named.
    ///
    /// `Ok(None)` when the account has several and the user has to pick one.
    pub fn sole_installation(&self) -> Result<Option<&InstallationSummary>, SetupError> {
        match self.installations.as_slice() {
            [] => Err(SetupError::NoInstallations),
            [only] => Ok(Some(only)),
            _ => Ok(None),
        }
    }

    pub fn select(self, installation: &str) -> Result<Entry, SetupError> {
        if !self.installations.iter().any(|i| i.id == installation) {
            return Err(SetupError::UnknownInstallation(installation.to_string()));
        }

        debug!("[rointe] Setup completed for installation [{}]", installation);
        Ok(Entry {
            username: self.username,
            password: self.password,
            installation: installation.to_string(),
            local_id: self.local_id,
        })
    }
}
