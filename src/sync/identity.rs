use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConstructionError;
use crate::remote::Repository;

/// The remote repository a [`SyncEndpoint`](super::SyncEndpoint) writes to.
///
/// Immutable once built; every field is required.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointIdentity {
    owner_login: String,
    repo_name: String,
    installation_id: String,
}

impl EndpointIdentity {
    pub fn new(
        owner_login: impl Into<String>,
        repo_name: impl Into<String>,
        installation_id: impl Into<String>,
    ) -> Result<Self, ConstructionError> {
        let owner_login = required("owner_login", owner_login.into())?;
        let repo_name = required("repo_name", repo_name.into())?;
        let installation_id = required("installation_id", installation_id.into())?;
        Ok(Self {
            owner_login,
            repo_name,
            installation_id,
        })
    }

    pub fn from_repository(repository: &Repository) -> Result<Self, ConstructionError> {
        Self::new(
            repository.owner_login.clone(),
            repository.name.clone(),
            repository.installation_id.clone(),
        )
    }

    pub fn owner_login(&self) -> &str {
        &self.owner_login
    }

    pub fn repo_name(&self) -> &str {
        &self.repo_name
    }

    pub fn installation_id(&self) -> &str {
        &self.installation_id
    }

    /// Stable key used by stores and the call serializer.
    pub fn storage_key(&self) -> String {
        format!(
            "{}/{}/{}",
            self.installation_id, self.owner_login, self.repo_name
        )
    }
}

impl fmt::Display for EndpointIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner_login, self.repo_name)
    }
}

fn required(field: &'static str, value: String) -> Result<String, ConstructionError> {
    if value.trim().is_empty() {
        Err(ConstructionError::MissingField(field))
    } else {
        Ok(value)
    }
}

/// An endpoint as registered with the engine: the id upstream events target,
/// the adapter that owns it, and where it points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRecord {
    pub id: String,
    pub adapter: String,
    pub identity: EndpointIdentity,
    /// Issue label; the configured default label applies when absent.
    #[serde(default)]
    pub label: Option<String>,
}

impl EndpointRecord {
    pub fn new(
        id: impl Into<String>,
        adapter: impl Into<String>,
        identity: EndpointIdentity,
    ) -> Result<Self, ConstructionError> {
        let id = required("id", id.into())?;
        let adapter = required("adapter", adapter.into())?;
        Ok(Self {
            id,
            adapter,
            identity,
            label: None,
        })
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Endpoint id derived from the repository, as the repository listing
    /// hands them out.
    pub fn from_repository(
        adapter: impl Into<String>,
        repository: &Repository,
    ) -> Result<Self, ConstructionError> {
        let identity = EndpointIdentity::from_repository(repository)?;
        Self::new(identity.storage_key(), adapter, identity)
    }

    pub fn ensure_adapter(&self, expected: &str) -> Result<(), ConstructionError> {
        if self.adapter == expected {
            Ok(())
        } else {
            Err(ConstructionError::AdapterMismatch {
                expected: expected.to_string(),
                actual: self.adapter.clone(),
            })
        }
    }
}
