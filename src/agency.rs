//! Agency lookup used to print the agency name on page one.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::StoreError;

/// Printed when the agency cannot be found or its lookup fails.
pub const UNKNOWN_AGENCY: &str = "Agence inconnue";

#[async_trait]
pub trait AgencyDirectory: Send + Sync {
    /// `Ok(None)` when no agency carries this id.
    async fn agency_name(&self, agency_id: &str) -> Result<Option<String>, StoreError>;
}

/// Resolves the display name, degrading to [`UNKNOWN_AGENCY`] on a missing
/// record, a blank name, or a failed lookup.
pub async fn display_name(directory: &dyn AgencyDirectory, agency_id: &str) -> String {
    match directory.agency_name(agency_id).await {
        Ok(Some(name)) if !name.trim().is_empty() => name,
        Ok(_) => {
            warn!(agency_id, "agency not found, using placeholder name");
            UNKNOWN_AGENCY.to_string()
        }
        Err(err) => {
            warn!(agency_id, error = %err, "agency lookup failed, using placeholder name");
            UNKNOWN_AGENCY.to_string()
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryAgencyDirectory {
    names: RwLock<HashMap<String, String>>,
}

impl MemoryAgencyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, agency_id: impl Into<String>, name: impl Into<String>) {
        self.names.write().await.insert(agency_id.into(), name.into());
    }
}

impl<K, V> FromIterator<(K, V)> for MemoryAgencyDirectory
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            names: RwLock::new(
                iter.into_iter()
                    .map(|(id, name)| (id.into(), name.into()))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl AgencyDirectory for MemoryAgencyDirectory {
    async fn agency_name(&self, agency_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.names.read().await.get(agency_id).cloned())
    }
}
