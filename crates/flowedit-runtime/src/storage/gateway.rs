#![forbid(unsafe_code)]

//! Typed access to the current-state slot and the drafts collection.

use flowedit_core::FlowState;
use tracing::debug;

use super::{CURRENT_STATE_KEY, KeyValueStore, StorageError, StoreName, check_key};

/// [`FlowState`]-level operations over a [`KeyValueStore`].
///
/// Values are stored as JSON. Reads validate the flow shape, so a record
/// that is not a flow comes back as [`StorageError::Serialization`].
#[derive(Debug, Clone)]
pub struct PersistenceGateway<S> {
    backend: S,
}

impl<S: KeyValueStore> PersistenceGateway<S> {
    #[must_use]
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    #[must_use]
    pub fn backend(&self) -> &S {
        &self.backend
    }

    // ====================================================================
    // Current state
    // ====================================================================

    /// Overwrite the current-state slot.
    pub async fn save_current(&self, flow: &FlowState) -> Result<(), StorageError> {
        let bytes = encode(flow)?;
        self.backend
            .put(StoreName::Flow, CURRENT_STATE_KEY, bytes)
            .await
    }

    /// Read the current-state slot.
    pub async fn load_current(&self) -> Result<Option<FlowState>, StorageError> {
        match self.backend.get(StoreName::Flow, CURRENT_STATE_KEY).await? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Empty the current-state slot.
    pub async fn clear_current(&self) -> Result<(), StorageError> {
        self.backend
            .delete(StoreName::Flow, CURRENT_STATE_KEY)
            .await
    }

    // ====================================================================
    // Drafts
    // ====================================================================

    /// Save `flow` under `name`, overwriting any draft with that name.
    pub async fn save_draft(&self, name: &str, flow: &FlowState) -> Result<(), StorageError> {
        check_key(name)?;
        let bytes = encode(flow)?;
        self.backend.put(StoreName::Drafts, name, bytes).await?;
        debug!(name, "draft saved");
        Ok(())
    }

    /// Read the draft named `name`.
    pub async fn load_draft(&self, name: &str) -> Result<Option<FlowState>, StorageError> {
        match self.backend.get(StoreName::Drafts, name).await? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Draft names in ascending order.
    pub async fn list_drafts(&self) -> Result<Vec<String>, StorageError> {
        let keys = self.backend.get_all_keys(StoreName::Drafts).await?;
        Ok(keys.into_iter().collect())
    }

    pub async fn delete_draft(&self, name: &str) -> Result<(), StorageError> {
        self.backend.delete(StoreName::Drafts, name).await?;
        debug!(name, "draft deleted");
        Ok(())
    }

    /// Move a draft to a new name in one transaction.
    pub async fn rename_draft(&self, from: &str, to: &str) -> Result<(), StorageError> {
        check_key(to)?;
        self.backend.rename(StoreName::Drafts, from, to).await?;
        debug!(from, to, "draft renamed");
        Ok(())
    }

    pub async fn draft_exists(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.backend.get(StoreName::Drafts, name).await?.is_some())
    }
}

fn encode(flow: &FlowState) -> Result<Vec<u8>, StorageError> {
    Ok(serde_json::to_vec(flow)?)
}

fn decode(bytes: &[u8]) -> Result<FlowState, StorageError> {
    let text =
        std::str::from_utf8(bytes).map_err(|e| StorageError::Serialization(e.to_string()))?;
    FlowState::from_json_str(text).map_err(|e| StorageError::Serialization(e.to_string()))
}
