use rollcall_protocol::{Delegate, DelegateId};
use std::collections::HashMap;
use tracing::info;

use crate::error::StoreError;
use crate::store::RosterStore;

/// Session snapshot of the roster, loaded once when the station starts.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    by_id: HashMap<DelegateId, Delegate>,
}

impl Roster {
    pub async fn load(store: &dyn RosterStore) -> Result<Self, StoreError> {
        let delegates = store.list_delegates().await?;
        let roster = Self::from_delegates(delegates);
        info!(delegates = roster.len(), "Roster loaded");
        Ok(roster)
    }

    pub fn from_delegates(delegates: impl IntoIterator<Item = Delegate>) -> Self {
        Self {
            by_id: delegates.into_iter().map(|d| (d.id.clone(), d)).collect(),
        }
    }

    pub fn lookup(&self, id: &DelegateId) -> Option<&Delegate> {
        self.by_id.get(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
