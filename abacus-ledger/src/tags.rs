use std::sync::Arc;

use abacus_model::Tag;
use abacus_model::TagId;
use abacus_store::MemoryStore;
use abacus_store::State;
use chrono::Utc;
use uuid::Uuid;

use crate::LedgerError;
use crate::LedgerResult;

pub const DEFAULT_TAG_COLOR: &str = "#808080";

/// Free-form labels attachable to any transaction. Tags are global — one
/// namespace across the user's ledgers — and names are unique.
#[derive(Clone)]
pub struct TagEngine {
    store: Arc<MemoryStore>,
}

impl TagEngine {
    #[must_use]
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    pub async fn create_tag(&self, name: &str, color: Option<&str>) -> LedgerResult<Tag> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::Validation("tag name cannot be empty".into()));
        }

        let mut uow = self.store.unit_of_work().await;
        ensure_tag_name_free(&uow, name, None)?;
        let tag = Tag {
            id: Uuid::new_v4(),
            name: name.to_string(),
            color: color.unwrap_or(DEFAULT_TAG_COLOR).to_string(),
            created_at: Utc::now(),
        };
        uow.tags.insert(tag.id, tag.clone());
        uow.commit();
        Ok(tag)
    }

    pub async fn list_tags(&self) -> Vec<Tag> {
        let state = self.store.read().await;
        let mut tags: Vec<Tag> = state.tags.values().cloned().collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        tags
    }

    pub async fn get_tag(&self, tag_id: TagId) -> LedgerResult<Tag> {
        let state = self.store.read().await;
        state
            .tags
            .get(&tag_id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("tag {tag_id}")))
    }

    pub async fn update_tag(
        &self,
        tag_id: TagId,
        name: Option<&str>,
        color: Option<&str>,
    ) -> LedgerResult<Tag> {
        let mut uow = self.store.unit_of_work().await;
        let old = uow
            .tags
            .get(&tag_id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("tag {tag_id}")))?;

        let mut updated = old;
        if let Some(name) = name {
            let name = name.trim();
            if name.is_empty() {
                return Err(LedgerError::Validation("tag name cannot be empty".into()));
            }
            if name != updated.name {
                ensure_tag_name_free(&uow, name, Some(tag_id))?;
            }
            updated.name = name.to_string();
        }
        if let Some(color) = color {
            updated.color = color.to_string();
        }
        uow.tags.insert(tag_id, updated.clone());
        uow.commit();
        Ok(updated)
    }

    /// Deleting a tag detaches it from every transaction that carries it;
    /// the transactions themselves are untouched.
    pub async fn delete_tag(&self, tag_id: TagId) -> LedgerResult<()> {
        let mut uow = self.store.unit_of_work().await;
        if uow.tags.remove(&tag_id).is_none() {
            return Err(LedgerError::NotFound(format!("tag {tag_id}")));
        }
        for tx in uow.transactions.values_mut() {
            tx.tag_ids.retain(|id| *id != tag_id);
        }
        uow.commit();
        Ok(())
    }
}

fn ensure_tag_name_free(state: &State, name: &str, excluding: Option<TagId>) -> LedgerResult<()> {
    let taken = state
        .tags
        .values()
        .any(|tag| tag.name == name && excluding != Some(tag.id));
    if taken {
        Err(LedgerError::Conflict(format!("tag '{name}' already exists")))
    } else {
        Ok(())
    }
}

/// Transactions may only reference tags that exist.
pub(crate) fn ensure_tags_exist(state: &State, tag_ids: &[TagId]) -> LedgerResult<()> {
    for tag_id in tag_ids {
        if !state.tags.contains_key(tag_id) {
            return Err(LedgerError::NotFound(format!("tag {tag_id}")));
        }
    }
    Ok(())
}
