use std::sync::Arc;

use abacus_model::Channel;
use abacus_model::ChannelBinding;
use abacus_model::ChannelBindingId;
use abacus_model::LedgerId;
use abacus_model::UserId;
use abacus_store::MemoryStore;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::AuthError;
use crate::AuthResult;
use crate::otp::OtpStore;

/// Channel-binding lifecycle: a user generates a short-lived code in the
/// app, types it into the chat channel, and the channel adapter verifies
/// it on behalf of the still-anonymous chat identity.
#[derive(Clone)]
pub struct ChannelBindingEngine {
    store: Arc<MemoryStore>,
    otp: Arc<OtpStore>,
}

impl ChannelBindingEngine {
    #[must_use]
    pub fn new(store: Arc<MemoryStore>, otp: Arc<OtpStore>) -> Self {
        Self { store, otp }
    }

    pub async fn generate_code(
        &self,
        user_id: UserId,
        channel: Channel,
        default_ledger_id: Option<LedgerId>,
    ) -> AuthResult<String> {
        if let Some(ledger_id) = default_ledger_id {
            let state = self.store.read().await;
            let owned = state
                .ledgers
                .get(&ledger_id)
                .is_some_and(|ledger| ledger.user_id == user_id);
            if !owned {
                return Err(AuthError::NotFound(format!("ledger {ledger_id}")));
            }
        }
        Ok(self.otp.issue(user_id, channel, default_ledger_id))
    }

    /// Consumes the code on first lookup. Rejects expired or unknown codes
    /// and external identities that already hold an active binding on the
    /// same channel.
    pub async fn verify_code(
        &self,
        code: &str,
        external_user_id: &str,
        display_name: Option<&str>,
    ) -> AuthResult<ChannelBinding> {
        let entry = self.otp.take(code).ok_or(AuthError::Unauthorized)?;

        let mut uow = self.store.unit_of_work().await;
        let already_bound = uow.channel_bindings.values().any(|binding| {
            binding.is_active
                && binding.channel == entry.channel
                && binding.external_user_id == external_user_id
        });
        if already_bound {
            return Err(AuthError::Conflict(format!(
                "{} identity is already bound",
                entry.channel
            )));
        }

        let binding = ChannelBinding {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            channel: entry.channel,
            external_user_id: external_user_id.to_string(),
            display_name: display_name.map(str::to_string),
            default_ledger_id: entry.default_ledger_id,
            is_active: true,
            created_at: Utc::now(),
            last_used_at: None,
            unbound_at: None,
        };
        uow.channel_bindings.insert(binding.id, binding.clone());
        uow.commit();
        info!(binding_id = %binding.id, channel = %binding.channel, "bound channel identity");
        Ok(binding)
    }

    /// Soft delete; the row stays with `unbound_at` set so history survives.
    pub async fn unbind(&self, user_id: UserId, binding_id: ChannelBindingId) -> AuthResult<()> {
        let mut uow = self.store.unit_of_work().await;
        let binding = uow
            .channel_bindings
            .get_mut(&binding_id)
            .filter(|binding| binding.user_id == user_id && binding.is_active)
            .ok_or_else(|| AuthError::NotFound(format!("binding {binding_id}")))?;
        binding.is_active = false;
        binding.unbound_at = Some(Utc::now());
        uow.commit();
        Ok(())
    }

    pub async fn list_bindings(
        &self,
        user_id: UserId,
        include_inactive: bool,
    ) -> Vec<ChannelBinding> {
        let state = self.store.read().await;
        let mut bindings: Vec<ChannelBinding> = state
            .channel_bindings
            .values()
            .filter(|binding| binding.user_id == user_id)
            .filter(|binding| include_inactive || binding.is_active)
            .cloned()
            .collect();
        bindings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        bindings
    }

    /// Resolve the acting user for an incoming chat message; a hit stamps
    /// `last_used_at`.
    pub async fn lookup_binding(
        &self,
        channel: Channel,
        external_user_id: &str,
    ) -> Option<ChannelBinding> {
        let mut uow = self.store.unit_of_work().await;
        let id = uow
            .channel_bindings
            .values()
            .find(|binding| {
                binding.is_active
                    && binding.channel == channel
                    && binding.external_user_id == external_user_id
            })
            .map(|binding| binding.id)?;
        let binding = uow.channel_bindings.get_mut(&id)?;
        binding.last_used_at = Some(Utc::now());
        let resolved = binding.clone();
        uow.commit();
        Some(resolved)
    }
}
