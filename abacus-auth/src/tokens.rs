use std::sync::Arc;

use abacus_crypto::constant_time_eq;
use abacus_crypto::generate_secret;
use abacus_crypto::token_digest;
use abacus_model::ApiToken;
use abacus_model::ApiTokenId;
use abacus_model::User;
use abacus_model::UserId;
use abacus_store::MemoryStore;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::AuthError;
use crate::AuthResult;

/// Raw tokens look like `abk_` followed by 48 alphanumerics.
pub const TOKEN_PREFIX: &str = "abk_";
pub const TOKEN_BODY_LENGTH: usize = 48;
pub const MAX_TOKENS_PER_USER: usize = 10;

/// The raw secret rides along exactly once, at creation. Everything
/// persisted afterwards is the digest and a display prefix.
#[derive(Debug, Clone)]
pub struct TokenCreateResult {
    pub token: ApiToken,
    pub raw_token: String,
}

#[derive(Clone)]
pub struct ApiTokenEngine {
    store: Arc<MemoryStore>,
    max_tokens: usize,
}

impl ApiTokenEngine {
    #[must_use]
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            max_tokens: MAX_TOKENS_PER_USER,
        }
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub async fn create_token(
        &self,
        user_id: UserId,
        name: &str,
    ) -> AuthResult<TokenCreateResult> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthError::Validation("token name cannot be empty".into()));
        }

        let mut uow = self.store.unit_of_work().await;
        let active = uow
            .api_tokens
            .values()
            .filter(|token| token.user_id == user_id && token.is_active())
            .count();
        if active >= self.max_tokens {
            return Err(AuthError::Validation(format!(
                "maximum of {} active tokens reached",
                self.max_tokens
            )));
        }

        let raw_token = format!("{TOKEN_PREFIX}{}", generate_secret(TOKEN_BODY_LENGTH));
        let token = ApiToken {
            id: Uuid::new_v4(),
            user_id,
            name: name.to_string(),
            token_hash: token_digest(&raw_token),
            token_prefix: raw_token[..8].to_string(),
            created_at: Utc::now(),
            last_used_at: None,
            revoked_at: None,
        };
        uow.api_tokens.insert(token.id, token.clone());
        uow.commit();
        info!(token_id = %token.id, "created api token");
        Ok(TokenCreateResult { token, raw_token })
    }

    /// Digest the raw secret and compare it against every active row in
    /// constant time. A hit refreshes `last_used_at` inside the same unit,
    /// so concurrent validations cannot race the write.
    pub async fn validate_token(&self, raw_token: &str) -> Option<ApiToken> {
        if !raw_token.starts_with(TOKEN_PREFIX) {
            return None;
        }
        let digest = token_digest(raw_token);

        let mut uow = self.store.unit_of_work().await;
        let hit = uow
            .api_tokens
            .values()
            .filter(|token| token.is_active())
            .find(|token| constant_time_eq(&token.token_hash, &digest))
            .map(|token| token.id)?;
        let token = uow.api_tokens.get_mut(&hit)?;
        token.last_used_at = Some(Utc::now());
        let validated = token.clone();
        uow.commit();
        Some(validated)
    }

    pub async fn get_user_for_token(&self, raw_token: &str) -> Option<User> {
        let token = self.validate_token(raw_token).await?;
        let state = self.store.read().await;
        state.users.get(&token.user_id).cloned()
    }

    /// Soft delete: the row stays for display, validation refuses it.
    pub async fn revoke_token(&self, user_id: UserId, token_id: ApiTokenId) -> AuthResult<()> {
        let mut uow = self.store.unit_of_work().await;
        let token = uow
            .api_tokens
            .get_mut(&token_id)
            .filter(|token| token.user_id == user_id && token.is_active())
            .ok_or_else(|| AuthError::NotFound(format!("token {token_id}")))?;
        token.revoked_at = Some(Utc::now());
        uow.commit();
        Ok(())
    }

    pub async fn get_token(&self, user_id: UserId, token_id: ApiTokenId) -> AuthResult<ApiToken> {
        let state = self.store.read().await;
        state
            .api_tokens
            .get(&token_id)
            .filter(|token| token.user_id == user_id)
            .cloned()
            .ok_or_else(|| AuthError::NotFound(format!("token {token_id}")))
    }

    pub async fn list_tokens(&self, user_id: UserId, include_revoked: bool) -> Vec<ApiToken> {
        let state = self.store.read().await;
        let mut tokens: Vec<ApiToken> = state
            .api_tokens
            .values()
            .filter(|token| token.user_id == user_id)
            .filter(|token| include_revoked || token.is_active())
            .cloned()
            .collect();
        tokens.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tokens
    }
}
