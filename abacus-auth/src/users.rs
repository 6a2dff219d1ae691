use std::sync::Arc;

use abacus_model::User;
use abacus_model::UserId;
use abacus_store::MemoryStore;
use chrono::Utc;
use uuid::Uuid;

use crate::AuthError;
use crate::AuthResult;

/// Minimal user registry backing the ownership checks of every engine.
#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<MemoryStore>,
}

impl UserDirectory {
    #[must_use]
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    pub async fn register_user(&self, email: &str) -> AuthResult<User> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(AuthError::Validation("a valid email is required".into()));
        }

        let mut uow = self.store.unit_of_work().await;
        if uow.users.values().any(|user| user.email == email) {
            return Err(AuthError::Conflict(format!("email {email} is taken")));
        }
        let user = User {
            id: Uuid::new_v4(),
            email,
            created_at: Utc::now(),
        };
        uow.users.insert(user.id, user.clone());
        uow.commit();
        Ok(user)
    }

    pub async fn get_user(&self, user_id: UserId) -> AuthResult<User> {
        let state = self.store.read().await;
        state
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| AuthError::NotFound(format!("user {user_id}")))
    }

    pub async fn find_by_email(&self, email: &str) -> Option<User> {
        let state = self.store.read().await;
        let needle = email.trim().to_lowercase();
        state.users.values().find(|user| user.email == needle).cloned()
    }
}
