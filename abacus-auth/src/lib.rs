#![deny(clippy::print_stdout, clippy::print_stderr)]

//! The authenticated access surface: opaque API tokens hashed at rest and
//! the OTP flow that binds chat-platform identities to users.

use thiserror::Error;

mod bindings;
mod otp;
mod tokens;
mod users;

pub use bindings::ChannelBindingEngine;
pub use otp::CODE_TTL_SECONDS;
pub use otp::OtpStore;
pub use tokens::ApiTokenEngine;
pub use tokens::MAX_TOKENS_PER_USER;
pub use tokens::TOKEN_BODY_LENGTH;
pub use tokens::TOKEN_PREFIX;
pub use tokens::TokenCreateResult;
pub use users::UserDirectory;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("unauthorized")]
    Unauthorized,
}
