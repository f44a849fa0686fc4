//! HTTP gateway to the session backend.
//!
//! The backend issues session tokens and serves server-computed collections
//! (friends, games, profile). Protected routes take the token in the
//! `X-Session-Key` header.

pub mod error;
pub mod gateway;

pub use error::ApiError;
pub use gateway::{Gateway, LoginGrant, UserPayload, VerifyResponse, SESSION_HEADER};
