//! Counsel account API
//!
//! Sign-in, registration, email verification, password reset and profile
//! calls layered over the gateway client. Login installs the issued token
//! pair into the gateway session and caches the user profile under the
//! `user_data` store key; logout and revoke-all clear both.

pub mod api;
pub mod types;

pub use api::AccountApi;
pub use counsel_gateway::{Error, Result};
pub use types::{
    AuthResponse, EmailVerificationResponse, LoginRequest, MessageResponse, RegisterRequest,
    RegisterResponse, RevokeAllResponse, Role, TokenValidation, User,
};
