//! Handshake authentication: bearer-token verification.
//!
//! Tokens are issued by the external identity service; this server only
//! verifies them at connection time.

mod jwt;

pub use jwt::{Claims, TokenVerifier};
