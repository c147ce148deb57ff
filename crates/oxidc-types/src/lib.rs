//! Shared error types for the oxidc OAuth client engine

pub mod errors;

pub use errors::{AuthError, AuthResult};
