//! Session domain models: credentials, user profile, and the persisted token pair.

pub mod claims;
pub mod profile;
pub mod secret;
pub mod tokens;

pub use profile::*;
pub use secret::*;
pub use tokens::*;
