//! Authentication for the GuildBridge relay.
//!
//! Connection handshakes resolve opaque bridge keys against the in-memory
//! [`CredentialStore`]; the administrative key lifecycle (revoke, restore,
//! reset, lookup) lives in [`AccessManager`].

mod access;
mod store;

pub use access::{AccessError, AccessManager, KeyIssued, RevokeOutcome};
pub use store::{CredentialStore, Identity};
