//! Flat-file storage for the GuildBridge relay.
//!
//! The membership snapshot is a JSON record list rewritten atomically
//! (whole-file replace) after every synchronization pass and after every key
//! issuance, revocation, or reset.

mod models;
mod snapshot;

pub use models::MemberRecord;
pub use snapshot::{SnapshotStore, StorageError};
