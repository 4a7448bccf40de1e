//! Rate-limited membership synchronization.
//!
//! The synchronizer reconciles the credential store against the external
//! membership directory on a timer, funneling every outbound call through a
//! sliding-window budget so the directory's request cap is never exceeded.

mod directory;
mod rate_limit;
mod updater;

pub use directory::{DirectoryClient, DirectoryError, MemberProfile, MembershipDirectory};
pub use rate_limit::CallBudget;
pub use updater::{MembershipSynchronizer, SyncSummary};
