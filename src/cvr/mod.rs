//! Client View Record engine
//!
//! A CVR is the server's record of which keys, at which versions, a client
//! group has been sent. Each pull diffs the rows the actor may currently see
//! against the CVR named by the client's cookie and answers with a patch.

pub mod diff;
pub mod key;
pub mod mutations;
pub mod patch;
pub mod pull;
pub mod registry;
pub mod source;
pub mod store;
pub mod types;

pub use diff::{compute, Diff};
pub use key::build_key;
pub use pull::{PullOptions, PullOrchestrator, PullOutcome};
pub use registry::{
    Predicate, SqlValue, SyncTable, TableRegistry, TableStrategy, TenantRows, TenantScope,
    Visibility,
};
pub use source::normalize_version;
pub use store::{ClientGroupRepository, CvrRepository};
pub use types::{
    ClientGroup, CvrData, CvrSnapshot, MutationChanges, PatchOp, PullRequest, PullResponse,
    SyncRow, INIT_KEY, PULL_VERSION,
};
