//! Session Hub
//!
//! In-memory session store, per-session rosters, room fan-out and deferred
//! cleanup of empty sessions, owned by a single actor task.

mod actor;
mod cleanup;
mod engine;
mod membership;
mod mutations;
mod router;
mod session;
mod store;


pub use actor::{HubHandle, spawn_hub};
pub use engine::{HubConfig, HubLimits};
pub use router::Outbox;
pub use session::{Participant, SessionSnapshot};
pub use store::SessionDefaults;
