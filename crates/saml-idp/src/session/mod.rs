//! Replay-safe protocol state: pending sign-ins, deferred logouts and SP sessions

mod sp_session;
mod store;
mod types;

pub use sp_session::{InMemorySpSessionStore, SpSession, SpSessionStore};
pub use store::{InMemoryOneTimeStore, LogoutMessageStore, OneTimeStore, SigninStateStore};
pub use types::{InteractionStep, LogoutMessage, SigninState, StoreEntry, StoreError};
