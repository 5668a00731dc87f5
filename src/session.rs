//! Session state owned by one browsing context: the snapshot model and the store that guards it.

pub mod snapshot;
pub mod token_store;

pub use snapshot::*;
pub use token_store::*;
