//! Identity records and credential models held by a session snapshot.

pub mod id;
pub mod token;
pub mod user;

pub use id::*;
pub use token::{pair::*, secret::*};
pub use user::*;
