//! Session registry and the actor that serializes access to it.

pub mod actor;
pub mod state;

pub use actor::{RegistryActor, RegistryCommand, RegistryHandle, RegistrySnapshot, spawn_registry};
pub use state::{Dispatch, Registry};
