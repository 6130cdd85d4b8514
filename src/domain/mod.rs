//! Domain layer: entities and the entity tree store
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod arena;
pub mod entities;
pub mod error;
pub mod events;
pub mod store;

pub use arena::EntityArena;
pub use entities::*;
pub use error::{StoreError, StoreResult};
pub use events::{StoreEvent, SubscriptionId};
pub use store::EntityTreeStore;
