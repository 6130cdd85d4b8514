//! factory-canvas: the entity tree behind a factory planning canvas.
//!
//! The [`domain`] layer holds the store ([`domain::EntityTreeStore`]) and
//! its entities; [`application`] drives it from canvas scripts; [`cli`] and
//! [`config`] are the binary's ambient layers.

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;

pub use domain::{Entity, EntityId, EntityKind, EntityTreeStore, Payload, StoreError, StoreEvent};
