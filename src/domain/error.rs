//! Domain-level errors (no external dependencies)

use thiserror::Error;

use crate::domain::entities::{EntityId, EntityKind};

/// Rejected store operations.
///
/// Every variant means the store was left untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("entity {0} does not exist")]
    NotFound(EntityId),

    #[error("entity {id} is a {kind} and cannot have children")]
    ChildlessDestination { id: EntityId, kind: EntityKind },

    #[error("entity {id} is a {actual}, not a {expected}")]
    KindMismatch {
        id: EntityId,
        expected: EntityKind,
        actual: EntityKind,
    },

    #[error("cannot move entity {target} into its own subtree at {destination}")]
    CycleDetected {
        target: EntityId,
        destination: EntityId,
    },

    #[error("the root entity cannot be moved or removed")]
    RootImmutable,

    #[error("parent {parent} of entity {id} is missing; store is corrupt")]
    MissingParent { id: EntityId, parent: EntityId },
}

/// Result type for store mutations.
pub type StoreResult<T> = Result<T, StoreError>;
