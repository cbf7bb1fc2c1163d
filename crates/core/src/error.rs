use crate::types::EntityId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: EntityId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl CoreError {
    /// Shorthand for a [`CoreError::NotFound`] with an owned id.
    pub fn not_found(entity: &'static str, id: impl Into<EntityId>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}
