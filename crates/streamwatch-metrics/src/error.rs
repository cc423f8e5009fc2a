use thiserror::Error;

use crate::series::EntityType;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetricsError {
    #[error("{entity_type:?} series needs {expected} labels, got {got}")]
    Arity {
        entity_type: EntityType,
        expected: usize,
        got: usize,
    },

    #[error("metric name is empty")]
    EmptyName,
}
