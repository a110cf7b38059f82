//! Table validation run before any new version is written.

use crate::observations::{ELEMENT_ID, OBSERVATION_TIME, SOURCE_ID, UNIT, VALUE};
use polars::prelude::*;
use thiserror::Error;

/// A table failed validation; nothing was written.
#[derive(Debug, Error)]
#[error("invalid observation table: {field}: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Checks a fetched table before it is persisted as a new version. Validators
/// are pluggable; the stock one is [`ObservationSchema`].
pub trait TableValidator: Send + Sync {
    fn validate(&self, frame: &DataFrame) -> Result<(), ValidationError>;
}

/// The stock validator: enforces the canonical observation schema, non-null
/// columns, and non-empty station identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObservationSchema;

impl ObservationSchema {
    fn expected() -> [(&'static str, DataType); 5] {
        [
            (SOURCE_ID, DataType::String),
            (ELEMENT_ID, DataType::String),
            (
                OBSERVATION_TIME,
                DataType::Datetime(TimeUnit::Milliseconds, None),
            ),
            (VALUE, DataType::Float64),
            (UNIT, DataType::String),
        ]
    }
}

impl TableValidator for ObservationSchema {
    fn validate(&self, frame: &DataFrame) -> Result<(), ValidationError> {
        for (name, dtype) in &Self::expected() {
            let column = frame
                .column(name)
                .map_err(|_| ValidationError::new(*name, "column is missing"))?;
            if column.dtype() != dtype {
                return Err(ValidationError::new(
                    *name,
                    format!("expected {dtype}, found {}", column.dtype()),
                ));
            }
            if column.null_count() > 0 {
                return Err(ValidationError::new(
                    *name,
                    format!("{} null values", column.null_count()),
                ));
            }
        }
        let empty_ids = frame
            .column(SOURCE_ID)
            .and_then(|c| c.str())
            .map(|ids| ids.into_iter().flatten().filter(|id| id.is_empty()).count())
            .map_err(|e| ValidationError::new(SOURCE_ID, e.to_string()))?;
        if empty_ids > 0 {
            return Err(ValidationError::new(
                SOURCE_ID,
                format!("{empty_ids} empty station identifiers"),
            ));
        }
        Ok(())
    }
}
