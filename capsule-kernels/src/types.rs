//! Core types for the capsule kernels library
//!
//! This module defines the error type, the strongly-typed context values a
//! kernel is parameterised with, and the kernel kinds the host understands.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for capsule operations
pub type Result<T> = std::result::Result<T, CapsuleError>;

/// Errors that can occur while building or invoking capsules
#[derive(Debug, thiserror::Error)]
pub enum CapsuleError {
    #[error("Failed to allocate context blob of {size} bytes")]
    AllocationError { size: usize },

    #[error("Invalid context data: {0}")]
    InvalidContext(String),

    #[error("Capsule has already been released")]
    Released,

    #[error("Kernel signature mismatch: expected `{expected}`, capsule has `{actual}`")]
    SignatureMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Kernel `{signature}` reported failure")]
    KernelFailure { signature: &'static str },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// The three call shapes the host knows how to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelKind {
    /// Line filter: whole input line in, whole output line out
    Filter1d,
    /// Neighbourhood filter: one window of samples in, one scalar out
    Stencil,
    /// Geometric transform: output coordinate in, input coordinate out
    Transform,
}

impl KernelKind {
    /// The C prototype the host expects for this kind of callback
    pub fn signature(self) -> &'static str {
        match self {
            KernelKind::Filter1d => "int (double *, npy_intp, double *, npy_intp, void *)",
            KernelKind::Stencil => "int (double *, npy_intp, double *, void *)",
            KernelKind::Transform => "int (npy_intp *, double *, int, int, void *)",
        }
    }
}

impl fmt::Display for KernelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelKind::Filter1d => write!(f, "filter1d"),
            KernelKind::Stencil => write!(f, "stencil"),
            KernelKind::Transform => write!(f, "transform"),
        }
    }
}

/// Parameters copied into a capsule's context blob
///
/// This is the typed side of the boundary. The host only ever sees the raw
/// blob produced from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContextData {
    /// Window size for the sliding average (must be >= 1)
    Window { size: usize },
    /// Weight vector for the stencil filter (non-empty, finite)
    Weights { values: Vec<f64> },
    /// Uniform shift subtracted from every coordinate axis
    Shift { offset: f64 },
}

impl ContextData {
    pub fn window(size: usize) -> Self {
        ContextData::Window { size }
    }

    pub fn weights(values: impl Into<Vec<f64>>) -> Self {
        ContextData::Weights {
            values: values.into(),
        }
    }

    pub fn shift(offset: f64) -> Self {
        ContextData::Shift { offset }
    }

    /// Call shape of the built-in kernel that reads this blob layout
    pub fn kind(&self) -> KernelKind {
        match self {
            ContextData::Window { .. } => KernelKind::Filter1d,
            ContextData::Weights { .. } => KernelKind::Stencil,
            ContextData::Shift { .. } => KernelKind::Transform,
        }
    }

    /// Check the value before anything is allocated for it
    pub fn validate(&self) -> Result<()> {
        match self {
            ContextData::Window { size } => {
                if *size == 0 {
                    return Err(CapsuleError::InvalidContext(
                        "window size must be at least 1".to_string(),
                    ));
                }
                if isize::try_from(*size).is_err() {
                    return Err(CapsuleError::InvalidContext(format!(
                        "window size {} does not fit npy_intp",
                        size
                    )));
                }
            }
            ContextData::Weights { values } => {
                if values.is_empty() {
                    return Err(CapsuleError::InvalidContext(
                        "weight vector is empty".to_string(),
                    ));
                }
                if let Some(pos) = values.iter().position(|w| !w.is_finite()) {
                    return Err(CapsuleError::InvalidContext(format!(
                        "weight at index {} is not finite",
                        pos
                    )));
                }
            }
            ContextData::Shift { offset } => {
                if !offset.is_finite() {
                    return Err(CapsuleError::InvalidContext(
                        "shift must be finite".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for ContextData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextData::Window { size } => write!(f, "window={}", size),
            ContextData::Weights { values } => write!(f, "weights={:?}", values),
            ContextData::Shift { offset } => write!(f, "shift={}", offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_validation() {
        assert!(ContextData::window(3).validate().is_ok());
        assert!(ContextData::window(0).validate().is_err());
        assert!(ContextData::weights(vec![]).validate().is_err());
        assert!(ContextData::weights(vec![1.0, f64::NAN]).validate().is_err());
        assert!(ContextData::shift(f64::INFINITY).validate().is_err());
        assert!(ContextData::shift(-2.5).validate().is_ok());
    }

    #[test]
    fn test_signature_strings() {
        assert_eq!(
            KernelKind::Filter1d.signature(),
            "int (double *, npy_intp, double *, npy_intp, void *)"
        );
        assert_eq!(format!("{}", KernelKind::Transform), "transform");
    }

    #[test]
    fn test_context_data_serde() {
        let data: ContextData =
            serde_json::from_str(r#"{"type": "weights", "values": [0.5, 0.5]}"#).unwrap();
        assert_eq!(data, ContextData::weights(vec![0.5, 0.5]));
    }
}
