//! Error types for voltage-dnp3

use thiserror::Error;

use crate::measurement::PointType;
use crate::time::TimeQuality;

#[derive(Error, Debug)]
pub enum Dnp3Error {
    // ======================================
    // Timestamp misuse and validation
    // ======================================
    #[error("Cannot order timestamps: {left} vs {right} (INVALID time has no ordering)")]
    InvalidTimestampComparison {
        left: TimeQuality,
        right: TimeQuality,
    },

    #[error("Cannot order timestamps of different time quality: {left} vs {right}")]
    IncomparableTimestamps {
        left: TimeQuality,
        right: TimeQuality,
    },

    #[error("Timestamp out of 48-bit range: {millis} ms")]
    TimestampOutOfRange { millis: i64 },

    // ======================================
    // Decoding
    // ======================================
    #[error("Malformed {point_type} object at index {index}: {reason}")]
    MalformedPayload {
        point_type: PointType,
        index: u16,
        reason: String,
    },

    #[error("Invalid trace line: {0}")]
    InvalidTrace(String),

    // ======================================
    // Point database
    // ======================================
    #[error("Point already exists: {point_type}:{index}")]
    DuplicatePoint { point_type: PointType, index: u16 },

    #[error("Point not found: {point_type}:{index}")]
    PointNotFound { point_type: PointType, index: u16 },

    #[error("Point type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: PointType,
        actual: PointType,
    },

    // ======================================
    // Configuration
    // ======================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Dnp3Error {
    /// Create an invalid-config error for a field
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a malformed-payload error
    pub fn malformed(point_type: PointType, index: u16, reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            point_type,
            index,
            reason: reason.into(),
        }
    }
}

impl From<common::ConfigLoadError> for Dnp3Error {
    fn from(err: common::ConfigLoadError) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Dnp3Error>;
