//! Error types for yolopost.

use thiserror::Error;

/// Result alias for yolopost operations.
pub type YoloPostResult<T> = std::result::Result<T, YoloPostError>;

/// Errors that can occur while configuring or running the postprocessor.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum YoloPostError {
    /// A threshold lies outside `[0, 1]` or is not finite.
    #[error("{name} must be within [0, 1], got {value}")]
    InvalidThreshold { name: &'static str, value: f32 },
    /// The number of anchors differs from the declared anchor count.
    #[error("expected {expected} anchors, got {got}")]
    AnchorCountMismatch { expected: usize, got: usize },
    /// An anchor has a non-positive or non-finite dimension.
    #[error("anchor {index} must have finite positive width and height")]
    InvalidAnchor { index: usize },
    /// An anchor list could not be parsed.
    #[error("invalid anchor list: {0}")]
    InvalidAnchorList(String),
    /// A configuration value is invalid.
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    /// The tensor buffer length does not match the declared shape.
    #[error("tensor shape requires {expected} values, got {got}")]
    ShapeMismatch { expected: usize, got: usize },
    /// The channel count does not match `5 + num_classes`.
    #[error("expected {expected} channels per anchor, got {got}")]
    ChannelMismatch { expected: usize, got: usize },
    /// A tensor dimension does not match the decoder configuration.
    #[error("{dim} is {got}, decoder expects {expected}")]
    DimensionMismatch {
        dim: &'static str,
        expected: usize,
        got: usize,
    },
    /// A batch index is out of range.
    #[error("batch index {index} out of bounds (len {len})")]
    BatchIndexOutOfBounds { index: usize, len: usize },
    /// A non-finite input value, or a box size that overflows `f32`, was found
    /// at this flat tensor index (strict mode).
    #[error("non-finite value at flat index {index}")]
    NonFinite { index: usize },
}

impl YoloPostError {
    /// Returns true for errors raised while validating a configuration.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidThreshold { .. }
                | Self::AnchorCountMismatch { .. }
                | Self::InvalidAnchor { .. }
                | Self::InvalidAnchorList(_)
                | Self::InvalidConfig(_)
        )
    }

    /// Returns true for tensor layout errors.
    pub fn is_shape_error(&self) -> bool {
        matches!(
            self,
            Self::ShapeMismatch { .. }
                | Self::ChannelMismatch { .. }
                | Self::DimensionMismatch { .. }
                | Self::BatchIndexOutOfBounds { .. }
        )
    }

    /// Returns true for non-finite input errors.
    pub fn is_numeric_error(&self) -> bool {
        matches!(self, Self::NonFinite { .. })
    }
}
