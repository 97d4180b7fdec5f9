use crate::device::Device;
use crate::hazard::Hazard;
use crate::shape::Shape;

/// All errors that can be produced by sentinel.
///
/// The predicates in [`crate::compat`] answer with plain `bool`s; these
/// variants exist for the `ensure_*` helpers and for the debug gate, so that
/// calling layers can turn a failed check into their own failure policy with `?`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Two shapes were required to be identical.
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    /// Shapes do not broadcast against each other (e.g. [3, 4] with [4, 3]).
    #[error("shapes {lhs} and {rhs} are not broadcastable")]
    NotBroadcastable { lhs: Shape, rhs: Shape },

    /// Element types differ between operands.
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch {
        expected: crate::DType,
        got: crate::DType,
    },

    /// Operands live on different devices.
    #[error("device mismatch: expected {expected}, got {got}")]
    DeviceMismatch { expected: Device, got: Device },

    /// Operation requires a specific rank.
    #[error("rank mismatch: expected rank {expected}, got {got}")]
    RankMismatch { expected: usize, got: usize },

    /// A layout was built with a strides vector of the wrong length.
    #[error("shape rank {rank} does not match strides rank {strides}")]
    RankStrideMismatch { rank: usize, strides: usize },

    /// Element count or furthest element offset does not fit in `usize`.
    #[error("layout {shape} with strides {strides:?} overflows the address space")]
    LayoutOverflow { shape: Shape, strides: Vec<usize> },

    /// Dimension index out of range for the tensor's rank.
    #[error("dimension out of range: dim {dim} for tensor with {rank} dimensions")]
    DimOutOfRange { dim: usize, rank: usize },

    /// Narrow/slice operation out of bounds.
    #[error("narrow out of bounds: dim {dim}, start {start}, len {len}, dim_size {dim_size}")]
    NarrowOutOfBounds {
        dim: usize,
        start: usize,
        len: usize,
        dim_size: usize,
    },

    /// Cannot reshape because element counts differ.
    #[error(
        "cannot reshape: source has {src} elements, target shape {dst_shape} has {dst} elements"
    )]
    ReshapeElementMismatch {
        src: usize,
        dst: usize,
        dst_shape: Shape,
    },

    /// The operation only supports contiguous layouts.
    #[error("layout with shape {shape} is not contiguous")]
    NotContiguous { shape: Shape },

    /// A layout addresses bytes beyond the end of its storage region.
    #[error("layout needs {required} bytes but storage region holds {available}")]
    LayoutOutOfBounds { required: usize, available: usize },

    /// Element count mismatch when writing from or reading into a slice.
    #[error("element count mismatch: shape {shape} requires {expected} elements, got {got}")]
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        got: usize,
    },

    /// A written operand partially aliases another operand of the same op.
    #[error("operand {written} is written but overlaps operand {other}")]
    OverlappingOperands { written: usize, other: usize },

    /// A memory hazard detected by a region's memory checker.
    #[error(transparent)]
    Hazard(#[from] Hazard),

    /// Process-wide settings could not be installed or parsed.
    #[error("settings: {0}")]
    Settings(String),

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }
}

/// Convenience Result type used throughout sentinel.
pub type Result<T> = std::result::Result<T, Error>;

/// Early return with a formatted error message.
/// Usage: `bail!("storage {} is not materialized", id)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
