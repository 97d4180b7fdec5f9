use std::fmt;

// DType — Element types a storage region can be viewed as
//
// Every tensor carries a DType. For compatibility checks only equality
// matters; for hazard tracking the element size turns an element footprint
// into the byte range recorded against the storage region.
//
//   F16  — 16-bit IEEE half float
//   BF16 — 16-bit brain float
//   F32  — 32-bit float
//   F64  — 64-bit float
//   U8   — unsigned byte (masks, images)
//   U32  — unsigned 32-bit int (indices)
//   I64  — signed 64-bit int (labels/indices)

/// Enum of all supported element data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F16,
    BF16,
    F32,
    F64,
    U8,
    U32,
    I64,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::F16 | DType::BF16 => 2,
            DType::F32 | DType::U32 => 4,
            DType::F64 | DType::I64 => 8,
            DType::U8 => 1,
        }
    }

    /// Whether this dtype is a floating-point type (i.e. can carry gradients).
    pub fn is_float(&self) -> bool {
        matches!(self, DType::F16 | DType::BF16 | DType::F32 | DType::F64)
    }

    /// Whether this is a half-precision type (F16 or BF16).
    pub fn is_half(&self) -> bool {
        matches!(self, DType::F16 | DType::BF16)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::F16 => "f16",
            DType::BF16 => "bf16",
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::U8 => "u8",
            DType::U32 => "u32",
            DType::I64 => "i64",
        };
        write!(f, "{}", s)
    }
}

// WithDType — Bridge between Rust element types and byte storage
//
// Storage regions are untyped bytes. Typed reads and writes go through this
// trait, which fixes the DType of a Rust type and its little-endian encoding.

/// Trait implemented by Rust types that can be stored in a tensor.
pub trait WithDType: Copy + Send + Sync + 'static + num_traits::Zero + fmt::Debug {
    /// The corresponding DType enum variant.
    const DTYPE: DType;

    /// Decode one element from exactly `DTYPE.size_in_bytes()` bytes.
    fn from_le_slice(bytes: &[u8]) -> Self;

    /// Encode one element into exactly `DTYPE.size_in_bytes()` bytes.
    fn write_le_slice(self, out: &mut [u8]);
}

macro_rules! impl_with_dtype {
    ($ty:ty, $dtype:expr, $n:literal) => {
        impl WithDType for $ty {
            const DTYPE: DType = $dtype;

            fn from_le_slice(bytes: &[u8]) -> Self {
                let mut buf = [0u8; $n];
                buf.copy_from_slice(&bytes[..$n]);
                <$ty>::from_le_bytes(buf)
            }

            fn write_le_slice(self, out: &mut [u8]) {
                out[..$n].copy_from_slice(&self.to_le_bytes());
            }
        }
    };
}

impl_with_dtype!(half::f16, DType::F16, 2);
impl_with_dtype!(half::bf16, DType::BF16, 2);
impl_with_dtype!(f32, DType::F32, 4);
impl_with_dtype!(f64, DType::F64, 8);
impl_with_dtype!(u8, DType::U8, 1);
impl_with_dtype!(u32, DType::U32, 4);
impl_with_dtype!(i64, DType::I64, 8);
