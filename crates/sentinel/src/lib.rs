//! # Sentinel
//!
//! Tensor compatibility checks and debug-mode memory-hazard tracking for
//! autograd runtimes.
//!
//! This is the top-level facade crate that re-exports everything you need.
//!
//! ## Usage
//!
//! ```rust
//! use sentinel::prelude::*;
//! ```
//!
//! ## Architecture
//!
//! | Crate | Purpose |
//! |-------|----------|
//! | `sentinel-core` | Tensor, Storage, Shape, Layout, compatibility predicates, MemoryChecker, DebugGate |
//!
//! ## Features
//!
//! - `hazard-tracking` (default) — compiles the debug gate in. Without it
//!   every gate entry point is a no-op, whatever the runtime settings say.
//!
//! ## Configuration
//!
//! Debug mode is off by default. Set `SENTINEL_DEBUG=1` in the environment,
//! call [`settings::init`] once at startup, or build a [`DebugGate`] from an
//! explicit [`DebugSettings`].

/// Re-export core types.
pub use sentinel_core::{
    CheckerState, DType, DebugGate, DebugSettings, Device, Error, Hazard, Layout, MemoryChecker,
    Result, Shape, Storage, StorageId, Tensor, TensorUse, Tick, UseRecord, WithDType,
};

/// Compatibility predicates over tensors.
pub mod compat {
    pub use sentinel_core::compat::*;
}

/// Process-wide debug settings.
pub mod settings {
    pub use sentinel_core::settings::*;
}

/// Saved tensors — tensors kept for backward, checked for in-place changes.
pub mod saved;

/// Prelude: import this for the most common types.
pub mod prelude {
    pub use crate::compat::{
        broadcastable, broadcastable3, broadcastable_and_compatible, canonicalize, compatible,
        compatible3, compress, is_whole, overlap, same_dims, same_dims3,
    };
    pub use crate::saved::SavedTensor;
    pub use crate::{
        DType, DebugGate, DebugSettings, Device, Hazard, Layout, Shape, Tensor, TensorUse, Tick,
    };
}
