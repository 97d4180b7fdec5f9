//! # sentinel-core
//!
//! Compatibility predicates and debug-mode memory-hazard tracking for
//! strided tensors.
//!
//! This crate provides:
//! - [`Tensor`] — a shared handle to a strided view over a [`Storage`] region
//! - [`Shape`] / [`Layout`] — shapes, strides, offsets and their geometry
//!   (overlap, coverage, canonical and jointly compressed forms)
//! - [`compat`] — dtype/device/broadcast predicates over tensors
//! - [`MemoryChecker`] — per-region record of reads, writes and invalidations
//! - [`DebugGate`] — the entry point operations call in debug mode
//! - [`DType`] / [`Device`] — element types and execution devices
//! - [`Tick`] — process-wide logical clock stamping every recorded use
//! - [`settings`] — [`DebugSettings`] and the process-wide instance

pub mod compat;
pub mod debug;
pub mod device;
pub mod dtype;
pub mod error;
pub mod hazard;
pub mod layout;
pub mod settings;
pub mod shape;
pub mod storage;
pub mod tensor;
pub mod tick;

pub use debug::DebugGate;
pub use device::Device;
pub use dtype::{DType, WithDType};
pub use error::{Error, Result};
pub use hazard::{CheckerState, Hazard, MemoryChecker, TensorUse, UseRecord};
pub use layout::Layout;
pub use settings::DebugSettings;
pub use shape::Shape;
pub use storage::{Storage, StorageId};
pub use tensor::Tensor;
pub use tick::Tick;
