use sentinel_core::{DebugGate, Result, Tensor, Tick};

// SavedTensor — A tensor kept for the backward pass
//
// Autograd engines keep some inputs of an operation alive until the backward
// pass runs, and they assume those inputs were not overwritten in between.
// A SavedTensor remembers the Tick at which it was saved; `unpack` asks the
// debug gate whether any byte of the tensor was mutated since then.
//
// Outside debug mode `unpack` never fails.

/// A tensor saved at a known tick, checked for in-place changes when unpacked.
#[derive(Debug, Clone)]
pub struct SavedTensor {
    tensor: Tensor,
    saved_at: Tick,
}

impl SavedTensor {
    /// Save `tensor` now.
    pub fn new(tensor: &Tensor) -> Self {
        SavedTensor {
            tensor: tensor.clone(),
            saved_at: Tick::next(),
        }
    }

    pub fn saved_at(&self) -> Tick {
        self.saved_at
    }

    /// True if the tensor's bytes are as they were when saved.
    pub fn is_intact(&self, gate: &DebugGate) -> bool {
        gate.check_unchanged_since(&self.tensor, self.saved_at)
    }

    /// The saved tensor, or a hazard if it was modified after saving.
    pub fn unpack(&self, gate: &DebugGate) -> Result<&Tensor> {
        gate.ensure_unchanged_since(&self.tensor, self.saved_at)?;
        Ok(&self.tensor)
    }
}
