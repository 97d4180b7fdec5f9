use crate::compat;
use crate::error::{Error, Result};
use crate::hazard::TensorUse;
use crate::settings::{self, DebugSettings};
use crate::shape::Shape;
use crate::tensor::Tensor;
use crate::tick::Tick;

// DebugGate — Entry point for instrumented operations
//
// Operation implementations call the gate with each operand and how they use
// it. In debug mode the gate validates the call and records the uses on the
// operands' storage regions; otherwise every entry point returns at once.
//
// CHECK ORDER (guarded_op):
//
//   1. compatibility   dtype and device agree; shapes broadcast jointly
//                      (only when `check_compatibility` is set)
//   2. aliasing        an operand that is mutated may not partially overlap
//                      another operand; the exact same view is allowed
//                      (in-place update)
//   3. hazards         no operand reads bytes that were invalidated
//   4. recording       every use is recorded with its own fresh Tick
//
// Uses are recorded and checked over the bytes a view actually addresses
// (`Tensor::byte_footprint`), so interleaved views of one region stay
// independent. The first recorded use of a region also fixes its history
// depth to this gate's `history_limit`.
//
// The first violation is returned and nothing is recorded in that case, so a
// rejected call leaves the use histories as they were.
//
// With the `hazard-tracking` cargo feature disabled `is_enabled` is a
// compile-time `false` and all of this folds away.

/// Debug-mode validation and use recording for tensor operations.
#[derive(Debug, Clone, Default)]
pub struct DebugGate {
    settings: DebugSettings,
}

impl DebugGate {
    pub fn new(settings: DebugSettings) -> Self {
        DebugGate { settings }
    }

    /// A gate configured by the process-wide settings.
    pub fn from_global() -> Self {
        Self::new(settings::global().clone())
    }

    pub fn settings(&self) -> &DebugSettings {
        &self.settings
    }

    pub fn is_enabled(&self) -> bool {
        cfg!(feature = "hazard-tracking") && self.settings.enabled
    }

    /// Record one use of `t`'s bytes. Returns the tick it was recorded at,
    /// or `None` outside debug mode.
    pub fn record_use(&self, t: &Tensor, kind: TensorUse) -> Option<Tick> {
        if !self.is_enabled() {
            return None;
        }
        let checker = t.memory_checker();
        checker.configure_history_limit(self.settings.history_limit);
        let tick = Tick::next();
        checker.record_use(kind, &t.byte_footprint(), tick);
        Some(tick)
    }

    /// Record that `t`'s bytes were overwritten.
    pub fn register_change(&self, t: &Tensor) -> Option<Tick> {
        self.record_use(t, TensorUse::Write)
    }

    /// True if no byte of `t` changed after `tick`. Always true outside debug mode.
    pub fn check_unchanged_since(&self, t: &Tensor, tick: Tick) -> bool {
        !self.is_enabled()
            || t
                .memory_checker()
                .range_unchanged_since(tick, &t.byte_footprint())
    }

    /// `Result` form of [`DebugGate::check_unchanged_since`].
    pub fn ensure_unchanged_since(&self, t: &Tensor, tick: Tick) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        t.memory_checker()
            .ensure_range_unchanged_since(tick, &t.byte_footprint())?;
        Ok(())
    }

    /// Validate and record one operation over `operands`.
    pub fn guarded_op(&self, operands: &[(&Tensor, TensorUse)]) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        if self.settings.check_compatibility {
            check_compatibility(operands)?;
        }
        check_aliasing(operands)?;
        for (t, kind) in operands {
            t.memory_checker().check_use(*kind, &t.byte_footprint())?;
        }
        for (t, kind) in operands {
            self.record_use(t, *kind);
        }
        Ok(())
    }

    /// [`DebugGate::guarded_op`] for a two-operand operation.
    pub fn normal_op2(
        &self,
        a: &Tensor,
        a_use: TensorUse,
        b: &Tensor,
        b_use: TensorUse,
    ) -> Result<()> {
        self.guarded_op(&[(a, a_use), (b, b_use)])
    }

    /// [`DebugGate::guarded_op`] for a three-operand operation.
    pub fn normal_op3(
        &self,
        a: &Tensor,
        a_use: TensorUse,
        b: &Tensor,
        b_use: TensorUse,
        c: &Tensor,
        c_use: TensorUse,
    ) -> Result<()> {
        self.guarded_op(&[(a, a_use), (b, b_use), (c, c_use)])
    }
}

fn check_compatibility(operands: &[(&Tensor, TensorUse)]) -> Result<()> {
    let Some((first, _)) = operands.first() else {
        return Ok(());
    };
    for (t, _) in &operands[1..] {
        compat::ensure_compatible(first, t)?;
    }
    operands
        .iter()
        .try_fold(Shape::scalar(), |acc, (t, _)| Shape::broadcast_shape(&acc, t.shape()))
        .map(|_| ())
}

fn check_aliasing(operands: &[(&Tensor, TensorUse)]) -> Result<()> {
    for (i, (a, a_use)) in operands.iter().enumerate() {
        if !a_use.mutates() {
            continue;
        }
        for (j, (b, _)) in operands.iter().enumerate() {
            if i == j {
                continue;
            }
            let same_view = a.layout() == b.layout() && a.dtype() == b.dtype();
            if !same_view && compat::overlap(a, b) {
                tracing::debug!(written = i, other = j, "mutated operand overlaps another operand");
                return Err(Error::OverlappingOperands {
                    written: i,
                    other: j,
                });
            }
        }
    }
    Ok(())
}
