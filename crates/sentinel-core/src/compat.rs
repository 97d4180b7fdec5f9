//! Compatibility predicates over tensors.
//!
//! Everything here is pure: the predicates read dtype, device, layout and
//! storage identity and answer with a `bool`. Failing a check is never an
//! error at this level; the `ensure_*` helpers wrap the common checks in
//! `Result` for callers that want to propagate with `?`.
//!
//! Shapes of different rank are compared after padding the shorter one on
//! the left with extent-1 axes, so `[8, 1]` broadcasts against `[2, 8, 3]`.
//! A rank-0 tensor broadcasts with anything.
//!
//! The layout-rewriting helpers (`canonicalize`, `compress`) never modify a
//! tensor other handles can see: they hand out a new impl whenever the
//! current one is shared.

use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::shape::Shape;
use crate::tensor::Tensor;

// Dtype / device

/// Same element type and same device.
pub fn compatible(a: &Tensor, b: &Tensor) -> bool {
    a.dtype() == b.dtype() && a.device() == b.device()
}

pub fn compatible3(a: &Tensor, b: &Tensor, c: &Tensor) -> bool {
    compatible(a, b) && compatible(a, c)
}

/// `Result` form of [`compatible`]; the dtype is checked first.
pub fn ensure_compatible(a: &Tensor, b: &Tensor) -> Result<()> {
    if a.dtype() != b.dtype() {
        return Err(Error::DTypeMismatch {
            expected: a.dtype(),
            got: b.dtype(),
        });
    }
    if a.device() != b.device() {
        return Err(Error::DeviceMismatch {
            expected: a.device(),
            got: b.device(),
        });
    }
    Ok(())
}

// Shapes

/// True if `a` and `b` broadcast against each other.
///
/// With `b_non_reducing`, `b` must not be 1 on an axis where `a` is not:
/// the operation may not sum over `a` into `b`.
pub fn broadcastable(a: &Tensor, b: &Tensor, b_non_reducing: bool) -> bool {
    Shape::broadcastable(a.shape(), b.shape(), b_non_reducing)
}

/// Three-operand broadcasting; `c` is typically the output.
pub fn broadcastable3(a: &Tensor, b: &Tensor, c: &Tensor, c_non_reducing: bool) -> bool {
    Shape::broadcastable3(a.shape(), b.shape(), c.shape(), c_non_reducing)
}

/// [`compatible`] and [`broadcastable`] (reductions allowed).
pub fn broadcastable_and_compatible(a: &Tensor, b: &Tensor) -> bool {
    compatible(a, b) && broadcastable(a, b, false)
}

pub fn ensure_broadcastable(a: &Tensor, b: &Tensor, b_non_reducing: bool) -> Result<()> {
    if !broadcastable(a, b, b_non_reducing) {
        return Err(Error::NotBroadcastable {
            lhs: a.shape().clone(),
            rhs: b.shape().clone(),
        });
    }
    Ok(())
}

/// Identical extents after left-padding.
pub fn same_dims(a: &Tensor, b: &Tensor) -> bool {
    Shape::same_dims(a.shape(), b.shape())
}

pub fn same_dims3(a: &Tensor, b: &Tensor, c: &Tensor) -> bool {
    Shape::same_dims3(a.shape(), b.shape(), c.shape())
}

// Memory

/// True if the tensors view the same storage region and share at least one byte.
pub fn overlap(a: &Tensor, b: &Tensor) -> bool {
    a.same_storage(b)
        && a.layout().overlaps(
            a.dtype().size_in_bytes(),
            b.layout(),
            b.dtype().size_in_bytes(),
        )
}

/// True if the tensor reaches every byte of its storage region, and nothing past it.
pub fn is_whole(t: &Tensor) -> bool {
    t.layout()
        .covers(t.dtype().size_in_bytes(), t.storage().len_bytes())
}

pub fn num_elements(t: &Tensor) -> usize {
    t.elem_count()
}

/// A view of `t`'s storage with `layout`; see [`Tensor::with_layout`].
pub fn with_layout(t: &Tensor, layout: Layout) -> Result<Tensor> {
    t.with_layout(layout)
}

// Layout rewriting

/// A handle to the same elements with the canonical layout: extent-1 axes
/// dropped and nesting axes merged. If the layout already is canonical the
/// result shares `t`'s impl.
pub fn canonicalize(t: &Tensor) -> Tensor {
    let canonical = t.layout().canonical();
    if canonical == *t.layout() {
        t.clone()
    } else {
        t.view(canonical)
    }
}

/// Jointly compress the layouts of one operation's operands, so that
/// a kernel sees the fewest axes that still describe every operand.
///
/// All operands end up with the same rank and stay broadcast-compatible
/// with each other. Handles whose layout changes get a new impl; aliases
/// held elsewhere are not affected.
pub fn compress(tensors: &mut [&mut Tensor]) -> Result<()> {
    let mut layouts: Vec<Layout> = tensors.iter().map(|t| t.layout().clone()).collect();
    Layout::compress(&mut layouts)?;
    for (t, layout) in tensors.iter_mut().zip(layouts) {
        if layout != *t.layout() {
            t.set_layout(layout)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use crate::dtype::DType;

    fn f32_tensor(dims: &[usize]) -> Tensor {
        Tensor::empty(dims, DType::F32, Device::Cpu)
    }

    #[test]
    fn test_compatible() {
        let a = f32_tensor(&[2, 3]);
        let b = f32_tensor(&[7]);
        let c = Tensor::empty(3, DType::F64, Device::Cpu);
        let d = Tensor::empty(3, DType::F32, Device::Cuda(0));
        assert!(compatible(&a, &b));
        assert!(!compatible(&a, &c));
        assert!(!compatible(&a, &d));
        assert!(!compatible3(&a, &b, &d));
        assert!(matches!(
            ensure_compatible(&a, &c),
            Err(Error::DTypeMismatch {
                expected: DType::F32,
                got: DType::F64
            })
        ));
        assert!(matches!(
            ensure_compatible(&a, &d),
            Err(Error::DeviceMismatch { .. })
        ));
    }

    #[test]
    fn test_broadcastable_padding() {
        let a = f32_tensor(&[2, 8, 3]);
        let b = f32_tensor(&[8, 1]);
        assert!(broadcastable(&a, &b, false));
        assert!(!broadcastable(&a, &b, true));
        assert!(broadcastable(&b, &a, true));
        assert!(!broadcastable(&f32_tensor(&[3, 4]), &f32_tensor(&[4, 3]), false));
        assert!(broadcastable_and_compatible(&a, &b));
        assert!(ensure_broadcastable(&a, &b, true).is_err());
    }

    #[test]
    fn test_scalar_broadcasts_with_anything() {
        let s = f32_tensor(&[]);
        let a = f32_tensor(&[4, 5]);
        assert!(broadcastable(&s, &a, false));
        assert!(broadcastable(&a, &s, false));
        assert!(broadcastable3(&s, &s, &a, true));
    }

    #[test]
    fn test_broadcastable3_output_non_reducing() {
        let a = f32_tensor(&[4, 1]);
        let b = f32_tensor(&[1, 5]);
        let out = f32_tensor(&[4, 5]);
        let row = f32_tensor(&[1, 5]);
        assert!(broadcastable3(&a, &b, &out, true));
        assert!(broadcastable3(&a, &b, &row, false));
        assert!(!broadcastable3(&a, &b, &row, true));
        assert!(!broadcastable3(&a, &f32_tensor(&[3, 5]), &out, false));
    }

    #[test]
    fn test_same_dims() {
        let a = f32_tensor(&[1, 3]);
        let b = f32_tensor(&[3]);
        let c = f32_tensor(&[1, 4]);
        assert!(same_dims(&a, &b));
        assert!(!same_dims(&a, &c));
        assert!(same_dims3(&a, &b, &f32_tensor(&[3])));
        assert!(!same_dims3(&a, &b, &c));
    }

    #[test]
    fn test_overlap_requires_same_storage() {
        let a = f32_tensor(&[4, 4]);
        let b = f32_tensor(&[4, 4]);
        assert!(!overlap(&a, &b));
        assert!(overlap(&a, &a.transpose(0, 1).unwrap()));
        let left = a.narrow(1, 0, 2).unwrap();
        let right = a.narrow(1, 2, 2).unwrap();
        assert!(!overlap(&left, &right));
        assert!(overlap(&left, &a.narrow(1, 1, 2).unwrap()));
    }

    #[test]
    fn test_is_whole() {
        let a = f32_tensor(&[3, 4]);
        assert!(is_whole(&a));
        assert!(is_whole(&a.transpose(0, 1).unwrap()));
        assert!(!is_whole(&a.narrow(0, 0, 2).unwrap()));
    }

    #[test]
    fn test_canonicalize_keeps_aliases() {
        let a = f32_tensor(&[2, 1, 3]);
        let alias = a.clone();
        let c = canonicalize(&a);
        assert_eq!(c.dims(), &[6]);
        assert_eq!(a.dims(), &[2, 1, 3]);
        assert!(c.same_storage(&a));
        let again = canonicalize(&c);
        assert!(again.same_impl(&c));
        assert!(alias.same_impl(&a));
    }

    #[test]
    fn test_compress_batch() {
        let a = f32_tensor(&[2, 3, 4]);
        let mut x = a.clone();
        let mut y = f32_tensor(&[3, 4]);
        compress(&mut [&mut x, &mut y]).unwrap();
        assert_eq!(x.dims(), &[2, 12]);
        assert_eq!(y.dims(), &[1, 12]);
        assert_eq!(y.layout().strides(), &[0, 1]);
        assert!(broadcastable(&x, &y, false));
        // The original handle is untouched.
        assert_eq!(a.dims(), &[2, 3, 4]);
        assert_eq!(num_elements(&x), 24);
    }

    #[test]
    fn test_compress_rejects_incompatible() {
        let mut x = f32_tensor(&[3, 4]);
        let mut y = f32_tensor(&[4, 3]);
        assert!(compress(&mut [&mut x, &mut y]).is_err());
    }

    #[test]
    fn test_with_layout_forwarding() {
        let t = f32_tensor(&[6]);
        let v = with_layout(&t, Layout::contiguous(Shape::from((3, 2)))).unwrap();
        assert_eq!(v.dims(), &[3, 2]);
        assert!(v.same_storage(&t));
    }
}
