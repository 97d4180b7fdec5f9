use std::ops::Range;
use std::sync::Arc;

use crate::device::Device;
use crate::dtype::{DType, WithDType};
use crate::error::{Error, Result};
use crate::hazard::MemoryChecker;
use crate::layout::Layout;
use crate::shape::Shape;
use crate::storage::Storage;

// Tensor — A typed, strided view over a shared storage region
//
// ARCHITECTURE:
//
//   Tensor (handle) ──Arc──▶ TensorImpl { layout, dtype, device, storage }
//                                                               │
//                                                      Arc<Storage> (bytes + MemoryChecker)
//
//   Cloning a Tensor clones the handle only: both handles share one impl, so
//   they are aliases in the strictest sense. Views (transpose, narrow,
//   broadcast_as, reshape, with_layout) build a NEW impl over the SAME
//   storage: they alias the bytes but not the layout.
//
// COPY-ON-WRITE:
//
//   `set_layout` changes the layout of this handle only. If the impl is not
//   shared it is edited in place (Arc::get_mut); otherwise the handle gets a
//   fresh impl and every other alias keeps the old layout.

/// Everything a tensor handle points at.
#[derive(Debug, Clone)]
struct TensorImpl {
    layout: Layout,
    dtype: DType,
    device: Device,
    storage: Arc<Storage>,
}

/// A shared handle to a strided tensor.
///
/// ```ignore
/// use sentinel_core::{Device, Tensor};
///
/// let a = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], (2, 3), Device::Cpu)?;
/// let t = a.transpose(0, 1)?;
/// assert_eq!(t.to_vec::<f32>()?, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
/// ```
#[derive(Clone)]
pub struct Tensor {
    inner: Arc<TensorImpl>,
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tensor(storage={:?}, shape={}, strides={:?}, offset={}, dtype={}, device={})",
            self.inner.storage.id(),
            self.inner.layout.shape(),
            self.inner.layout.strides(),
            self.inner.layout.offset(),
            self.inner.dtype,
            self.inner.device,
        )
    }
}

fn check_bounds(layout: &Layout, dtype: DType, storage: &Storage) -> Result<()> {
    layout.validate()?;
    let required = layout.required_bytes(dtype.size_in_bytes());
    if required > storage.len_bytes() {
        return Err(Error::LayoutOutOfBounds {
            required,
            available: storage.len_bytes(),
        });
    }
    Ok(())
}

impl Tensor {
    // Construction

    /// Wrap an existing storage region with a layout. The layout must stay
    /// inside the region.
    pub fn from_storage(storage: Arc<Storage>, layout: Layout, dtype: DType) -> Result<Self> {
        check_bounds(&layout, dtype, &storage)?;
        Ok(Tensor {
            inner: Arc::new(TensorImpl {
                layout,
                dtype,
                device: storage.device(),
                storage,
            }),
        })
    }

    /// A contiguous tensor over a new, not yet materialized region.
    pub fn empty(shape: impl Into<Shape>, dtype: DType, device: Device) -> Self {
        let shape = shape.into();
        let storage = Storage::new(shape.elem_count() * dtype.size_in_bytes(), device);
        Tensor {
            inner: Arc::new(TensorImpl {
                layout: Layout::contiguous(shape),
                dtype,
                device,
                storage: Arc::new(storage),
            }),
        }
    }

    /// Like [`Tensor::empty`], with the region zero-filled on first access.
    pub fn zeros(shape: impl Into<Shape>, dtype: DType, device: Device) -> Self {
        let t = Self::empty(shape, dtype, device);
        t.zero_on_allocation();
        t
    }

    /// A contiguous tensor holding a copy of `data`.
    pub fn from_slice<T: WithDType>(
        data: &[T],
        shape: impl Into<Shape>,
        device: Device,
    ) -> Result<Self> {
        let shape = shape.into();
        if data.len() != shape.elem_count() {
            return Err(Error::ElementCountMismatch {
                expected: shape.elem_count(),
                got: data.len(),
                shape,
            });
        }
        let size = T::DTYPE.size_in_bytes();
        let mut bytes = vec![0u8; data.len() * size];
        for (chunk, &value) in bytes.chunks_exact_mut(size).zip(data) {
            value.write_le_slice(chunk);
        }
        Ok(Tensor {
            inner: Arc::new(TensorImpl {
                layout: Layout::contiguous(shape),
                dtype: T::DTYPE,
                device,
                storage: Arc::new(Storage::from_bytes(bytes, device)),
            }),
        })
    }

    // Views (share the storage region, new impl)

    /// A new impl over the same storage. Callers guarantee `layout` is in bounds.
    pub(crate) fn view(&self, layout: Layout) -> Self {
        Tensor {
            inner: Arc::new(TensorImpl {
                layout,
                ..(*self.inner).clone()
            }),
        }
    }

    pub fn transpose(&self, dim0: usize, dim1: usize) -> Result<Self> {
        Ok(self.view(self.inner.layout.transpose(dim0, dim1)?))
    }

    pub fn narrow(&self, dim: usize, start: usize, len: usize) -> Result<Self> {
        Ok(self.view(self.inner.layout.narrow(dim, start, len)?))
    }

    /// Expand to `shape` with stride-0 broadcast axes.
    pub fn broadcast_as(&self, shape: impl Into<Shape>) -> Result<Self> {
        Ok(self.view(self.inner.layout.broadcast_as(&shape.into())?))
    }

    /// Reinterpret a contiguous tensor with a new shape.
    pub fn reshape(&self, shape: impl Into<Shape>) -> Result<Self> {
        Ok(self.view(self.inner.layout.reshape(shape.into())?))
    }

    /// A view over the same region with an arbitrary layout.
    pub fn with_layout(&self, layout: Layout) -> Result<Self> {
        check_bounds(&layout, self.inner.dtype, &self.inner.storage)?;
        Ok(self.view(layout))
    }

    // Accessors

    pub fn shape(&self) -> &Shape {
        self.inner.layout.shape()
    }

    pub fn dims(&self) -> &[usize] {
        self.inner.layout.dims()
    }

    pub fn rank(&self) -> usize {
        self.inner.layout.rank()
    }

    /// Total number of elements.
    pub fn elem_count(&self) -> usize {
        self.inner.layout.elem_count()
    }

    pub fn dtype(&self) -> DType {
        self.inner.dtype
    }

    pub fn device(&self) -> Device {
        self.inner.device
    }

    pub fn layout(&self) -> &Layout {
        &self.inner.layout
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.inner.storage
    }

    pub fn is_contiguous(&self) -> bool {
        self.inner.layout.is_contiguous()
    }

    /// Bytes of the storage region this tensor's layout can touch.
    pub fn byte_range(&self) -> Range<usize> {
        self.inner.layout.byte_range(self.inner.dtype.size_in_bytes())
    }

    /// Bytes this tensor actually addresses, as sorted disjoint intervals.
    /// Narrower than `byte_range` for strided views.
    pub fn byte_footprint(&self) -> Vec<Range<usize>> {
        self.inner.layout.byte_footprint(self.inner.dtype.size_in_bytes())
    }

    /// True if both handles point at the same impl (full aliases).
    pub fn same_impl(&self, other: &Tensor) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// True if both tensors view the same storage region.
    pub fn same_storage(&self, other: &Tensor) -> bool {
        Arc::ptr_eq(&self.inner.storage, &other.inner.storage)
    }

    /// True if no other handle shares this tensor's impl.
    pub fn is_unique(&self) -> bool {
        Arc::strong_count(&self.inner) == 1
    }

    // Layout mutation

    /// Replace this handle's layout, copy-on-write.
    pub fn set_layout(&mut self, layout: Layout) -> Result<()> {
        check_bounds(&layout, self.inner.dtype, &self.inner.storage)?;
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.layout = layout,
            None => *self = self.view(layout),
        }
        Ok(())
    }

    // Storage forwarders

    /// See [`Storage::zero_on_allocation`].
    pub fn zero_on_allocation(&self) {
        self.inner.storage.zero_on_allocation()
    }

    pub fn memory_checker(&self) -> &MemoryChecker {
        self.inner.storage.memory_checker()
    }

    // Data access

    fn check_dtype<T: WithDType>(&self) -> Result<()> {
        if T::DTYPE != self.inner.dtype {
            return Err(Error::DTypeMismatch {
                expected: self.inner.dtype,
                got: T::DTYPE,
            });
        }
        Ok(())
    }

    /// Copy the elements out in logical (row-major) order.
    pub fn to_vec<T: WithDType>(&self) -> Result<Vec<T>> {
        self.check_dtype::<T>()?;
        let size = self.inner.dtype.size_in_bytes();
        let layout = &self.inner.layout;
        Ok(self.inner.storage.read(|bytes| {
            layout
                .strided_indices()
                .map(|i| T::from_le_slice(&bytes[i * size..(i + 1) * size]))
                .collect()
        }))
    }

    /// Write `data` through the layout, in logical order.
    pub fn write_slice<T: WithDType>(&self, data: &[T]) -> Result<()> {
        self.check_dtype::<T>()?;
        if data.len() != self.elem_count() {
            return Err(Error::ElementCountMismatch {
                shape: self.shape().clone(),
                expected: self.elem_count(),
                got: data.len(),
            });
        }
        let size = self.inner.dtype.size_in_bytes();
        let layout = &self.inner.layout;
        self.inner.storage.write(|bytes| {
            for (i, &value) in layout.strided_indices().zip(data) {
                value.write_le_slice(&mut bytes[i * size..(i + 1) * size]);
            }
        });
        Ok(())
    }
}
