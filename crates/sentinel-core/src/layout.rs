use std::ops::Range;

use crate::error::{Error, Result};
use crate::shape::Shape;

// Layout — How a tensor's logical shape maps onto its storage region
//
// A Layout is shape + strides + offset, all in ELEMENTS and in public axis
// order. Views (transpose, narrow, broadcast) only change the Layout; the
// storage region underneath is shared.
//
// Beyond addressing, the layout answers the geometric questions the
// compatibility layer needs:
//
// 1. Footprint: `span()` / `byte_range()` give the smallest interval of the
//    region the layout can touch; `byte_footprint()` gives the exact bytes,
//    which is what the hazard tracker records.
//
// 2. Overlap: do two layouts over the same region share at least one byte?
//    Interval rejection first, a dense-range fast path second, and an exact
//    sorted-interval intersection last.
//
// 3. Coverage: does the layout reach every byte of a region of a given size,
//    with no gaps and nothing left over?
//
// 4. Canonical form: drop extent-1 axes and merge neighbouring axes whose
//    strides nest (outer stride == inner stride * inner extent). This keeps
//    the exact set of addressed elements AND their logical order.
//    `compress` does the same jointly for the operands of one operation.

/// Layout describes how a tensor's logical shape maps to flat storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    shape: Shape,
    strides: Vec<usize>,
    /// Offset (in elements) into the storage region where element [0, .., 0] lives.
    offset: usize,
}

impl Layout {
    /// Create a new contiguous row-major layout for the given shape.
    pub fn contiguous(shape: Shape) -> Self {
        let strides = shape.stride_contiguous();
        Layout {
            shape,
            strides,
            offset: 0,
        }
    }

    /// Create a layout with explicit strides and offset, without validation.
    pub fn new(shape: Shape, strides: Vec<usize>, offset: usize) -> Self {
        Layout {
            shape,
            strides,
            offset,
        }
    }

    /// Create a layout with explicit strides and offset, checking that the
    /// strides match the rank and that the furthest element is addressable.
    pub fn try_new(shape: Shape, strides: Vec<usize>, offset: usize) -> Result<Self> {
        let layout = Layout {
            shape,
            strides,
            offset,
        };
        layout.validate()?;
        Ok(layout)
    }

    /// Check that the strides match the rank and that the element count and
    /// every element offset fit in `usize`.
    pub fn validate(&self) -> Result<()> {
        if self.shape.rank() != self.strides.len() {
            return Err(Error::RankStrideMismatch {
                rank: self.shape.rank(),
                strides: self.strides.len(),
            });
        }
        let overflow = || Error::LayoutOverflow {
            shape: self.shape.clone(),
            strides: self.strides.clone(),
        };
        let count = self
            .dims()
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(overflow)?;
        if count > 0 {
            let mut last = self.offset;
            for (&d, &s) in self.dims().iter().zip(&self.strides) {
                last = (d - 1)
                    .checked_mul(s)
                    .and_then(|step| last.checked_add(step))
                    .ok_or_else(overflow)?;
            }
            last.checked_add(1).ok_or_else(overflow)?;
        }
        Ok(())
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn elem_count(&self) -> usize {
        self.shape.elem_count()
    }

    /// Check if this layout is dense row-major starting at its offset.
    ///
    /// Extent-1 axes are ignored: their stride never moves the cursor.
    pub fn is_contiguous(&self) -> bool {
        if self.elem_count() == 0 {
            return true;
        }
        let mut expected = 1usize;
        for (&d, &s) in self.dims().iter().zip(&self.strides).rev() {
            if d == 1 {
                continue;
            }
            if s != expected {
                return false;
            }
            expected *= d;
        }
        true
    }

    // Views

    /// Transpose two dimensions.
    ///
    /// Example: [2, 3, 4] transpose(0, 2) → [4, 3, 2]
    ///          strides [12, 4, 1]         → [1, 4, 12]
    pub fn transpose(&self, dim0: usize, dim1: usize) -> Result<Layout> {
        let rank = self.rank();
        if dim0 >= rank || dim1 >= rank {
            return Err(Error::DimOutOfRange {
                dim: dim0.max(dim1),
                rank,
            });
        }
        let mut new_dims = self.shape.dims().to_vec();
        let mut new_strides = self.strides.clone();
        new_dims.swap(dim0, dim1);
        new_strides.swap(dim0, dim1);
        Ok(Layout::new(Shape::new(new_dims), new_strides, self.offset))
    }

    /// Narrow (slice) along a dimension.
    ///
    /// Example: [4, 6] narrow(dim=1, start=2, len=3) → [4, 3], offset += 2
    pub fn narrow(&self, dim: usize, start: usize, len: usize) -> Result<Layout> {
        let rank = self.rank();
        if dim >= rank {
            return Err(Error::DimOutOfRange { dim, rank });
        }
        let dim_size = self.shape.dims()[dim];
        if start + len > dim_size {
            return Err(Error::NarrowOutOfBounds {
                dim,
                start,
                len,
                dim_size,
            });
        }
        let mut new_dims = self.shape.dims().to_vec();
        new_dims[dim] = len;
        let new_offset = self.offset + start * self.strides[dim];
        Ok(Layout::new(
            Shape::new(new_dims),
            self.strides.clone(),
            new_offset,
        ))
    }

    /// Expand to `target` by giving broadcast axes (extent 1, or missing on
    /// the left) a stride of 0.
    pub fn broadcast_as(&self, target: &Shape) -> Result<Layout> {
        if target.rank() < self.rank() || !Shape::broadcastable(&self.shape, target, true) {
            return Err(Error::NotBroadcastable {
                lhs: self.shape.clone(),
                rhs: target.clone(),
            });
        }
        let pad = target.rank() - self.rank();
        let strides = target
            .dims()
            .iter()
            .enumerate()
            .map(|(axis, &t)| {
                if axis < pad || self.dims()[axis - pad] != t {
                    0
                } else {
                    self.strides[axis - pad]
                }
            })
            .collect();
        Ok(Layout::new(target.clone(), strides, self.offset))
    }

    /// Reinterpret a contiguous layout with a new shape of the same size.
    pub fn reshape(&self, new_shape: Shape) -> Result<Layout> {
        if new_shape.elem_count() != self.elem_count() {
            return Err(Error::ReshapeElementMismatch {
                src: self.elem_count(),
                dst: new_shape.elem_count(),
                dst_shape: new_shape,
            });
        }
        if !self.is_contiguous() {
            return Err(Error::NotContiguous {
                shape: self.shape.clone(),
            });
        }
        let strides = new_shape.stride_contiguous();
        Ok(Layout::new(new_shape, strides, self.offset))
    }

    // Addressing

    /// flat_index = offset + sum(index[i] * stride[i])
    pub fn flat_index(&self, index: &[usize]) -> usize {
        let mut flat = self.offset;
        for (i, &idx) in index.iter().enumerate() {
            flat += idx * self.strides[i];
        }
        flat
    }

    /// Iterator over the element offsets of this layout, in logical order.
    pub fn strided_indices(&self) -> StridedIter {
        StridedIter::new(self)
    }

    // Footprint

    /// Element offsets the layout can touch: `offset ..= furthest element`.
    /// `None` for layouts with no elements.
    ///
    /// Saturates at `usize::MAX` for layouts that fail [`Layout::validate`].
    pub fn span(&self) -> Option<Range<usize>> {
        if self.dims().contains(&0) {
            return None;
        }
        let end = self
            .dims()
            .iter()
            .zip(&self.strides)
            .fold(self.offset, |acc, (&d, &s)| {
                acc.saturating_add((d - 1).saturating_mul(s))
            })
            .saturating_add(1);
        Some(self.offset..end)
    }

    /// Byte interval of the footprint for elements of `elem_size` bytes.
    /// Empty layouts give an empty range at the offset.
    pub fn byte_range(&self, elem_size: usize) -> Range<usize> {
        let start = self.offset.saturating_mul(elem_size);
        match self.span() {
            Some(span) => start..span.end.saturating_mul(elem_size),
            None => start..start,
        }
    }

    /// Bytes a storage region must hold for this layout to be in bounds.
    pub fn required_bytes(&self, elem_size: usize) -> usize {
        self.span()
            .map_or(0, |span| span.end.saturating_mul(elem_size))
    }

    /// The bytes actually addressed by the layout, as sorted disjoint
    /// intervals. One interval when the canonical layout is dense; a strided
    /// view gets one interval per run of adjacent elements.
    pub fn byte_footprint(&self, elem_size: usize) -> Vec<Range<usize>> {
        if self.elem_count() == 0 || elem_size == 0 {
            return Vec::new();
        }
        let canonical = self.canonical();
        if canonical.is_dense_interval() {
            return vec![self.byte_range(elem_size)];
        }
        canonical.byte_intervals(elem_size)
    }

    /// Sorted, disjoint byte intervals actually addressed by the layout.
    pub(crate) fn byte_intervals(&self, elem_size: usize) -> Vec<Range<usize>> {
        let mut starts: Vec<usize> = self.strided_indices().map(|i| i * elem_size).collect();
        starts.sort_unstable();
        let mut merged: Vec<Range<usize>> = Vec::new();
        for start in starts {
            let end = start + elem_size;
            match merged.last_mut() {
                Some(last) if start <= last.end => last.end = last.end.max(end),
                _ => merged.push(start..end),
            }
        }
        merged
    }

    /// True for canonical layouts that address one dense interval.
    fn is_dense_interval(&self) -> bool {
        self.rank() == 0 || (self.rank() == 1 && self.strides[0] == 1)
    }

    /// True if the two layouts, over the same region, share at least one byte.
    pub fn overlaps(&self, elem_size: usize, other: &Layout, other_elem_size: usize) -> bool {
        if self.elem_count() == 0 || other.elem_count() == 0 {
            return false;
        }
        let a = self.byte_range(elem_size);
        let b = other.byte_range(other_elem_size);
        if a.end <= b.start || b.end <= a.start {
            return false;
        }

        let ca = self.canonical();
        let cb = other.canonical();
        if ca.is_dense_interval() && cb.is_dense_interval() {
            return true;
        }

        // Exact test: materialize the smaller footprint, probe with the larger.
        let (small, small_size, large, large_size) = if ca.elem_count() <= cb.elem_count() {
            (&ca, elem_size, &cb, other_elem_size)
        } else {
            (&cb, other_elem_size, &ca, elem_size)
        };
        let intervals = small.byte_intervals(small_size);
        large.strided_indices().any(|idx| {
            let start = idx * large_size;
            let end = start + large_size;
            let pos = intervals.partition_point(|iv| iv.end <= start);
            intervals.get(pos).is_some_and(|iv| iv.start < end)
        })
    }

    /// True if every byte of a `storage_bytes`-long region is reachable
    /// through this layout, with no gaps and no bytes beyond it.
    pub fn covers(&self, elem_size: usize, storage_bytes: usize) -> bool {
        if self.elem_count() == 0 {
            return storage_bytes == 0;
        }
        if elem_size == 0 || self.offset != 0 || storage_bytes % elem_size != 0 {
            return false;
        }
        let len = storage_bytes / elem_size;
        if self.span().map_or(0, |s| s.end) != len || self.elem_count() < len {
            return false;
        }

        // Fast path: the moving axes tile [0, len) exactly when sorted by stride.
        let mut axes: Vec<(usize, usize)> = self
            .dims()
            .iter()
            .copied()
            .zip(self.strides.iter().copied())
            .filter(|&(d, s)| d > 1 && s > 0)
            .collect();
        axes.sort_unstable_by_key(|&(_, s)| s);
        let mut expected = 1usize;
        let mut tiles = true;
        for (d, s) in axes {
            if s != expected {
                tiles = false;
                break;
            }
            expected *= d;
        }
        if tiles {
            return expected == len;
        }

        // Self-overlapping strides can still cover everything; count hits.
        let mut seen = vec![false; len];
        let mut distinct = 0usize;
        for idx in self.strided_indices() {
            if !seen[idx] {
                seen[idx] = true;
                distinct += 1;
            }
        }
        distinct == len
    }

    // Canonical forms

    /// Minimal layout addressing the same elements in the same order.
    ///
    /// [2, 1, 3, 4] strides [12, 7, 4, 1] → [24] strides [1].
    /// Layouts with no elements become [0] strides [1] at offset 0.
    pub fn canonical(&self) -> Layout {
        if self.elem_count() == 0 {
            return Layout::new(Shape::new(vec![0]), vec![1], 0);
        }
        let mut dims: Vec<usize> = Vec::with_capacity(self.rank());
        let mut strides: Vec<usize> = Vec::with_capacity(self.rank());
        for (&d, &s) in self.dims().iter().zip(&self.strides) {
            if d == 1 {
                continue;
            }
            if let (Some(outer_d), Some(outer_s)) = (dims.last_mut(), strides.last_mut()) {
                if *outer_s == s * d {
                    *outer_d *= d;
                    *outer_s = s;
                    continue;
                }
            }
            dims.push(d);
            strides.push(s);
        }
        Layout::new(Shape::new(dims), strides, self.offset)
    }

    pub fn is_canonical(&self) -> bool {
        self.canonical() == *self
    }

    /// Jointly compress the layouts of one operation's operands.
    ///
    /// All layouts are padded to a common rank; axes that are 1 in every
    /// layout are dropped, and neighbouring axes are merged only when the
    /// merge is valid for every layout at once: either both axes broadcast
    /// (extent 1 against a larger extent) or neither does and the strides
    /// nest. Every layout ends up with the same rank, still addresses the
    /// same elements in the same order, and stays broadcast-compatible with
    /// the others.
    pub fn compress(layouts: &mut [Layout]) -> Result<()> {
        let Some(first) = layouts.first() else {
            return Ok(());
        };
        let rank = layouts.iter().map(Layout::rank).max().unwrap_or(0);

        let mut full = vec![1usize; rank];
        for layout in layouts.iter() {
            for (axis, f) in full.iter_mut().enumerate() {
                let d = layout.shape.padded_dim(rank, axis);
                if d == 1 {
                    continue;
                }
                if *f != 1 && *f != d {
                    return Err(Error::NotBroadcastable {
                        lhs: first.shape.clone(),
                        rhs: layout.shape.clone(),
                    });
                }
                *f = d;
            }
        }

        // (dims, strides) per layout, left-padded to `rank`.
        let padded: Vec<(Vec<usize>, Vec<usize>)> = layouts
            .iter()
            .map(|l| {
                let pad = rank - l.rank();
                let mut dims = vec![1; pad];
                dims.extend_from_slice(l.dims());
                let mut strides = vec![0; pad];
                strides.extend_from_slice(&l.strides);
                (dims, strides)
            })
            .collect();

        let mut out_full: Vec<usize> = Vec::with_capacity(rank);
        let mut out: Vec<(Vec<usize>, Vec<usize>)> = vec![(Vec::new(), Vec::new()); layouts.len()];
        for axis in 0..rank {
            let extent = full[axis];
            if extent == 1 {
                continue;
            }
            let mergeable = match out_full.last() {
                Some(&outer) if outer != 0 && extent != 0 => {
                    padded.iter().zip(&out).all(|((dims, strides), (od, os))| {
                        let (outer_d, outer_s) = (od[od.len() - 1], os[os.len() - 1]);
                        match (outer_d == 1, dims[axis] == 1) {
                            (true, true) => true,
                            (false, false) => outer_s == strides[axis] * dims[axis],
                            _ => false,
                        }
                    })
                }
                _ => false,
            };
            if mergeable {
                if let Some(outer) = out_full.last_mut() {
                    *outer *= extent;
                }
                for ((dims, strides), (od, os)) in padded.iter().zip(out.iter_mut()) {
                    if dims[axis] != 1 {
                        let last = od.len() - 1;
                        od[last] *= dims[axis];
                        os[last] = strides[axis];
                    }
                }
            } else {
                out_full.push(extent);
                for ((dims, strides), (od, os)) in padded.iter().zip(out.iter_mut()) {
                    od.push(dims[axis]);
                    os.push(strides[axis]);
                }
            }
        }

        for (layout, (dims, strides)) in layouts.iter_mut().zip(out) {
            *layout = Layout::new(Shape::new(dims), strides, layout.offset);
        }
        Ok(())
    }
}

// StridedIter — Element offsets of a layout in logical (row-major) order
//
// For a contiguous layout this counts offset, offset+1, ...; for transposed or
// broadcast layouts it follows the strides (and may repeat offsets when a
// stride is 0).

/// Iterator that yields flat storage indices for each element of a Layout.
pub struct StridedIter {
    current: Vec<usize>,
    dims: Vec<usize>,
    strides: Vec<usize>,
    offset: usize,
    remaining: usize,
    started: bool,
}

impl StridedIter {
    fn new(layout: &Layout) -> Self {
        StridedIter {
            current: vec![0; layout.rank()],
            dims: layout.dims().to_vec(),
            strides: layout.strides().to_vec(),
            offset: layout.offset(),
            remaining: layout.elem_count(),
            started: false,
        }
    }

    fn flat_index(&self) -> usize {
        self.current
            .iter()
            .zip(&self.strides)
            .fold(self.offset, |acc, (&i, &s)| acc + i * s)
    }

    /// Advance the multi-dimensional index by one (rightmost dimension first).
    fn advance(&mut self) {
        for i in (0..self.dims.len()).rev() {
            self.current[i] += 1;
            if self.current[i] < self.dims[i] {
                return;
            }
            self.current[i] = 0;
        }
    }
}

impl Iterator for StridedIter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        if self.started {
            self.advance();
        }
        self.started = true;
        self.remaining -= 1;
        Some(self.flat_index())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for StridedIter {}

#[cfg(test)]
mod tests {
    use super::*;

    fn contiguous(dims: &[usize]) -> Layout {
        Layout::contiguous(Shape::from(dims))
    }

    fn indices(layout: &Layout) -> Vec<usize> {
        layout.strided_indices().collect()
    }

    #[test]
    fn test_contiguous_layout() {
        let layout = contiguous(&[2, 3]);
        assert!(layout.is_contiguous());
        assert_eq!(layout.strides(), &[3, 1]);
        assert_eq!(layout.offset(), 0);
        assert_eq!(indices(&layout), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_try_new_rejects_rank_mismatch() {
        let err = Layout::try_new(Shape::from((2, 3)), vec![1], 0).unwrap_err();
        assert!(matches!(err, Error::RankStrideMismatch { rank: 2, strides: 1 }));
        assert!(Layout::try_new(Shape::from((2, 3)), vec![1, 2], 5).is_ok());
    }

    #[test]
    fn test_validate_rejects_overflow() {
        let huge = Layout::new(Shape::from((2, 2)), vec![usize::MAX, 1], 0);
        assert!(matches!(huge.validate(), Err(Error::LayoutOverflow { .. })));
        assert_eq!(huge.span(), Some(0..usize::MAX));
        assert_eq!(huge.required_bytes(4), usize::MAX);
        let wide = Layout::new(Shape::from((usize::MAX, 2)), vec![0, 0], 0);
        assert!(matches!(wide.validate(), Err(Error::LayoutOverflow { .. })));
        assert!(contiguous(&[0, 3]).validate().is_ok());
    }

    #[test]
    fn test_transpose_indices() {
        // [[0, 1, 2], [3, 4, 5]] read column-major
        let transposed = contiguous(&[2, 3]).transpose(0, 1).unwrap();
        assert_eq!(transposed.dims(), &[3, 2]);
        assert_eq!(transposed.strides(), &[1, 3]);
        assert!(!transposed.is_contiguous());
        assert_eq!(indices(&transposed), vec![0, 3, 1, 4, 2, 5]);
    }

    #[test]
    fn test_narrow() {
        let narrowed = contiguous(&[4, 6]).narrow(1, 2, 3).unwrap();
        assert_eq!(narrowed.dims(), &[4, 3]);
        assert_eq!(narrowed.offset(), 2);
        assert_eq!(narrowed.strides(), &[6, 1]);
        assert!(contiguous(&[4, 6]).narrow(1, 5, 3).is_err());
    }

    #[test]
    fn test_singleton_strides_do_not_break_contiguity() {
        let layout = Layout::new(Shape::from((2, 1, 4)), vec![4, 99, 1], 3);
        assert!(layout.is_contiguous());
    }

    #[test]
    fn test_broadcast_as() {
        let b = contiguous(&[8, 1]).broadcast_as(&Shape::from((2, 8, 3))).unwrap();
        assert_eq!(b.strides(), &[0, 1, 0]);
        assert_eq!(b.elem_count(), 48);
        assert!(contiguous(&[3, 4]).broadcast_as(&Shape::from((4, 3))).is_err());
        assert!(contiguous(&[2, 3]).broadcast_as(&Shape::from(3)).is_err());
    }

    #[test]
    fn test_reshape_requires_contiguous() {
        let layout = contiguous(&[2, 6]).narrow(0, 1, 1).unwrap();
        let reshaped = layout.reshape(Shape::from((3, 2))).unwrap();
        assert_eq!(reshaped.offset(), 6);
        let t = contiguous(&[2, 3]).transpose(0, 1).unwrap();
        assert!(matches!(t.reshape(Shape::from(6)), Err(Error::NotContiguous { .. })));
        assert!(matches!(
            contiguous(&[2, 3]).reshape(Shape::from(5)),
            Err(Error::ReshapeElementMismatch { .. })
        ));
    }

    #[test]
    fn test_flat_index() {
        let layout = contiguous(&[2, 3, 4]);
        assert_eq!(layout.flat_index(&[1, 2, 3]), 23);
        assert_eq!(layout.flat_index(&[0, 0, 0]), 0);
    }

    #[test]
    fn test_span_and_byte_range() {
        let layout = contiguous(&[4, 6]).narrow(1, 2, 3).unwrap();
        assert_eq!(layout.span(), Some(2..23));
        assert_eq!(layout.byte_range(4), 8..92);
        assert_eq!(layout.required_bytes(4), 92);
        let empty = contiguous(&[0, 3]);
        assert_eq!(empty.span(), None);
        assert_eq!(empty.byte_range(4), 0..0);
    }

    #[test]
    fn test_byte_footprint() {
        let sliced = contiguous(&[4, 6]).narrow(0, 1, 2).unwrap();
        assert_eq!(sliced.byte_footprint(4), vec![24..72]);
        let even = Layout::new(Shape::from(4), vec![2], 0);
        assert_eq!(even.byte_footprint(4), vec![0..4, 8..12, 16..20, 24..28]);
        let cols = contiguous(&[4, 6]).narrow(1, 0, 3).unwrap();
        assert_eq!(cols.byte_footprint(2)[1], 12..18);
        let b = contiguous(&[1]).broadcast_as(&Shape::from(5)).unwrap();
        assert_eq!(b.byte_footprint(8), vec![0..8]);
        assert!(contiguous(&[0, 3]).byte_footprint(4).is_empty());
    }

    #[test]
    fn test_disjoint_slices_do_not_overlap() {
        let base = contiguous(&[4, 6]);
        let left = base.narrow(1, 0, 3).unwrap();
        let right = base.narrow(1, 3, 3).unwrap();
        // Byte intervals interleave, footprints do not.
        assert!(!left.overlaps(4, &right, 4));
        assert!(left.overlaps(4, &base, 4));
    }

    #[test]
    fn test_even_odd_interleave() {
        let base = contiguous(&[8]);
        let even = Layout::new(Shape::from(4), vec![2], 0);
        let odd = Layout::new(Shape::from(4), vec![2], 1);
        assert!(!even.overlaps(8, &odd, 8));
        assert!(even.overlaps(8, &base, 8));
        // Viewed as bytes of a different size the same offsets collide.
        assert!(even.overlaps(8, &Layout::new(Shape::from(1), vec![1], 1), 16));
    }

    #[test]
    fn test_dense_ranges_overlap_by_interval() {
        let a = contiguous(&[2, 3]);
        let b = Layout::new(Shape::from(4), vec![1], 5);
        assert!(a.overlaps(4, &b, 4));
        let c = Layout::new(Shape::from(4), vec![1], 6);
        assert!(!a.overlaps(4, &c, 4));
    }

    #[test]
    fn test_empty_never_overlaps() {
        let a = contiguous(&[0, 3]);
        assert!(!a.overlaps(4, &contiguous(&[9]), 4));
    }

    #[test]
    fn test_covers() {
        assert!(contiguous(&[2, 3]).covers(4, 24));
        assert!(!contiguous(&[2, 3]).covers(4, 28));
        assert!(contiguous(&[2, 3]).transpose(0, 1).unwrap().covers(4, 24));
        assert!(!contiguous(&[4, 6]).narrow(1, 0, 3).unwrap().covers(4, 96));
        assert!(Layout::new(Shape::scalar(), vec![], 0).covers(8, 8));
        assert!(contiguous(&[0]).covers(4, 0));
    }

    #[test]
    fn test_covers_with_self_overlapping_strides() {
        // Offsets 0, 1, 1, 2: every element of a 3-element region is reached.
        let layout = Layout::new(Shape::from((2, 2)), vec![1, 1], 0);
        assert!(layout.covers(4, 12));
        // A broadcast view of one element covers a one-element region.
        let b = contiguous(&[1]).broadcast_as(&Shape::from(5)).unwrap();
        assert!(b.covers(4, 4));
    }

    #[test]
    fn test_canonical_merges_and_drops() {
        let layout = Layout::new(Shape::from((2, 1, 3, 4)), vec![12, 7, 4, 1], 5);
        let c = layout.canonical();
        assert_eq!(c.dims(), &[24]);
        assert_eq!(c.strides(), &[1]);
        assert_eq!(c.offset(), 5);
        assert_eq!(indices(&c), indices(&layout));
    }

    #[test]
    fn test_canonical_keeps_order_of_transposed() {
        let t = contiguous(&[2, 3]).transpose(0, 1).unwrap();
        assert!(t.is_canonical());
        let sliced = contiguous(&[4, 6]).narrow(1, 1, 4).unwrap();
        assert_eq!(sliced.canonical().dims(), &[4, 4]);
    }

    #[test]
    fn test_canonical_edge_cases() {
        assert_eq!(contiguous(&[1, 1]).canonical().rank(), 0);
        assert_eq!(contiguous(&[3, 0]).canonical().dims(), &[0]);
        let b = contiguous(&[1]).broadcast_as(&Shape::from((3, 4))).unwrap();
        let c = b.canonical();
        assert_eq!(c.dims(), &[12]);
        assert_eq!(c.strides(), &[0]);
    }

    #[test]
    fn test_compress_joint() {
        let mut layouts = vec![contiguous(&[2, 3, 4]), contiguous(&[2, 3, 4])];
        Layout::compress(&mut layouts).unwrap();
        assert_eq!(layouts[0].dims(), &[24]);
        assert_eq!(layouts[1].dims(), &[24]);
    }

    #[test]
    fn test_compress_respects_broadcast_structure() {
        // b broadcasts over axis 0 only; axes 1 and 2 can merge, axis 0 cannot.
        let a = contiguous(&[2, 3, 4]);
        let b = contiguous(&[3, 4]);
        let before: Vec<usize> = indices(&b.broadcast_as(a.shape()).unwrap());
        let mut layouts = vec![a, b];
        Layout::compress(&mut layouts).unwrap();
        assert_eq!(layouts[0].dims(), &[2, 12]);
        assert_eq!(layouts[1].dims(), &[1, 12]);
        let full = Shape::broadcast_shape(layouts[0].shape(), layouts[1].shape()).unwrap();
        assert_eq!(indices(&layouts[1].broadcast_as(&full).unwrap()), before);
    }

    #[test]
    fn test_compress_drops_all_one_axes_and_rejects_mismatch() {
        let mut layouts = vec![contiguous(&[1, 5]), contiguous(&[1, 1, 5])];
        Layout::compress(&mut layouts).unwrap();
        assert_eq!(layouts[0].dims(), &[5]);
        assert_eq!(layouts[1].dims(), &[5]);

        let mut bad = vec![contiguous(&[3, 4]), contiguous(&[4, 3])];
        assert!(matches!(Layout::compress(&mut bad), Err(Error::NotBroadcastable { .. })));
    }

    #[test]
    fn test_compress_keeps_non_nesting_axes() {
        let t = contiguous(&[2, 3]).transpose(0, 1).unwrap();
        let mut layouts = vec![t.clone(), contiguous(&[3, 2])];
        Layout::compress(&mut layouts).unwrap();
        assert_eq!(layouts[0], t);
        assert_eq!(layouts[1].dims(), &[3, 2]);
    }
}
