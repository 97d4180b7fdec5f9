use std::fmt;

// Shape — N-dimensional shape in public axis order
//
// A Shape lists the extent of each axis, outermost first:
//   - Scalar: Shape([])          — rank 0, 1 element
//   - Vector: Shape([5])         — rank 1, 5 elements
//   - Matrix: Shape([3, 4])      — rank 2, 12 elements
//
// Extents may be 0 (empty tensor). An extent of 1 is the broadcasting
// wildcard.
//
// BROADCASTING
//
// Shapes of different rank are compared after (virtually) padding the shorter
// one on the LEFT with extent-1 axes: [8, 1] against [2, 8, 3] is read as
// [1, 8, 1]. Padding never allocates and never touches the stored dims; it is
// expressed through `padded_dim`. Per aligned axis the extents must be equal
// or one of them must be 1.

/// N-dimensional shape of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Create a new shape from a vector of dimension sizes.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    /// The rank-0 shape.
    pub fn scalar() -> Self {
        Shape(Vec::new())
    }

    /// The dimension sizes as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of dimensions (0 for scalar).
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements: 1 for a scalar, 0 if any extent is 0.
    pub fn elem_count(&self) -> usize {
        self.0.iter().product::<usize>()
    }

    /// Contiguous row-major strides, in elements.
    ///
    /// For shape [2, 3, 4], strides are [12, 4, 1].
    pub fn stride_contiguous(&self) -> Vec<usize> {
        let mut strides = vec![0usize; self.rank()];
        let mut running = 1usize;
        for i in (0..self.rank()).rev() {
            strides[i] = running;
            running = running.saturating_mul(self.0[i]);
        }
        strides
    }

    /// Size of a specific dimension.
    pub fn dim(&self, d: usize) -> crate::Result<usize> {
        self.0.get(d).copied().ok_or(crate::Error::DimOutOfRange {
            dim: d,
            rank: self.rank(),
        })
    }

    /// Extent of `axis` after left-padding this shape to `rank` axes.
    ///
    /// `rank` must be at least `self.rank()`; axes in the padded prefix are 1.
    pub fn padded_dim(&self, rank: usize, axis: usize) -> usize {
        debug_assert!(rank >= self.rank() && axis < rank);
        let pad = rank - self.rank();
        if axis < pad {
            1
        } else {
            self.0[axis - pad]
        }
    }

    // Broadcasting predicates

    /// True if `a` and `b` broadcast against each other.
    ///
    /// With `b_non_reducing`, `b` may not be 1 on an axis where `a` is not 1:
    /// `b` must never be the narrower operand.
    pub fn broadcastable(a: &Shape, b: &Shape, b_non_reducing: bool) -> bool {
        let rank = a.rank().max(b.rank());
        (0..rank).all(|axis| {
            let da = a.padded_dim(rank, axis);
            let db = b.padded_dim(rank, axis);
            if b_non_reducing && db == 1 && da != 1 {
                return false;
            }
            da == db || da == 1 || db == 1
        })
    }

    /// Three-operand form of [`Shape::broadcastable`]: on every padded axis
    /// the extents that are not 1 must all agree.
    ///
    /// With `c_non_reducing`, `c` may not be 1 where `a` or `b` is not 1.
    pub fn broadcastable3(a: &Shape, b: &Shape, c: &Shape, c_non_reducing: bool) -> bool {
        let rank = a.rank().max(b.rank()).max(c.rank());
        (0..rank).all(|axis| {
            let da = a.padded_dim(rank, axis);
            let db = b.padded_dim(rank, axis);
            let dc = c.padded_dim(rank, axis);
            if c_non_reducing && dc == 1 && (da != 1 || db != 1) {
                return false;
            }
            let mut target = 1;
            for d in [da, db, dc] {
                if d == 1 {
                    continue;
                }
                if target != 1 && target != d {
                    return false;
                }
                target = d;
            }
            true
        })
    }

    /// True if the padded extents of `a` and `b` are identical.
    ///
    /// Stronger than [`Shape::broadcastable`]: no axis may use the wildcard.
    pub fn same_dims(a: &Shape, b: &Shape) -> bool {
        let rank = a.rank().max(b.rank());
        (0..rank).all(|axis| a.padded_dim(rank, axis) == b.padded_dim(rank, axis))
    }

    /// True if the padded extents of `a`, `b` and `c` are all identical.
    pub fn same_dims3(a: &Shape, b: &Shape, c: &Shape) -> bool {
        Shape::same_dims(a, b) && Shape::same_dims(b, c)
    }

    /// Compute the broadcast output shape of two shapes.
    ///
    ///   [3, 4] and [4]       → [3, 4]
    ///   [2, 1] and [1, 3]    → [2, 3]
    ///   [5, 3, 1] and [3, 4] → [5, 3, 4]
    ///   [3] and [4]          → Error
    pub fn broadcast_shape(lhs: &Shape, rhs: &Shape) -> crate::Result<Shape> {
        if !Shape::broadcastable(lhs, rhs, false) {
            return Err(crate::Error::NotBroadcastable {
                lhs: lhs.clone(),
                rhs: rhs.clone(),
            });
        }
        let rank = lhs.rank().max(rhs.rank());
        let dims = (0..rank)
            .map(|axis| {
                let l = lhs.padded_dim(rank, axis);
                let r = rhs.padded_dim(rank, axis);
                if l == 1 {
                    r
                } else {
                    l
                }
            })
            .collect();
        Ok(Shape::new(dims))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

// These let you write: Shape::from((3, 4)) instead of Shape::new(vec![3, 4])

impl From<()> for Shape {
    fn from(_: ()) -> Self {
        Shape(vec![])
    }
}

impl From<usize> for Shape {
    fn from(d: usize) -> Self {
        Shape(vec![d])
    }
}

impl From<(usize, usize)> for Shape {
    fn from((d0, d1): (usize, usize)) -> Self {
        Shape(vec![d0, d1])
    }
}

impl From<(usize, usize, usize)> for Shape {
    fn from((d0, d1, d2): (usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2])
    }
}

impl From<(usize, usize, usize, usize)> for Shape {
    fn from((d0, d1, d2, d3): (usize, usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2, d3])
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Shape(v)
    }
}

impl From<&[usize]> for Shape {
    fn from(s: &[usize]) -> Self {
        Shape(s.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(a: [usize; N]) -> Self {
        Shape(a.to_vec())
    }
}
