//! Static shape metadata for tensor values.

use crate::{Error, Result};
use std::fmt;

/// The shape of a tensor value: an ordered sequence of dimension sizes.
///
/// Rank is the number of dimensions; a rank-0 shape is a scalar with one
/// element. Shapes carry no data type: instructions in this IR are compared
/// and rewritten purely on their dimension structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Create a shape from dimension sizes.
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    /// Create a rank-0 (scalar) shape.
    pub fn scalar() -> Self {
        Self { dims: Vec::new() }
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// All dimension sizes, in order.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Size of one dimension, or `None` if the index is out of range.
    pub fn dim(&self, index: usize) -> Option<usize> {
        self.dims.get(index).copied()
    }

    /// Overwrite the size of one dimension.
    pub fn set_dim(&mut self, index: usize, size: usize) -> Result<()> {
        match self.dims.get_mut(index) {
            Some(dim) => {
                *dim = size;
                Ok(())
            }
            None => Err(Error::Shape(format!(
                "dimension {} out of range for rank-{} shape {}",
                index,
                self.rank(),
                self
            ))),
        }
    }

    /// Total number of elements (product of all dimensions, 1 for scalars).
    pub fn element_count(&self) -> usize {
        self.dims.iter().product()
    }

    /// Whether two shapes describe the same data modulo unit dimensions.
    ///
    /// True iff the subsequences of non-unit dimensions are identical, i.e.
    /// one shape can be turned into the other purely by inserting or removing
    /// size-1 dimensions. Element order is unaffected by such a reinterpretation.
    pub fn eq_ignoring_unit_dims(&self, other: &Shape) -> bool {
        let mut lhs = self.dims.iter().filter(|&&d| d != 1);
        let mut rhs = other.dims.iter().filter(|&&d| d != 1);
        loop {
            match (lhs.next(), rhs.next()) {
                (None, None) => return true,
                (Some(a), Some(b)) if a == b => continue,
                _ => return false,
            }
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, dim) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", dim)?;
        }
        write!(f, "]")
    }
}
