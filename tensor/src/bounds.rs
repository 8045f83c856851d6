use std::fmt;
use std::iter;
use std::ops::Deref;

use itertools::Itertools;

use ht_error::*;

/// The shape of a tensor: the extent of each of its dimensions, outermost first.
#[derive(Clone, Default, Eq, PartialEq, Hash)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Return `true` if the given `coord` exists within this `Shape`.
    pub fn contains_coord(&self, coord: &[usize]) -> bool {
        if coord.len() != self.len() {
            return false;
        }

        coord.iter().zip(&self.0).all(|(i, dim)| i < dim)
    }

    /// Return the row-major offset of the given `coord`, which must be valid for this `Shape`.
    pub fn offset_of(&self, coord: &[usize]) -> usize {
        debug_assert!(self.contains_coord(coord));

        coord
            .iter()
            .zip(&self.0)
            .fold(0, |offset, (i, dim)| offset * dim + i)
    }

    /// Return the number of elements contained within this `Shape`.
    pub fn size(&self) -> usize {
        self.0.iter().product()
    }

    /// Return an `HTError` if this `Shape` has a zero extent or is too large to address.
    ///
    /// An empty `Shape` is valid: it describes a scalar.
    pub fn validate(&self) -> HTResult<()> {
        let mut size = 1usize;
        for dim in &self.0 {
            if dim == &0 {
                return Err(HTError::bad_request("invalid tensor dimension", dim));
            } else if let Some(m) = size.checked_mul(*dim) {
                size = m;
            } else {
                return Err(HTError::bad_request(
                    "tensor shape exceeds the maximum addressable size",
                    self,
                ));
            }
        }

        Ok(())
    }

    /// Return an `HTError` if the given `coord` doesn't fit within this `Shape`.
    pub fn validate_coord(&self, coord: &[usize]) -> HTResult<()> {
        if self.contains_coord(coord) {
            Ok(())
        } else {
            Err(HTError::bad_request(
                format!("tensor of shape {} does not contain", self),
                format!("[{}]", coord.iter().join(", ")),
            ))
        }
    }
}

impl Deref for Shape {
    type Target = [usize];

    fn deref(&self) -> &[usize] {
        &self.0
    }
}

impl From<Vec<usize>> for Shape {
    fn from(shape: Vec<usize>) -> Shape {
        Shape(shape)
    }
}

impl iter::FromIterator<usize> for Shape {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Shape(iter.into_iter().collect())
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}]", self.0.iter().join(", "))
    }
}
