//! Concrete index arrays, their [`Size`] record, and the staging buffers used to build them.

use std::fmt;

use itertools::Itertools;
use log::trace;

use ht_error::*;

use super::{Format, LevelType, Shape};

/// The index arrays of one level of a [`crate::Storage`].
///
/// The variant always matches the [`LevelType`] of the same level of the storage's format.
#[derive(Clone, Eq, PartialEq)]
pub enum LevelIndex {
    /// A single array holding the extent of this dimension.
    Dense { ptr: Box<[usize]> },
    /// A position array with one entry per parent position plus a leading zero,
    /// and a coordinate array with one entry per stored coordinate.
    Sparse { pos: Box<[usize]>, crd: Box<[usize]> },
    /// A single array holding the fan-out, and a coordinate array holding
    /// exactly that many coordinates per parent position.
    Fixed { ptr: Box<[usize]>, crd: Box<[usize]> },
}

impl LevelIndex {
    pub fn dense(extent: usize) -> Self {
        Self::Dense {
            ptr: vec![extent].into(),
        }
    }

    pub fn sparse(pos: Vec<usize>, crd: Vec<usize>) -> Self {
        Self::Sparse {
            pos: pos.into(),
            crd: crd.into(),
        }
    }

    pub fn fixed(fanout: usize, crd: Vec<usize>) -> Self {
        Self::Fixed {
            ptr: vec![fanout].into(),
            crd: crd.into(),
        }
    }

    pub fn level_type(&self) -> LevelType {
        match self {
            Self::Dense { .. } => LevelType::Dense,
            Self::Sparse { .. } => LevelType::Sparse,
            Self::Fixed { .. } => LevelType::Fixed,
        }
    }

    /// The number of arrays in this group, equal to the multiplicity of its [`LevelType`].
    pub fn len(&self) -> usize {
        self.level_type().multiplicity()
    }

    /// Return the `i`th array of this group, if there is one.
    pub fn array(&self, i: usize) -> Option<&[usize]> {
        match (self, i) {
            (Self::Dense { ptr }, 0) => Some(&ptr[..]),
            (Self::Sparse { pos, .. }, 0) => Some(&pos[..]),
            (Self::Sparse { crd, .. }, 1) => Some(&crd[..]),
            (Self::Fixed { ptr, .. }, 0) => Some(&ptr[..]),
            (Self::Fixed { crd, .. }, 1) => Some(&crd[..]),
            _ => None,
        }
    }

    /// Return every array in this group, in order.
    pub fn arrays(&self) -> Vec<&[usize]> {
        (0..self.len()).filter_map(|i| self.array(i)).collect()
    }

    /// The coordinate array of a compressed level, or `None` for a dense level.
    pub fn coordinates(&self) -> Option<&[usize]> {
        match self {
            Self::Dense { .. } => None,
            Self::Sparse { crd, .. } | Self::Fixed { crd, .. } => Some(&crd[..]),
        }
    }

    /// The lengths of the arrays in this group.
    pub fn size(&self) -> LevelSize {
        match self {
            Self::Dense { ptr } => LevelSize {
                ptr: ptr.len(),
                idx: 0,
            },
            Self::Sparse { pos, crd } => LevelSize {
                ptr: pos.len(),
                idx: crd.len(),
            },
            Self::Fixed { ptr, crd } => LevelSize {
                ptr: ptr.len(),
                idx: crd.len(),
            },
        }
    }

    /// The number of positions at this level, given the number of positions of its parent.
    pub fn num_positions(&self, parents: usize) -> usize {
        match self {
            Self::Dense { ptr } => parents * ptr.first().copied().unwrap_or(0),
            Self::Sparse { crd, .. } | Self::Fixed { crd, .. } => crd.len(),
        }
    }

    /// Check the invariants of this level and return its number of positions.
    fn validate(&self, level_type: LevelType, extent: usize, parents: usize) -> HTResult<usize> {
        if self.level_type() != level_type {
            return Err(HTError::bad_request(
                format!("expected a {} level index but found", level_type),
                self.level_type(),
            ));
        }

        match self {
            Self::Dense { ptr } => {
                if ptr.as_ref() != &[extent][..] {
                    return Err(HTError::bad_request(
                        format!("dense level of extent {} has index", extent),
                        format!("{:?}", ptr),
                    ));
                }

                Ok(parents * extent)
            }
            Self::Sparse { pos, crd } => {
                if pos.len() != parents + 1 {
                    return Err(HTError::bad_request(
                        format!("position array for {} parents has length", parents),
                        pos.len(),
                    ));
                }

                if pos[0] != 0 || pos[parents] != crd.len() {
                    return Err(HTError::bad_request(
                        format!("position array must span [0, {}), found", crd.len()),
                        format!("[{}, {})", pos[0], pos[parents]),
                    ));
                }

                if let Some((start, end)) = pos.iter().tuple_windows().find(|(l, r)| l > r) {
                    return Err(HTError::bad_request(
                        "position array must be non-decreasing",
                        format!("{} > {}", start, end),
                    ));
                }

                for (start, end) in pos.iter().copied().tuple_windows() {
                    validate_segment(&crd[start..end], extent)?;
                }

                Ok(crd.len())
            }
            Self::Fixed { ptr, crd } => {
                let fanout = match ptr.as_ref() {
                    [fanout] => *fanout,
                    other => {
                        return Err(HTError::bad_request(
                            "fixed level index must hold exactly one fan-out, not",
                            format!("{:?}", other),
                        ))
                    }
                };

                if crd.len() != parents * fanout {
                    return Err(HTError::bad_request(
                        format!("fixed level with {} parents of fan-out {} has", parents, fanout),
                        format!("{} coordinates", crd.len()),
                    ));
                }

                if fanout > 0 {
                    for segment in crd.chunks(fanout) {
                        validate_segment(segment, extent)?;
                    }
                }

                Ok(crd.len())
            }
        }
    }
}

fn validate_segment(segment: &[usize], extent: usize) -> HTResult<()> {
    if let Some((l, r)) = segment.iter().tuple_windows().find(|(l, r)| l >= r) {
        return Err(HTError::bad_request(
            "coordinates within a segment must be strictly increasing",
            format!("{} >= {}", l, r),
        ));
    }

    match segment.last() {
        Some(last) if *last >= extent => Err(HTError::bad_request(
            format!("coordinate out of bounds for extent {}", extent),
            last,
        )),
        _ => Ok(()),
    }
}

impl fmt::Debug for LevelIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Dense { ptr } => write!(f, "dense {:?}", ptr),
            Self::Sparse { pos, crd } => write!(f, "sparse {:?} {:?}", pos, crd),
            Self::Fixed { ptr, crd } => write!(f, "fixed {:?} {:?}", ptr, crd),
        }
    }
}

/// The index arrays of every level of a [`crate::Storage`], outermost first.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct Index {
    levels: Vec<LevelIndex>,
}

impl Index {
    pub fn new(levels: Vec<LevelIndex>) -> Self {
        Self { levels }
    }

    pub fn levels(&self) -> &[LevelIndex] {
        &self.levels
    }

    pub fn level(&self, i: usize) -> Option<&LevelIndex> {
        self.levels.get(i)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// The number of value slots this index addresses.
    pub fn num_values(&self) -> usize {
        self.levels
            .iter()
            .fold(1, |parents, level| level.num_positions(parents))
    }

    /// Compute the [`Size`] record of this index.
    pub fn size(&self) -> Size {
        Size {
            levels: self.levels.iter().map(LevelIndex::size).collect(),
            values: self.num_values(),
        }
    }

    /// Check every invariant of this index against the given `shape` and `format`,
    /// and return the number of value slots it addresses.
    pub fn validate(&self, shape: &Shape, format: &Format) -> HTResult<usize> {
        format.validate(shape.len())?;

        if self.len() != format.order() {
            return Err(HTError::bad_request(
                format!("index for format {} has levels", format),
                self.len(),
            ));
        }

        let extents = format.to_level_order(&shape[..]);

        let mut parents = 1;
        for (i, level) in self.levels.iter().enumerate() {
            parents = level
                .validate(format.levels()[i], extents[i], parents)
                .map_err(|cause| cause.consume(format!("validating level {}", i)))?;
        }

        Ok(parents)
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(&self.levels).finish()
    }
}

/// The lengths of the arrays of one level.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LevelSize {
    /// The length of the position (or extent, or fan-out) array
    pub ptr: usize,
    /// The length of the coordinate array, zero for a dense level
    pub idx: usize,
}

/// The lengths of every index array of a storage, and of its value array.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Size {
    levels: Vec<LevelSize>,
    values: usize,
}

impl Size {
    pub fn levels(&self) -> &[LevelSize] {
        &self.levels
    }

    pub fn level(&self, i: usize) -> Option<LevelSize> {
        self.levels.get(i).copied()
    }

    /// The length of the `array`th index array of the given `level`.
    pub fn num_index_values(&self, level: usize, array: usize) -> usize {
        match (self.level(level), array) {
            (Some(size), 0) => size.ptr,
            (Some(size), 1) => size.idx,
            _ => 0,
        }
    }

    /// The number of stored scalar values.
    pub fn num_values(&self) -> usize {
        self.values
    }
}

struct Staged {
    level_type: LevelType,
    extent: usize,
    pos: Vec<usize>,
    crd: Vec<usize>,
}

/// A snapshot of the lengths of the staging buffers, used to discard a subtree.
pub(crate) struct Mark {
    depth: usize,
    lens: Vec<(usize, usize)>,
    values: usize,
}

/// Growable staging buffers for an [`Index`] whose final size is not yet known.
pub(crate) struct IndexBuilder {
    levels: Vec<Staged>,
    values: usize,
}

impl IndexBuilder {
    pub fn new(shape: &Shape, format: &Format) -> Self {
        debug_assert_eq!(shape.len(), format.order());

        let levels = format
            .levels()
            .iter()
            .zip(format.to_level_order(&shape[..]))
            .map(|(level_type, extent)| Staged {
                level_type: *level_type,
                extent,
                pos: if level_type.is_compressed() {
                    vec![0]
                } else {
                    vec![]
                },
                crd: vec![],
            })
            .collect();

        Self { levels, values: 0 }
    }

    pub fn mark(&self, depth: usize) -> Mark {
        Mark {
            depth,
            lens: self.levels[depth..]
                .iter()
                .map(|level| (level.pos.len(), level.crd.len()))
                .collect(),
            values: self.values,
        }
    }

    pub fn rollback(&mut self, mark: Mark) {
        for (level, (pos, crd)) in self.levels[mark.depth..].iter_mut().zip(mark.lens) {
            level.pos.truncate(pos);
            level.crd.truncate(crd);
        }

        self.values = mark.values;
    }

    /// Append a coordinate to the level at `depth`, if it stores coordinates.
    pub fn push_coord(&mut self, depth: usize, coord: usize) {
        let level = &mut self.levels[depth];
        if level.level_type.is_compressed() {
            debug_assert!(coord < level.extent);
            level.crd.push(coord);
        }
    }

    /// Close the current parent's segment of the level at `depth`.
    pub fn end_segment(&mut self, depth: usize) {
        let level = &mut self.levels[depth];
        if level.level_type.is_compressed() {
            level.pos.push(level.crd.len());
        }
    }

    /// Reserve one value slot.
    pub fn push_value(&mut self) {
        self.values += 1;
    }

    /// Convert the staging buffers into a fixed-size [`Index`] and its [`Size`].
    pub fn finish(self) -> HTResult<(Index, Size)> {
        let mut levels = Vec::with_capacity(self.levels.len());

        for (depth, staged) in self.levels.into_iter().enumerate() {
            trace!(
                "finalize {} level {} with {} coordinates",
                staged.level_type,
                depth,
                staged.crd.len()
            );

            let level = match staged.level_type {
                LevelType::Dense => LevelIndex::dense(staged.extent),
                LevelType::Sparse => LevelIndex::sparse(staged.pos, staged.crd),
                LevelType::Fixed => {
                    let mut counts = staged.pos.iter().tuple_windows().map(|(l, r)| r - l);
                    let fanout = counts.next().unwrap_or(0);
                    if let Some(count) = counts.find(|count| *count != fanout) {
                        return Err(HTError::unsupported(format!(
                            "fixed level {} has a non-uniform fan-out ({} and {})",
                            depth, fanout, count
                        )));
                    }

                    LevelIndex::fixed(fanout, staged.crd)
                }
            };

            levels.push(level);
        }

        let index = Index::new(levels);
        let size = index.size();

        if size.num_values() != self.values {
            return Err(HTError::internal(format!(
                "staged {} values but the index addresses {}",
                self.values,
                size.num_values()
            )));
        }

        Ok((index, size))
    }
}
