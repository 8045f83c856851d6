//! Co-iteration: merging the coordinates several operands contribute at one level into the
//! ordered, duplicate-free sequence of coordinates an expression is present at.
//!
//! Every operand's coordinates are canonically ordered, so the merge is a single linear pass
//! with one explicit cursor per operand. A sum yields the union of its operands' coordinates,
//! a product their intersection.

use super::kernel::Node;
use super::LevelIndex;

/// The coordinates one operand contributes at a level, beneath one parent position.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Range<'a> {
    /// The operand has no value beneath this parent.
    Absent,
    /// The operand does not iterate over this dimension, so it is present at every
    /// coordinate and remains at the given position.
    Broadcast(usize),
    /// Every coordinate in `[0, extent)` is present at position `base + coord`.
    Dense { base: usize, extent: usize },
    /// The coordinates `crd[start..end]`, the `k`th of which is at position `k`.
    Compressed {
        crd: &'a [usize],
        start: usize,
        end: usize,
    },
}

impl<'a> Range<'a> {
    /// The range of the given `level` beneath the parent position `parent`.
    pub fn of(level: &'a LevelIndex, parent: usize) -> Self {
        match level {
            LevelIndex::Dense { ptr } => {
                let extent = ptr.first().copied().unwrap_or(0);
                Self::Dense {
                    base: parent * extent,
                    extent,
                }
            }
            LevelIndex::Sparse { pos, crd } => Self::Compressed {
                crd,
                start: pos[parent],
                end: pos[parent + 1],
            },
            LevelIndex::Fixed { ptr, crd } => {
                let fanout = ptr.first().copied().unwrap_or(0);
                Self::Compressed {
                    crd,
                    start: parent * fanout,
                    end: (parent + 1) * fanout,
                }
            }
        }
    }

    fn cursor(&self) -> usize {
        match self {
            Self::Compressed { start, .. } => *start,
            _ => 0,
        }
    }

    /// Iterate over the `(coordinate, position)` pairs of this range.
    pub fn iter(self) -> Positions<'a> {
        Positions {
            cursor: self.cursor(),
            range: self,
        }
    }
}

/// An iterator over the `(coordinate, position)` pairs of a single [`Range`].
pub(crate) struct Positions<'a> {
    range: Range<'a>,
    cursor: usize,
}

impl<'a> Iterator for Positions<'a> {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let item = match self.range {
            Range::Dense { base, extent } if self.cursor < extent => {
                Some((self.cursor, base + self.cursor))
            }
            Range::Compressed { crd, end, .. } if self.cursor < end => {
                Some((crd[self.cursor], self.cursor))
            }
            _ => None,
        };

        if item.is_some() {
            self.cursor += 1;
        }

        item
    }
}

/// Merges the [`Range`]s of every operand of an operator tree at one level.
///
/// The co-iterator itself holds no mutable state: the caller owns one cursor per operand
/// (see [`CoIterator::cursors`]) and passes them into every call.
pub(crate) struct CoIterator<'a, 'n> {
    root: &'n Node,
    ranges: Vec<Range<'a>>,
    extent: usize,
}

impl<'a, 'n> CoIterator<'a, 'n> {
    pub fn new(root: &'n Node, ranges: Vec<Range<'a>>, extent: usize) -> Self {
        Self {
            root,
            ranges,
            extent,
        }
    }

    /// The initial cursor of each operand.
    pub fn cursors(&self) -> Vec<usize> {
        self.ranges.iter().map(Range::cursor).collect()
    }

    /// Return the least coordinate no less than `from` at which the expression is present.
    pub fn next(&self, from: usize, cursors: &mut [usize]) -> Option<usize> {
        self.seek(self.root, from, cursors)
    }

    /// Return the position of each operand at `coord`, or `None` where the operand is absent
    /// and must be filled with the identity of its enclosing operator.
    ///
    /// Calls must be made in ascending order of `coord`.
    pub fn locate(&self, coord: usize, cursors: &mut [usize]) -> Vec<Option<usize>> {
        let mut states = Vec::with_capacity(self.ranges.len());

        for (i, range) in self.ranges.iter().enumerate() {
            states.push(match range {
                Range::Absent => None,
                Range::Broadcast(pos) => Some(*pos),
                Range::Dense { base, .. } => Some(base + coord),
                Range::Compressed { .. } => {
                    if self.seek_operand(i, coord, cursors) == Some(coord) {
                        Some(cursors[i])
                    } else {
                        None
                    }
                }
            });
        }

        states
    }

    #[cfg(test)]
    pub fn points(&self) -> Vec<(usize, Vec<Option<usize>>)> {
        let mut cursors = self.cursors();
        let mut points = Vec::new();
        let mut from = 0;

        while let Some(coord) = self.next(from, &mut cursors) {
            points.push((coord, self.locate(coord, &mut cursors)));
            from = coord + 1;
        }

        points
    }

    fn seek(&self, node: &Node, from: usize, cursors: &mut [usize]) -> Option<usize> {
        if from >= self.extent {
            return None;
        }

        match node {
            Node::Leaf(i) => self.seek_operand(*i, from, cursors),
            Node::Neg(node) => self.seek(node, from, cursors),
            Node::Add(l, r) | Node::Sub(l, r) => {
                let l = self.seek(l, from, cursors);
                let r = self.seek(r, from, cursors);
                match (l, r) {
                    (Some(l), Some(r)) => Some(Ord::min(l, r)),
                    (l, None) => l,
                    (None, r) => r,
                }
            }
            Node::Mul(l, r) => {
                let mut from = from;
                loop {
                    let l_coord = self.seek(l, from, cursors)?;
                    let r_coord = self.seek(r, l_coord, cursors)?;
                    if l_coord == r_coord {
                        return Some(l_coord);
                    }

                    // neither side has a coordinate in [from, r_coord) in common
                    from = r_coord;
                }
            }
        }
    }

    fn seek_operand(&self, i: usize, from: usize, cursors: &mut [usize]) -> Option<usize> {
        match self.ranges[i] {
            Range::Absent => None,
            Range::Broadcast(_) => Some(from),
            Range::Dense { extent, .. } => Some(from).filter(|coord| *coord < extent),
            Range::Compressed { crd, end, .. } => {
                let cursor = &mut cursors[i];
                while *cursor < end && crd[*cursor] < from {
                    *cursor += 1;
                }

                if *cursor < end {
                    Some(crd[*cursor])
                } else {
                    None
                }
            }
        }
    }
}
