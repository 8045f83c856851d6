//! A [`Format`] bound to concrete index arrays and a flat value array.

use std::fmt;

use log::debug;

use ht_error::*;

use super::coiter::Range;
use super::kernel::Kernel;
use super::{pack, Coord, Format, Index, LevelIndex, Shape, Size};

/// The lifecycle stage of a [`Storage`].
///
/// A storage only ever moves forward: `Empty` to `Assembled` to `Computed`.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Stage {
    Empty,
    Assembled,
    Computed,
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Empty => "empty",
            Self::Assembled => "assembled",
            Self::Computed => "computed",
        })
    }
}

enum State {
    Empty,
    Assembled {
        index: Index,
        size: Size,
        kernel: Kernel,
    },
    Computed {
        index: Index,
        size: Size,
        values: Box<[f64]>,
    },
}

/// The index and kernel of an assembled [`Storage`], as consumed by compute.
pub(crate) struct Assembled {
    pub shape: Shape,
    pub format: Format,
    pub index: Index,
    pub size: Size,
    pub kernel: Kernel,
}

/// A tensor stored as a hierarchy of levels, one per dimension, outermost first.
pub struct Storage {
    shape: Shape,
    format: Format,
    state: State,
}

impl Storage {
    /// Construct a new, empty `Storage` of the given `shape` and `format`.
    pub fn new(shape: Shape, format: Format) -> HTResult<Self> {
        shape.validate()?;
        format.validate(shape.len())?;

        Ok(Self {
            shape,
            format,
            state: State::Empty,
        })
    }

    /// Construct a computed `Storage` holding the given coordinate/value pairs.
    ///
    /// Entries may be given in any order; the values of duplicate coordinates are summed.
    /// Compressed levels store only those coordinates with at least one entry beneath them,
    /// while dense levels store every coordinate and zero-fill the missing values.
    pub fn pack(shape: Shape, format: Format, entries: Vec<(Coord, f64)>) -> HTResult<Self> {
        let storage = Self::new(shape, format)?;
        let (index, size, values) = pack::pack(&storage.shape, &storage.format, entries)?;
        Ok(storage.computed(index, size, values))
    }

    /// Construct a computed `Storage` from literal index and value arrays.
    pub fn from_parts(
        shape: Shape,
        format: Format,
        index: Index,
        values: Vec<f64>,
    ) -> HTResult<Self> {
        let storage = Self::new(shape, format)?;

        let num_values = index.validate(&storage.shape, &storage.format)?;
        if values.len() != num_values {
            return Err(HTError::bad_request(
                format!("index addresses {} values but found", num_values),
                values.len(),
            ));
        }

        let size = index.size();
        Ok(storage.computed(index, size, values))
    }

    /// Construct a computed order-0 `Storage` holding a single value.
    pub fn scalar(value: f64) -> Self {
        let index = Index::default();
        let size = index.size();

        Self {
            shape: Shape::default(),
            format: Format::default(),
            state: State::Computed {
                index,
                size,
                values: vec![value].into(),
            },
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn format(&self) -> &Format {
        &self.format
    }

    /// The number of dimensions of this tensor.
    pub fn order(&self) -> usize {
        self.shape.len()
    }

    pub fn stage(&self) -> Stage {
        match &self.state {
            State::Empty => Stage::Empty,
            State::Assembled { .. } => Stage::Assembled,
            State::Computed { .. } => Stage::Computed,
        }
    }

    /// The index arrays of this storage, available once it is assembled.
    pub fn index(&self) -> HTResult<&Index> {
        match &self.state {
            State::Assembled { index, .. } | State::Computed { index, .. } => Ok(index),
            State::Empty => Err(HTError::storage_not_ready("read the index of", self.stage())),
        }
    }

    /// The index arrays of the given `level`, available once this storage is assembled.
    pub fn dimension_index(&self, level: usize) -> HTResult<&LevelIndex> {
        let index = self.index()?;
        index.level(level).ok_or_else(|| {
            HTError::bad_request(
                format!("storage of order {} has no level", self.order()),
                level,
            )
        })
    }

    /// The lengths of the arrays of this storage, available once it is assembled.
    pub fn size(&self) -> HTResult<&Size> {
        match &self.state {
            State::Assembled { size, .. } | State::Computed { size, .. } => Ok(size),
            State::Empty => Err(HTError::storage_not_ready("read the size of", self.stage())),
        }
    }

    /// The stored values, available once this storage is computed.
    pub fn values(&self) -> HTResult<&[f64]> {
        match &self.state {
            State::Computed { values, .. } => Ok(&values[..]),
            _ => Err(HTError::storage_not_ready("read the values of", self.stage())),
        }
    }

    /// Every stored coordinate with its value, in storage order.
    ///
    /// Coordinates are given in dimension order, whatever the mode order of this storage's
    /// format. This includes the explicit zeros of dense levels.
    pub fn entries(&self) -> HTResult<Vec<(Coord, f64)>> {
        let values = self.values()?;
        let index = self.index()?;

        let mut entries = Vec::with_capacity(values.len());
        let mut coord = Vec::with_capacity(self.order());
        collect_entries(index.levels(), 0, &mut coord, values, &mut entries);

        if !self.format.is_identity_order() {
            for (coord, _) in entries.iter_mut() {
                *coord = self.format.to_dimension_order(coord);
            }
        }

        Ok(entries)
    }

    /// The logical content of this storage as a row-major dense array.
    pub fn to_dense(&self) -> HTResult<Vec<f64>> {
        let mut dense = vec![0.; self.shape.size()];
        for (coord, value) in self.entries()? {
            dense[self.shape.offset_of(&coord)] += value;
        }

        Ok(dense)
    }

    pub(crate) fn assembled(self, index: Index, size: Size, kernel: Kernel) -> HTResult<Self> {
        let stage = self.stage();
        match self.state {
            State::Empty => {
                debug!("assembled a storage of format {} with {:?}", self.format, size);

                Ok(Self {
                    shape: self.shape,
                    format: self.format,
                    state: State::Assembled {
                        index,
                        size,
                        kernel,
                    },
                })
            }
            _ => Err(HTError::storage_not_ready("assemble", stage)),
        }
    }

    pub(crate) fn into_assembled(self) -> HTResult<Assembled> {
        let stage = self.stage();
        match self.state {
            State::Assembled {
                index,
                size,
                kernel,
            } => Ok(Assembled {
                shape: self.shape,
                format: self.format,
                index,
                size,
                kernel,
            }),
            _ => Err(HTError::storage_not_ready("compute", stage)),
        }
    }

    pub(crate) fn computed(self, index: Index, size: Size, values: Vec<f64>) -> Self {
        debug_assert_eq!(size.num_values(), values.len());

        Self {
            shape: self.shape,
            format: self.format,
            state: State::Computed {
                index,
                size,
                values: values.into(),
            },
        }
    }
}

fn collect_entries(
    levels: &[LevelIndex],
    parent: usize,
    coord: &mut Coord,
    values: &[f64],
    entries: &mut Vec<(Coord, f64)>,
) {
    match levels.split_first() {
        None => entries.push((coord.clone(), values[parent])),
        Some((level, children)) => {
            for (i, pos) in Range::of(level, parent).iter() {
                coord.push(i);
                collect_entries(children, pos, coord, values, entries);
                coord.pop();
            }
        }
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.state {
            State::Empty => write!(f, "{} storage of shape {}", self.stage(), self.shape),
            State::Assembled { index, .. } | State::Computed { index, .. } => write!(
                f,
                "{} storage of shape {} with index {:?}",
                self.stage(),
                self.shape,
                index
            ),
        }
    }
}

impl fmt::Display for Storage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} tensor of shape {} with format {}",
            self.stage(),
            self.shape,
            self.format
        )
    }
}
