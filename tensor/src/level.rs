//! Per-dimension storage disciplines and the [`Format`] which orders them.

use std::fmt;
use std::iter::FromIterator;
use std::str::FromStr;

use itertools::Itertools;

use ht_error::*;

/// The storage discipline of one dimension of a tensor.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub enum LevelType {
    /// Every coordinate in `[0, extent)` is present; the only index array holds the extent.
    Dense,
    /// Compressed: a position array delimits each parent's slice of a coordinate array.
    Sparse,
    /// Every parent owns exactly the same number of coordinates (the fan-out).
    Fixed,
}

impl LevelType {
    /// The number of index arrays owned by a level of this type.
    pub fn multiplicity(&self) -> usize {
        match self {
            Self::Dense => 1,
            Self::Sparse | Self::Fixed => 2,
        }
    }

    /// Return `true` if a level of this type stores explicit coordinates.
    pub fn is_compressed(&self) -> bool {
        !matches!(self, Self::Dense)
    }
}

impl FromStr for LevelType {
    type Err = HTError;

    fn from_str(s: &str) -> HTResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dense" | "d" => Ok(Self::Dense),
            "sparse" | "s" => Ok(Self::Sparse),
            "fixed" | "f" => Ok(Self::Fixed),
            other => Err(HTError::bad_request("unknown level type", other)),
        }
    }
}

impl fmt::Debug for LevelType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for LevelType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Dense => "dense",
            Self::Sparse => "sparse",
            Self::Fixed => "fixed",
        })
    }
}

/// The physical layout of a tensor: one [`LevelType`] per level, outermost first, and the
/// mode order which assigns a dimension of the tensor to each level.
///
/// The default mode order is the identity, so level `k` stores dimension `k`. A format such as
/// `"dense,sparse;1,0"` stores a matrix column-major (CSC).
///
/// Formats compare by their level sequence and mode order, so the same tensor packed twice
/// under equal formats produces equal storages.
#[derive(Clone, Default, Eq, PartialEq, Hash)]
pub struct Format {
    levels: Vec<LevelType>,
    modes: Vec<usize>,
}

impl Format {
    /// A format with the identity mode order.
    pub fn new(levels: Vec<LevelType>) -> Self {
        let modes = (0..levels.len()).collect();
        Self { levels, modes }
    }

    /// A format whose `k`th level stores dimension `modes[k]`.
    ///
    /// Return a `BadRequest` error unless `modes` is a permutation of `0..levels.len()`.
    pub fn with_mode_order(levels: Vec<LevelType>, modes: Vec<usize>) -> HTResult<Self> {
        let mut seen = vec![false; levels.len()];
        for mode in &modes {
            match seen.get_mut(*mode) {
                Some(flag) if !*flag => *flag = true,
                _ => {
                    return Err(HTError::bad_request(
                        format!("invalid mode order for {} levels", levels.len()),
                        format!("[{}]", modes.iter().join(", ")),
                    ))
                }
            }
        }

        if modes.len() != levels.len() {
            return Err(HTError::bad_request(
                format!("mode order for {} levels has length", levels.len()),
                modes.len(),
            ));
        }

        Ok(Self { levels, modes })
    }

    /// A format of the given order with every level of the same type.
    pub fn uniform(level_type: LevelType, order: usize) -> Self {
        Self::new(vec![level_type; order])
    }

    pub fn levels(&self) -> &[LevelType] {
        &self.levels
    }

    /// The dimension stored at each level, outermost first.
    pub fn mode_order(&self) -> &[usize] {
        &self.modes
    }

    /// Return `true` if level `k` stores dimension `k` for every `k`.
    pub fn is_identity_order(&self) -> bool {
        self.modes.iter().enumerate().all(|(level, mode)| level == *mode)
    }

    /// The level which stores the given dimension.
    pub fn level_of(&self, dim: usize) -> Option<usize> {
        self.modes.iter().position(|mode| *mode == dim)
    }

    /// Permute per-dimension `items` (a shape, a coordinate) into level order.
    pub fn to_level_order<T: Clone>(&self, items: &[T]) -> Vec<T> {
        debug_assert_eq!(items.len(), self.order());
        self.modes.iter().map(|mode| items[*mode].clone()).collect()
    }

    /// Permute per-level `items` back into dimension order.
    pub fn to_dimension_order<T: Clone>(&self, items: &[T]) -> Vec<T> {
        debug_assert_eq!(items.len(), self.order());

        let mut dims = items.to_vec();
        for (level, mode) in self.modes.iter().enumerate() {
            dims[*mode] = items[level].clone();
        }

        dims
    }

    /// The number of dimensions this format describes.
    pub fn order(&self) -> usize {
        self.levels.len()
    }

    /// Return `true` if every level of this format is [`LevelType::Dense`].
    pub fn is_dense(&self) -> bool {
        self.levels.iter().all(|level| level == &LevelType::Dense)
    }

    /// Return a `FormatDimensionMismatch` error unless this format has exactly `ndim` levels.
    pub fn validate(&self, ndim: usize) -> HTResult<()> {
        if self.order() == ndim {
            Ok(())
        } else {
            Err(HTError::format_dimension_mismatch(self, ndim))
        }
    }
}

impl From<Vec<LevelType>> for Format {
    fn from(levels: Vec<LevelType>) -> Self {
        Self::new(levels)
    }
}

impl FromIterator<LevelType> for Format {
    fn from_iter<I: IntoIterator<Item = LevelType>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl FromStr for Format {
    type Err = HTError;

    /// Parse a comma-separated list of level types, optionally followed by a semicolon and
    /// a comma-separated mode order, e.g. `"dense,sparse"` or `"dense,sparse;1,0"`.
    fn from_str(s: &str) -> HTResult<Self> {
        let s = s.trim().trim_start_matches('(').trim_end_matches(')');
        let (levels, modes) = match s.split_once(';') {
            Some((levels, modes)) => (levels, Some(modes)),
            None => (s, None),
        };

        let levels = if levels.trim().is_empty() {
            vec![]
        } else {
            levels
                .split(',')
                .map(LevelType::from_str)
                .collect::<HTResult<Vec<_>>>()?
        };

        match modes.map(str::trim) {
            None => Ok(Self::new(levels)),
            Some("") => Self::with_mode_order(levels, vec![]),
            Some(modes) => {
                let modes = modes
                    .split(',')
                    .map(|mode| {
                        mode.trim()
                            .parse()
                            .map_err(|_| HTError::bad_request("invalid mode", mode.trim()))
                    })
                    .collect::<HTResult<Vec<usize>>>()?;

                Self::with_mode_order(levels, modes)
            }
        }
    }
}

impl fmt::Debug for Format {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_identity_order() {
            write!(f, "({})", self.levels.iter().join(", "))
        } else {
            write!(
                f,
                "({}; {})",
                self.levels.iter().join(", "),
                self.modes.iter().join(", ")
            )
        }
    }
}
