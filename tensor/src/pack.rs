//! Packing unordered coordinate/value pairs into the index arrays of a given [`Format`].

use itertools::Itertools;
use log::debug;

use ht_error::*;

use super::index::IndexBuilder;
use super::{Coord, Format, Index, LevelType, Shape, Size};

/// Pack the given `entries` into an [`Index`] and a value array laid out per `format`.
///
/// Entries may be given in any order. The values of duplicate coordinates are summed.
/// Coordinates are given in dimension order and stored in the level order of `format`.
pub(crate) fn pack(
    shape: &Shape,
    format: &Format,
    entries: Vec<(Coord, f64)>,
) -> HTResult<(Index, Size, Vec<f64>)> {
    for (coord, _) in &entries {
        shape.validate_coord(coord)?;
    }

    let num_entries = entries.len();
    let entries = entries
        .into_iter()
        .map(|(coord, value)| (format.to_level_order(&coord), value))
        .sorted_by(|(l, _), (r, _)| l.cmp(r))
        .coalesce(|(l_coord, l_value), (r_coord, r_value)| {
            if l_coord == r_coord {
                Ok((l_coord, l_value + r_value))
            } else {
                Err(((l_coord, l_value), (r_coord, r_value)))
            }
        })
        .collect::<Vec<_>>();

    let mut packer = Packer {
        extents: format.to_level_order(&shape[..]),
        format,
        builder: IndexBuilder::new(shape, format),
        values: Vec::with_capacity(entries.len()),
    };

    packer.pack_level(0, &entries);

    let Packer {
        builder, values, ..
    } = packer;

    let (index, size) = builder.finish()?;

    debug!(
        "packed {} entries ({} distinct) of a tensor with shape {} into {} slots of format {}",
        num_entries,
        entries.len(),
        shape,
        size.num_values(),
        format
    );

    Ok((index, size, values))
}

struct Packer<'a> {
    extents: Vec<usize>,
    format: &'a Format,
    builder: IndexBuilder,
    values: Vec<f64>,
}

impl<'a> Packer<'a> {
    // every entry in `entries` shares the same coordinates at each level above `depth`
    fn pack_level(&mut self, depth: usize, entries: &[(Coord, f64)]) {
        if depth == self.format.order() {
            let value = entries.first().map(|(_, value)| *value).unwrap_or(0.);
            self.values.push(value);
            self.builder.push_value();
            return;
        }

        let mut rest = entries;
        match self.format.levels()[depth] {
            LevelType::Dense => {
                for coord in 0..self.extents[depth] {
                    let split = rest.partition_point(|(c, _)| c[depth] == coord);
                    self.pack_level(depth + 1, &rest[..split]);
                    rest = &rest[split..];
                }
            }
            LevelType::Sparse | LevelType::Fixed => {
                while let Some((first, _)) = rest.first() {
                    let coord = first[depth];
                    let split = rest.partition_point(|(c, _)| c[depth] == coord);
                    self.builder.push_coord(depth, coord);
                    self.pack_level(depth + 1, &rest[..split]);
                    rest = &rest[split..];
                }

                self.builder.end_segment(depth);
            }
        }
    }
}
