//! Assembly: deriving the index arrays of an output [`Storage`] from an element-wise
//! expression over its operands.
//!
//! The output is traversed top-down, one level per output index variable. At each level the
//! coordinates are produced by a [`CoIterator`] over the operands' ranges beneath their
//! current positions, and handed to a [`Sink`]. Assembly and compute share this traversal,
//! so the `k`th value slot reserved by assembly is the `k`th value written by compute.

use itertools::Itertools;
use log::debug;

use ht_error::*;

use super::coiter::CoIterator;
use super::index::{IndexBuilder, Mark};
use super::kernel::{Kernel, Node, View};
use super::{Expr, Format, IndexVar, LevelType, Storage};

/// A consumer of the coordinate stream of a [`Traversal`].
pub(crate) trait Sink {
    type Mark;

    /// Snapshot everything emitted at `depth` or below.
    fn mark(&self, depth: usize) -> Self::Mark;

    /// Discard everything emitted since `mark` was taken.
    fn rollback(&mut self, mark: Self::Mark);

    /// Emit a coordinate of the level at `depth`.
    fn coordinate(&mut self, depth: usize, coord: usize);

    /// Close the current segment of the level at `depth`.
    fn end_segment(&mut self, depth: usize);

    /// Emit one value slot, given the position (or absence) of every operand.
    fn slot(&mut self, root: &Node, views: &[View], states: &[Option<usize>]);
}

impl Sink for IndexBuilder {
    type Mark = Mark;

    fn mark(&self, depth: usize) -> Mark {
        IndexBuilder::mark(self, depth)
    }

    fn rollback(&mut self, mark: Mark) {
        IndexBuilder::rollback(self, mark)
    }

    fn coordinate(&mut self, depth: usize, coord: usize) {
        self.push_coord(depth, coord)
    }

    fn end_segment(&mut self, depth: usize) {
        IndexBuilder::end_segment(self, depth)
    }

    fn slot(&mut self, _root: &Node, _views: &[View], _states: &[Option<usize>]) {
        self.push_value()
    }
}

/// A depth-first walk over the coordinates of the output of a [`Kernel`] in a given [`Format`].
pub(crate) struct Traversal<'a> {
    kernel: &'a Kernel,
    format: &'a Format,
    views: Vec<View<'a>>,
}

impl<'a> Traversal<'a> {
    pub fn new(kernel: &'a Kernel, format: &'a Format) -> HTResult<Self> {
        format.validate(kernel.shape().len())?;

        Ok(Self {
            kernel,
            format,
            views: kernel.views()?,
        })
    }

    /// Emit the full coordinate stream of the output to the given `sink`.
    pub fn run<S: Sink>(&self, sink: &mut S) {
        let states = vec![Some(0); self.views.len()];
        self.visit(0, &states, sink);
    }

    // return `true` if the expression is present anywhere beneath the given operand states
    fn visit<S: Sink>(&self, depth: usize, states: &[Option<usize>], sink: &mut S) -> bool {
        let root = self.kernel.root();

        if depth == self.format.order() {
            sink.slot(root, &self.views, states);
            return root.is_present(states);
        }

        let ranges = self
            .views
            .iter()
            .zip(states)
            .map(|(view, state)| view.range(depth, *state))
            .collect();

        let extent = self.kernel.shape()[depth];
        let coiter = CoIterator::new(root, ranges, extent);
        let mut cursors = coiter.cursors();
        let mut present = false;

        match self.format.levels()[depth] {
            LevelType::Dense => {
                for coord in 0..extent {
                    let children = coiter.locate(coord, &mut cursors);
                    present |= self.visit(depth + 1, &children, sink);
                }
            }
            LevelType::Sparse | LevelType::Fixed => {
                let mut from = 0;
                while let Some(coord) = coiter.next(from, &mut cursors) {
                    let children = coiter.locate(coord, &mut cursors);

                    let mark = sink.mark(depth);
                    sink.coordinate(depth, coord);
                    if self.visit(depth + 1, &children, sink) {
                        present = true;
                    } else {
                        // nothing beneath this coordinate survived
                        sink.rollback(mark);
                    }

                    from = coord + 1;
                }

                sink.end_segment(depth);
            }
        }

        present
    }
}

/// Assemble the index of the output of `expr` in the given `format`.
///
/// The output's index variables are those of `expr`, in order of first appearance.
pub fn assemble(expr: Expr, format: Format) -> HTResult<Storage> {
    let vars = expr.index_vars();
    assemble_with(&vars, expr, format)
}

/// Assemble the index of the output of `expr` in the given `format`, with one output
/// dimension per index variable in `vars`, in that order.
///
/// The output is traversed in the level order of `format`, so every operand must store the
/// output's index variables in that same relative order.
pub fn assemble_with(vars: &[IndexVar], expr: Expr, format: Format) -> HTResult<Storage> {
    debug!(
        "assemble ({}) = {} in format {}",
        vars.iter().join(","),
        expr,
        format
    );

    format.validate(vars.len())?;

    let kernel = Kernel::new(&format.to_level_order(vars), &expr)?;
    let shape = format.to_dimension_order(&kernel.shape()[..]);
    let storage = Storage::new(shape.into(), format)?;

    let mut builder = IndexBuilder::new(storage.shape(), storage.format());
    Traversal::new(&kernel, storage.format())?.run(&mut builder);

    let (index, size) = builder
        .finish()
        .map_err(|cause| cause.consume(format!("assembling {}", expr)))?;

    debug!(
        "assembled the index of ({}) in level order with {} value slots",
        kernel.vars().iter().join(","),
        size.num_values()
    );

    storage.assembled(index, size, kernel)
}
