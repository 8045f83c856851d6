//! Lowering of an [`Expr`] into the operand table and operator tree that assembly and
//! compute traverse.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use itertools::Itertools;
use log::debug;

use ht_error::*;

use super::coiter::Range;
use super::{Expr, Index, IndexVar, Shape, Stage, Storage};

/// An element-wise operator tree whose leaves index into the operand table of a [`Kernel`].
pub(crate) enum Node {
    Leaf(usize),
    Neg(Box<Node>),
    Add(Box<Node>, Box<Node>),
    Sub(Box<Node>, Box<Node>),
    Mul(Box<Node>, Box<Node>),
}

impl Node {
    fn lower(expr: &Expr, leaves: &mut usize) -> Self {
        match expr {
            Expr::Read(_) => {
                let leaf = *leaves;
                *leaves += 1;
                Self::Leaf(leaf)
            }
            Expr::Neg(expr) => Self::Neg(Box::new(Self::lower(expr, leaves))),
            Expr::Add(l, r) => {
                let l = Self::lower(l, leaves);
                Self::Add(Box::new(l), Box::new(Self::lower(r, leaves)))
            }
            Expr::Sub(l, r) => {
                let l = Self::lower(l, leaves);
                Self::Sub(Box::new(l), Box::new(Self::lower(r, leaves)))
            }
            Expr::Mul(l, r) => {
                let l = Self::lower(l, leaves);
                Self::Mul(Box::new(l), Box::new(Self::lower(r, leaves)))
            }
        }
    }

    /// Return `true` if this node has a value given the position (or absence) of each operand.
    pub fn is_present(&self, states: &[Option<usize>]) -> bool {
        match self {
            Self::Leaf(i) => states[*i].is_some(),
            Self::Neg(node) => node.is_present(states),
            Self::Add(l, r) | Self::Sub(l, r) => l.is_present(states) || r.is_present(states),
            Self::Mul(l, r) => l.is_present(states) && r.is_present(states),
        }
    }

    /// Compute the value of this node, or `None` if no operand beneath it is present.
    ///
    /// An absent operand of a sum or difference contributes nothing, rather than being
    /// looked up, since it has no value slot.
    pub fn eval(&self, views: &[View], states: &[Option<usize>]) -> Option<f64> {
        match self {
            Self::Leaf(i) => states[*i].map(|pos| views[*i].value(pos)),
            Self::Neg(node) => node.eval(views, states).map(|value| -value),
            Self::Add(l, r) => match (l.eval(views, states), r.eval(views, states)) {
                (Some(l), Some(r)) => Some(l + r),
                (l, None) => l,
                (None, r) => r,
            },
            Self::Sub(l, r) => match (l.eval(views, states), r.eval(views, states)) {
                (Some(l), Some(r)) => Some(l - r),
                (l, None) => l,
                (None, r) => r.map(|r| -r),
            },
            Self::Mul(l, r) => match (l.eval(views, states), r.eval(views, states)) {
                (Some(l), Some(r)) => Some(l * r),
                _ => None,
            },
        }
    }
}

struct Operand {
    tensor: Arc<Storage>,
    // the level of this operand consumed at each output depth, if any
    levels: Vec<Option<usize>>,
}

/// A borrowed view of one computed operand.
pub(crate) struct View<'a> {
    index: &'a Index,
    values: &'a [f64],
    levels: &'a [Option<usize>],
}

impl<'a> View<'a> {
    /// The coordinates this operand contributes at `depth` beneath its position `state`.
    pub fn range(&self, depth: usize, state: Option<usize>) -> Range<'a> {
        match (state, self.levels[depth]) {
            (None, _) => Range::Absent,
            (Some(pos), None) => Range::Broadcast(pos),
            (Some(pos), Some(level)) => Range::of(&self.index.levels()[level], pos),
        }
    }

    #[inline]
    pub fn value(&self, pos: usize) -> f64 {
        self.values[pos]
    }
}

/// An expression lowered against a fixed output index variable order.
pub(crate) struct Kernel {
    vars: Vec<IndexVar>,
    shape: Shape,
    root: Node,
    operands: Vec<Operand>,
}

impl Kernel {
    pub fn new(vars: &[IndexVar], expr: &Expr) -> HTResult<Self> {
        let accesses = expr.accesses();

        let mut extents = BTreeMap::<&IndexVar, usize>::new();
        for access in &accesses {
            let stage = access.tensor().stage();
            if stage != Stage::Computed {
                return Err(HTError::storage_not_ready("read", stage)
                    .consume(format!("reading {}", access)));
            }

            for (var, dim) in access.vars().iter().zip(access.tensor().shape().iter()) {
                if let Some(known) = extents.get(var) {
                    if known != dim {
                        return Err(HTError::unbound_index_variable(
                            var,
                            format!(
                                "bound to extent {} by {} but to {} elsewhere",
                                dim, access, known
                            ),
                        ));
                    }
                } else {
                    extents.insert(var, *dim);
                }
            }
        }

        let mut seen = HashSet::with_capacity(vars.len());
        let mut shape = Vec::with_capacity(vars.len());
        for var in vars {
            if !seen.insert(var) {
                return Err(HTError::bad_request("repeated output index variable", var));
            }

            match extents.get(var) {
                Some(dim) => shape.push(*dim),
                None => {
                    return Err(HTError::unbound_index_variable(
                        var,
                        "is not read by any tensor in the expression",
                    ))
                }
            }
        }

        if let Some(var) = extents.keys().find(|var| !seen.contains(*var)) {
            return Err(HTError::unbound_index_variable(
                var,
                format!("is not one of the output index variables ({})", vars.iter().join(",")),
            ));
        }

        let mut operands = Vec::with_capacity(accesses.len());
        for access in accesses {
            let format = access.tensor().format();
            let levels = vars
                .iter()
                .map(|var| access.vars().iter().position(|v| v == var))
                .map(|dim| dim.and_then(|dim| format.level_of(dim)))
                .collect::<Vec<Option<usize>>>();

            if levels.iter().flatten().tuple_windows().any(|(l, r)| l > r) {
                return Err(HTError::unsupported(format!(
                    "{} is not read in the output order ({})",
                    access,
                    vars.iter().join(",")
                )));
            }

            operands.push(Operand {
                tensor: access.tensor().clone(),
                levels,
            });
        }

        let root = Node::lower(expr, &mut 0);

        debug!(
            "lowered {} over ({}) with {} operands",
            expr,
            vars.iter().join(","),
            operands.len()
        );

        Ok(Self {
            vars: vars.to_vec(),
            shape: shape.into(),
            root,
            operands,
        })
    }

    pub fn vars(&self) -> &[IndexVar] {
        &self.vars
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Borrow the index and values of every operand.
    pub fn views(&self) -> HTResult<Vec<View<'_>>> {
        self.operands
            .iter()
            .map(|operand| {
                Ok(View {
                    index: operand.tensor.index()?,
                    values: operand.tensor.values()?,
                    levels: &operand.levels,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Access, Format, LevelType};

    fn read(name: &str, shape: Vec<usize>, vars: &[&str]) -> Expr {
        let format = Format::uniform(LevelType::Sparse, shape.len());
        read_as(name, shape, format, vars)
    }

    fn read_as(name: &str, shape: Vec<usize>, format: Format, vars: &[&str]) -> Expr {
        let tensor = Storage::pack(shape.into(), format, vec![]).unwrap();
        let vars = vars.iter().map(|var| IndexVar::new(var)).collect();
        Access::new(name, Arc::new(tensor), vars).unwrap().into()
    }

    fn vars(names: &[&str]) -> Vec<IndexVar> {
        names.iter().map(|name| IndexVar::new(name)).collect()
    }

    #[test]
    fn test_broadcast_levels() {
        let expr = read("B", vec![3, 4], &["i", "j"]) * read("d", vec![4], &["j"]);
        let kernel = Kernel::new(&vars(&["i", "j"]), &expr).unwrap();
        assert_eq!(kernel.shape(), &Shape::from(vec![3, 4]));
        assert_eq!(kernel.operands[0].levels, vec![Some(0), Some(1)]);
        assert_eq!(kernel.operands[1].levels, vec![None, Some(0)]);
    }

    #[test]
    fn test_column_major_levels() {
        let csc = "dense,sparse;1,0".parse().unwrap();
        let expr = read_as("B", vec![3, 4], csc, &["i", "j"]);

        let kernel = Kernel::new(&vars(&["j", "i"]), &expr).unwrap();
        assert_eq!(kernel.shape(), &Shape::from(vec![4, 3]));
        assert_eq!(kernel.operands[0].levels, vec![Some(0), Some(1)]);

        let err = Kernel::new(&vars(&["i", "j"]), &expr).map(|_| ()).unwrap_err();
        assert_eq!(err.code(), ErrorType::Unsupported);
    }

    #[test]
    fn test_inconsistent_extent() {
        let expr = read("b", vec![3], &["i"]) + read("c", vec![4], &["i"]);
        let err = Kernel::new(&vars(&["i"]), &expr).map(|_| ()).unwrap_err();
        assert_eq!(err.code(), ErrorType::UnboundIndexVariable);
    }

    #[test]
    fn test_output_vars() {
        let expr = read("B", vec![3, 3], &["i", "j"]);

        let err = Kernel::new(&vars(&["i"]), &expr).map(|_| ()).unwrap_err();
        assert_eq!(err.code(), ErrorType::UnboundIndexVariable);

        let err = Kernel::new(&vars(&["i", "j", "k"]), &expr).map(|_| ()).unwrap_err();
        assert_eq!(err.code(), ErrorType::UnboundIndexVariable);

        let err = Kernel::new(&vars(&["j", "i"]), &expr).map(|_| ()).unwrap_err();
        assert_eq!(err.code(), ErrorType::Unsupported);
    }

    #[test]
    fn test_presence() {
        let expr = (read("b", vec![2], &["i"]) + read("c", vec![2], &["i"]))
            * read("d", vec![2], &["i"]);
        let kernel = Kernel::new(&vars(&["i"]), &expr).unwrap();
        let root = kernel.root();

        assert!(root.is_present(&[Some(0), None, Some(0)]));
        assert!(root.is_present(&[None, Some(0), Some(0)]));
        assert!(!root.is_present(&[Some(0), Some(0), None]));
        assert!(!root.is_present(&[None, None, Some(0)]));
    }
}
