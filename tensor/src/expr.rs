//! The element-wise expression grammar consumed by the assembler.

use std::collections::HashSet;
use std::fmt;
use std::ops;
use std::sync::Arc;

use itertools::Itertools;

use ht_error::*;

use super::Storage;

/// A named index variable, e.g. the `i` in `a(i) = b(i) + c(i)`.
///
/// Two variables are the same variable iff their names are equal.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct IndexVar(Arc<str>);

impl IndexVar {
    pub fn new<N: AsRef<str>>(name: N) -> Self {
        Self(name.as_ref().into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for IndexVar {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Debug for IndexVar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for IndexVar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A read of an operand [`Storage`], binding one [`IndexVar`] to each of its dimensions.
#[derive(Clone)]
pub struct Access {
    name: String,
    tensor: Arc<Storage>,
    vars: Vec<IndexVar>,
}

impl Access {
    /// Construct a new read of `tensor`, which must have exactly one dimension per var.
    pub fn new<N: fmt::Display>(
        name: N,
        tensor: Arc<Storage>,
        vars: Vec<IndexVar>,
    ) -> HTResult<Self> {
        let name = name.to_string();

        if vars.len() != tensor.order() {
            let unbound = tensor.order().min(vars.len());
            return Err(HTError::new(
                ErrorType::UnboundIndexVariable,
                format!(
                    "tensor {} of order {} read with {} index variables ({}): \
                    dimension {} has no consistent binding",
                    name,
                    tensor.order(),
                    vars.len(),
                    vars.iter().join(","),
                    unbound,
                ),
            ));
        }

        let mut seen = HashSet::with_capacity(vars.len());
        if let Some(repeated) = vars.iter().find(|var| !seen.insert(*var)) {
            return Err(HTError::unsupported(format!(
                "tensor {} reads index variable {} more than once",
                name, repeated
            )));
        }

        Ok(Self { name, tensor, vars })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tensor(&self) -> &Arc<Storage> {
        &self.tensor
    }

    pub fn vars(&self) -> &[IndexVar] {
        &self.vars
    }
}

impl fmt::Debug for Access {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({})", self.name, self.vars.iter().join(","))
    }
}

/// An element-wise expression over tensor reads.
#[derive(Clone)]
pub enum Expr {
    Read(Access),
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Every tensor read in this expression, left to right.
    pub fn accesses(&self) -> Vec<&Access> {
        let mut accesses = Vec::new();
        self.collect_accesses(&mut accesses);
        accesses
    }

    fn collect_accesses<'a>(&'a self, accesses: &mut Vec<&'a Access>) {
        match self {
            Self::Read(access) => accesses.push(access),
            Self::Neg(expr) => expr.collect_accesses(accesses),
            Self::Add(l, r) | Self::Sub(l, r) | Self::Mul(l, r) => {
                l.collect_accesses(accesses);
                r.collect_accesses(accesses);
            }
        }
    }

    /// The free index variables of this expression, in order of first appearance.
    pub fn index_vars(&self) -> Vec<IndexVar> {
        self.accesses()
            .into_iter()
            .flat_map(|access| access.vars().iter().cloned())
            .unique()
            .collect()
    }
}

impl From<Access> for Expr {
    fn from(access: Access) -> Self {
        Self::Read(access)
    }
}

impl ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}

impl ops::Add for Expr {
    type Output = Expr;

    fn add(self, other: Expr) -> Expr {
        Expr::Add(Box::new(self), Box::new(other))
    }
}

impl ops::Sub for Expr {
    type Output = Expr;

    fn sub(self, other: Expr) -> Expr {
        Expr::Sub(Box::new(self), Box::new(other))
    }
}

impl ops::Mul for Expr {
    type Output = Expr;

    fn mul(self, other: Expr) -> Expr {
        Expr::Mul(Box::new(self), Box::new(other))
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Read(access) => fmt::Display::fmt(access, f),
            Self::Neg(expr) => write!(f, "-{}", expr),
            Self::Add(l, r) => write!(f, "({} + {})", l, r),
            Self::Sub(l, r) => write!(f, "({} - {})", l, r),
            Self::Mul(l, r) => write!(f, "({} * {})", l, r),
        }
    }
}
