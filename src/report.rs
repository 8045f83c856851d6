//! A serializable summary of a computed [`Storage`].

use std::fmt;

use serde::Serialize;

use ht_error::*;
use ht_tensor::{Expr, LevelIndex, Storage};

/// The index array lengths of one level of a [`Storage`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct LevelReport {
    pub level_type: String,
    pub ptr: usize,
    pub idx: usize,
}

impl From<&LevelIndex> for LevelReport {
    fn from(level: &LevelIndex) -> Self {
        let size = level.size();

        Self {
            level_type: level.level_type().to_string(),
            ptr: size.ptr,
            idx: size.idx,
        }
    }
}

/// A summary of the output of an expression.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Report {
    pub expr: String,
    pub shape: Vec<usize>,
    pub format: String,
    pub levels: Vec<LevelReport>,
    pub num_values: usize,
    pub sum: f64,
    pub verified: bool,
}

impl Report {
    /// Summarize the computed `output` of `expr`.
    ///
    /// `verified` records whether the caller's independent check of the output succeeded.
    pub fn new(expr: &Expr, output: &Storage, verified: bool) -> HTResult<Self> {
        let index = output.index()?;
        let values = output.values()?;

        Ok(Self {
            expr: expr.to_string(),
            shape: output.shape().to_vec(),
            format: output.format().to_string(),
            levels: index.levels().iter().map(LevelReport::from).collect(),
            num_values: output.size()?.num_values(),
            sum: values.iter().sum(),
            verified,
        })
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{} in format {}", self.expr, self.format)?;

        for (i, level) in self.levels.iter().enumerate() {
            writeln!(
                f,
                "  level {} ({}): {} pos, {} crd",
                i, level.level_type, level.ptr, level.idx
            )?;
        }

        write!(
            f,
            "  {} values, sum {}, {}",
            self.num_values,
            self.sum,
            if self.verified { "verified" } else { "NOT verified" }
        )
    }
}
