//! A hierarchical tensor storage engine.
//!
//! A [`Storage`] represents an n-dimensional array as a stack of levels, one per dimension,
//! each of which is [`LevelType::Dense`], [`LevelType::Sparse`] or [`LevelType::Fixed`].
//! The output of an element-wise [`Expr`] over operand storages of any format is built in
//! two passes over the same coordinate stream: [`assemble`] derives its index arrays and
//! [`compute`] fills its values.
//!
//! ```ignore
//! let b = Access::new("b", Arc::new(b), vec!["i".into()])?;
//! let c = Access::new("c", Arc::new(c), vec!["i".into()])?;
//! let a = compute(assemble(Expr::from(b) + c.into(), "sparse".parse()?)?)?;
//! ```

pub use assemble::{assemble, assemble_with};
pub use bounds::Shape;
pub use evaluate::{compute, evaluate};
pub use expr::{Access, Expr, IndexVar};
pub use index::{Index, LevelIndex, LevelSize, Size};
pub use level::{Format, LevelType};
pub use storage::{Stage, Storage};

mod assemble;
mod bounds;
mod coiter;
mod evaluate;
mod expr;
mod index;
mod kernel;
mod level;
mod pack;
mod storage;

/// The coordinate of a single element of a tensor, outermost dimension first.
pub type Coord = Vec<usize>;
