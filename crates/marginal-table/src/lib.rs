#![forbid(unsafe_code)]
//! marginal-table: the table ("potential") abstraction.
//!
//! A `Table` is a dense array of `f64` addressed by an ordered scope of
//! discrete variables, the first variable varying fastest. Combination and
//! projection never mutate their inputs; the in-place mutators in `measure`
//! take `&mut self`.

pub mod algebra;
pub mod function;
pub mod instantiation;
pub mod measure;
pub mod reduce;
pub mod table;

pub use function::{CombineFn, ProjectFn};
pub use instantiation::Instantiation;
pub use reduce::Reduction;
pub use table::{Table, TableBuilder};
