//! Associative, commutative reductions used to eliminate variables.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reduction {
    Sum,
    Product,
    Max,
    Min,
}

impl Reduction {
    /// Neutral element the accumulator must start from.
    pub const fn neutral(self) -> f64 {
        match self {
            Reduction::Sum => 0.0,
            Reduction::Product => 1.0,
            Reduction::Max => f64::NEG_INFINITY,
            Reduction::Min => f64::INFINITY,
        }
    }

    #[inline]
    pub fn apply(self, acc: f64, x: f64) -> f64 {
        match self {
            Reduction::Sum => acc + x,
            Reduction::Product => acc * x,
            Reduction::Max => acc.max(x),
            Reduction::Min => acc.min(x),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Reduction::Sum => "sum",
            Reduction::Product => "product",
            Reduction::Max => "max",
            Reduction::Min => "min",
        }
    }
}
