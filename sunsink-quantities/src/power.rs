use std::{
    fmt::{Debug, Display, Formatter},
    ops::{Div, Mul},
};

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Signed power.
///
/// For meter readings, positive values mean grid import and negative values mean export.
#[derive(
    Clone,
    Copy,
    Default,
    Deserialize,
    Eq,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    derive_more::Add,
    derive_more::AddAssign,
    derive_more::From,
    derive_more::FromStr,
    derive_more::Neg,
    derive_more::Sub,
    derive_more::SubAssign,
    derive_more::Sum,
)]
#[from(i32, f64, OrderedFloat<f64>)]
#[must_use]
pub struct Watts(pub OrderedFloat<f64>);

impl Watts {
    pub const ZERO: Self = Self(OrderedFloat(0.0));

    /// Round down to the closest multiple of the step.
    ///
    /// A non-positive step leaves the value unchanged.
    pub fn floor_to(self, step: Self) -> Self {
        if step.0.0 <= 0.0 {
            self
        } else {
            Self(OrderedFloat((self.0.0 / step.0.0).floor() * step.0.0))
        }
    }

    /// Whole non-negative watts as expected by the battery command payloads.
    #[must_use]
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn whole(self) -> u32 {
        self.0.0.max(0.0).round() as u32
    }
}

impl Mul<f64> for Watts {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Div<f64> for Watts {
    type Output = Self;

    fn div(self, rhs: f64) -> Self::Output {
        Self(self.0 / rhs)
    }
}

impl Display for Watts {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.0} W", self.0)
    }
}

impl Debug for Watts {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.0}W", self.0)
    }
}
