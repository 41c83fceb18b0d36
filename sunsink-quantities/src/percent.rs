use std::fmt::{Debug, Display, Formatter};

use derive_more::{From, FromStr};
use serde::{Deserialize, Serialize};

/// State-of-charge style percentage as reported by the batteries.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, From, FromStr, Serialize, Deserialize)]
#[must_use]
pub struct Percent(pub u16);

impl Percent {
    pub const FULL: Self = Self(100);

    pub const fn is_full(self) -> bool {
        self.0 >= Self::FULL.0
    }
}

impl Debug for Percent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl Display for Percent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} %", self.0)
    }
}
