pub mod percent;
pub mod power;

pub use self::{percent::Percent, power::Watts};
