//! Fixtures shared by the unit tests.
mod common;
mod recording;

pub use common::*;
pub use recording::*;
