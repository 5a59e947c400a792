mod builder;
mod informer;

pub use builder::*;
pub use informer::*;
