mod controller;
mod counters;
mod delta;
mod dispatcher;
mod handler;
mod queue;
mod store;
mod sync;
mod watcher;

pub use controller::*;
pub use counters::*;
pub use delta::*;
pub use dispatcher::*;
pub use handler::*;
pub use queue::*;
pub use store::*;
pub use sync::*;
pub use watcher::*;
