//! Shared informer: keeps local, eventually-consistent mirrors of remote
//! collections and fans their changes out to registered handlers.
//!
//! Each watched collection gets a [`ResourceWatcher`] (list, then watch,
//! relist when the resume point expires), a coalescing [`DeltaQueue`] and an
//! [`EventDispatcher`] that applies deltas to the collection's [`Store`]
//! before invoking the handler.

mod config;
mod core;
mod errors;
mod informer;
pub mod metrics;
mod remote;
mod resource;
pub(crate) mod utils;

pub use crate::config::*;
pub use crate::core::*;
pub use errors::*;
pub use informer::*;
pub use remote::*;
pub use resource::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
