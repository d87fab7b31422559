//! Worker threads.
//!
//! - [`core`]: spawning and joining the workers of a processor,
//! - [`worker`]: the loop each worker runs.

pub(crate) mod core;
pub(crate) mod worker;
