//! Time utilities.
//!
//! It includes:
//! - [`Deadline`], the bound accepted by every timed wait,
//! - [`sleep_for`] and [`sleep_until`], cancellable sleeps backed by the
//!   processor timer thread.

mod deadline;
mod sleep;

pub use deadline::Deadline;

#[doc(inline)]
pub use sleep::{sleep_for, sleep_until};
