//! Bounded event dispatch with a dedicated worker thread (`spec.md` §4.2).

pub mod bus;
pub mod payload;

pub use bus::{EventBus, Subscriber};
