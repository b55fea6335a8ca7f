//! Event/metrics surface: four event kinds delivered
//! synchronously to registered handlers.

pub mod bus;
pub mod event;

pub use bus::{EventBus, EventHandler, SubscriptionId};
pub use event::Event;
