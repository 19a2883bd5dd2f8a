//! Monotonic elapsed-time measurement and repeat-interval helpers.
//!
//! A small `Duration`/`Instant`/`Repeater` trio backed by `std::time::Instant`
//! rather than a hardware timestamp counter: nothing in this system needs
//! cross-machine or cross-socket clock correction, just a monotonic clock
//! and a periodic-fire gate for the handshake and ping timers.

mod duration;
mod instant;
mod repeater;

pub use duration::Duration;
pub use instant::Instant;
pub use repeater::Repeater;
