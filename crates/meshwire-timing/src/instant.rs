use crate::Duration;

/// A monotonic point in time, independent of wall-clock adjustments.
#[derive(Copy, Clone, Debug)]
pub struct Instant(std::time::Instant);

impl Instant {
    #[inline]
    pub fn now() -> Self {
        Self(std::time::Instant::now())
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        Duration::from(self.0.elapsed())
    }

    #[inline]
    pub fn elapsed_since(&self, earlier: Instant) -> Duration {
        Duration::from(self.0.saturating_duration_since(earlier.0))
    }

    #[inline]
    pub fn saturating_sub(&self, rhs: Instant) -> Duration {
        Duration::from(self.0.saturating_duration_since(rhs.0))
    }
}

