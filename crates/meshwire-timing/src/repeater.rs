use crate::{Duration, Instant};

/// Fires at most once per `interval`, tracked on every call to [`fired`] or
/// [`maybe`]. A freshly-constructed `Repeater` fires immediately on its
/// first check.
///
/// [`fired`]: Repeater::fired
/// [`maybe`]: Repeater::maybe
#[derive(Clone, Copy, Debug)]
pub struct Repeater {
    interval: Duration,
    last_acted: Option<Instant>,
}

impl Repeater {
    #[inline]
    pub fn every(interval: Duration) -> Self {
        Self { interval, last_acted: None }
    }

    /// Runs `f` with the elapsed time if `interval` has passed since the
    /// last fire (or since construction).
    #[inline]
    pub fn maybe<F>(&mut self, mut f: F)
    where
        F: FnMut(Duration),
    {
        if self.fired_with_elapsed().is_some() {
            f(self.last_acted.map_or(Duration::ZERO, |t| t.elapsed()));
        }
    }

    #[inline]
    pub fn fired(&mut self) -> bool {
        self.fired_with_elapsed().is_some()
    }

    fn fired_with_elapsed(&mut self) -> Option<Duration> {
        let elapsed = self.last_acted.map(|t| t.elapsed());
        let due = match elapsed {
            None => true,
            Some(e) => e >= self.interval,
        };
        if due {
            self.last_acted = Some(Instant::now());
        }
        if due { elapsed.or(Some(Duration::ZERO)) } else { None }
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[inline]
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Resets the timer as if it had just fired — the next check will not be
    /// due until another full interval has passed.
    #[inline]
    pub fn reset(&mut self) {
        self.last_acted = Some(Instant::now());
    }

    /// Forces the next [`fired`](Self::fired)/[`maybe`](Self::maybe) check to
    /// be due regardless of elapsed time.
    #[inline]
    pub fn force_fire(&mut self) {
        self.last_acted = None;
    }
}
