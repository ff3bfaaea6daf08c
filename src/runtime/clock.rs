use std::time::{Duration, Instant};

/// The monotonic, steady clock used for every deadline in this crate.
///
/// Wall-clock time is never used for scheduling: deadlines are always
/// compared against [`Instant::now`], so a system clock adjustment (NTP
/// step, user changing the date) cannot perturb a pending timer.
pub type Clock = Instant;

/// Computes `deadline - now`, saturating to [`Duration::ZERO`] if the
/// deadline has already passed.
pub(crate) fn remaining(now: Clock, deadline: Clock) -> Duration {
    deadline.saturating_duration_since(now)
}
