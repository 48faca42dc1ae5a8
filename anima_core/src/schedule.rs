use std::time::{Duration, Instant};

/// A fixed-cadence timer driven by whoever owns it.
///
/// Nothing runs in the background: the owner calls [`RepeatingTask::take_due`]
/// with the current time and performs one step per returned tick. Dropping the
/// task (or replacing it with `None`) cancels it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatingTask {
    interval: Duration,
    next_due: Instant,
}

impl RepeatingTask {
    /// Starts a task whose first tick is due one `interval` after `now`.
    pub fn start(interval: Duration, now: Instant) -> Self {
        RepeatingTask {
            interval,
            next_due: now + interval,
        }
    }

    /// Consumes every tick that is due at `now` and returns how many there were.
    pub fn take_due(&mut self, now: Instant) -> usize {
        let mut ticks = 0;
        while self.next_due <= now {
            ticks += 1;
            self.next_due += self.interval;
            if self.interval.is_zero() {
                break;
            }
        }
        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_accumulate_with_elapsed_time() {
        let start = Instant::now();
        let interval = Duration::from_millis(100);
        let mut task = RepeatingTask::start(interval, start);

        assert_eq!(task.take_due(start), 0);
        assert_eq!(task.take_due(start + Duration::from_millis(99)), 0);
        assert_eq!(task.take_due(start + Duration::from_millis(100)), 1);
        assert_eq!(task.take_due(start + Duration::from_millis(100)), 0);
        assert_eq!(task.take_due(start + Duration::from_millis(450)), 3);
        assert_eq!(task.take_due(start + Duration::from_millis(499)), 0);
        assert_eq!(task.take_due(start + Duration::from_millis(500)), 1);
    }

    #[test]
    fn zero_interval_fires_once_per_poll() {
        let start = Instant::now();
        let mut task = RepeatingTask::start(Duration::ZERO, start);
        assert_eq!(task.take_due(start), 1);
        assert_eq!(task.take_due(start), 1);
    }
}
