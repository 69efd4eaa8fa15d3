// src/session/clock.rs

use std::time::Duration;

use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};

const TICK: Duration = Duration::from_secs(1);

/// Countdown against a fixed deadline.
///
/// Ticks once per second with the whole seconds left and calls `on_expire`
/// exactly once when nothing is left. Aborted when dropped.
pub struct Clock {
    handle: JoinHandle<()>,
}

impl Clock {
    pub fn start<T, E>(remaining_secs: u64, mut on_tick: T, on_expire: E) -> Self
    where
        T: FnMut(u64) + Send + 'static,
        E: FnOnce() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            if remaining_secs == 0 {
                on_tick(0);
                on_expire();
                return;
            }

            let started = Instant::now();
            let deadline = started + Duration::from_secs(remaining_secs);
            let mut ticker = interval_at(started + TICK, TICK);
            // A stalled runtime must not stretch the attempt.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                let now = ticker.tick().await;
                let left = seconds_left(deadline, now);
                on_tick(left);
                if left == 0 {
                    break;
                }
            }

            tracing::debug!("Clock reached zero");
            on_expire();
        });

        Self { handle }
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Rounds up so the display never shows 0 before the deadline has passed.
fn seconds_left(deadline: Instant, now: Instant) -> u64 {
    let left = deadline.saturating_duration_since(now);
    let whole = left.as_secs();
    if left.subsec_nanos() > 0 { whole + 1 } else { whole }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    fn recorder() -> (
        Arc<Mutex<Vec<u64>>>,
        Arc<AtomicUsize>,
        impl FnMut(u64) + Send + 'static,
        impl FnOnce() + Send + 'static,
    ) {
        let ticks = Arc::new(Mutex::new(Vec::new()));
        let expired = Arc::new(AtomicUsize::new(0));
        let tick_sink = Arc::clone(&ticks);
        let expire_sink = Arc::clone(&expired);
        (
            ticks,
            expired,
            move |left| tick_sink.lock().unwrap().push(left),
            move || {
                expire_sink.fetch_add(1, Ordering::SeqCst);
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_counts_down_and_expires_once() {
        let (ticks, expired, on_tick, on_expire) = recorder();
        let clock = Clock::start(3, on_tick, on_expire);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(*ticks.lock().unwrap(), vec![2, 1]);
        assert_eq!(expired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(*ticks.lock().unwrap(), vec![2, 1, 0]);
        assert_eq!(expired.load(Ordering::SeqCst), 1);
        drop(clock);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_remaining_fires_immediately() {
        let (ticks, expired, on_tick, on_expire) = recorder();
        let _clock = Clock::start(0, on_tick, on_expire);

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(expired.load(Ordering::SeqCst), 1);
        assert_eq!(*ticks.lock().unwrap(), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_expiry() {
        let (_ticks, expired, on_tick, on_expire) = recorder();
        let clock = Clock::start(2, on_tick, on_expire);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        clock.stop();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(expired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_seconds_left_rounds_up() {
        let now = Instant::now();
        assert_eq!(seconds_left(now + Duration::from_millis(1500), now), 2);
        assert_eq!(seconds_left(now + Duration::from_secs(1), now), 1);
        assert_eq!(seconds_left(now, now + Duration::from_secs(3)), 0);
    }
}
