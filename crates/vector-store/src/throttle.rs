use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{self, Instant};

struct Bucket {
    available: u32,
    window_started: Option<Instant>,
}

/// Fixed-window token bucket bounding the rate of provider requests.
///
/// `tokens_per_interval` tokens become available at the start of each
/// window; once spent, [`Throttler::acquire`] sleeps until the next window
/// opens. A batch call consumes exactly one token regardless of batch size
/// — the throttle bounds request rate, not payload volume.
pub struct Throttler {
    tokens_per_interval: u32,
    interval: Duration,
    bucket: Mutex<Bucket>,
}

impl Throttler {
    /// # Panics
    ///
    /// Panics when `tokens_per_interval` is zero or `interval` is zero.
    #[must_use]
    pub fn new(tokens_per_interval: u32, interval: Duration) -> Self {
        assert!(tokens_per_interval > 0, "throttler needs at least one token");
        assert!(!interval.is_zero(), "throttler interval must be non-zero");
        Self {
            tokens_per_interval,
            interval,
            bucket: Mutex::new(Bucket {
                available: tokens_per_interval,
                window_started: None,
            }),
        }
    }

    /// Twenty requests per minute — the most conservative published
    /// embedding rate limit, safe for any account tier.
    #[must_use]
    pub fn conservative() -> Self {
        Self::new(20, Duration::from_secs(60))
    }

    /// Take one token, cooperatively waiting for the next window when the
    /// current one is spent.
    pub async fn acquire(&self) {
        loop {
            let wait_until = {
                let mut bucket = self.bucket.lock().await;
                let now = Instant::now();
                let window = *bucket.window_started.get_or_insert(now);

                let elapsed = now.duration_since(window);
                if elapsed >= self.interval {
                    // Skip whole windows that passed while idle.
                    let windows = (elapsed.as_nanos() / self.interval.as_nanos()) as u32;
                    bucket.window_started = Some(window + self.interval * windows);
                    bucket.available = self.tokens_per_interval;
                }

                if bucket.available > 0 {
                    bucket.available -= 1;
                    return;
                }

                bucket.window_started.unwrap_or(now) + self.interval
            };

            time::sleep_until(wait_until).await;
        }
    }
}
