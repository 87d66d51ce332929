use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;

pub trait Timer {
    /// Current unix time in seconds.
    fn timestamp(&self) -> u64;
}

pub trait SetableTimer {
    fn add_second(&self);
}

/// Coarse unix clock shared by the store. A dedicated task advances it
/// once per second, so expiration checks never hit the system clock.
pub struct SystemTimer {
    seconds: AtomicU64,
    cancellation_token: CancellationToken,
}

impl SystemTimer {
    pub fn new(cancellation_token: CancellationToken) -> Self {
        debug!("Creating system timer");
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);
        SystemTimer {
            seconds: AtomicU64::new(now),
            cancellation_token,
        }
    }

    pub async fn run(&self) {
        let start = Instant::now();
        let mut interval = interval_at(start, Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.add_second();
                    trace!("Server tick: {}", self.timestamp());
                },
                _ = self.cancellation_token.cancelled() => {
                    debug!("System timer cancelled");
                    return;
                },
            }
        }
    }
}

impl Timer for SystemTimer {
    fn timestamp(&self) -> u64 {
        self.seconds.load(Ordering::Acquire)
    }
}

impl SetableTimer for SystemTimer {
    fn add_second(&self) {
        self.seconds.fetch_add(1, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_starts_at_unix_time() {
        let timer = SystemTimer::new(CancellationToken::new());
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        assert!(timer.timestamp() <= now);
        assert!(timer.timestamp() + 2 > now);
    }

    #[test]
    fn add_second_advances_clock() {
        let timer = SystemTimer::new(CancellationToken::new());
        let before = timer.timestamp();
        timer.add_second();
        assert_eq!(timer.timestamp(), before + 1);
    }

    #[tokio::test]
    async fn run_returns_on_cancellation() {
        let token = CancellationToken::new();
        let timer = SystemTimer::new(token.clone());
        token.cancel();
        timer.run().await;
    }
}
