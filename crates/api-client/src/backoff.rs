use rand::Rng;
use std::time::Duration;

/// Delay schedule between retries of one gateway call.
///
/// The n-th delay is `min(max, base * 2^n)`, widened by up to `jitter` of
/// itself in either direction so that several currencies backing off at once
/// do not retry in lock step.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: f64,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter: jitter.clamp(0.0, 1.0),
            attempt: 0,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let exp = self.base.saturating_mul(2u32.saturating_pow(self.attempt));
        let capped = exp.min(self.max);
        self.attempt = self.attempt.saturating_add(1);

        let spread = capped.as_secs_f64() * self.jitter;
        if spread <= 0.0 {
            return capped;
        }
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_secs_f64((capped.as_secs_f64() + offset).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_capped() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(500), 0.0);
        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(500),
                Duration::from_millis(500),
            ]
        );
    }

    #[test]
    fn jitter_stays_in_band() {
        let mut backoff = Backoff::new(Duration::from_secs(10), Duration::from_secs(60), 0.2);
        let secs = backoff.next_delay().as_secs_f64();
        assert!((8.0..=12.0).contains(&secs), "delay was {secs}");
    }

    #[test]
    fn out_of_range_jitter_is_clamped() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(1), -3.0);
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }
}
