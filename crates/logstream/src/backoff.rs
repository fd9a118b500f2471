use std::time::Duration;

/// Delay before the first retry after an unclean close.
pub const BASE_DELAY_MS: u64 = 1_000;

/// Ceiling on the retry delay.
pub const MAX_DELAY_MS: u64 = 30_000;

/// Delay before reconnect attempt number `attempt` (zero-based).
///
/// Doubles from one second per consecutive unclean close, capped at thirty
/// seconds. The caller resets its counter on every successful open, so a
/// long-stable connection that drops retries fast instead of inheriting a
/// stale delay.
pub fn delay_for(attempt: u32) -> Duration {
    // 2^5 already clears the cap, so clamping the exponent avoids overflow.
    let ms = (BASE_DELAY_MS << attempt.min(5)).min(MAX_DELAY_MS);
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_from_one_second_and_caps_at_thirty() {
        let delays: Vec<u64> = (0..8).map(|n| delay_for(n).as_millis() as u64).collect();
        assert_eq!(
            delays,
            vec![1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000, 30_000]
        );
    }

    #[test]
    fn huge_attempt_counts_stay_capped() {
        assert_eq!(delay_for(u32::MAX), Duration::from_millis(MAX_DELAY_MS));
    }
}
