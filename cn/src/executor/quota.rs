//! Quota classification and backoff arithmetic
//!
//! The documented pattern set lives here and nowhere else. Handler
//! errors are already tagged, but messages from external providers still
//! pass through this predicate so a retriable error whose text betrays a
//! quota condition gets the delayed release instead of a tight retry.

/// Case-insensitive substrings identifying a quota / rate-limit error.
pub const QUOTA_ERROR_PATTERNS: [&str; 7] = [
    "quota",
    "rate limit",
    "too many requests",
    "429",
    "resource exhausted",
    "capacity",
    "overloaded",
];

/// Whether an error message matches the quota pattern set.
pub fn is_quota_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    QUOTA_ERROR_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Backoff before retry number `retry_count` (1-based):
/// min(initial * 2^(retry_count-1), max).
pub fn backoff_delay(retry_count: i64, initial_secs: u64, max_secs: u64) -> u64 {
    let exponent = retry_count.saturating_sub(1).clamp(0, 62) as u32;
    initial_secs
        .saturating_mul(2u64.saturating_pow(exponent))
        .min(max_secs)
}

/// Whether another retry is allowed given the pre-increment count.
/// `max_retries` of -1 means retry forever; 0 means never retry.
pub fn retry_allowed(retry_count: i64, max_retries: i64) -> bool {
    max_retries < 0 || retry_count < max_retries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_patterns_match_case_insensitively() {
        assert!(is_quota_error("Error 429 Too Many Requests"));
        assert!(is_quota_error("RESOURCE EXHAUSTED"));
        assert!(is_quota_error("model overloaded, try later"));
        assert!(is_quota_error("Rate Limit reached for requests"));
        assert!(!is_quota_error("file not found"));
        assert!(!is_quota_error("invalid action type"));
    }

    #[test]
    fn test_backoff_doubles_from_initial() {
        // The defaults: 30s initial, 600s ceiling.
        assert_eq!(backoff_delay(1, 30, 600), 30);
        assert_eq!(backoff_delay(2, 30, 600), 60);
        assert_eq!(backoff_delay(3, 30, 600), 120);
        assert_eq!(backoff_delay(4, 30, 600), 240);
        assert_eq!(backoff_delay(5, 30, 600), 480);
        assert_eq!(backoff_delay(6, 30, 600), 600);
        assert_eq!(backoff_delay(60, 30, 600), 600);
    }

    #[test]
    fn test_retry_allowed_boundaries() {
        // MAX_RETRIES=3: counts 0,1,2 retry; 3 does not.
        assert!(retry_allowed(0, 3));
        assert!(retry_allowed(2, 3));
        assert!(!retry_allowed(3, 3));

        // MAX_RETRIES=0 never retries.
        assert!(!retry_allowed(0, 0));

        // MAX_RETRIES=-1 always retries.
        assert!(retry_allowed(0, -1));
        assert!(retry_allowed(10_000, -1));
    }
}
