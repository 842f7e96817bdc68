//! Lexicographic ordering keys.
//!
//! Generates arbitrary-precision keys over the alphabet `a..=z` so that a
//! new key can always be placed strictly between two existing ones without
//! renumbering anything else. Intended for orderings that are edited
//! concurrently, such as branch lists.

/// Number of usable digits, `a..=z`.
const BASE: u8 = 26;

/// Returns a key that sorts strictly between `lower` and `upper`.
///
/// `None` stands for the open end of the key space: `key_between(None,
/// None)` yields the midpoint key `"n"`. When both bounds are given,
/// `lower` must sort strictly before `upper`; bounds must be non-empty and
/// must not end in `'a'`, which is the reserved zero digit (a key ending in
/// `'a'` has no room below it at that depth). Violating these preconditions
/// produces a key without the betweenness guarantee.
#[must_use]
pub fn key_between(lower: Option<&str>, upper: Option<&str>) -> String {
    debug_assert!(
        lower.map_or(true, |l| !l.is_empty() && !l.ends_with('a')),
        "lower bound must be non-empty and must not end in 'a'"
    );
    debug_assert!(
        upper.map_or(true, |u| !u.is_empty() && !u.ends_with('a')),
        "upper bound must be non-empty and must not end in 'a'"
    );
    if let (Some(l), Some(u)) = (lower, upper) {
        debug_assert!(l < u, "lower bound must sort strictly before upper");
    }

    let mut low: &[u8] = lower.unwrap_or("").as_bytes();
    let mut high: Option<&[u8]> = upper.map(str::as_bytes);
    let mut key = String::new();

    loop {
        // The upper bound runs out of digits only when the bounds violate
        // the preconditions above; stop rather than descend forever.
        if matches!(high, Some(bytes) if bytes.is_empty()) {
            debug_assert!(false, "upper bound exhausted while descending");
            return key;
        }

        let lo = low.first().map_or(0, |c| c - b'a');
        let hi = match high {
            Some(bytes) => bytes.first().map_or(0, |c| c - b'a'),
            None => BASE,
        };

        if lo == hi {
            // Shared prefix digit; descend one position.
            key.push(char::from(b'a' + lo));
            if !low.is_empty() {
                low = &low[1..];
            }
            high = high.map(|bytes| if bytes.is_empty() { bytes } else { &bytes[1..] });
        } else if hi - lo > 1 {
            // Room at this depth: take the midpoint digit and stop.
            key.push(char::from(b'a' + (lo + hi) / 2));
            return key;
        } else {
            // Adjacent digits: keep the lower one and find a key above the
            // remainder of `lower`, which is unbounded from above here.
            key.push(char::from(b'a' + lo));
            if !low.is_empty() {
                low = &low[1..];
            }
            high = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midpoint_of_open_space() {
        assert_eq!(key_between(None, None), "n");
    }

    #[test]
    fn key_above_and_below() {
        let above = key_between(Some("n"), None);
        assert!(above.as_str() > "n");

        let below = key_between(None, Some("n"));
        assert!(below.as_str() < "n");
    }

    #[test]
    fn key_between_adjacent_digits_extends() {
        let key = key_between(Some("az"), Some("b"));
        assert!(key.as_str() > "az");
        assert!(key.as_str() < "b");

        let key = key_between(Some("ab"), Some("ac"));
        assert!(key.as_str() > "ab");
        assert!(key.as_str() < "ac");
    }

    #[test]
    fn repeated_insertion_stays_ordered() {
        // Squeeze forty keys between the same pair; every new key must land
        // strictly between its neighbours.
        let mut lower = String::from("b");
        let upper = "c";
        for _ in 0..40 {
            let key = key_between(Some(&lower), Some(upper));
            assert!(key.as_str() > lower.as_str());
            assert!(key.as_str() < upper);
            lower = key;
        }
    }

    #[test]
    fn prepending_forever_stays_ordered() {
        let mut upper = String::from("n");
        for _ in 0..40 {
            let key = key_between(None, Some(&upper));
            assert!(!key.is_empty());
            assert!(key.as_str() < upper.as_str());
            upper = key;
        }
    }

    #[test]
    #[should_panic(expected = "upper bound")]
    fn upper_bound_ending_in_reserved_digit_is_rejected() {
        let _ = key_between(None, Some("a"));
    }

    #[test]
    fn keys_use_only_lowercase_digits() {
        let key = key_between(Some("abz"), Some("ac"));
        assert!(key.chars().all(|c| c.is_ascii_lowercase()));
    }
}
