// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Process-wide monotonic timestamps.
//
// Two calls never return the same instant, even when the wall clock stalls
// or steps backwards, so an update always moves `updatedAt` forward.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};

static LAST_MICROS: AtomicI64 = AtomicI64::new(0);

/// The current UTC time, strictly later than any previous result.
pub fn now() -> DateTime<Utc> {
    let wall = Utc::now().timestamp_micros();
    let mut last = LAST_MICROS.load(Ordering::Relaxed);
    loop {
        let next = wall.max(last + 1);
        match LAST_MICROS.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return DateTime::from_timestamp_micros(next).unwrap_or_else(Utc::now),
            Err(current) => last = current,
        }
    }
}

/// [`now`] as an RFC 3339 string with microsecond precision (`...Z`).
///
/// The fixed width keeps lexicographic and chronological order identical.
pub fn timestamp() -> String {
    now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strictly_increasing() {
        let mut previous = timestamp();
        for _ in 0..1000 {
            let next = timestamp();
            assert!(next > previous, "{next} should be after {previous}");
            previous = next;
        }
    }

    #[test]
    fn test_format() {
        let ts = timestamp();
        assert!(ts.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(&ts).is_ok());
        // 2026-01-01T00:00:00.000000Z
        assert_eq!(ts.len(), 27);
    }

    #[test]
    fn test_concurrent_callers_never_collide() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..500).map(|_| timestamp()).collect::<Vec<_>>()))
            .collect();
        let mut all: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), total);
    }
}
