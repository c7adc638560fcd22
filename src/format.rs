//! Human-friendly renderings used in problem details and the access log.

use std::time::Duration;

const UNITS: [&str; 5] = ["B", "kB", "MB", "GB", "TB"];

/// Renders a byte count with a binary (1024) unit and two decimals.
///
/// ```
/// assert_eq!(keel::friendly_size(1536), "1.50 kB");
/// ```
pub fn friendly_size(length: i64) -> String {
    let mut value = length as f64;
    let mut unit = 0;

    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    format!("{value:.2} {}", UNITS[unit])
}

/// Renders a duration for the access log. Zero prints as `0s`.
pub fn friendly_duration(duration: Duration) -> String {
    if duration.is_zero() {
        "0s".to_owned()
    } else {
        format!("{duration:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_scale_through_units() {
        let cases = [
            (1, "1.00 B"),
            (13, "13.00 B"),
            (1023, "1023.00 B"),
            (1024, "1.00 kB"),
            (1536, "1.50 kB"),
            (1_048_576, "1.00 MB"),
            (3_214_822_145, "2.99 GB"),
        ];

        for (given, expected) in cases {
            assert_eq!(friendly_size(given), expected, "size {given}");
        }
    }

    #[test]
    fn sizes_stop_at_terabytes() {
        assert_eq!(friendly_size(1024_i64.pow(5)), "1024.00 TB");
    }

    #[test]
    fn zero_duration_prints_as_seconds() {
        assert_eq!(friendly_duration(Duration::ZERO), "0s");
        assert_eq!(friendly_duration(Duration::from_millis(12)), "12ms");
    }
}
