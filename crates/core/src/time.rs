//! The `MM:SS.D` time readout.

/// Format seconds as `MM:SS.D`. Tenths are truncated, minutes grow past two digits.
pub fn format_time(seconds: f64) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    let tenths_total = (seconds * 10.0 + 1e-9).floor() as u64;
    let minutes = tenths_total / 600;
    let secs = (tenths_total / 10) % 60;
    let tenths = tenths_total % 10;
    format!("{minutes:02}:{secs:02}.{tenths}")
}

/// Parse a committed `M:SS.D` readout: 1-4 minute digits, two second digits below 60,
/// one tenths digit.
pub fn parse_time(text: &str) -> Option<f64> {
    let (minutes, rest) = text.split_once(':')?;
    let (secs, tenths) = rest.split_once('.')?;

    if !digits(minutes, 1..=4) || !digits(secs, 2..=2) || !digits(tenths, 1..=1) {
        return None;
    }

    let minutes: u32 = minutes.parse().ok()?;
    let secs: u32 = secs.parse().ok()?;
    let tenths: u32 = tenths.parse().ok()?;
    if secs >= 60 {
        return None;
    }

    Some(minutes as f64 * 60.0 + secs as f64 + tenths as f64 / 10.0)
}

/// Whether `text` is an acceptable in-progress edit of the readout.
///
/// Edits keep exactly one `:` and one `.` and stay within the digit widths of
/// [`parse_time`], but any part may still be empty.
pub fn is_partial_time(text: &str) -> bool {
    let Some((minutes, rest)) = text.split_once(':') else {
        return false;
    };
    let Some((secs, tenths)) = rest.split_once('.') else {
        return false;
    };
    digits(minutes, 0..=4) && digits(secs, 0..=2) && digits(tenths, 0..=1)
}

fn digits(part: &str, len: std::ops::RangeInclusive<usize>) -> bool {
    len.contains(&part.len()) && part.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "00:00.0");
        assert_eq!(format_time(5.25), "00:05.2");
        assert_eq!(format_time(65.99), "01:05.9");
        assert_eq!(format_time(6000.0), "100:00.0");
        assert_eq!(format_time(-3.0), "00:00.0");
        assert_eq!(format_time(f64::NAN), "00:00.0");
    }

    #[test]
    fn test_format_time_exact_tenths() {
        // 0.3 * 10 is 2.9999999999999996 in f64
        assert_eq!(format_time(0.3), "00:00.3");
        assert_eq!(format_time(12.7), "00:12.7");
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("00:05.2"), Some(5.2));
        assert_eq!(parse_time("1:30.0"), Some(90.0));
        assert_eq!(parse_time("1234:00.5"), Some(74040.5));
    }

    #[test]
    fn test_parse_time_rejects_malformed() {
        assert_eq!(parse_time("00:60.0"), None);
        assert_eq!(parse_time("00:5.2"), None);
        assert_eq!(parse_time("00:05.25"), None);
        assert_eq!(parse_time("12345:00.0"), None);
        assert_eq!(parse_time(":05.2"), None);
        assert_eq!(parse_time("00:05"), None);
        assert_eq!(parse_time("a0:05.2"), None);
        assert_eq!(parse_time("+1:05.2"), None);
        assert_eq!(parse_time(""), None);
    }

    #[test]
    fn test_partial_edits() {
        assert!(is_partial_time(":."));
        assert!(is_partial_time("01:."));
        assert!(is_partial_time("01:3.5"));
        assert!(!is_partial_time("0130.5"));
        assert!(!is_partial_time("01:30"));
        assert!(!is_partial_time("01:30.5.1"));
        assert!(!is_partial_time("01:300.5"));
        assert!(!is_partial_time("01:30.55"));
    }
}
