//! Timestamp parsing and formatting.
//!
//! Subtitle cues use `HH:MM:SS,mmm`; a `.` millisecond separator is
//! accepted as well, as are the shorter `MM:SS` and `SS` forms.

/// Parse a timestamp string to total seconds.
///
/// # Examples
/// ```
/// use reel_models::timestamp::parse_timestamp;
/// assert_eq!(parse_timestamp("00:00:02,500").unwrap(), 2.5);
/// assert_eq!(parse_timestamp("01:30:00").unwrap(), 5400.0);
/// assert_eq!(parse_timestamp("05:30.25").unwrap(), 330.25);
/// ```
pub fn parse_timestamp(ts: &str) -> Result<f64, TimestampError> {
    let ts = ts.trim();
    if ts.is_empty() {
        return Err(TimestampError::Empty);
    }

    let normalized = ts.replace(',', ".");
    let parts: Vec<&str> = normalized.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [s] => ("0", "0", *s),
        [m, s] => ("0", *m, *s),
        [h, m, s] => (*h, *m, *s),
        _ => return Err(TimestampError::InvalidFormat(ts.to_string())),
    };

    let hours = parse_component("hours", hours)?;
    let minutes = parse_component("minutes", minutes)?;
    let seconds = parse_component("seconds", seconds)?;
    Ok(hours * 3600.0 + minutes * 60.0 + seconds)
}

fn parse_component(unit: &'static str, raw: &str) -> Result<f64, TimestampError> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| TimestampError::InvalidValue(unit, raw.to_string()))?;
    if !value.is_finite() {
        return Err(TimestampError::InvalidValue(unit, raw.to_string()));
    }
    if value < 0.0 {
        return Err(TimestampError::Negative);
    }
    Ok(value)
}

/// Format seconds as an SRT timestamp (`HH:MM:SS,mmm`).
///
/// Negative input is clamped to zero.
pub fn format_srt_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

/// Error type for timestamp parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum TimestampError {
    /// Timestamp string is empty
    Empty,
    /// Invalid format (too many colons)
    InvalidFormat(String),
    /// Invalid numeric value for a component
    InvalidValue(&'static str, String),
    /// Negative component
    Negative,
}

impl std::fmt::Display for TimestampError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimestampError::Empty => write!(f, "Timestamp cannot be empty"),
            TimestampError::InvalidFormat(ts) => write!(f, "Invalid timestamp format: {}", ts),
            TimestampError::InvalidValue(unit, val) => {
                write!(f, "Invalid {} value: {}", unit, val)
            }
            TimestampError::Negative => write!(f, "Timestamp components must be non-negative"),
        }
    }
}

impl std::error::Error for TimestampError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_srt_forms() {
        assert_eq!(parse_timestamp("00:00:04,000").unwrap(), 4.0);
        assert_eq!(parse_timestamp("00:01:02.250").unwrap(), 62.25);
        assert_eq!(parse_timestamp(" 12 ").unwrap(), 12.0);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_timestamp(""), Err(TimestampError::Empty));
        assert!(matches!(
            parse_timestamp("1:2:3:4"),
            Err(TimestampError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_timestamp("aa:00"),
            Err(TimestampError::InvalidValue("minutes", _))
        ));
        assert_eq!(parse_timestamp("-5"), Err(TimestampError::Negative));
    }

    #[test]
    fn test_format_srt_timestamp() {
        assert_eq!(format_srt_timestamp(0.0), "00:00:00,000");
        assert_eq!(format_srt_timestamp(3661.5), "01:01:01,500");
        assert_eq!(format_srt_timestamp(-2.0), "00:00:00,000");
    }
}
