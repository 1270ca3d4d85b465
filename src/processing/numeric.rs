//! Locale-tolerant decimal parsing used by range aggregation.

/// Parse a decimal number, accepting `,` as the decimal separator.
///
/// Leading/trailing whitespace is ignored. Returns `None` (never an error) for empty text,
/// unparsable text and non-finite results such as `inf` or `NaN`.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let normalized = trimmed.replace(',', ".");
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Shortest text that round-trips `value`: `7` rather than `7.0`, `3.5` rather than `3.50`.
pub fn format_decimal(value: f64) -> String {
    if value == 0.0 {
        // Collapse -0 to 0.
        return "0".to_string();
    }
    value.to_string()
}

/// Minimum and maximum of the parsable values, plus the number of values that were skipped.
///
/// Empty values are not counted as skipped.
pub fn min_max<'a, I>(values: I) -> (Option<(f64, f64)>, usize)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut acc: Option<(f64, f64)> = None;
    let mut skipped = 0usize;
    for raw in values {
        match parse_decimal(raw) {
            Some(v) => {
                acc = Some(match acc {
                    Some((lo, hi)) => (lo.min(v), hi.max(v)),
                    None => (v, v),
                });
            }
            None if raw.trim().is_empty() => {}
            None => skipped += 1,
        }
    }
    (acc, skipped)
}
