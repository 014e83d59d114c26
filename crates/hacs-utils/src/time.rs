use std::time::Duration;

/// Parses a compact duration string such as `1d2h3m4s`.
///
/// Each segment is a run of digits followed by one of `s`, `m`, `h` or `d`. Returns `None`
/// for malformed input or when the total overflows.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use hacs_utils::time::parse_duration;
///
/// assert_eq!(parse_duration("30m"), Some(Duration::from_secs(1800)));
/// ```
pub fn parse_duration(input: &str) -> Option<Duration> {
    let mut total: u64 = 0;
    let mut chars = input.trim().chars().peekable();

    while chars.peek().is_some() {
        let mut digits = String::new();
        while let Some(c) = chars.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            digits.push(*c);
            chars.next();
        }

        if digits.is_empty() {
            return None;
        }

        let number: u64 = digits.parse().ok()?;
        let unit = match chars.next()? {
            's' => 1,
            'm' => 60,
            'h' => 60 * 60,
            'd' => 24 * 60 * 60,
            _ => return None,
        };

        total = total.checked_add(number.checked_mul(unit)?)?;
    }

    Some(Duration::from_secs(total))
}

/// Renders a duration back into the compact form, largest unit first.
pub fn format_duration(duration: Duration) -> String {
    let mut secs = duration.as_secs();
    if secs == 0 {
        return "0s".into();
    }

    let mut out = String::new();
    for (unit, size) in [('d', 86_400), ('h', 3_600), ('m', 60), ('s', 1)] {
        let count = secs / size;
        if count > 0 {
            out.push_str(&format!("{count}{unit}"));
            secs %= size;
        }
    }
    out
}
