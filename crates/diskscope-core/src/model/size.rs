/// Human-readable formatting for byte counts and entry tallies.
///
/// Sizes are `u64` bytes everywhere inside the crate; floating point only
/// appears at this display boundary. Binary units (1 KB = 1024 B) with the
/// short labels users expect from disk tools.

const UNIT: f64 = 1024.0;

/// Format a byte count with an appropriate unit.
pub fn format_size(bytes: u64) -> String {
    let b = bytes as f64;
    if b < UNIT {
        return format!("{bytes} B");
    }
    let kb = b / UNIT;
    if kb < UNIT {
        return format!("{kb:.1} KB");
    }
    let mb = kb / UNIT;
    if mb < UNIT {
        return format!("{mb:.1} MB");
    }
    let gb = mb / UNIT;
    if gb < UNIT {
        return format!("{gb:.2} GB");
    }
    format!("{:.2} TB", gb / UNIT)
}

/// Format a count with thousands separators.
pub fn format_count(count: u64) -> String {
    let digits = count.to_string();
    if digits.len() <= 3 {
        return digits;
    }
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    let lead = digits.len() % 3;
    for (i, ch) in digits.chars().enumerate() {
        if i != 0 && (i + 3 - lead) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Fraction of `part` in `whole` as a percentage, 0.0 when `whole` is 0.
pub fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}
