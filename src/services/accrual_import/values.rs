//! Locale-aware numeric parsing and VAT rate inference
//!
//! Exports come from spreadsheets formatted for the ru-RU locale: decimal
//! comma, space or NBSP thousands separators, currency suffixes. Parsing is
//! lenient and never fails; garbage becomes zero.

/// Amounts at or below this magnitude count as zero
pub const EPSILON: f64 = 1e-5;

fn strip_number(raw: &str, keep_dot: bool) -> String {
    raw.trim()
        .replace([' ', '\u{a0}', '\u{202f}'], "")
        .replace(',', ".")
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-' || (keep_dot && *c == '.'))
        .collect()
}

/// Parse a locale formatted decimal, defaulting to 0.0
pub fn parse_decimal(raw: &str) -> f64 {
    let cleaned = strip_number(raw, true);
    if cleaned.is_empty() {
        return 0.0;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Parse a locale formatted integer; `None` on empty or unparsable input
pub fn parse_int(raw: &str) -> Option<i64> {
    let cleaned = strip_number(raw, false);
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<i64>().ok()
}

pub fn is_nonzero(value: f64) -> bool {
    value.abs() > EPSILON
}

/// Infer the VAT rate from the two totals, falling back to header hints
pub fn infer_vat_rate(total_no_vat: f64, total_with_vat: f64, header_line: &str) -> Option<f64> {
    if total_no_vat > 0.0 && total_with_vat > 0.0 {
        let rate = (total_with_vat - total_no_vat) / total_no_vat;
        if rate > 0.0 && rate < 1.0 {
            return Some((rate * 10_000.0).round() / 10_000.0);
        }
    }
    vat_rate_from_header(header_line)
}

fn vat_rate_from_header(header_line: &str) -> Option<f64> {
    let compact: String = header_line
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    // "20%" must be checked first, "5%" is a suffix of "15%"/"25%" only
    if compact.contains("20%") {
        Some(0.20)
    } else if has_standalone_percent(&compact, "5%") {
        Some(0.05)
    } else {
        None
    }
}

fn has_standalone_percent(text: &str, needle: &str) -> bool {
    text.match_indices(needle).any(|(idx, _)| {
        idx == 0 || !text[..idx].chars().next_back().is_some_and(|c| c.is_ascii_digit())
    })
}
