//! Whitespace and case folding shared by header matching and lookups

/// Trim and collapse all whitespace (NBSP included) to single spaces
pub fn clean(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `clean` plus lowercase, with `ё` folded to `е`
pub fn fold(raw: &str) -> String {
    clean(raw).to_lowercase().replace('ё', "е")
}

pub fn is_blank(raw: &str) -> bool {
    raw.chars().all(|c| c.is_whitespace() || c == '\u{feff}')
}
