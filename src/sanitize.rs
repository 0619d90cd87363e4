const BOM: char = '\u{feff}';

/// Strips leading byte-order marks and every control character other than
/// newline, carriage return and tab.
pub fn sanitize(raw: &str) -> String {
    raw.trim_start_matches(BOM)
        .chars()
        .filter(|&ch| matches!(ch, '\n' | '\r' | '\t') || !ch.is_control())
        .collect()
}

/// True when nothing but whitespace and byte-order marks remain. A BOM is
/// whitespace here wherever it sits, matching how editors trim.
pub fn is_blank(text: &str) -> bool {
    text.chars().all(|ch| ch.is_whitespace() || ch == BOM)
}
