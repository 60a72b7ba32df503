//! Human size strings.
//!
//! Upstream descriptors carry sizes like "15MB" or "0 Bytes". Parsing is
//! lenient: anything unparseable is treated as zero bytes.

const KIB: u64 = 1024;

const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

/// Parse a size string using binary multipliers (B, KB, MB, GB).
///
/// Unit matching is case-insensitive and ignores whitespace. Units outside
/// the table (including "Bytes") count as single bytes. Malformed, negative
/// or empty input yields 0. Fractions are truncated to whole bytes.
pub fn parse_size(text: &str) -> u64 {
    let text = text.trim();
    let number_end = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());

    let number: f64 = match text[..number_end].parse() {
        Ok(n) => n,
        Err(_) => return 0,
    };
    if !number.is_finite() || number < 0.0 {
        return 0;
    }

    let unit: String = text[number_end..]
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();

    let multiplier = match unit.as_str() {
        "B" => 1,
        "KB" => KIB,
        "MB" => KIB * KIB,
        "GB" => KIB * KIB * KIB,
        _ => 1,
    };

    (number * multiplier as f64) as u64
}

/// Render a byte count the way the catalog UI shows it: "0 Bytes",
/// "1.5 KB", "15 MB". At most two decimals, trailing zeros dropped.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= KIB as f64 && unit < UNITS.len() - 1 {
        value /= KIB as f64;
        unit += 1;
    }

    let fixed = format!("{value:.2}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[unit])
}
