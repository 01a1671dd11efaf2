//! Phone-number normalization shared by ingestion, lead resolution and
//! outbound sends. Deliberately heuristic: it assumes a single default
//! country rather than attempting full international-number parsing.

/// Strip everything that is not an ASCII digit.
pub fn digits(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Canonical digit string with the default country dial code enforced.
///
/// Rules, in order: drop a leading `00` international prefix; then, when a
/// default dial code is configured and not already present, replace a
/// leading `0` trunk prefix with it, or prepend it to short (<= 10 digit)
/// numbers. Anything else passes through unchanged.
pub fn normalize_with_country(raw: &str, default_code: &str) -> String {
    let mut normalized = digits(raw);
    if normalized.is_empty() {
        return normalized;
    }

    if let Some(stripped) = normalized.strip_prefix("00") {
        normalized = stripped.to_string();
    }

    if !default_code.is_empty() && !normalized.starts_with(default_code) {
        if let Some(rest) = normalized.strip_prefix('0') {
            normalized = format!("{default_code}{rest}");
        } else if normalized.len() <= 10 {
            normalized = format!("{default_code}{normalized}");
        }
    }

    normalized
}

/// Recipient identifier for the messaging API, or `None` when the number
/// normalizes to nothing.
pub fn format_recipient(raw: &str, default_code: &str) -> Option<String> {
    let normalized = normalize_with_country(raw, default_code);
    (!normalized.is_empty()).then_some(normalized)
}
