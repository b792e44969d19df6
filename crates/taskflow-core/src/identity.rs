//! User identifier normalization.

/// Transport prefixes stripped from raw sender ids.
const TRANSPORT_PREFIXES: &[&str] = &["whatsapp:", "sms:", "tel:"];

/// Normalize a raw sender identifier into the canonical per-user key.
///
/// Strips a transport prefix, a leading `+`, and formatting characters
/// (spaces, dashes, dots, parentheses), so every spelling of the same phone
/// number maps to one stored record.
pub fn normalize_user_id(raw: &str) -> String {
    let mut id = raw.trim();
    for prefix in TRANSPORT_PREFIXES {
        if let Some(rest) = id.strip_prefix(prefix) {
            id = rest.trim_start();
            break;
        }
    }
    let id = id.strip_prefix('+').unwrap_or(id);
    id.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect()
}
