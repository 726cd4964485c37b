use serde::de::IgnoredAny;

/// Whether `text` is one closed JSON object or array.
///
/// Scalars never qualify: a number or literal prefix can still grow, so
/// `1` may be the start of `12`. Empty and whitespace-only strings are
/// never complete.
#[inline]
pub(crate) fn is_complete_json(text: &str) -> bool {
    let trimmed = text.trim();
    let (Some(&first), Some(&last)) = (trimmed.as_bytes().first(), trimmed.as_bytes().last())
    else {
        return false;
    };
    match (first, last) {
        (b'{', b'}') | (b'[', b']') => parses_as_json(trimmed),
        _ => false,
    }
}

/// Whether `text` is exactly one JSON value of any kind.
#[inline]
pub(crate) fn parses_as_json(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty() && serde_json::from_str::<IgnoredAny>(trimmed).is_ok()
}

/// Render a JSON scalar as a plain string. Error codes arrive as either
/// strings or numbers depending on the backend revision.
#[must_use]
pub(crate) fn json_scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[inline]
pub(crate) fn data_url(media_type: &str, base64: &str) -> String {
    let mut out = String::with_capacity(media_type.len() + base64.len() + 13);
    out.push_str("data:");
    out.push_str(media_type);
    out.push_str(";base64,");
    out.push_str(base64);
    out
}
