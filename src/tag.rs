//! Tagged placeholder values: `<!TAG!>=value`.
//!
//! Values bearing the prefix were produced by a reducer rather than observed
//! literally. They count as one opaque category and are never compared
//! against values carrying a different tag.

const OPEN: &str = "<!";
const CLOSE: &str = "!>=";

/// Build a tagged value.
pub fn tagged(tag: &str, value: &str) -> String {
    format!("{OPEN}{tag}{CLOSE}{value}")
}

/// Split a tagged value into `(tag, value)`; `None` for literals.
pub fn split_tag(value: &str) -> Option<(&str, &str)> {
    let rest = value.strip_prefix(OPEN)?;
    let end = rest.find(CLOSE)?;
    Some((&rest[..end], &rest[end + CLOSE.len()..]))
}

/// Tag of `value`, `None` for literals.
pub fn tag_of(value: &str) -> Option<&str> {
    split_tag(value).map(|(t, _)| t)
}

pub fn is_tagged(value: &str) -> bool {
    split_tag(value).is_some()
}
