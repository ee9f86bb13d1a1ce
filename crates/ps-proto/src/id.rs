//! Identifier normalization.
//!
//! User names, room titles, command names and some event types are compared
//! by their *id*: the lowercase ASCII alphanumeric characters of the input,
//! with everything else dropped. `"Bob Ross"`, `"bob-ross"` and `"BOBROSS"`
//! all share the id `"bobross"`.

/// Convert a string to its id form.
///
/// Keeps ASCII letters (lowercased) and digits, drops every other character.
pub fn to_id(s: &str) -> String {
    s.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Returns `true` if the string is already in id form.
pub fn is_id(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase())
}

/// Compare two strings by id.
pub fn id_eq(a: &str, b: &str) -> bool {
    let mut left = a.chars().filter(char::is_ascii_alphanumeric);
    let mut right = b.chars().filter(char::is_ascii_alphanumeric);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return true,
            (Some(l), Some(r)) if l.eq_ignore_ascii_case(&r) => continue,
            _ => return false,
        }
    }
}
