//! Naming rules for message types.

/// Derives an operation name from a method name.
///
/// An uppercase letter starts a new word when it follows a lowercase letter
/// or digit, or when it ends an acronym (`getHTTPStatus` becomes
/// `get-http-status`). Digits stay with the preceding word (`getV2Token`
/// becomes `get-v2-token`). `-` and `_` collapse into a single `-`.
#[must_use]
pub fn kebab_case(method: &str) -> String {
    let chars: Vec<char> = method.trim().chars().collect();
    let mut name = String::with_capacity(chars.len() + 4);
    for (index, &current) in chars.iter().enumerate() {
        if current == '-' || current == '_' {
            push_separator(&mut name);
            continue;
        }
        if current.is_uppercase() {
            let previous = index.checked_sub(1).and_then(|at| chars.get(at));
            let next = chars.get(index + 1);
            if starts_word(previous, next) {
                push_separator(&mut name);
            }
            name.extend(current.to_lowercase());
        } else {
            name.push(current);
        }
    }
    while name.ends_with('-') {
        name.pop();
    }
    name
}

fn starts_word(previous: Option<&char>, next: Option<&char>) -> bool {
    match previous {
        Some(previous) if previous.is_lowercase() || previous.is_ascii_digit() => true,
        Some(previous) if previous.is_uppercase() => next.is_some_and(|next| next.is_lowercase()),
        _ => false,
    }
}

fn push_separator(name: &mut String) {
    if !name.is_empty() && !name.ends_with('-') {
        name.push('-');
    }
}

/// Returns `true` for a usable message type segment.
pub(crate) fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Returns `true` for a dotted name whose segments are all valid.
pub(crate) fn is_dotted_name(name: &str) -> bool {
    name.contains('.') && name.split('.').all(is_valid_segment)
}

/// Strips module paths from a type name: `alloc::vec::Vec<alloc::string::String>`
/// becomes `Vec<String>`.
pub(crate) fn short_type_name(full: &str) -> String {
    let mut short = String::with_capacity(full.len());
    for piece in full.split_inclusive(is_type_delimiter) {
        let (path, delimiter) = match piece.char_indices().last() {
            Some((index, last)) if is_type_delimiter(last) => piece.split_at(index),
            _ => (piece, ""),
        };
        short.push_str(path.rsplit("::").next().unwrap_or(path));
        short.push_str(delimiter);
    }
    short
}

fn is_type_delimiter(c: char) -> bool {
    matches!(c, '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | ';' | '&')
}
