/// Placeholder shown when a client has no display name.
pub const UNNAMED_USER: &str = "Unnamed User";

/// Placeholder stored when a client has no public handle.
pub const UNNAMED_HANDLE: &str = "unnamed_user";

/// Escapes text for interpolation into a MarkdownV2 message.
///
/// Escaped characters: `_` `*` `[` `]` `~` `` ` `` `>` `#` `+` `-` `=` `|` `.` `!`
///
/// Parentheses are left untouched so that names like `Ann (work)` read
/// naturally in staff notifications. The Telegram channel falls back to plain
/// text when the server rejects the entities.
///
/// # Example
///
/// ```
/// use sarafancore::core::utils::escape_markdown;
///
/// assert_eq!(escape_markdown("A_B*C(D)E.F"), "A\\_B\\*C(D)E\\.F");
/// ```
pub fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len() * 2);

    for c in text.chars() {
        match c {
            '_' | '*' | '[' | ']' | '~' | '`' | '>' | '#' | '+' | '-' | '=' | '|' | '.' | '!' => {
                result.push('\\');
                result.push(c);
            }
            _ => result.push(c),
        }
    }

    result
}

/// Returns `value` trimmed, or `fallback` when nothing is left.
pub fn or_placeholder(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}
