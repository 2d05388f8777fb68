/// Redaction helpers for diagnostic logging
///
/// ServerQuery credentials are admin-level secrets. Anything that reaches the
/// log goes through here first.

/// Mask a secret completely. The output length is fixed so it leaks nothing
/// about the original.
pub fn secret(value: &str) -> String {
    if value.is_empty() {
        "<empty>".to_string()
    } else {
        "********".to_string()
    }
}

/// Mask a login name, keeping the first character visible.
/// Example: "serveradmin" -> "s***"
pub fn login_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        None => "<empty>".to_string(),
        Some(first) if chars.next().is_none() => format!("{}", first),
        Some(first) => format!("{}***", first),
    }
}
