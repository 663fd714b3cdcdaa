//! Shared-secret gate for administrative actions.

/// Check `provided` against the configured admin token.
///
/// With no token configured every request is refused.
pub fn check_admin_token(configured: Option<&str>, provided: Option<&str>) -> bool {
    match (configured, provided) {
        (Some(expected), Some(given)) if !expected.is_empty() => {
            constant_time_eq(expected.as_bytes(), given.as_bytes())
        }
        _ => false,
    }
}

/// Byte comparison whose running time does not depend on where inputs differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
