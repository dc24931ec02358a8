use std::error::Error;

/// Case-insensitive substrings marking an error as network-like.
pub const TRANSIENT_SIGNATURES: &[&str] = &[
    "offline",
    "timeout",
    "timed out",
    "connection",
    "no such host",
    "network is unreachable",
    "network unreachable",
    "deadline exceeded",
    "temporarily unavailable",
    "dns error",
    "error trying to connect",
];

/// Check a rendered error message against [`TRANSIENT_SIGNATURES`].
pub fn is_transient_message(message: &str) -> bool {
    if message.is_empty() {
        return false;
    }
    let lower = message.to_lowercase();
    TRANSIENT_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

/// Classify an error as transient by walking its source chain.
///
/// A `reqwest::Error` reporting a timeout or connect failure is transient
/// regardless of its text; every other link is matched by message.
pub fn is_transient(err: &(dyn Error + 'static)) -> bool {
    let mut current: Option<&(dyn Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(http) = e.downcast_ref::<reqwest::Error>() {
            if http.is_timeout() || http.is_connect() {
                return true;
            }
        }
        if is_transient_message(&e.to_string()) {
            return true;
        }
        current = e.source();
    }
    false
}
