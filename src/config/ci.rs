//! CI environment detection.
//!
//! In CI there is no SOPS keyring available, so the secrets loader skips
//! decryption and goes straight to environment-variable fallbacks.

/// Environment variables that indicate a CI environment
const CI_MARKERS: &[&str] = &["CI", "GITHUB_ACTIONS", "JENKINS_URL"];

/// Whether the current process appears to run in CI
pub fn is_ci() -> bool {
    detect(|name| std::env::var_os(name).is_some_and(|v| !v.is_empty()))
}

fn detect<F: Fn(&str) -> bool>(is_set: F) -> bool {
    CI_MARKERS.iter().any(|name| is_set(name))
}
