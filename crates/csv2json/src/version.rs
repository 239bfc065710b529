//! Service identity and build metadata.

/// Service name stamped into message envelopes.
pub const SERVICE_NAME: &str = "csv2json";

/// Semantic version, taken from the crate manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git commit, injected at build time via `CSV2JSON_COMMIT`.
pub const GIT_COMMIT: &str = match option_env!("CSV2JSON_COMMIT") {
    Some(commit) => commit,
    None => "unknown",
};

/// Build date, injected at build time via `CSV2JSON_BUILD_DATE`.
pub const BUILD_DATE: &str = match option_env!("CSV2JSON_BUILD_DATE") {
    Some(date) => date,
    None => "unknown",
};

/// Short version banner, e.g. `csv2json v0.1.0`.
pub fn version_info() -> String {
    format!("{} v{}", SERVICE_NAME, VERSION)
}

/// Full version banner including build metadata when available.
pub fn full_version_info() -> String {
    let mut info = version_info();
    if GIT_COMMIT != "unknown" {
        info.push_str(&format!(" (commit: {})", GIT_COMMIT));
    }
    if BUILD_DATE != "unknown" {
        info.push_str(&format!(" (built: {})", BUILD_DATE));
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_starts_with_service_name() {
        assert!(version_info().starts_with("csv2json v"));
        assert!(full_version_info().starts_with("csv2json v"));
    }

    #[test]
    fn version_is_semver_shaped() {
        assert_eq!(VERSION.split('.').count(), 3);
    }
}
