// SPDX-License-Identifier: MIT
// Protocol version negotiation for the initialize handshake.

use super::DomainError;

/// Pick the protocol version for a connection.
///
/// If the client's requested version is in `supported`, it wins. Otherwise
/// the newest supported version strictly lower than the requested one is
/// chosen. No supported version below the request means the handshake fails
/// with `UnsupportedVersion`.
///
/// `supported` is ordered newest first by convention, but selection compares
/// semver values and does not depend on list order.
pub fn negotiate(supported: &[String], requested: &str) -> Result<String, DomainError> {
    if supported.iter().any(|v| v == requested) {
        return Ok(requested.to_string());
    }

    let requested_version = semver::Version::parse(requested)
        .map_err(|_| DomainError::UnsupportedVersion(requested.to_string()))?;

    supported
        .iter()
        .filter_map(|v| semver::Version::parse(v).ok().map(|parsed| (parsed, v)))
        .filter(|(parsed, _)| *parsed < requested_version)
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, v)| v.clone())
        .ok_or_else(|| DomainError::UnsupportedVersion(requested.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supported(versions: &[&str]) -> Vec<String> {
        versions.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn exact_match_wins() {
        let s = supported(&["0.2.0", "0.1.0"]);
        assert_eq!(negotiate(&s, "0.1.0").unwrap(), "0.1.0");
        assert_eq!(negotiate(&s, "0.2.0").unwrap(), "0.2.0");
    }

    #[test]
    fn falls_back_to_newest_lower() {
        let s = supported(&["0.2.0", "0.1.0"]);
        assert_eq!(negotiate(&s, "0.1.5").unwrap(), "0.1.0");
        // Above everything we support: newest lower is 0.2.0.
        assert_eq!(negotiate(&s, "1.0.0").unwrap(), "0.2.0");
    }

    #[test]
    fn fails_below_oldest_supported() {
        let s = supported(&["0.2.0", "0.1.0"]);
        let err = negotiate(&s, "0.0.9").unwrap_err();
        assert!(matches!(err, DomainError::UnsupportedVersion(v) if v == "0.0.9"));
    }

    #[test]
    fn unparseable_request_fails() {
        let s = supported(&["0.1.0"]);
        assert!(negotiate(&s, "latest").is_err());
        // Exact string match still wins even for non-semver labels.
        let s = supported(&["2024-11-05"]);
        assert_eq!(negotiate(&s, "2024-11-05").unwrap(), "2024-11-05");
    }
}
