//! Orchestrator identity bootstrap.
//!
//! Entry points learn the orchestrator's peer identity out of band: an
//! environment variable, or a shared key file written at deploy time.
//! This only feeds the `peer` input of the gateway hop; discovery is not
//! part of the dispatch algorithm.

use std::path::Path;

use tether_foundation::{DispatchError, DispatchResult, PeerId};

/// Env var holding the orchestrator's public key as hex.
pub const ORCHESTRATOR_KEY_ENV: &str = "ORCHESTRATOR_PUBLIC_KEY";
/// Env var pointing at a file whose contents are the key as hex.
pub const ORCHESTRATOR_KEY_FILE_ENV: &str = "ORCHESTRATOR_KEY_FILE";

/// Resolve the orchestrator identity from process environment.
///
/// `Ok(None)` means "not configured"; the caller decides whether that is
/// fatal (the gateway serves 503s until a key appears on restart).
pub fn discover_orchestrator_key() -> DispatchResult<Option<PeerId>> {
    let env_value = std::env::var(ORCHESTRATOR_KEY_ENV).ok();
    let file = std::env::var(ORCHESTRATOR_KEY_FILE_ENV).ok();
    resolve_orchestrator_key(env_value.as_deref(), file.as_deref().map(Path::new))
}

/// Pure resolution: explicit value wins over the key file.
pub fn resolve_orchestrator_key(
    env_value: Option<&str>,
    key_file: Option<&Path>,
) -> DispatchResult<Option<PeerId>> {
    if let Some(raw) = env_value {
        let raw = raw.trim();
        if !raw.is_empty() {
            let peer = PeerId::from_hex(raw).map_err(|_| {
                DispatchError::Internal("malformed orchestrator public key".to_string())
            })?;
            return Ok(Some(peer));
        }
    }

    if let Some(path) = key_file {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DispatchError::Internal(format!("orchestrator key file {}: {e}", path.display()))
        })?;
        let peer = PeerId::from_hex(raw.trim()).map_err(|_| {
            DispatchError::Internal(format!(
                "malformed orchestrator key in {}",
                path.display()
            ))
        })?;
        return Ok(Some(peer));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn key_hex() -> String {
        PeerId::from_bytes([4; 32]).to_hex()
    }

    #[test]
    fn explicit_value_wins() {
        let peer = resolve_orchestrator_key(Some(&key_hex()), None)
            .unwrap()
            .unwrap();
        assert_eq!(peer, PeerId::from_bytes([4; 32]));
    }

    #[test]
    fn blank_value_falls_through_to_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", key_hex()).unwrap();

        let peer = resolve_orchestrator_key(Some("  "), Some(file.path()))
            .unwrap()
            .unwrap();
        assert_eq!(peer, PeerId::from_bytes([4; 32]));
    }

    #[test]
    fn unconfigured_is_none_not_error() {
        assert!(resolve_orchestrator_key(None, None).unwrap().is_none());
    }

    #[test]
    fn malformed_key_is_an_error() {
        assert!(resolve_orchestrator_key(Some("zzzz"), None).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let result =
            resolve_orchestrator_key(None, Some(Path::new("/nonexistent/orchestrator.key")));
        assert!(matches!(result, Err(DispatchError::Internal(_))));
    }
}
