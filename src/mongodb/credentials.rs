//! Service-account credentials for the source store.
//!
//! The credentials document lives at a fixed relative path by default and
//! grants read access to the source. Absence is not fatal: the connection
//! falls back to whatever credentials the URI itself carries.

use mongodb::options::Credential;
use serde::Deserialize;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    username: String,
    password: String,
    #[serde(default)]
    auth_source: Option<String>,
}

/// Read and decode the credentials document, if present and well-formed.
pub fn load(path: &Path) -> Option<Credential> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "source credentials file not readable, using URI credentials"
            );
            return None;
        }
    };

    let parsed: CredentialsFile = match serde_json::from_str(&raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "source credentials file malformed, using URI credentials"
            );
            return None;
        }
    };

    let mut credential = Credential::builder()
        .username(parsed.username)
        .password(parsed.password)
        .build();
    credential.source = parsed.auth_source;
    Some(credential)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_well_formed_credentials() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"username": "reader", "password": "s3cret", "auth_source": "admin"}"#)
            .unwrap();
        let credential = load(file.path()).unwrap();
        assert_eq!(credential.username.as_deref(), Some("reader"));
        assert_eq!(credential.password.as_deref(), Some("s3cret"));
        assert_eq!(credential.source.as_deref(), Some("admin"));
    }

    #[test]
    fn missing_file_falls_back_to_none() {
        assert!(load(Path::new("/nonexistent/credentials.json")).is_none());
    }

    #[test]
    fn malformed_json_falls_back_to_none() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not json at all").unwrap();
        assert!(load(file.path()).is_none());
    }
}
