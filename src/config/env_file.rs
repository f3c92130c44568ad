//! `KEY=VALUE` environment file ingestion.

use std::path::Path;
use tracing::{info, warn};

/// Load `KEY=VALUE` pairs from `path` into the process environment.
///
/// Lenient by policy: malformed lines are skipped rather than failing the
/// file, and an unreadable file degrades to whatever configuration is already
/// present (absent values surface later as connection failures, not here).
/// Variables already set in the environment win over file values.
///
/// Returns the number of variables applied. Must run before option parsing so
/// env-backed options see the injected values.
pub fn load(path: &Path) -> usize {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "environment file not readable, continuing with current environment"
            );
            return 0;
        }
    };

    let mut applied = 0;
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            warn!(line, "ignoring malformed environment line");
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() {
            warn!(line, "ignoring environment line with empty key");
            continue;
        }
        if std::env::var_os(key).is_some() {
            continue;
        }
        std::env::set_var(key, value);
        applied += 1;
    }

    info!(path = %path.display(), applied, "environment file loaded");
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_env_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_key_value_pairs() {
        let file = write_env_file("PORTAL_SYNC_TEST_HOST=db.example.com\nPORTAL_SYNC_TEST_PORT = 3307\n");
        let applied = load(file.path());
        assert_eq!(applied, 2);
        assert_eq!(
            std::env::var("PORTAL_SYNC_TEST_HOST").unwrap(),
            "db.example.com"
        );
        assert_eq!(std::env::var("PORTAL_SYNC_TEST_PORT").unwrap(), "3307");
    }

    #[test]
    fn skips_malformed_lines_and_comments() {
        let file = write_env_file(
            "# comment\n\nPORTAL_SYNC_TEST_OK=yes\nno equals sign here\n=empty_key\n",
        );
        let applied = load(file.path());
        assert_eq!(applied, 1);
        assert_eq!(std::env::var("PORTAL_SYNC_TEST_OK").unwrap(), "yes");
    }

    #[test]
    fn existing_environment_wins() {
        std::env::set_var("PORTAL_SYNC_TEST_PRESET", "from-env");
        let file = write_env_file("PORTAL_SYNC_TEST_PRESET=from-file\n");
        load(file.path());
        assert_eq!(
            std::env::var("PORTAL_SYNC_TEST_PRESET").unwrap(),
            "from-env"
        );
    }

    #[test]
    fn unreadable_file_degrades_to_nothing() {
        let applied = load(Path::new("/nonexistent/portal-sync.env"));
        assert_eq!(applied, 0);
    }
}
