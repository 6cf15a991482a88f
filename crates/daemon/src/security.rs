use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

pub fn ensure_owner_only_file(path: &Path) -> Result<()> {
    restrict_mode(path, 0o600)
}

pub fn ensure_owner_only_dir(path: &Path) -> Result<()> {
    restrict_mode(path, 0o700)
}

#[cfg(unix)]
fn restrict_mode(path: &Path, wanted: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if !path.exists() {
        return Ok(());
    }

    let metadata = fs::metadata(path)
        .with_context(|| format!("failed to read metadata for `{}`", path.display()))?;
    if metadata.permissions().mode() & 0o777 != wanted {
        fs::set_permissions(path, fs::Permissions::from_mode(wanted))
            .with_context(|| format!("failed to set mode {wanted:o} on `{}`", path.display()))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn restrict_mode(_path: &Path, _wanted: u32) -> Result<()> {
    Ok(())
}

/// Read a single-line secret (e.g. an access token) from disk.
///
/// Returns `Ok(None)` when the file is missing or blank. The file is
/// tightened to owner-only permissions as a side effect.
pub fn read_secret_file(path: &Path) -> Result<Option<String>> {
    if !path.is_file() {
        return Ok(None);
    }

    ensure_owner_only_file(path)?;
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read secret file `{}`", path.display()))?;
    let secret = contents.lines().next().unwrap_or_default().trim();
    Ok((!secret.is_empty()).then(|| secret.to_string()))
}

/// Mask all but the last four characters of a secret for display.
pub fn redact(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn read_secret_file_missing_is_none() {
        let tmp = tempdir().expect("tempdir should be created");
        assert_eq!(read_secret_file(&tmp.path().join("absent")).unwrap(), None);
    }

    #[test]
    fn read_secret_file_takes_first_trimmed_line() {
        let tmp = tempdir().expect("tempdir should be created");
        let path = tmp.path().join(".github_token");
        fs::write(&path, "  ghp_example123  \nignored\n").expect("token file should be written");
        assert_eq!(read_secret_file(&path).unwrap().as_deref(), Some("ghp_example123"));
    }

    #[test]
    fn read_secret_file_blank_is_none() {
        let tmp = tempdir().expect("tempdir should be created");
        let path = tmp.path().join(".github_token");
        fs::write(&path, "\n\n").expect("token file should be written");
        assert_eq!(read_secret_file(&path).unwrap(), None);
    }

    #[test]
    fn redact_keeps_last_four() {
        assert_eq!(redact("ghp_abcdef1234"), "**********1234");
        assert_eq!(redact("abc"), "***");
    }

    #[cfg(unix)]
    #[test]
    fn owner_only_helpers_apply_expected_modes() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempdir().expect("tempdir should be created");
        let dir_path = tmp.path().join("private-dir");
        let file_path = dir_path.join("token");

        fs::create_dir_all(&dir_path).expect("directory should be created");
        fs::write(&file_path, b"secret").expect("file should be created");

        fs::set_permissions(&dir_path, fs::Permissions::from_mode(0o755))
            .expect("directory permissions should be set");
        fs::set_permissions(&file_path, fs::Permissions::from_mode(0o644))
            .expect("file permissions should be set");

        ensure_owner_only_dir(&dir_path).expect("directory mode should be tightened");
        read_secret_file(&file_path).expect("secret should be readable");

        let dir_mode =
            fs::metadata(&dir_path).expect("directory metadata should load").permissions().mode()
                & 0o777;
        let file_mode =
            fs::metadata(&file_path).expect("file metadata should load").permissions().mode()
                & 0o777;
        assert_eq!(dir_mode, 0o700);
        assert_eq!(file_mode, 0o600);
    }
}
