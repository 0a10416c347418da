use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Write content to a file atomically using write-to-temp-then-rename.
/// The temp file is created in the same directory as the target so the
/// rename never crosses filesystems.
pub fn atomic_write(target: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    if !parent.exists() {
        fs::create_dir_all(parent)?;
    }

    let mut temp_file = NamedTempFile::new_in(parent)?;
    temp_file.write_all(content)?;
    temp_file.as_file().sync_all()?;
    temp_file.persist(target).map_err(|e| e.error)?;

    Ok(())
}

/// Turn an arbitrary key (an email, a URL id) into a single safe file name
/// component. Everything outside `[A-Za-z0-9._~-]` is percent-encoded, so
/// distinct keys never share a file and path separators cannot survive.
pub fn encode_file_component(key: &str) -> String {
    urlencoding::encode(key).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("deeper").join("creds.json");

        atomic_write(&target, b"{\"a\":1}").unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_atomic_write_replaces_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("store.json");
        fs::write(&target, "old content that is longer").unwrap();

        atomic_write(&target, b"new").unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "new");
        // No stray temp files left behind
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_encode_file_component() {
        assert_eq!(encode_file_component("a@example.com"), "a%40example.com");
        assert_eq!(encode_file_component("../etc/passwd"), "..%2Fetc%2Fpasswd");
        assert_eq!(encode_file_component("c:\\x"), "c%3A%5Cx");
    }

    #[test]
    fn test_encode_file_component_keeps_keys_apart() {
        assert_ne!(
            encode_file_component("x/y@example.com"),
            encode_file_component("x_y@example.com")
        );
        assert_ne!(encode_file_component("a%2Fb"), encode_file_component("a/b"));
    }
}
