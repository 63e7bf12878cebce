//! Crash-safe file writes shared by the filesystem store and key storage.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// Mode for private keys, account credentials and tokens
pub(crate) const PRIVATE_FILE_MODE: u32 = 0o600;

/// Mode for certificate chains
pub(crate) const PUBLIC_FILE_MODE: u32 = 0o644;

/// Write `contents` to `path` so that readers see either the old file or
/// the complete new one, never a prefix.
pub(crate) fn write_atomic(path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
    stage(path, contents, mode)?.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Write `contents` to a synced temporary file next to `path`, ready to be
/// renamed over it.
///
/// Dropping the returned file without persisting it removes it.
pub(crate) fn stage(path: &Path, contents: &[u8], mode: u32) -> io::Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(tmp)
}

/// Create a directory (and parents) readable only by the owner
pub(crate) fn create_private_dir(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o700))?;
    }

    Ok(())
}

/// Read a file, mapping "not found" to `None`
pub(crate) fn read_optional(path: &Path) -> io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
