//! File-backed persistence: the supervisor's own state and per-agent state files.

pub mod agent_state;
pub mod state_store;

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

/// Write `bytes` to `path` through a sibling temp file and rename.
///
/// Readers observe either the previous contents or the new contents, never
/// a partial write. Parent directories are created as needed.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}
