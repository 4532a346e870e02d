//! JSONL cache export and import
//!
//! One JSON object `{key: entry}` per line. Export writes to a temp file in
//! the destination directory and atomically renames it into place, so a crash
//! mid-write never leaves a truncated export behind.

use crate::cache::entry::CacheEntry;
use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Write entries to a JSONL file via temp-file + atomic rename
pub fn write_jsonl(path: &Path, entries: &HashMap<String, CacheEntry>) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).context("Failed to create export directory")?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .context("Failed to create temp file for export")?;

    for (key, entry) in entries {
        let line = serde_json::json!({ key: entry });
        serde_json::to_writer(&mut tmp, &line).context("Failed to serialize cache entry")?;
        tmp.write_all(b"\n")?;
    }
    tmp.flush()?;

    tmp.persist(path)
        .with_context(|| format!("Failed to move export into place at {}", path.display()))?;
    debug!("Exported {} cache entries to {}", entries.len(), path.display());
    Ok(())
}

/// Read entries from a JSONL file
pub fn read_jsonl(path: &Path) -> Result<HashMap<String, CacheEntry>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut entries = HashMap::new();
    for (lineno, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let object: HashMap<String, CacheEntry> = serde_json::from_str(line)
            .with_context(|| format!("Malformed cache line {} in {}", lineno + 1, path.display()))?;
        if object.len() != 1 {
            bail!(
                "Expected one {{key: entry}} object on line {} of {}",
                lineno + 1,
                path.display()
            );
        }
        entries.extend(object);
    }
    debug!("Imported {} cache entries from {}", entries.len(), path.display());
    Ok(entries)
}
