//! Atomic file writes: data lands at its final path only via a same-directory
//! temp file plus `rename`, so a reader never observes a partially written
//! file and a crash mid-write never corrupts the previous contents (spec.md
//! §4.6, "Atomic writes"). Used for the plugin discovery cache and for
//! `Address` sinks backed by a plain file.

use std::path::Path;

pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let tmp_name = format!(".{}.jn-tmp-{}", file_name(path), std::process::id());
    let tmp_path = dir.join(tmp_name);
    std::fs::write(&tmp_path, bytes)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "output".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_creates_final_file_only() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.json");
        write_atomic(&target, b"hello").unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "hello");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("jn-tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
