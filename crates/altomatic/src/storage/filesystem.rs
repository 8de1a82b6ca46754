use std::path::{Path, PathBuf};

use chrono::Local;
use rand::Rng;

use crate::error::StorageError;

/// Move a file from `src` to `dst`. Uses `rename` first (fast, atomic on
/// same filesystem). Falls back to copy + delete when rename fails, which
/// handles cross-device moves.
fn move_file(src: &Path, dst: &Path) -> Result<(), StorageError> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    std::fs::copy(src, dst).map_err(|e| StorageError::Rename {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    std::fs::remove_file(src).map_err(|e| StorageError::Rename {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

const SHORT_ID_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub(crate) fn short_id(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| SHORT_ID_CHARSET[rng.gen_range(0..SHORT_ID_CHARSET.len())] as char)
        .collect()
}

pub(crate) fn timestamp_prefix() -> String {
    Local::now().format("%Y-%m-%d-%H-%M").to_string()
}

fn session_folder_name() -> String {
    format!("session-{}-{}", timestamp_prefix(), short_id(4))
}

/// Applies orchestrator output to disk: a fresh session folder per batch,
/// renamed files moved into it.
pub struct ResultSink {
    session_dir: PathBuf,
    renamed_dir: PathBuf,
}

impl ResultSink {
    /// Creates the session folder tree under `output_root`. Failure here is
    /// a misconfiguration that aborts the batch before any job runs.
    pub fn create(output_root: &Path) -> Result<Self, StorageError> {
        let session_dir = output_root.join(session_folder_name());
        let renamed_dir = session_dir.join("renamed_images");

        std::fs::create_dir_all(&renamed_dir).map_err(|e| StorageError::CreateDirectory {
            path: renamed_dir.clone(),
            source: e,
        })?;

        Ok(Self {
            session_dir,
            renamed_dir,
        })
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    pub fn renamed_dir(&self) -> &Path {
        &self.renamed_dir
    }

    /// Moves `source` into the session folder under `filename`, resolving
    /// collisions against the live filesystem (the in-memory session set is
    /// not enough: files can appear underneath us). Returns the final path.
    pub fn place(&self, source: &Path, filename: &str) -> Result<PathBuf, StorageError> {
        let destination = resolve_conflict(&self.renamed_dir, filename)?;
        move_file(source, &destination)?;
        Ok(destination)
    }
}

/// Finds an available name in `directory`, appending `-2`, `-3`, … before
/// the extension. Probes `symlink_metadata` so broken symlinks count as
/// occupied.
fn resolve_conflict(directory: &Path, filename: &str) -> Result<PathBuf, StorageError> {
    let path = directory.join(filename);
    if std::fs::symlink_metadata(&path).is_err() {
        return Ok(path);
    }

    let (base, ext) = match filename.rfind('.') {
        Some(dot_pos) => (&filename[..dot_pos], Some(&filename[dot_pos..])),
        None => (filename, None),
    };

    for counter in 2..=1000 {
        let candidate = match ext {
            Some(ext) => format!("{}-{}{}", base, counter, ext),
            None => format!("{}-{}", base, counter),
        };

        let candidate_path = directory.join(&candidate);
        if std::fs::symlink_metadata(&candidate_path).is_err() {
            return Ok(candidate_path);
        }
    }

    Err(StorageError::FileExists(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_builds_session_tree() {
        let tmp = TempDir::new().unwrap();
        let sink = ResultSink::create(tmp.path()).unwrap();

        assert!(sink.session_dir().exists());
        assert!(sink.renamed_dir().exists());
        let name = sink
            .session_dir()
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(name.starts_with("session-"));
    }

    #[test]
    fn test_create_fails_on_unwritable_root() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("not_a_dir");
        std::fs::write(&blocker, b"file in the way").unwrap();

        let result = ResultSink::create(&blocker);
        assert!(matches!(result, Err(StorageError::CreateDirectory { .. })));
    }

    #[test]
    fn test_place_moves_source() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("input.jpg");
        std::fs::write(&source, b"jpeg bytes").unwrap();

        let sink = ResultSink::create(tmp.path()).unwrap();
        let placed = sink.place(&source, "orange-cat.jpg").unwrap();

        assert!(!source.exists());
        assert!(placed.exists());
        assert!(placed.ends_with("orange-cat.jpg"));
        assert_eq!(std::fs::read(&placed).unwrap(), b"jpeg bytes");
    }

    #[test]
    fn test_place_resolves_filesystem_collision() {
        let tmp = TempDir::new().unwrap();
        let sink = ResultSink::create(tmp.path()).unwrap();

        // A file appears in the session folder outside our bookkeeping.
        std::fs::write(sink.renamed_dir().join("sunset-beach.jpg"), b"external").unwrap();

        let source = tmp.path().join("input.jpg");
        std::fs::write(&source, b"ours").unwrap();
        let placed = sink.place(&source, "sunset-beach.jpg").unwrap();

        assert!(placed.ends_with("sunset-beach-2.jpg"));
        assert!(sink.renamed_dir().join("sunset-beach.jpg").exists());
    }

    #[test]
    fn test_place_missing_source_errors() {
        let tmp = TempDir::new().unwrap();
        let sink = ResultSink::create(tmp.path()).unwrap();

        let result = sink.place(&tmp.path().join("gone.jpg"), "name.jpg");
        assert!(matches!(result, Err(StorageError::Rename { .. })));
    }

    #[test]
    fn test_resolve_conflict_without_extension() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("noext"), b"x").unwrap();

        let resolved = resolve_conflict(tmp.path(), "noext").unwrap();
        assert!(resolved.ends_with("noext-2"));
    }

    #[test]
    fn test_resolve_conflict_counts_upward() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("pic.jpg"), b"1").unwrap();
        std::fs::write(tmp.path().join("pic-2.jpg"), b"2").unwrap();

        let resolved = resolve_conflict(tmp.path(), "pic.jpg").unwrap();
        assert!(resolved.ends_with("pic-3.jpg"));
    }

    #[test]
    fn test_session_folder_names_are_unique() {
        let a = session_folder_name();
        let b = session_folder_name();
        // Same minute, different short id (collision odds 1 in 36^4).
        assert_ne!(a, b);
    }
}
