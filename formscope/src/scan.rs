//! Discovery and loading of compiled units from disk.
//!
//! Feeds unit files through the same capture path the unit definition
//! hook uses, so on-disk units and units defined at runtime produce
//! identical records.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::bridge::Session;
use crate::bytecode::peek_class_name;
use crate::domain::ScanError;

pub const UNIT_EXTENSION: &str = "class";

/// Every unit file under `paths`, sorted. Files are taken as given;
/// directories are walked recursively for `.class` files.
///
/// # Errors
/// Returns [`ScanError::NotFound`] for a missing path, [`ScanError::Io`] if a
/// directory cannot be read.
pub fn collect_unit_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>, ScanError> {
    let mut files = Vec::new();
    for path in paths {
        if !path.exists() {
            return Err(ScanError::NotFound(path.clone()));
        }
        if path.is_dir() {
            walk(path, &mut files)?;
        } else {
            files.push(path.clone());
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), ScanError> {
    let entries = fs::read_dir(dir).map_err(|source| ScanError::Io { path: dir.to_path_buf(), source })?;
    for entry in entries {
        let path = entry
            .map_err(|source| ScanError::Io { path: dir.to_path_buf(), source })?
            .path();
        if path.is_dir() {
            walk(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == UNIT_EXTENSION) {
            files.push(path);
        }
    }
    Ok(())
}

/// Name a unit by its own header, falling back to the file stem.
pub fn unit_name_for(path: &Path, bytes: &[u8]) -> String {
    match peek_class_name(bytes) {
        Ok(name) => name,
        Err(e) => {
            let stem = path.file_stem().map_or_else(
                || path.display().to_string(),
                |s| s.to_string_lossy().into_owned(),
            );
            warn!("{}: unreadable unit header ({e}), recording as {stem}", path.display());
            stem
        }
    }
}

/// Read each file and capture it into `session`. Returns how many were loaded.
///
/// # Errors
/// Returns [`ScanError::Io`] if a file cannot be read.
pub fn load_units(session: &Session, files: &[PathBuf]) -> Result<usize, ScanError> {
    for path in files {
        let bytes = fs::read(path).map_err(|source| ScanError::Io { path: path.clone(), source })?;
        let name = unit_name_for(path, &bytes);
        debug!("Loading {} ({} bytes) as {name}", path.display(), bytes.len());
        session.capture_loaded_unit(&name, &bytes);
    }
    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_collect_walks_directories() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("app");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("core$f.class"), b"x").unwrap();
        fs::write(dir.path().join("README"), b"x").unwrap();

        let files = collect_unit_files(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(files, vec![nested.join("core$f.class")]);
    }

    #[test]
    fn test_missing_path() {
        let err = collect_unit_files(&[PathBuf::from("/definitely/not/here")]).unwrap_err();
        assert!(matches!(err, ScanError::NotFound(_)));
    }

    #[test]
    fn test_unit_name_falls_back_to_stem() {
        assert_eq!(unit_name_for(Path::new("out/Broken.class"), b"junk"), "Broken");
    }
}
