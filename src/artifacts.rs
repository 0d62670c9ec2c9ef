//! Local files consumed and produced by a run.
//!
//! Templates are read from ambient paths. Generated configuration and the
//! per-command logs are written into a single artifact directory opened once
//! through `cap-std`, so writes cannot escape it.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

/// Errors raised while reading or writing local run files.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ArtifactError {
    /// Raised when a path has no file name component.
    #[error("path has no file name: {path}")]
    InvalidPath {
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// Raised when reading a local file fails.
    #[error("failed to read `{path}`: {message}")]
    Read {
        /// File that failed to read.
        path: Utf8PathBuf,
        /// Underlying error message.
        message: String,
    },
    /// Raised when writing into the artifact directory fails.
    #[error("failed to write `{path}`: {message}")]
    Write {
        /// File or directory that failed to write.
        path: Utf8PathBuf,
        /// Underlying error message.
        message: String,
    },
    /// Raised when a template cannot be rendered.
    #[error("template `{path}` is invalid: {message}")]
    Template {
        /// Template path.
        path: Utf8PathBuf,
        /// Rendering failure.
        message: String,
    },
}

fn split(path: &Utf8Path) -> Result<(&Utf8Path, &str), ArtifactError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path.file_name().ok_or_else(|| ArtifactError::InvalidPath {
        path: path.to_path_buf(),
    })?;
    Ok((parent, file_name))
}

fn read_error(path: &Utf8Path, err: &io::Error) -> ArtifactError {
    ArtifactError::Read {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Reads a UTF-8 file from an ambient path.
///
/// # Errors
///
/// Returns [`ArtifactError::Read`] when the directory or file cannot be read.
pub fn read_local_file(path: &Utf8Path) -> Result<String, ArtifactError> {
    let (parent, file_name) = split(path)?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .map_err(|err| read_error(parent, &err))?;
    dir.read_to_string(file_name)
        .map_err(|err| read_error(path, &err))
}

/// Ensures a local file exists and is a regular file.
///
/// # Errors
///
/// Returns [`ArtifactError::Read`] when the file is missing or unreadable.
pub fn ensure_readable(path: &Utf8Path) -> Result<(), ArtifactError> {
    let (parent, file_name) = split(path)?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .map_err(|err| read_error(parent, &err))?;
    let metadata = dir
        .metadata(file_name)
        .map_err(|err| read_error(path, &err))?;
    if metadata.is_file() {
        Ok(())
    } else {
        Err(ArtifactError::Read {
            path: path.to_path_buf(),
            message: String::from("not a regular file"),
        })
    }
}

/// Directory receiving generated files and run logs.
#[derive(Debug)]
pub struct ArtifactStore {
    root: Utf8PathBuf,
    dir: Dir,
}

impl ArtifactStore {
    /// Opens `root`, creating it when missing.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Write`] when the directory cannot be created
    /// or opened.
    pub fn open(root: &Utf8Path) -> Result<Self, ArtifactError> {
        let write_error = |err: io::Error| ArtifactError::Write {
            path: root.to_path_buf(),
            message: err.to_string(),
        };
        Dir::create_ambient_dir_all(root, ambient_authority()).map_err(write_error)?;
        let dir = Dir::open_ambient_dir(root, ambient_authority()).map_err(write_error)?;
        Ok(Self {
            root: root.to_path_buf(),
            dir,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns the ambient path of a file inside the store.
    #[must_use]
    pub fn path_of(&self, name: &str) -> Utf8PathBuf {
        self.root.join(name)
    }

    /// Writes `contents` to `name`, replacing any previous file.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Write`] when the write fails.
    pub fn write(&self, name: &str, contents: &str) -> Result<Utf8PathBuf, ArtifactError> {
        let path = self.path_of(name);
        self.dir
            .write(name, contents)
            .map_err(|err| ArtifactError::Write {
                path: path.clone(),
                message: err.to_string(),
            })?;
        Ok(path)
    }

    /// Reads a file previously written to the store.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Read`] when the file cannot be read.
    pub fn read(&self, name: &str) -> Result<String, ArtifactError> {
        self.dir
            .read_to_string(name)
            .map_err(|err| read_error(&self.path_of(name), &err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn utf8(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp path")
    }

    #[rstest]
    fn store_creates_missing_directory_and_round_trips() {
        let tmp = TempDir::new().expect("temp dir");
        let root = utf8(&tmp).join("nested/logs");
        let store = ArtifactStore::open(&root).expect("open store");

        let written = store.write("setup-stdout-abc.log", "ok\n").expect("write");
        assert_eq!(written, root.join("setup-stdout-abc.log"));
        assert_eq!(store.read("setup-stdout-abc.log").expect("read"), "ok\n");
    }

    #[rstest]
    fn read_local_file_reports_missing_path() {
        let tmp = TempDir::new().expect("temp dir");
        let missing = utf8(&tmp).join("absent.template");
        let err = read_local_file(&missing).expect_err("missing file");
        assert!(matches!(err, ArtifactError::Read { path, .. } if path == missing));
    }

    #[rstest]
    fn ensure_readable_rejects_directories() {
        let tmp = TempDir::new().expect("temp dir");
        let root = utf8(&tmp);
        std::fs::create_dir(root.join("image.qcow2")).expect("mkdir");
        assert!(ensure_readable(&root.join("image.qcow2")).is_err());
        std::fs::write(root.join("real.qcow2"), b"qcow").expect("write");
        assert!(ensure_readable(&root.join("real.qcow2")).is_ok());
    }
}
