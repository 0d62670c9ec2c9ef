//! Materialises the generated private key for the system `ssh` client.

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::{Builder, NamedTempFile, TempDir};

use crate::backend::PrivateKey;

/// Owner-only key file and control socket directory for one session.
///
/// Both are removed when the value is dropped.
#[derive(Debug)]
pub(super) struct SessionFiles {
    _key: NamedTempFile,
    key_path: Utf8PathBuf,
    _control_dir: TempDir,
    control_path: Utf8PathBuf,
}

impl SessionFiles {
    pub(super) fn create(private_key: &PrivateKey) -> Result<Self, String> {
        let mut key = Builder::new()
            .prefix("lr-key-")
            .tempfile()
            .map_err(|err| err.to_string())?;
        restrict_permissions(key.path()).map_err(|err| err.to_string())?;
        key.write_all(private_key.expose().as_bytes())
            .and_then(|()| key.flush())
            .map_err(|err| err.to_string())?;
        let key_path = utf8(key.path())?;

        let control_dir = Builder::new()
            .prefix("lr-ssh-")
            .tempdir()
            .map_err(|err| err.to_string())?;
        let control_path = utf8(control_dir.path())?.join("ctl");

        Ok(Self {
            _key: key,
            key_path,
            _control_dir: control_dir,
            control_path,
        })
    }

    pub(super) fn key_path(&self) -> &Utf8Path {
        &self.key_path
    }

    pub(super) fn control_path(&self) -> &Utf8Path {
        &self.control_path
    }
}

fn utf8(path: &std::path::Path) -> Result<Utf8PathBuf, String> {
    Utf8PathBuf::from_path_buf(path.to_path_buf())
        .map_err(|path| format!("temporary path is not UTF-8: {}", path.display()))
}

#[cfg(unix)]
fn restrict_permissions(path: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &std::path::Path) -> std::io::Result<()> {
    Ok(())
}
