//! Device node access checks and the `su` fallback used when the current
//! process can't read or write the node.

use log::{debug, warn};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Access policy for device nodes.
#[cfg_attr(test, mockall::automock)]
pub trait DevicePermissions: Send + Sync {
    /// Whether the current process may read and write `path`.
    fn is_read_write(&self, path: &Path) -> bool {
        has_read_write_access(path)
    }

    /// Best-effort attempt to make `path` readable and writable. Failure is
    /// an expected outcome.
    fn ensure_read_write(&self, path: &Path) -> bool;
}

/// Checks read and write access for the real user, like `access(2)`.
#[cfg(unix)]
pub fn has_read_write_access(path: &Path) -> bool {
    use rustix::fs::{Access, access};

    access(path, Access::READ_OK | Access::WRITE_OK).is_ok()
}

#[cfg(not(unix))]
pub fn has_read_write_access(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| !meta.permissions().readonly())
        .unwrap_or(false)
}

/// Grants full permissions on the node through `su -c chmod 777`.
#[derive(Clone, Debug)]
pub struct SuPermissions {
    su_path: PathBuf,
}

impl SuPermissions {
    pub fn new(su_path: impl Into<PathBuf>) -> Self {
        Self {
            su_path: su_path.into(),
        }
    }

    fn chmod_777(&self, path: &Path) -> std::io::Result<bool> {
        let mut su = Command::new(&self.su_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        if let Some(mut stdin) = su.stdin.take() {
            let script = format!("chmod 777 {}\nexit\n", shell_quote(path));
            stdin.write_all(script.as_bytes())?;
        }
        let status = su.wait()?;
        Ok(status.success())
    }
}

/// Single-quotes `path` for `sh`, escaping embedded quotes.
fn shell_quote(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', r"'\''"))
}

impl DevicePermissions for SuPermissions {
    fn ensure_read_write(&self, path: &Path) -> bool {
        if !path.exists() {
            debug!("{} does not exist, nothing to chmod", path.display());
            return false;
        }
        match self.chmod_777(path) {
            Ok(true) => self.is_read_write(path),
            Ok(false) => {
                warn!("{} refused to chmod {}", self.su_path.display(), path.display());
                false
            }
            Err(e) => {
                warn!(
                    "Failed to run {} for {}: {e}",
                    self.su_path.display(),
                    path.display()
                );
                false
            }
        }
    }
}

/// Never elevates: a node without access stays inaccessible.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoElevation;

impl DevicePermissions for NoElevation {
    fn ensure_read_write(&self, _path: &Path) -> bool {
        false
    }
}

/// Treats every path as accessible. Meant for in-memory devices, whose paths
/// don't exist on disk.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unrestricted;

impl DevicePermissions for Unrestricted {
    fn is_read_write(&self, _path: &Path) -> bool {
        true
    }

    fn ensure_read_write(&self, _path: &Path) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_path_has_no_access() {
        assert!(!has_read_write_access(Path::new(
            "/dev/serial-link-does-not-exist"
        )));
    }

    #[cfg(unix)]
    #[test]
    fn test_dev_null_is_read_write() {
        assert!(has_read_write_access(Path::new("/dev/null")));
    }

    #[test]
    fn test_no_elevation() {
        assert!(!NoElevation.ensure_read_write(Path::new("/dev/null")));
    }

    #[test]
    fn test_unrestricted() {
        let path = Path::new("/dev/nowhere");
        assert!(Unrestricted.is_read_write(path));
        assert!(Unrestricted.ensure_read_write(path));
    }

    #[test]
    fn test_su_rejects_missing_node() {
        let su = SuPermissions::new("/bin/true");
        assert!(!su.ensure_read_write(Path::new("/dev/serial-link-does-not-exist")));
    }

    #[test]
    fn test_shell_quote_keeps_path_one_word() {
        assert_eq!(shell_quote(Path::new("/dev/ttyS0")), "'/dev/ttyS0'");
        assert_eq!(
            shell_quote(Path::new("/tmp/a b;rm -rf x")),
            "'/tmp/a b;rm -rf x'"
        );
        assert_eq!(shell_quote(Path::new("/tmp/it's")), r"'/tmp/it'\''s'");
    }

    #[cfg(unix)]
    #[test]
    fn test_su_script_chmods_path_with_spaces() {
        use std::os::unix::fs::PermissionsExt;

        let path = std::env::temp_dir().join(format!("serial link it's {}", std::process::id()));
        std::fs::write(&path, b"").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();

        let su = SuPermissions::new("/bin/sh");
        assert!(su.ensure_read_write(&path));
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(mode & 0o777, 0o777);
    }

    #[test]
    fn test_su_missing_binary_fails_softly() {
        let su = SuPermissions::new("/nonexistent/su");
        assert!(!su.ensure_read_write(Path::new("/")));
    }
}
