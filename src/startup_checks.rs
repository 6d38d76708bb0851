//! Startup requirement validation for herakles-libvirt-exporter.
//!
//! Checks that the chosen backend can plausibly be reached before the
//! listener opens. Failures are reported to the caller, which logs them;
//! the exporter still starts and serves preamble-only documents.

use nix::unistd::geteuid;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::hypervisor::BackendUri;

/// Read-only libvirtd socket used by `qemu:///system` style URIs.
pub const LIBVIRT_RO_SOCKET: &str = "/var/run/libvirt/libvirt-sock-ro";

/// Validate all runtime requirements for `uri`
pub fn validate_requirements(uri: &str) -> Result<(), ValidationError> {
    info!("🔍 Validating runtime requirements...");

    match BackendUri::parse(uri) {
        BackendUri::Fixture(path) => check_fixture(&path)?,
        BackendUri::Libvirt(uri) => {
            check_libvirt_feature(&uri)?;
            if is_local_system_uri(&uri) {
                check_user_privileges();
                check_libvirt_socket(Path::new(LIBVIRT_RO_SOCKET))?;
            } else {
                debug!("Remote or session URI {}, skipping local socket check", uri);
            }
        }
    }

    info!("✅ All runtime requirements validated");
    Ok(())
}

/// `qemu:///system`, `xen:///system` and friends talk to the local daemon.
fn is_local_system_uri(uri: &str) -> bool {
    uri.contains(":///system")
}

fn check_libvirt_feature(uri: &str) -> Result<(), ValidationError> {
    if cfg!(feature = "libvirt") {
        Ok(())
    } else {
        error!("❌ {} needs libvirt support, which this build does not include", uri);
        error!("   Solution: rebuild with --features libvirt, or use a fixture:// URI");
        Err(ValidationError::LibvirtUnsupported(uri.to_string()))
    }
}

/// Check if running with sufficient privileges
fn check_user_privileges() {
    if !geteuid().is_root() {
        warn!("⚠️  Not running as root - the read-only libvirt socket may be restricted");
        warn!("   Recommendation: run as root or as a member of the libvirt group");
    } else {
        info!("✅ Running as root (uid=0)");
    }
}

fn check_libvirt_socket(socket: &Path) -> Result<(), ValidationError> {
    match fs::metadata(socket) {
        Ok(_) => {
            info!("✅ libvirt socket present: {}", socket.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            error!("❌ Cannot access {} - insufficient permissions", socket.display());
            Err(ValidationError::InsufficientPermissions(e.to_string()))
        }
        Err(e) => {
            error!("❌ libvirt socket {} not available: {}", socket.display(), e);
            error!("   Is libvirtd (or virtqemud) running?");
            Err(ValidationError::SocketUnavailable(socket.to_path_buf()))
        }
    }
}

fn check_fixture(path: &Path) -> Result<(), ValidationError> {
    if path.is_file() {
        info!("✅ Fixture file present: {}", path.display());
        Ok(())
    } else {
        error!("❌ Fixture file not found: {}", path.display());
        error!("   Solution: herakles-libvirt-exporter generate-fixture -o {}", path.display());
        Err(ValidationError::FixtureMissing(path.to_path_buf()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Insufficient permissions: {0}")]
    InsufficientPermissions(String),

    #[error("libvirt socket not available: {0}")]
    SocketUnavailable(PathBuf),

    #[error("built without libvirt support, cannot open {0}")]
    LibvirtUnsupported(String),

    #[error("fixture file not found: {0}")]
    FixtureMissing(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_fixture_present() {
        let file = NamedTempFile::new().unwrap();
        let uri = format!("fixture://{}", file.path().display());
        assert!(validate_requirements(&uri).is_ok());
    }

    #[test]
    fn test_fixture_missing() {
        let err = validate_requirements("fixture:///nonexistent/stats.json").unwrap_err();
        assert!(matches!(err, ValidationError::FixtureMissing(_)));
    }

    #[test]
    fn test_missing_socket() {
        let err = check_libvirt_socket(Path::new("/nonexistent/libvirt-sock-ro")).unwrap_err();
        assert!(matches!(err, ValidationError::SocketUnavailable(_)));
    }

    #[test]
    fn test_local_system_uri() {
        assert!(is_local_system_uri("qemu:///system"));
        assert!(!is_local_system_uri("qemu+ssh://host/system"));
        assert!(!is_local_system_uri("qemu:///session"));
    }

    #[cfg(not(feature = "libvirt"))]
    #[test]
    fn test_libvirt_uri_without_feature() {
        let err = validate_requirements("qemu:///system").unwrap_err();
        assert!(matches!(err, ValidationError::LibvirtUnsupported(_)));
    }
}
