//! Memory-trim mitigation for vigil.
//!
//! The guard only knows the [`Mitigation`] trait; the concrete primitive is
//! picked per platform at startup. All implementations are best-effort and
//! idempotent at the call level: invoking one twice wastes work but cannot
//! corrupt anything. The at-most-once-per-episode discipline lives in the
//! guard, not here.
//!
//! Running without privileges is the normal case. A primitive that is
//! missing or refused reports an error which the guard turns into an Action
//! event; it is never fatal to the process.

use thiserror::Error;

/// Failure of a memory-trim attempt.
#[derive(Debug, Error)]
pub enum MitigationError {
    /// No trim primitive exists for this platform / libc
    #[error("memory trim is not supported on this platform")]
    Unsupported,
    /// The primitive ran but reported failure
    #[error("memory trim command failed: {0}")]
    CommandFailed(String),
}

/// A whole-system "release freeable memory back to the OS" primitive.
pub trait Mitigation {
    /// Attempt the trim. Expected to return promptly.
    fn trigger(&mut self) -> Result<(), MitigationError>;

    /// Short human-readable name of the primitive, used in event messages.
    fn describe(&self) -> &'static str;
}

/// glibc `malloc_trim(0)`: returns freeable heap pages to the kernel.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub struct MallocTrim;

#[cfg(all(target_os = "linux", target_env = "gnu"))]
impl Mitigation for MallocTrim {
    fn trigger(&mut self) -> Result<(), MitigationError> {
        // Returns 1 if memory was released, 0 if there was nothing to give
        // back. Both are successful attempts at the call level.
        unsafe {
            libc::malloc_trim(0);
        }
        Ok(())
    }

    fn describe(&self) -> &'static str {
        "malloc_trim"
    }
}

/// macOS `purge`: flushes the disk cache, best-effort.
#[cfg(target_os = "macos")]
pub struct MemoryPurge;

#[cfg(target_os = "macos")]
impl Mitigation for MemoryPurge {
    fn trigger(&mut self) -> Result<(), MitigationError> {
        use std::process::{Command, Stdio};

        let status = Command::new("purge")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(MitigationError::CommandFailed(format!(
                "purge exited with {status}"
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(MitigationError::Unsupported)
            }
            Err(e) => Err(MitigationError::CommandFailed(e.to_string())),
        }
    }

    fn describe(&self) -> &'static str {
        "purge"
    }
}

/// Fallback for platforms without a trim primitive.
pub struct UnsupportedTrim;

impl Mitigation for UnsupportedTrim {
    fn trigger(&mut self) -> Result<(), MitigationError> {
        Err(MitigationError::Unsupported)
    }

    fn describe(&self) -> &'static str {
        "unsupported"
    }
}

/// Pick the trim primitive for the current platform.
pub fn platform_default() -> Box<dyn Mitigation + Send> {
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    {
        Box::new(MallocTrim)
    }
    #[cfg(target_os = "macos")]
    {
        Box::new(MemoryPurge)
    }
    #[cfg(not(any(all(target_os = "linux", target_env = "gnu"), target_os = "macos")))]
    {
        Box::new(UnsupportedTrim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_trim_reports_without_panicking() {
        let mut trim = UnsupportedTrim;
        assert!(matches!(trim.trigger(), Err(MitigationError::Unsupported)));
        // Call-level idempotence: a second attempt behaves identically.
        assert!(matches!(trim.trigger(), Err(MitigationError::Unsupported)));
    }

    #[test]
    fn platform_default_names_its_primitive() {
        let mitigation = platform_default();
        assert!(!mitigation.describe().is_empty());
    }
}
