//! Host identity resolution.
//!
//! The `-1` user/group sentinels refer to the user invoking dockernel on the
//! host, not to anything inside the container. [`HostIdentity`] keeps that
//! lookup out of the launch builder.

use crate::error::Result;
#[cfg(not(unix))]
use crate::error::Error;

/// Source of the invoking host user's identity.
pub trait HostIdentity {
    /// Numeric user id of the invoking process.
    fn uid(&self) -> Result<u32>;

    /// Supplementary group ids of the invoking process.
    fn groups(&self) -> Result<Vec<u32>>;
}

/// Identity of the current process, read with `getuid(2)` / `getgroups(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessIdentity;

#[cfg(unix)]
impl HostIdentity for ProcessIdentity {
    fn uid(&self) -> Result<u32> {
        // SAFETY: getuid has no failure mode and touches no memory.
        Ok(unsafe { libc::getuid() })
    }

    fn groups(&self) -> Result<Vec<u32>> {
        // SAFETY: a zero-length call only returns the group count.
        let count = unsafe { libc::getgroups(0, std::ptr::null_mut()) };
        if count <= 0 {
            return Ok(Vec::new());
        }

        let mut groups: Vec<libc::gid_t> = vec![0; count as usize];
        // SAFETY: the buffer holds `count` gid_t slots.
        let filled = unsafe { libc::getgroups(count, groups.as_mut_ptr()) };
        if filled < 0 {
            tracing::warn!(
                error = %std::io::Error::last_os_error(),
                "failed to read host group ids"
            );
            return Ok(Vec::new());
        }
        groups.truncate(filled as usize);
        groups.sort_unstable();
        groups.dedup();
        Ok(groups)
    }
}

#[cfg(not(unix))]
impl HostIdentity for ProcessIdentity {
    fn uid(&self) -> Result<u32> {
        Err(Error::invalid_option(
            "user",
            "-1 is not supported on this platform",
        ))
    }

    fn groups(&self) -> Result<Vec<u32>> {
        Err(Error::invalid_option(
            "group-add",
            "-1 is not supported on this platform",
        ))
    }
}

/// Fixed identity, for tests and callers that resolve identity elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticIdentity {
    /// User id to report.
    pub uid: u32,
    /// Group ids to report.
    pub groups: Vec<u32>,
}

impl HostIdentity for StaticIdentity {
    fn uid(&self) -> Result<u32> {
        Ok(self.uid)
    }

    fn groups(&self) -> Result<Vec<u32>> {
        Ok(self.groups.clone())
    }
}
