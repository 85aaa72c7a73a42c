//! Facts about the orchestrating host.

use crate::error::{CtsError, Result};

/// Fail unless the process runs with an effective uid of 0.
///
/// Remote administrative commands (starting and stopping the cluster manager,
/// fencing) need root. Call once at program start, before touching the
/// cluster.
pub fn ensure_privileged() -> Result<()> {
    let euid = effective_uid();
    if euid != 0 {
        return Err(CtsError::PrivilegeRequired { euid });
    }
    Ok(())
}

/// Effective user id of this process.
pub fn effective_uid() -> u32 {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() }
}

/// Name of this host as reported by `gethostname(2)`.
pub fn hostname() -> std::io::Result<String> {
    let mut buf = vec![0u8; 256];
    // SAFETY: buf is valid for writes of buf.len() bytes.
    let result = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if result != 0 {
        return Err(std::io::Error::last_os_error());
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    buf.truncate(len);
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
