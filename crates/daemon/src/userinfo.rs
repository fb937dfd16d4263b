//! Resolves a requested user's home directory (the "external user-lookup
//! collaborator" spec §4.4 step 5 defers to) and anchors a relative
//! `server_path` against it.

use std::path::{Path, PathBuf};

use xcp_engine::EngineError;

#[cfg(unix)]
fn resolve_home_dir(user_name: &str) -> Option<PathBuf> {
    if user_name.is_empty() {
        return std::env::var_os("HOME").map(PathBuf::from);
    }

    let c_user = std::ffi::CString::new(user_name).ok()?;
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut buf = vec![0i8; 16 * 1024];
    let mut result: *mut libc::passwd = std::ptr::null_mut();
    let rc = unsafe {
        libc::getpwnam_r(
            c_user.as_ptr(),
            &mut pwd,
            buf.as_mut_ptr(),
            buf.len(),
            &mut result,
        )
    };
    if rc != 0 || result.is_null() || pwd.pw_dir.is_null() {
        return None;
    }
    let home = unsafe { std::ffi::CStr::from_ptr(pwd.pw_dir) }
        .to_string_lossy()
        .into_owned();
    Some(PathBuf::from(home))
}

#[cfg(not(unix))]
fn resolve_home_dir(_user_name: &str) -> Option<PathBuf> {
    None
}

/// Resolves `server_path` against `user_name`'s home directory when it is
/// relative, supporting a leading `~`, `~/`, or `~\` prefix. An absolute
/// path is returned unchanged without consulting the user database at all.
pub fn resolve_server_path(server_path: &str, user_name: &str) -> Result<PathBuf, EngineError> {
    let path = Path::new(server_path);
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }

    let home = resolve_home_dir(user_name).ok_or_else(|| {
        EngineError::invalid_argument(format!(
            "cannot resolve home directory for user {user_name:?}"
        ))
    })?;
    if !home.is_dir() {
        return Err(EngineError::invalid_argument(format!(
            "home directory {} is not a directory",
            home.display()
        )));
    }

    let stripped = server_path
        .strip_prefix("~/")
        .or_else(|| server_path.strip_prefix("~\\"))
        .unwrap_or_else(|| server_path.strip_prefix('~').unwrap_or(server_path));
    Ok(home.join(stripped))
}
