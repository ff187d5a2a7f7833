//! User and group resolution for created files

use crate::error::FsqError;
use std::ffi::CString;
use std::fs::File;
use std::path::Path;

/// Resolved owner for chown; `None` leaves that id unchanged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Owner {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

impl Owner {
    /// Resolve optional user and group specs, each a name or numeric id
    pub fn resolve(user: Option<&str>, group: Option<&str>) -> Result<Self, FsqError> {
        Ok(Self {
            uid: user.map(resolve_user).transpose()?,
            gid: group.map(resolve_group).transpose()?,
        })
    }

    pub fn is_unchanged(&self) -> bool {
        self.uid.is_none() && self.gid.is_none()
    }

    /// chown an open file
    pub fn apply_file(&self, file: &File) -> std::io::Result<()> {
        if self.is_unchanged() {
            return Ok(());
        }
        std::os::unix::fs::fchown(file, self.uid, self.gid)
    }

    /// chown a path without following a final symlink
    pub fn apply_path(&self, path: &Path) -> std::io::Result<()> {
        if self.is_unchanged() {
            return Ok(());
        }
        std::os::unix::fs::lchown(path, self.uid, self.gid)
    }
}

fn coerce_err(what: &'static str, value: &str) -> FsqError {
    FsqError::Coerce {
        what,
        value: value.to_string(),
    }
}

// Scratch buffer for getpw*_r/getgr*_r; grown on ERANGE
const LOOKUP_BUF_START: usize = 1024;
const LOOKUP_BUF_MAX: usize = 1 << 20;

fn resolve_user(spec: &str) -> Result<u32, FsqError> {
    if let Ok(uid) = spec.parse::<u32>() {
        return Ok(uid);
    }
    let name = CString::new(spec).map_err(|_| coerce_err("user", spec))?;
    let mut buf = vec![0 as libc::c_char; LOOKUP_BUF_START];
    loop {
        let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        let rc = unsafe {
            libc::getpwnam_r(name.as_ptr(), &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result)
        };
        if rc == libc::ERANGE && buf.len() < LOOKUP_BUF_MAX {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 || result.is_null() {
            return Err(coerce_err("user", spec));
        }
        return Ok(pwd.pw_uid);
    }
}

fn resolve_group(spec: &str) -> Result<u32, FsqError> {
    if let Ok(gid) = spec.parse::<u32>() {
        return Ok(gid);
    }
    let name = CString::new(spec).map_err(|_| coerce_err("group", spec))?;
    let mut buf = vec![0 as libc::c_char; LOOKUP_BUF_START];
    loop {
        let mut grp: libc::group = unsafe { std::mem::zeroed() };
        let mut result: *mut libc::group = std::ptr::null_mut();
        let rc = unsafe {
            libc::getgrnam_r(name.as_ptr(), &mut grp, buf.as_mut_ptr(), buf.len(), &mut result)
        };
        if rc == libc::ERANGE && buf.len() < LOOKUP_BUF_MAX {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 || result.is_null() {
            return Err(coerce_err("group", spec));
        }
        return Ok(grp.gr_gid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_ids_pass_through() {
        let owner = Owner::resolve(Some("1234"), Some("99")).unwrap();
        assert_eq!(owner.uid, Some(1234));
        assert_eq!(owner.gid, Some(99));
    }

    #[test]
    fn test_root_name_resolves() {
        let owner = Owner::resolve(Some("root"), None).unwrap();
        assert_eq!(owner.uid, Some(0));
        assert_eq!(owner.gid, None);
    }

    #[test]
    fn test_unknown_user_is_coerce_error() {
        let err = Owner::resolve(Some("no-such-user-fsq-test"), None).unwrap_err();
        assert!(matches!(err, FsqError::Coerce { what: "user", .. }));
        let err = Owner::resolve(None, Some("no\0group")).unwrap_err();
        assert!(matches!(err, FsqError::Coerce { what: "group", .. }));
    }

    #[test]
    fn test_default_owner_is_noop() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("f");
        let file = File::create(&path).unwrap();
        Owner::default().apply_file(&file).unwrap();
        Owner::default().apply_path(&path).unwrap();
    }
}
