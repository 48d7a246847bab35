//! Argv/envp marshalling.
//!
//! `execve` wants null-terminated strings gathered in a null-terminated
//! vector. `CString` supplies the terminator and `nix` supplies the sentinel,
//! so the only real work is rejecting interior NUL bytes and making sure the
//! storage is allocated *before* `fork`, since the child branch must not
//! touch the allocator.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use tm_common::{Error, Result};

/// Converts a single string into a `CString`, rejecting interior NULs.
///
/// `what` names the field for error reporting ("command", "argv", ...).
pub fn to_cstring(what: &'static str, value: &str) -> Result<CString> {
    CString::new(value).map_err(|_| Error::nul_byte(what, value))
}

/// Converts a path into a `CString` through its raw bytes, so non-UTF-8
/// components survive the round trip.
pub fn path_to_cstring(what: &'static str, path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| Error::nul_byte(what, path.to_string_lossy()))
}

/// Converts a string vector into the `CString` vector `execve` consumes.
pub fn to_cstring_vec(what: &'static str, values: &[String]) -> Result<Vec<CString>> {
    values.iter().map(|v| to_cstring(what, v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_strings_convert() {
        let argv = to_cstring_vec("argv", &["ls".to_string(), "-l".to_string()]).unwrap();
        assert_eq!(argv.len(), 2);
        assert_eq!(argv[0].to_bytes(), b"ls");
    }

    #[test]
    fn interior_nul_is_rejected() {
        let err = to_cstring("command", "bad\0path").unwrap_err();
        assert!(matches!(err, Error::NulByte { what: "command", .. }));
    }

    #[test]
    fn nul_in_vector_names_the_field() {
        let err = to_cstring_vec("envp", &["KEY=a\0b".to_string()]).unwrap_err();
        assert!(matches!(err, Error::NulByte { what: "envp", .. }));
    }

    #[test]
    fn empty_vector_is_valid() {
        assert!(to_cstring_vec("envp", &[]).unwrap().is_empty());
    }
}
