/// Platform-specific functionality — symbolic-link creation, reparse-point
/// detection and permission-error classification.

pub mod links;
pub mod reparse;

pub use links::symlink_file;
pub use reparse::is_reparse_point;

use std::io;

/// `true` when an I/O error is a permission failure.
///
/// Windows reports read-only or in-use DLLs as `PermissionDenied` as well,
/// so this one check covers both platforms.
pub fn is_access_denied(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::PermissionDenied
}
