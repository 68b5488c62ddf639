/// Reparse-point detection.
///
/// On Windows a junction, symlink or other reparse point carries
/// `FILE_ATTRIBUTE_REPARSE_POINT`; elsewhere only symbolic links exist.
use std::fs::Metadata;

/// `true` if the (non-followed) metadata describes a reparse point.
///
/// `meta` must come from `symlink_metadata` so links are not resolved.
#[cfg(windows)]
pub fn is_reparse_point(meta: &Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    use windows::Win32::Storage::FileSystem::FILE_ATTRIBUTE_REPARSE_POINT;

    meta.file_type().is_symlink() || meta.file_attributes() & FILE_ATTRIBUTE_REPARSE_POINT.0 != 0
}

/// `true` if the (non-followed) metadata describes a symbolic link.
#[cfg(not(windows))]
pub fn is_reparse_point(meta: &Metadata) -> bool {
    meta.file_type().is_symlink()
}
