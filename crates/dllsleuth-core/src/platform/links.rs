/// File symbolic links.
///
/// Windows distinguishes file and directory links; the consolidator only
/// ever links files, so the file variant is used there.
use std::io;
use std::path::Path;

/// Create a symbolic link at `link` pointing at the file `target`.
#[cfg(windows)]
pub fn symlink_file(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

/// Create a symbolic link at `link` pointing at the file `target`.
#[cfg(unix)]
pub fn symlink_file(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(any(windows, unix)))]
pub fn symlink_file(_target: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symbolic links are not supported on this platform",
    ))
}
