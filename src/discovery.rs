//! Finding and opening event device nodes.
//!
//! ```no_run
//! use evdevkit::discovery;
//! use std::path::Path;
//!
//! for path in discovery::scan_device_nodes(Path::new("/dev/input"), |p| {
//!     p.file_name().is_some_and(|n| n.to_string_lossy().starts_with("event"))
//! })? {
//!     println!("{}", path.display());
//! }
//! # Ok::<(), std::io::Error>(())
//! ```

use std::fs::{self, OpenOptions};
use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

/// Whether `path` is a character device.
pub fn is_device_file(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|meta| meta.file_type().is_char_device())
}

/// Character devices in `dir` accepted by `filter`, sorted by path.
pub fn scan_device_nodes(dir: &Path, filter: impl Fn(&Path) -> bool) -> io::Result<Vec<PathBuf>> {
    let mut nodes = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        match entry.file_type() {
            Ok(file_type) if file_type.is_char_device() => {}
            Ok(_) => continue,
            Err(e) => {
                log::debug!("skipping {}: {}", path.display(), e);
                continue;
            }
        }
        if filter(&path) {
            nodes.push(path);
        }
    }
    nodes.sort();
    Ok(nodes)
}

/// Event nodes (`eventN`) under `dir`, sorted.
pub fn event_nodes(dir: &Path) -> io::Result<Vec<PathBuf>> {
    scan_device_nodes(dir, |path| {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("event"))
    })
}

/// Open a device node for [`Registry::bind`](crate::Registry::bind).
///
/// Tries read/write first so the device can be grabbed, then falls back to
/// read-only. The descriptor is non-blocking and close-on-exec.
pub fn open_device_node(path: &Path) -> io::Result<OwnedFd> {
    let flags = libc::O_NONBLOCK | libc::O_CLOEXEC;
    let file = match OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(flags)
        .open(path)
    {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            log::debug!("{} not writable, opening read-only", path.display());
            OpenOptions::new().read(true).custom_flags(flags).open(path)?
        }
        Err(e) => return Err(e),
    };
    Ok(OwnedFd::from(file))
}
