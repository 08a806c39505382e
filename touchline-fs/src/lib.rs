//! Capability-based filesystem helpers shared by Touchline crates.
//!
//! Paths are UTF-8 (`camino`) and every operation goes through a `cap-std`
//! directory handle opened from the path's parent.
#![forbid(unsafe_code)]

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};
use std::io::{self, Write};
use std::path::Component;

/// Open the parent directory of `path` and return it with the file name.
pub fn open_dir_and_file(path: &Utf8Path) -> io::Result<(fs_utf8::Dir, String)> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::other(format!("{path} does not name a file")))?
        .to_owned();
    let dir = fs_utf8::Dir::open_ambient_dir(parent, ambient_authority())?;
    Ok((dir, file_name))
}

/// Create every missing directory above `path`.
pub fn ensure_parent_dir(path: &Utf8Path) -> io::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_str().is_empty() || parent == Utf8Path::new("/") {
        return Ok(());
    }

    let (base_dir, relative) = base_dir_and_relative(parent)?;
    if relative.as_str().is_empty() {
        return Ok(());
    }
    base_dir.create_dir_all(&relative)
}

/// Read `path` as UTF-8, returning `None` when it or its directory is absent.
pub fn read_if_exists(path: &Utf8Path) -> io::Result<Option<String>> {
    let (dir, name) = match open_dir_and_file(path) {
        Ok(found) => found,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    match dir.read_to_string(&name) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Replace `path` with `contents` in a single rename.
///
/// The bytes are written to a hidden sibling file and flushed to disk
/// before being renamed over the target, so readers observe either the old
/// or the new contents and never a partial write. The directory is synced
/// after the rename so the new entry survives a power loss.
pub fn write_atomic(path: &Utf8Path, contents: &[u8]) -> io::Result<()> {
    ensure_parent_dir(path)?;
    let (dir, name) = open_dir_and_file(path)?;
    let staging = format!(".{name}.tmp");

    let written = dir.create(&staging).and_then(|mut file| {
        file.write_all(contents)?;
        file.sync_all()
    });
    if let Err(err) = written.and_then(|()| dir.rename(&staging, &dir, &name)) {
        // Best effort: a stale staging file is overwritten on the next save.
        dir.remove_file(&staging).ok();
        return Err(err);
    }
    sync_dir(&dir)
}

/// Flush `dir`'s entries to disk.
#[cfg(unix)]
pub fn sync_dir(dir: &fs_utf8::Dir) -> io::Result<()> {
    dir.open(".")?.sync_all()
}

/// No-op where directory handles cannot be synced.
#[cfg(not(unix))]
pub fn sync_dir(_dir: &fs_utf8::Dir) -> io::Result<()> {
    Ok(())
}

/// Split `parent` into an ambient base directory and the path below it.
///
/// Absolute paths are anchored at the filesystem root (or drive prefix on
/// Windows); relative paths at the current directory.
pub fn base_dir_and_relative(parent: &Utf8Path) -> io::Result<(fs_utf8::Dir, Utf8PathBuf)> {
    let std_parent = parent.as_std_path();

    let (base, relative) = match std_parent.components().next() {
        Some(Component::Prefix(prefix)) => {
            let prefix_str = prefix
                .as_os_str()
                .to_str()
                .ok_or_else(|| io::Error::other("non-UTF-8 path prefix"))?;
            let base = Utf8PathBuf::from(prefix_str).join(std::path::MAIN_SEPARATOR.to_string());
            let relative = std_parent
                .strip_prefix(base.as_std_path())
                .or_else(|_| std_parent.strip_prefix(prefix.as_os_str()))
                .map_err(|_| io::Error::other("failed to strip prefix from parent path"))?
                .to_path_buf();
            (base, relative)
        }
        Some(Component::RootDir) => {
            let base = Utf8PathBuf::from(std::path::MAIN_SEPARATOR.to_string());
            let relative = std_parent
                .strip_prefix(base.as_std_path())
                .map_err(|_| io::Error::other("failed to strip root from absolute path"))?
                .to_path_buf();
            (base, relative)
        }
        _ => (Utf8PathBuf::from("."), std_parent.to_path_buf()),
    };

    let dir = fs_utf8::Dir::open_ambient_dir(&base, ambient_authority())?;
    let relative = Utf8PathBuf::from_path_buf(relative)
        .map_err(|_| io::Error::other("non-UTF-8 parent path"))?;

    Ok((dir, relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn workspace() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().expect("create temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
        (dir, root)
    }

    #[rstest]
    fn write_atomic_creates_parents_and_replaces(workspace: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = workspace;
        let target = root.join("state/nested/cursor.json");

        write_atomic(&target, b"first").expect("first write");
        write_atomic(&target, b"second").expect("second write");

        let contents = read_if_exists(&target).expect("read back");
        assert_eq!(contents.as_deref(), Some("second"));
        assert!(
            !root.join("state/nested/.cursor.json.tmp").exists(),
            "staging file should be renamed away"
        );
    }

    #[rstest]
    fn sync_dir_flushes_an_open_directory(workspace: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = workspace;
        let target = root.join("cursor.json");
        write_atomic(&target, b"saved").expect("write");
        let (dir, _) = open_dir_and_file(&target).expect("open parent");
        sync_dir(&dir).expect("sync directory");
        assert_eq!(
            read_if_exists(&target).expect("read back").as_deref(),
            Some("saved")
        );
    }

    #[rstest]
    fn read_if_exists_tolerates_missing_directories(workspace: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = workspace;
        let missing = root.join("absent/cursor.json");
        assert_eq!(read_if_exists(&missing).expect("read"), None);
    }
}
