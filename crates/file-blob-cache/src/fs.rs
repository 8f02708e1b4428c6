//! Filesystem helpers used on the disk queue

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use filetime::FileTime;
use tempfile::NamedTempFile;

use crate::types::CacheEntry;

/// Run `f`, turning a "no such file" error into `Ok(None)`
pub(crate) fn catch_not_found<F, R>(f: F) -> io::Result<Option<R>>
where
    F: FnOnce() -> io::Result<R>,
{
    match f() {
        Ok(x) => Ok(Some(x)),
        Err(e) => match e.kind() {
            io::ErrorKind::NotFound => Ok(None),
            _ => Err(e),
        },
    }
}

/// Size of the file at `path`, `None` if there is no such file
pub(crate) fn file_size(path: &Path) -> io::Result<Option<u64>> {
    catch_not_found(|| fs::metadata(path).map(|m| m.len()))
}

/// Write `data` to `path` through a temporary file in `dir`, so readers never
/// observe a partially written file
pub(crate) fn write_atomic(dir: &Path, path: &Path, data: &[u8]) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let mut temp_file = NamedTempFile::new_in(dir)?;
    temp_file.write_all(data)?;
    temp_file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Set the modification time of `path` to now
pub(crate) fn touch(path: &Path) -> io::Result<()> {
    filetime::set_file_mtime(path, FileTime::now())
}

/// List the regular files in `dir`, oldest modification first
pub(crate) fn list_entries(dir: &Path) -> io::Result<Vec<CacheEntry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let metadata = match catch_not_found(|| entry.metadata())? {
            Some(metadata) => metadata,
            None => continue,
        };
        if !metadata.is_file() {
            continue;
        }
        let modified: DateTime<Utc> = metadata.modified()?.into();
        entries.push(CacheEntry {
            path: entry.path(),
            size: metadata.len(),
            modified,
        });
    }
    entries.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
    Ok(entries)
}

/// Remove a file or a whole directory tree
pub(crate) fn remove_path(path: &Path) -> io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    #[test]
    fn test_catch_not_found() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(file_size(&missing).unwrap().is_none());

        fs::write(&missing, b"12345").unwrap();
        assert_eq!(file_size(&missing).unwrap(), Some(5));
    }

    #[test]
    fn test_write_atomic_replaces_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("entry");

        write_atomic(dir.path(), &path, b"first").unwrap();
        write_atomic(dir.path(), &path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
        // No temporary files left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_write_atomic_creates_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested");
        let path = nested.join("entry");

        write_atomic(&nested, &path, b"data").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"data");
    }

    #[test]
    fn test_list_entries_sorted_by_modification() {
        let dir = tempdir().unwrap();
        let now = SystemTime::now();
        for (name, age_secs) in [("new", 10), ("old", 300), ("mid", 60)] {
            let path = dir.path().join(name);
            fs::write(&path, name).unwrap();
            let mtime = FileTime::from_system_time(now - Duration::from_secs(age_secs));
            filetime::set_file_mtime(&path, mtime).unwrap();
        }
        fs::create_dir(dir.path().join("subdir")).unwrap();

        let entries = list_entries(dir.path()).unwrap();
        let names: Vec<_> = entries
            .iter()
            .map(|e| e.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["old", "mid", "new"]);
        assert_eq!(entries[0].size, 3);
    }

    #[test]
    fn test_touch_moves_entry_to_back() {
        let dir = tempdir().unwrap();
        let past = FileTime::from_system_time(SystemTime::now() - Duration::from_secs(120));
        for name in ["a", "b"] {
            let path = dir.path().join(name);
            fs::write(&path, name).unwrap();
            filetime::set_file_mtime(&path, past).unwrap();
        }

        touch(&dir.path().join("a")).unwrap();

        let entries = list_entries(dir.path()).unwrap();
        assert!(entries[0].path.ends_with("b"));
        assert!(entries[1].path.ends_with("a"));
    }

    #[test]
    fn test_remove_path_handles_files_and_directories() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("file");
        let sub = dir.path().join("sub");
        fs::write(&file, b"x").unwrap();
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("inner"), b"y").unwrap();

        remove_path(&file).unwrap();
        remove_path(&sub).unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
