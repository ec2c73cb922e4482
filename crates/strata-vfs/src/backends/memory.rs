//! In-memory filesystem backend.
//!
//! Memory sources are virtual: their paths are slash-separated keys with no
//! leading `/`, and the empty key is the root. The data lives in a
//! [`MemoryStore`] that several backends may share, so reconstructing a
//! backend (for instance on a config reload) does not lose its contents.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::{VfsError, VfsResult};
use crate::ops::SyncFs;
use crate::types::EntryInfo;

/// Entry in the memory filesystem.
#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8>, mtime: SystemTime },
    Directory { mtime: SystemTime },
}

impl Entry {
    fn directory() -> Self {
        Entry::Directory {
            mtime: SystemTime::now(),
        }
    }

    fn info(&self, name: &str) -> EntryInfo {
        match self {
            Entry::File { data, mtime } => {
                EntryInfo::file(name, data.len() as u64).with_mtime(*mtime)
            }
            Entry::Directory { mtime } => EntryInfo::directory(name).with_mtime(*mtime),
        }
    }
}

/// Shared storage behind one or more [`MemoryBackend`]s.
#[derive(Debug)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store holding only the root directory.
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        // Root directory always exists
        entries.insert(String::new(), Entry::directory());
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Number of entries, root included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if only the root exists.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }
}

/// In-memory filesystem backend.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    store: Arc<MemoryStore>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a backend over a fresh, private store.
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    /// Create a backend over an existing store.
    pub fn with_store(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    /// Normalize a path: drop leading `/`, resolve `.` and `..`.
    ///
    /// A `..` at the root is an error rather than silently ignored.
    pub fn normalize(path: &str) -> VfsResult<String> {
        let mut parts: Vec<&str> = Vec::new();
        for component in path.split('/') {
            match component {
                "" | "." => {}
                ".." => {
                    if parts.pop().is_none() {
                        return Err(VfsError::path_escapes_root(path));
                    }
                }
                name => parts.push(name),
            }
        }
        Ok(parts.join("/"))
    }

    fn parent_of(path: &str) -> &str {
        path.rfind('/').map(|i| &path[..i]).unwrap_or("")
    }

    fn is_under(candidate: &str, dir: &str) -> bool {
        if dir.is_empty() {
            return !candidate.is_empty();
        }
        candidate.len() > dir.len()
            && candidate.starts_with(dir)
            && candidate.as_bytes()[dir.len()] == b'/'
    }

    /// Ensure all parent directories of `path` exist.
    fn ensure_parents(entries: &mut BTreeMap<String, Entry>, path: &str) -> VfsResult<()> {
        let parent = Self::parent_of(path);
        if parent.is_empty() {
            return Ok(());
        }
        let mut current = String::new();
        for component in parent.split('/') {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(component);
            match entries.get(&current) {
                Some(Entry::Directory { .. }) => {}
                Some(Entry::File { .. }) => return Err(VfsError::not_a_directory(current)),
                None => {
                    entries.insert(current.clone(), Entry::directory());
                }
            }
        }
        Ok(())
    }

    /// Keys of everything strictly below `dir`.
    fn descendants(entries: &BTreeMap<String, Entry>, dir: &str) -> Vec<String> {
        entries
            .keys()
            .filter(|k| Self::is_under(k, dir))
            .cloned()
            .collect()
    }

    fn rebase(child: &str, from: &str, to: &str) -> String {
        let relative = child[from.len()..].trim_start_matches('/');
        if to.is_empty() {
            relative.to_string()
        } else if relative.is_empty() {
            to.to_string()
        } else {
            format!("{to}/{relative}")
        }
    }
}

impl SyncFs for MemoryBackend {
    fn info(&self, path: &str) -> VfsResult<EntryInfo> {
        let normalized = Self::normalize(path)?;
        let entries = self.store.entries.read();
        entries
            .get(&normalized)
            .map(|e| e.info(&normalized))
            .ok_or_else(|| VfsError::not_found(normalized.clone()))
    }

    fn ls(&self, path: &str) -> VfsResult<Vec<EntryInfo>> {
        let normalized = Self::normalize(path)?;
        let entries = self.store.entries.read();

        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => {}
            Some(Entry::File { .. }) => return Err(VfsError::not_a_directory(normalized)),
            None => return Err(VfsError::not_found(normalized)),
        }

        // BTreeMap iteration is ordered, so the listing comes out sorted.
        Ok(entries
            .iter()
            .filter(|(key, _)| Self::is_under(key, &normalized))
            .filter(|(key, _)| Self::parent_of(key) == normalized)
            .map(|(key, entry)| entry.info(key))
            .collect())
    }

    fn cat(&self, path: &str) -> VfsResult<Vec<u8>> {
        let normalized = Self::normalize(path)?;
        let entries = self.store.entries.read();
        match entries.get(&normalized) {
            Some(Entry::File { data, .. }) => Ok(data.clone()),
            Some(Entry::Directory { .. }) => Err(VfsError::is_a_directory(normalized)),
            None => Err(VfsError::not_found(normalized)),
        }
    }

    fn pipe(&self, path: &str, data: &[u8]) -> VfsResult<()> {
        let normalized = Self::normalize(path)?;
        if normalized.is_empty() {
            return Err(VfsError::is_a_directory("/"));
        }
        let mut entries = self.store.entries.write();
        if let Some(Entry::Directory { .. }) = entries.get(&normalized) {
            return Err(VfsError::is_a_directory(normalized));
        }
        Self::ensure_parents(&mut entries, &normalized)?;
        entries.insert(
            normalized,
            Entry::File {
                data: data.to_vec(),
                mtime: SystemTime::now(),
            },
        );
        Ok(())
    }

    fn touch(&self, path: &str) -> VfsResult<()> {
        let normalized = Self::normalize(path)?;
        let mut entries = self.store.entries.write();
        match entries.get(&normalized) {
            Some(Entry::File { .. }) => Ok(()),
            Some(Entry::Directory { .. }) => Err(VfsError::is_a_directory(normalized)),
            None => {
                Self::ensure_parents(&mut entries, &normalized)?;
                entries.insert(
                    normalized,
                    Entry::File {
                        data: Vec::new(),
                        mtime: SystemTime::now(),
                    },
                );
                Ok(())
            }
        }
    }

    fn mkdir(&self, path: &str, exist_ok: bool) -> VfsResult<()> {
        let normalized = Self::normalize(path)?;
        let mut entries = self.store.entries.write();

        if let Some(existing) = entries.get(&normalized) {
            return match existing {
                Entry::Directory { .. } if exist_ok => Ok(()),
                _ => Err(VfsError::already_exists(normalized)),
            };
        }

        Self::ensure_parents(&mut entries, &normalized)?;
        entries.insert(normalized, Entry::directory());
        Ok(())
    }

    fn rm(&self, path: &str, recursive: bool) -> VfsResult<()> {
        let normalized = Self::normalize(path)?;
        if normalized.is_empty() {
            return Err(VfsError::permission_denied("cannot remove root"));
        }

        let mut entries = self.store.entries.write();
        match entries.get(&normalized) {
            Some(Entry::File { .. }) => {
                entries.remove(&normalized);
                Ok(())
            }
            Some(Entry::Directory { .. }) => {
                let children = Self::descendants(&entries, &normalized);
                if !children.is_empty() && !recursive {
                    return Err(VfsError::directory_not_empty(normalized));
                }
                for child in children {
                    entries.remove(&child);
                }
                entries.remove(&normalized);
                Ok(())
            }
            None => Err(VfsError::not_found(normalized)),
        }
    }

    fn mv(&self, from: &str, to: &str) -> VfsResult<()> {
        let from_normalized = Self::normalize(from)?;
        let to_normalized = Self::normalize(to)?;
        if from_normalized.is_empty() {
            return Err(VfsError::permission_denied("cannot move root"));
        }
        if from_normalized == to_normalized {
            return Ok(());
        }
        if Self::is_under(&to_normalized, &from_normalized) {
            return Err(VfsError::invalid_path(format!(
                "cannot move {from_normalized} into itself"
            )));
        }

        let mut entries = self.store.entries.write();
        let entry = entries
            .remove(&from_normalized)
            .ok_or_else(|| VfsError::not_found(from_normalized.clone()))?;

        if let Err(e) = Self::ensure_parents(&mut entries, &to_normalized) {
            entries.insert(from_normalized, entry);
            return Err(e);
        }

        // If it's a directory, move all children too
        if matches!(entry, Entry::Directory { .. }) {
            for child in Self::descendants(&entries, &from_normalized) {
                if let Some(child_entry) = entries.remove(&child) {
                    let new_path = Self::rebase(&child, &from_normalized, &to_normalized);
                    entries.insert(new_path, child_entry);
                }
            }
        }

        // Insert at new location (possibly overwriting)
        entries.insert(to_normalized, entry);
        Ok(())
    }

    fn copy(&self, from: &str, to: &str) -> VfsResult<()> {
        let from_normalized = Self::normalize(from)?;
        let to_normalized = Self::normalize(to)?;
        if Self::is_under(&to_normalized, &from_normalized) {
            return Err(VfsError::invalid_path(format!(
                "cannot copy {from_normalized} into itself"
            )));
        }

        let mut entries = self.store.entries.write();
        let entry = entries
            .get(&from_normalized)
            .cloned()
            .ok_or_else(|| VfsError::not_found(from_normalized.clone()))?;

        Self::ensure_parents(&mut entries, &to_normalized)?;

        if matches!(entry, Entry::Directory { .. }) {
            let copies: Vec<(String, Entry)> = Self::descendants(&entries, &from_normalized)
                .into_iter()
                .filter_map(|child| {
                    let copied = entries.get(&child)?.clone();
                    Some((Self::rebase(&child, &from_normalized, &to_normalized), copied))
                })
                .collect();
            entries.extend(copies);
        }

        entries.insert(to_normalized, entry);
        Ok(())
    }

    fn read_only(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_and_cat() {
        let fs = MemoryBackend::new();
        fs.pipe("test.txt", b"hello world").unwrap();
        assert_eq!(fs.cat("test.txt").unwrap(), b"hello world");
        assert_eq!(fs.cat_range("test.txt", 6, Some(11)).unwrap(), b"world");
    }

    #[test]
    fn test_mkdir_and_ls() {
        let fs = MemoryBackend::new();
        fs.mkdir("m/subdir", false).unwrap();
        fs.pipe("m/subdir/file.txt", b"x").unwrap();
        fs.pipe("m/root.txt", b"yy").unwrap();

        let names: Vec<_> = fs.ls("m").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["m/root.txt", "m/subdir"]);

        let sub = fs.ls("m/subdir").unwrap();
        assert_eq!(sub.len(), 1);
        assert_eq!(sub[0].name, "m/subdir/file.txt");
        assert_eq!(sub[0].size, 1);
    }

    #[test]
    fn test_ls_root_and_errors() {
        let fs = MemoryBackend::new();
        fs.pipe("a.txt", b"").unwrap();
        fs.mkdir("b", false).unwrap();

        let names: Vec<_> = fs.ls("").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a.txt", "b"]);

        assert!(matches!(fs.ls("a.txt"), Err(VfsError::NotADirectory(_))));
        assert!(matches!(fs.ls("nope"), Err(VfsError::NotFound(_))));
    }

    #[test]
    fn test_mkdir_exist_ok() {
        let fs = MemoryBackend::new();
        fs.mkdir("dir", false).unwrap();
        fs.mkdir("dir", true).unwrap();
        assert!(matches!(
            fs.mkdir("dir", false),
            Err(VfsError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_touch_keeps_content() {
        let fs = MemoryBackend::new();
        fs.touch("a/b.txt").unwrap();
        assert!(fs.isdir("a"));
        assert!(fs.cat("a/b.txt").unwrap().is_empty());

        fs.pipe("a/b.txt", b"data").unwrap();
        fs.touch("a/b.txt").unwrap();
        assert_eq!(fs.cat("a/b.txt").unwrap(), b"data");
    }

    #[test]
    fn test_rm_recursive() {
        let fs = MemoryBackend::new();
        fs.pipe("dir/a.txt", b"a").unwrap();
        fs.pipe("dir/sub/b.txt", b"b").unwrap();
        fs.pipe("dirty.txt", b"keep").unwrap();

        assert!(matches!(
            fs.rm("dir", false),
            Err(VfsError::DirectoryNotEmpty(_))
        ));
        fs.rm("dir", true).unwrap();
        assert!(!fs.exists("dir"));
        assert!(!fs.exists("dir/sub/b.txt"));
        // Sibling sharing the name prefix survives
        assert!(fs.exists("dirty.txt"));
    }

    #[test]
    fn test_rm_root_denied() {
        let fs = MemoryBackend::new();
        assert!(matches!(fs.rm("/", true), Err(VfsError::PermissionDenied(_))));
    }

    #[test]
    fn test_mv_directory() {
        let fs = MemoryBackend::new();
        fs.pipe("old/a.txt", b"content").unwrap();
        fs.pipe("old/nested/b.txt", b"more").unwrap();

        fs.mv("old", "new/place").unwrap();

        assert!(!fs.exists("old"));
        assert_eq!(fs.cat("new/place/a.txt").unwrap(), b"content");
        assert_eq!(fs.cat("new/place/nested/b.txt").unwrap(), b"more");
    }

    #[test]
    fn test_mv_into_itself_rejected() {
        let fs = MemoryBackend::new();
        fs.mkdir("a", false).unwrap();
        assert!(matches!(fs.mv("a", "a/b"), Err(VfsError::InvalidPath(_))));
        assert!(fs.isdir("a"));
    }

    #[test]
    fn test_copy_tree() {
        let fs = MemoryBackend::new();
        fs.pipe("src/a.txt", b"a").unwrap();
        fs.pipe("src/sub/b.txt", b"b").unwrap();

        fs.copy("src", "dst").unwrap();

        assert_eq!(fs.cat("src/a.txt").unwrap(), b"a");
        assert_eq!(fs.cat("dst/a.txt").unwrap(), b"a");
        assert_eq!(fs.cat("dst/sub/b.txt").unwrap(), b"b");
    }

    #[test]
    fn test_shared_store() {
        let store = Arc::new(MemoryStore::new());
        let first = MemoryBackend::with_store(Arc::clone(&store));
        let second = MemoryBackend::with_store(Arc::clone(&store));

        first.pipe("shared/x.txt", b"seen by both").unwrap();
        assert_eq!(second.cat("shared/x.txt").unwrap(), b"seen by both");
        assert!(!store.is_empty());
    }

    #[test]
    fn test_path_normalization() {
        let fs = MemoryBackend::new();
        fs.pipe("/a/b/c.txt", b"").unwrap();

        assert!(fs.exists("a/b/c.txt"));
        assert!(fs.exists("/a/b/c.txt"));
        assert!(fs.exists("a/./b/c.txt"));
        assert!(fs.exists("a/b/../b/c.txt"));
        assert!(matches!(
            MemoryBackend::normalize("../etc"),
            Err(VfsError::PathEscapesRoot(_))
        ));
    }

    #[test]
    fn test_file_as_parent_rejected() {
        let fs = MemoryBackend::new();
        fs.pipe("file", b"").unwrap();
        assert!(matches!(
            fs.pipe("file/child", b""),
            Err(VfsError::NotADirectory(_))
        ));
    }
}
