/*
 * Copyright (c) 2026 Jonathan Perkin <jonathan@perkin.org.uk>
 *
 * Permission to use, copy, modify, and distribute this software for any
 * purpose with or without fee is hereby granted, provided that the above
 * copyright notice and this permission notice appear in all copies.
 *
 * THE SOFTWARE IS PROVIDED "AS IS" AND THE AUTHOR DISCLAIMS ALL WARRANTIES
 * WITH REGARD TO THIS SOFTWARE INCLUDING ALL IMPLIED WARRANTIES OF
 * MERCHANTABILITY AND FITNESS. IN NO EVENT SHALL THE AUTHOR BE LIABLE FOR
 * ANY SPECIAL, DIRECT, INDIRECT, OR CONSEQUENTIAL DAMAGES OR ANY DAMAGES
 * WHATSOEVER RESULTING FROM LOSS OF USE, DATA OR PROFITS, WHETHER IN AN
 * ACTION OF CONTRACT, NEGLIGENCE OR OTHER TORTIOUS ACTION, ARISING OUT OF
 * OR IN CONNECTION WITH THE USE OR PERFORMANCE OF THIS SOFTWARE.
 */

/*!
 * Storage backends that packages are written to.
 *
 * Paths handed to a [`Storage`] are `/`-separated keys relative to the
 * backend's root.  Keys that could escape the root (absolute paths, `..`
 * components or backslashes) are rejected with
 * [`std::io::ErrorKind::InvalidInput`].
 */

use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};

/**
 * A place to write package files to.
 */
pub trait Storage {
    /**
     * Whether anything exists at `path`.
     */
    fn exists(&self, path: &str) -> bool;

    /**
     * Create the directory `path`, including any missing parents when
     * `recursive` is set.  Creating a directory that already exists is not
     * an error.
     */
    fn make_dir(&self, path: &str, recursive: bool) -> io::Result<()>;

    /**
     * Open `path` for writing, truncating any existing file.  The parent
     * directory must already exist.
     */
    fn create(&self, path: &str) -> io::Result<Box<dyn Write + '_>>;

    /**
     * Open `path` for reading.
     */
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>>;

    /**
     * A stable locator for `path` that is meaningful outside this process,
     * recorded as the `path` of each manifest entry.
     */
    fn locator(&self, path: &str) -> String;

    /**
     * Remove the directory `path`, and everything below it when
     * `recursive` is set.
     */
    fn remove_dir(&self, path: &str, recursive: bool) -> io::Result<()>;

    /**
     * Remove the file `path`.  Removing a file that does not exist is not
     * an error.
     */
    fn remove_file(&self, path: &str) -> io::Result<()>;

    /**
     * Every file below the directory `path`, as sorted keys relative to it.
     * A directory that does not exist holds no files.
     */
    fn list_files(&self, path: &str) -> io::Result<Vec<String>>;
}

/**
 * Join a storage key onto a base key.
 */
pub fn join(base: &str, rel: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        rel.to_string()
    } else if rel.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{rel}")
    }
}

/**
 * The parent key of `path`, or `None` if it has no directory component.
 */
pub fn parent(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(dir, _)| dir).filter(|d| !d.is_empty())
}

/**
 * [`Storage`] on the local filesystem, rooted at a directory.
 */
#[derive(Clone, Debug)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /**
     * Create a backend rooted at `root`, creating the directory if needed.
     */
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        fs::create_dir_all(root.as_ref())?;
        let root = fs::canonicalize(root.as_ref())?;
        Ok(LocalStorage { root })
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn validate_key(key: &str) -> io::Result<()> {
        let unsafe_key = |why: &str| {
            Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsafe storage key ({why}): '{key}'"),
            ))
        };
        if key.starts_with('/') {
            return unsafe_key("absolute path");
        }
        if key.contains('\\') {
            return unsafe_key("backslash");
        }
        if Path::new(key)
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return unsafe_key("parent traversal");
        }
        Ok(())
    }

    /**
     * Resolve a key to a filesystem path under the root.  The empty key is
     * the root itself.
     */
    pub fn path(&self, key: &str) -> io::Result<PathBuf> {
        Self::validate_key(key)?;
        Ok(self.root.join(key))
    }
}

impl Storage for LocalStorage {
    fn exists(&self, path: &str) -> bool {
        self.path(path).map(|p| p.exists()).unwrap_or(false)
    }

    fn make_dir(&self, path: &str, recursive: bool) -> io::Result<()> {
        let dir = self.path(path)?;
        if recursive {
            fs::create_dir_all(&dir)
        } else {
            match fs::create_dir(&dir) {
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => {
                    Ok(())
                }
                other => other,
            }
        }
    }

    fn create(&self, path: &str) -> io::Result<Box<dyn Write + '_>> {
        let file = fs::File::create(self.path(path)?)?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(fs::File::open(self.path(path)?)?))
    }

    fn locator(&self, path: &str) -> String {
        self.root.join(path).display().to_string()
    }

    fn remove_dir(&self, path: &str, recursive: bool) -> io::Result<()> {
        let dir = self.path(path)?;
        if recursive {
            fs::remove_dir_all(dir)
        } else {
            fs::remove_dir(dir)
        }
    }

    fn remove_file(&self, path: &str) -> io::Result<()> {
        match fs::remove_file(self.path(path)?) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn list_files(&self, path: &str) -> io::Result<Vec<String>> {
        fn walk(dir: &Path, prefix: &str, out: &mut Vec<String>) -> io::Result<()> {
            for entry in fs::read_dir(dir)? {
                let entry = entry?;
                let name = entry.file_name();
                let key = join(prefix, &name.to_string_lossy());
                if entry.file_type()?.is_dir() {
                    walk(&entry.path(), &key, out)?;
                } else {
                    out.push(key);
                }
            }
            Ok(())
        }

        let dir = self.path(path)?;
        let mut files = Vec::new();
        if dir.is_dir() {
            walk(&dir, "", &mut files)?;
        }
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_keys() {
        assert_eq!(join("archive", "ab/cd"), "archive/ab/cd");
        assert_eq!(join("archive/", "x"), "archive/x");
        assert_eq!(join("", "x"), "x");
        assert_eq!(join("a", ""), "a");
        assert_eq!(parent("a/b/c.txt"), Some("a/b"));
        assert_eq!(parent("c.txt"), None);
    }

    #[test]
    fn unsafe_keys() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = LocalStorage::new(dir.path())?;
        for key in ["/etc/passwd", "../x", "a/../../x", "a\\b"] {
            let err = storage.create(key).err().map(|e| e.kind());
            assert_eq!(err, Some(io::ErrorKind::InvalidInput), "key {key}");
        }
        assert!(!storage.exists("../x"));
        Ok(())
    }

    #[test]
    fn write_and_read() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = LocalStorage::new(dir.path().join("root"))?;
        storage.make_dir("a/b", true)?;
        storage.make_dir("a/b", false)?;
        assert!(storage.make_dir("x/y", false).is_err());
        {
            let mut w = storage.create("a/b/file.txt")?;
            w.write_all(b"test")?;
            w.flush()?;
        }
        let mut s = String::new();
        storage.open("a/b/file.txt")?.read_to_string(&mut s)?;
        assert_eq!(s, "test");
        assert!(storage.exists("a/b/file.txt"));
        assert!(storage.locator("a/b/file.txt").ends_with("a/b/file.txt"));
        storage.create("a/c.txt")?.flush()?;
        assert_eq!(storage.list_files("a")?, ["b/file.txt", "c.txt"]);
        assert!(storage.list_files("missing")?.is_empty());
        storage.remove_file("a/c.txt")?;
        storage.remove_file("a/c.txt")?;
        assert_eq!(storage.list_files("")?, ["a/b/file.txt"]);
        assert!(storage.remove_dir("a", false).is_err());
        storage.remove_dir("a", true)?;
        assert!(!storage.exists("a"));
        Ok(())
    }
}
