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
 * Write planned [`FileInfo`] entries into a package directory.
 *
 * Every entry is validated before anything is written, so a malformed plan
 * never leaves a half-written package behind.  Data files are hashed while
 * they are copied and the result is compared against the planned checksum.
 * Entries marked as fetched are skipped.
 *
 * After each file the progress callback is invoked, and may return
 * [`ControlFlow::Break`] to stop.  Files already written are left in
 * place.
 */

use std::io::{self, Read, Write};
use std::ops::ControlFlow;
use tracing::debug;

use crate::digest::{Digest, checksum_algorithm};
use crate::error::{Error, Result};
use crate::manifest::{Entry, FileInfo};
use crate::model::{ContentSource, Submission};
use crate::storage::{Storage, join, parent};

/**
 * Progress of a package write, passed to the progress callback after each
 * file.
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Progress<'a> {
    /// Number of files to be written.
    pub total_files: usize,
    /// Total bytes to be written.
    pub total_size: u64,
    /// Files written so far, including the current one.
    pub copied_files: usize,
    /// Bytes written so far, including the current file.
    pub copied_size: u64,
    /// Package-relative name of the file just written.
    pub current_filename: &'a str,
    /// Size of the file just written.
    pub current_filesize: u64,
}

/**
 * A progress callback.
 */
pub type ProgressFn<'a> = dyn FnMut(&Progress<'_>) -> ControlFlow<()> + 'a;

/**
 * A progress callback that never interrupts and ignores its input.
 */
pub fn no_progress(_: &Progress<'_>) -> ControlFlow<()> {
    ControlFlow::Continue(())
}

/*
 * Writer adaptor hashing everything that passes through it.
 */
struct HashingWriter<W> {
    inner: W,
    hasher: Box<dyn digest::DynDigest>,
    size: u64,
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.size += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

enum Source<'a> {
    Stream(Box<dyn Read + 'a>),
    Text(&'a str),
}

/**
 * Writes the files of one package.
 */
pub struct PackageWriter<'a> {
    storage: &'a dyn Storage,
    package_dir: String,
}

impl<'a> PackageWriter<'a> {
    /**
     * Create a writer for the package rooted at `package_dir`.
     */
    pub fn new(storage: &'a dyn Storage, package_dir: impl Into<String>) -> Self {
        PackageWriter {
            storage,
            package_dir: package_dir.into(),
        }
    }

    /**
     * Write every non-fetched entry of `files`, in order.  Data bytes come
     * from `content` and metadata from `sip`.  Returns the entries as
     * written, with size and checksum measured from what was actually
     * stored.
     */
    pub fn write_all(
        &self,
        sip: &Submission,
        content: &dyn ContentSource,
        files: &[FileInfo],
        progress: &mut ProgressFn<'_>,
    ) -> Result<Vec<FileInfo>> {
        /* Validate everything up front. */
        let mut pending = Vec::new();
        for info in files.iter().filter(|f| !f.fetched) {
            let digest = checksum_algorithm(&info.checksum)?;
            match info.kind()? {
                Entry::Data(id) => {
                    if content.instance(&id).is_none() {
                        return Err(Error::Validation(format!(
                            "{}: unknown content {id}",
                            info.filename
                        )));
                    }
                }
                Entry::Metadata(name) => {
                    if sip.metadata_entry(name).is_none() {
                        return Err(Error::Validation(format!(
                            "{}: submission {} has no '{name}' metadata",
                            info.filename,
                            sip.id()
                        )));
                    }
                }
                Entry::Text(_) => {}
            }
            pending.push((info, digest));
        }

        let total_files = pending.len();
        let total_size = pending.iter().map(|(f, _)| f.size).sum();
        self.storage
            .make_dir(&self.package_dir, true)
            .map_err(|e| Error::storage(&self.package_dir, e))?;

        let mut written = Vec::with_capacity(total_files);
        let mut copied_size = 0;
        for (i, (info, digest)) in pending.into_iter().enumerate() {
            let source = match info.kind()? {
                Entry::Data(id) => {
                    let reader = content
                        .open(&id)
                        .map_err(|e| Error::storage(id.to_string(), e))?;
                    Source::Stream(reader)
                }
                Entry::Metadata(name) => match sip.metadata_entry(name) {
                    Some(entry) => Source::Text(&entry.content),
                    None => {
                        return Err(Error::Validation(format!(
                            "{}: metadata '{name}' disappeared",
                            info.filename
                        )));
                    }
                },
                Entry::Text(text) => Source::Text(text),
            };
            let stored = self.write_one(info, digest, source)?;
            debug!(
                filename = %stored.filename,
                size = stored.size,
                checksum = %stored.checksum,
                "wrote package file"
            );
            copied_size += stored.size;
            let flow = progress(&Progress {
                total_files,
                total_size,
                copied_files: i + 1,
                copied_size,
                current_filename: &stored.filename,
                current_filesize: stored.size,
            });
            let last = stored.filename.clone();
            written.push(stored);
            if flow.is_break() && i + 1 < total_files {
                return Err(Error::Cancelled(last));
            }
        }
        Ok(written)
    }

    fn write_one(
        &self,
        info: &FileInfo,
        digest: Digest,
        source: Source<'_>,
    ) -> Result<FileInfo> {
        let dest = join(&self.package_dir, &info.filename);
        if let Some(dir) = parent(&dest) {
            self.storage
                .make_dir(dir, true)
                .map_err(|e| Error::storage(dir, e))?;
        }
        let out = self.storage.create(&dest).map_err(|e| Error::storage(&dest, e))?;
        let mut out = HashingWriter {
            inner: out,
            hasher: digest.hasher(),
            size: 0,
        };
        match source {
            Source::Stream(mut reader) => {
                io::copy(&mut reader, &mut out)
                    .map_err(|e| Error::storage(&dest, e))?;
            }
            Source::Text(text) => {
                out.write_all(text.as_bytes())
                    .map_err(|e| Error::storage(&dest, e))?;
            }
        }
        out.flush().map_err(|e| Error::storage(&dest, e))?;

        let checksum = format!("{}:{}", digest.prefix(), Digest::finish(out.hasher));
        if checksum != info.checksum {
            return Err(Error::ChecksumMismatch {
                filename: info.filename.clone(),
                expected: info.checksum.clone(),
                actual: checksum,
            });
        }
        Ok(FileInfo {
            size: out.size,
            checksum,
            path: self.storage.locator(&dest),
            ..info.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContentArena;
    use crate::storage::LocalStorage;

    fn data(filename: &str, arena: &ContentArena, id: crate::model::ContentId) -> FileInfo {
        let instance = arena.instance(&id).cloned();
        FileInfo {
            filename: filename.to_string(),
            size: instance.as_ref().map(|i| i.size).unwrap_or_default(),
            checksum: instance.map(|i| i.checksum).unwrap_or_default(),
            file_uuid: Some(id),
            ..Default::default()
        }
    }

    fn text(filename: &str, content: &str) -> FileInfo {
        FileInfo {
            filename: filename.to_string(),
            size: content.len() as u64,
            checksum: Digest::MD5.checksum(content.as_bytes()),
            content: Some(content.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn writes_and_reports() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = LocalStorage::new(dir.path())?;
        let mut arena = ContentArena::new();
        let id = arena.add_bytes("test-second");
        let sip = Submission::create(true, None)?;
        let files = vec![
            data("data/files/nested/a.txt", &arena, id),
            FileInfo {
                fetched: true,
                ..data("data/files/elsewhere.txt", &arena, id)
            },
            text("bagit.txt", "test"),
        ];
        let writer = PackageWriter::new(&storage, "pkg");
        let mut seen = Vec::new();
        let written = writer.write_all(&sip, &arena, &files, &mut |p| {
            seen.push((p.copied_files, p.copied_size, p.current_filename.to_string()));
            assert_eq!(p.total_files, 2);
            assert_eq!(p.total_size, 15);
            ControlFlow::Continue(())
        })?;
        assert_eq!(written.len(), 2);
        assert_eq!(
            seen,
            [
                (1, 11, "data/files/nested/a.txt".to_string()),
                (2, 15, "bagit.txt".to_string())
            ]
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("pkg/data/files/nested/a.txt"))?,
            "test-second"
        );
        assert!(!dir.path().join("pkg/data/files/elsewhere.txt").exists());
        assert!(written[1].path.ends_with("pkg/bagit.txt"));
        Ok(())
    }

    #[test]
    fn mismatch_is_detected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = LocalStorage::new(dir.path())?;
        let sip = Submission::create(true, None)?;
        let arena = ContentArena::new();
        let mut bad = text("bagit.txt", "test");
        bad.checksum = "md5:00".to_string();
        let writer = PackageWriter::new(&storage, "pkg");
        let err = writer.write_all(&sip, &arena, &[bad], &mut no_progress);
        assert!(matches!(err, Err(Error::ChecksumMismatch { .. })));
        Ok(())
    }

    #[test]
    fn invalid_plan_writes_nothing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = LocalStorage::new(dir.path())?;
        let sip = Submission::create(true, None)?;
        let arena = ContentArena::new();
        let files = vec![
            text("bagit.txt", "test"),
            FileInfo {
                filename: "orphan".to_string(),
                checksum: "md5:00".to_string(),
                ..Default::default()
            },
        ];
        let writer = PackageWriter::new(&storage, "pkg");
        let err = writer.write_all(&sip, &arena, &files, &mut no_progress);
        assert!(matches!(err, Err(Error::Validation(_))));
        assert!(!dir.path().join("pkg").exists());

        let missing = vec![FileInfo {
            metadata_id: Some("json".to_string()),
            ..text("data/metadata/json.json", "{}")
        }];
        let err = writer.write_all(&sip, &arena, &missing, &mut no_progress);
        assert!(matches!(err, Err(Error::Validation(_))));
        Ok(())
    }

    #[test]
    fn cancel_stops_early() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = LocalStorage::new(dir.path())?;
        let sip = Submission::create(true, None)?;
        let arena = ContentArena::new();
        let files = vec![text("one.txt", "1"), text("two.txt", "2")];
        let writer = PackageWriter::new(&storage, "pkg");
        let err = writer.write_all(&sip, &arena, &files, &mut |_| ControlFlow::Break(()));
        assert!(matches!(err, Err(Error::Cancelled(ref f)) if f == "one.txt"));
        assert!(dir.path().join("pkg/one.txt").exists());
        assert!(!dir.path().join("pkg/two.txt").exists());
        Ok(())
    }
}
