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
 * Serialize a package directory into a single tarball.
 *
 * The tarball holds exactly one top-level directory named after the bag,
 * with the package contents below it.  Entries are added in sorted order
 * with normalised ownership and timestamps, so serializing the same
 * package twice produces identical bytes.
 *
 * ## Examples
 *
 * ```no_run
 * use sipstore::serialize::serialize_to_file;
 *
 * fn main() -> sipstore::Result<()> {
 *     serialize_to_file("/srv/archive/ab/cd/0000-1111", "bag-0000-1111.tar.zst")?;
 *     Ok(())
 * }
 * ```
 */

use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use tar::{Builder as TarBuilder, HeaderMode};
use tracing::info;

use crate::error::{Error, Result};

/**
 * Compression applied to a serialized package.
 */
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Compression {
    /// Plain tar.
    None,
    /// gzip.
    #[default]
    Gzip,
    /// Zstandard.
    Zstd,
}

/* Tarball suffixes, longest first, matched case-insensitively. */
const SUFFIXES: &[(&str, Compression)] = &[
    (".tar.gz", Compression::Gzip),
    (".tar.zst", Compression::Zstd),
    (".tgz", Compression::Gzip),
    (".tzst", Compression::Zstd),
    (".tar", Compression::None),
];

impl Compression {
    /**
     * The compression implied by the file name of `path`, or `None` if it
     * does not end in a known tarball suffix.
     */
    pub fn for_path(path: impl AsRef<Path>) -> Option<Self> {
        let name = path.as_ref().file_name()?.to_str()?.to_ascii_lowercase();
        SUFFIXES
            .iter()
            .find(|(suffix, _)| name.ends_with(*suffix))
            .map(|&(_, compression)| compression)
    }
}

enum Encoder<W: Write> {
    Plain(W),
    Gzip(GzEncoder<W>),
    Zstd(zstd::stream::Encoder<'static, W>),
}

impl<W: Write> Encoder<W> {
    fn new(writer: W, compression: Compression) -> io::Result<Self> {
        Ok(match compression {
            Compression::None => Encoder::Plain(writer),
            Compression::Gzip => {
                Encoder::Gzip(GzEncoder::new(writer, flate2::Compression::default()))
            }
            Compression::Zstd => Encoder::Zstd(zstd::stream::Encoder::new(
                writer,
                zstd::DEFAULT_COMPRESSION_LEVEL,
            )?),
        })
    }

    fn finish(self) -> io::Result<W> {
        match self {
            Encoder::Plain(w) => Ok(w),
            Encoder::Gzip(e) => e.finish(),
            Encoder::Zstd(e) => e.finish(),
        }
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Encoder::Plain(w) => w.write(buf),
            Encoder::Gzip(e) => e.write(buf),
            Encoder::Zstd(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Encoder::Plain(w) => w.flush(),
            Encoder::Gzip(e) => e.flush(),
            Encoder::Zstd(e) => e.flush(),
        }
    }
}

/*
 * Add everything below `dir` as `prefix/...`, directories before their
 * contents and siblings in byte order.
 */
fn append_tree<W: Write>(
    tar: &mut TarBuilder<W>,
    dir: &Path,
    prefix: &str,
) -> io::Result<()> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let name = entry.file_name();
        let name = format!("{prefix}/{}", name.to_string_lossy());
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            tar.append_dir(&name, &path)?;
            append_tree(tar, &path, &name)?;
        } else {
            tar.append_path_with_name(&path, &name)?;
        }
    }
    Ok(())
}

/**
 * Write the package directory `dir` to `writer` as a tarball whose single
 * top-level directory is `name`.  Returns the writer once the archive is
 * complete.
 */
pub fn serialize_bag<W: Write>(
    dir: impl AsRef<Path>,
    name: &str,
    writer: W,
    compression: Compression,
) -> Result<W> {
    let dir = dir.as_ref();
    if name.is_empty() || name.contains('/') {
        return Err(Error::Validation(format!("invalid bag name '{name}'")));
    }
    let encoder = Encoder::new(writer, compression)?;
    let mut tar = TarBuilder::new(encoder);
    tar.mode(HeaderMode::Deterministic);
    tar.follow_symlinks(false);
    tar.append_dir(name, dir)
        .map_err(|e| Error::storage(dir.display().to_string(), e))?;
    append_tree(&mut tar, dir, name)
        .map_err(|e| Error::storage(dir.display().to_string(), e))?;
    let encoder = tar.into_inner()?;
    Ok(encoder.finish()?)
}

/**
 * Serialize the package directory `dir` to the file `out`.  Compression is
 * chosen from the extension of `out`, defaulting to gzip, and the bag is
 * named after the last component of `dir`.
 */
pub fn serialize_to_file(dir: impl AsRef<Path>, out: impl AsRef<Path>) -> Result<File> {
    let dir = dir.as_ref();
    let out = out.as_ref();
    let name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Validation(format!("{}: no bag name", dir.display())))?;
    let compression = Compression::for_path(out).unwrap_or_default();
    let file = File::create(out).map_err(|e| Error::storage(out.display().to_string(), e))?;
    let file = serialize_bag(dir, name, file, compression)?;
    info!(bag = name, output = %out.display(), ?compression, "serialized package");
    Ok(file)
}
