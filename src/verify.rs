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
 * Read back and verify a BagIt package.
 *
 * [`Bag::open`] parses the tag files of a package directory.  Parsing is
 * lenient: blank lines, comments and anything not in the expected format
 * are ignored.  [`Bag::verify`] then recomputes the checksum of every file
 * listed in the payload and tag manifests and reports each [`Problem`]
 * found.  Payload files that are absent but listed in `fetch.txt` are not
 * problems, as the package is incomplete by design until they are fetched.
 * They are also left out of the `Payload-Oxum` count, which only describes
 * what the package itself stores.  Any file below `data/` that the payload
 * manifest does not list is reported as [`Problem::Unlisted`].
 *
 * ## Examples
 *
 * ```no_run
 * use sipstore::storage::LocalStorage;
 * use sipstore::verify::Bag;
 *
 * fn main() -> sipstore::Result<()> {
 *     let storage = LocalStorage::new("/srv")?;
 *     let bag = Bag::open(&storage, "archive/ab/cd/0000-1111-2222-3333-444455556666")?;
 *     for problem in bag.verify(&storage)? {
 *         println!("{problem}");
 *     }
 *     Ok(())
 * }
 * ```
 */

use indexmap::IndexMap;
use std::fmt;
use std::io::Read;
use std::str::FromStr;

use crate::bagit::{BAGINFO_FILE, BAGIT_FILE, FETCH_FILE};
use crate::digest::{Digest, parse_checksum};
use crate::error::{Error, Result};
use crate::storage::{Storage, join};

/** Payload directory of every bag. */
const PAYLOAD_DIR: &str = "data";

/**
 * A line of a payload or tag manifest.
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ManifestEntry {
    /// Lowercase hex digest.
    pub checksum: String,
    /// Package-relative filename.
    pub filename: String,
}

/**
 * A line of `fetch.txt`.
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FetchEntry {
    /// Where to fetch the file from.
    pub url: String,
    /// Expected size, or `None` if given as `-`.
    pub size: Option<u64>,
    /// Package-relative filename.
    pub filename: String,
}

/**
 * Something wrong with a package.
 */
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Problem {
    /// A listed file is neither present nor fetchable.
    Missing(String),
    /// A payload file is present but not listed in the payload manifest.
    Unlisted(String),
    /// A file does not match its manifest checksum.
    Mismatch {
        /// Package-relative filename.
        filename: String,
        /// Checksum listed in the manifest.
        expected: String,
        /// Checksum of the file.
        actual: String,
    },
    /// The `Payload-Oxum` tag does not describe the payload.
    Oxum {
        /// Value of the tag.
        expected: String,
        /// Value computed from the payload.
        actual: String,
    },
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Problem::Missing(s) => write!(f, "{s}: missing"),
            Problem::Unlisted(s) => write!(f, "{s}: not in manifest"),
            Problem::Mismatch {
                filename,
                expected,
                actual,
            } => {
                write!(f, "{filename}: checksum {actual} does not match {expected}")
            }
            Problem::Oxum { expected, actual } => {
                write!(f, "Payload-Oxum {expected} does not match payload {actual}")
            }
        }
    }
}

/**
 * A parsed BagIt package.
 */
#[derive(Clone, Debug)]
pub struct Bag {
    dir: String,
    digest: Digest,
    declaration: IndexMap<String, String>,
    info: IndexMap<String, String>,
    manifest: Vec<ManifestEntry>,
    tagmanifest: Vec<ManifestEntry>,
    fetch: Vec<FetchEntry>,
}

/*
 * Split off the first whitespace separated field, returning it and the rest
 * of the line with leading whitespace removed.
 */
fn next_field(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_start();
    let (field, rest) = line.split_once(char::is_whitespace)?;
    Some((field, rest.trim_start()))
}

/*
 * Usable lines, skipping blanks and comments.
 */
fn content_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().filter(|l| {
        let l = l.trim_start();
        !l.is_empty() && !l.starts_with('#')
    })
}

fn parse_manifest(text: &str) -> Vec<ManifestEntry> {
    content_lines(text)
        .filter_map(next_field)
        .filter(|(_, filename)| !filename.is_empty())
        .map(|(checksum, filename)| ManifestEntry {
            checksum: checksum.to_lowercase(),
            filename: filename.trim_end().to_string(),
        })
        .collect()
}

fn parse_fetch(text: &str) -> Vec<FetchEntry> {
    content_lines(text)
        .filter_map(|line| {
            let (url, rest) = next_field(line)?;
            let (size, filename) = next_field(rest)?;
            let size = match size {
                "-" => None,
                s => Some(u64::from_str(s).ok()?),
            };
            let filename = filename.trim_end();
            (!filename.is_empty()).then(|| FetchEntry {
                url: url.to_string(),
                size,
                filename: filename.to_string(),
            })
        })
        .collect()
}

/*
 * "Label: value" lines.  Lines starting with whitespace continue the
 * previous value.  If a label appears more than once the last one wins.
 */
fn parse_tags(text: &str) -> IndexMap<String, String> {
    let mut tags: IndexMap<String, String> = IndexMap::new();
    let mut last: Option<String> = None;
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if line.starts_with(char::is_whitespace) {
            if let Some(value) = last.as_ref().and_then(|k| tags.get_mut(k)) {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        match line.split_once(':') {
            Some((label, value)) => {
                let label = label.trim().to_string();
                tags.insert(label.clone(), value.trim().to_string());
                last = Some(label);
            }
            None => last = None,
        }
    }
    tags
}

fn read_text(storage: &dyn Storage, path: &str) -> Result<String> {
    let mut text = String::new();
    storage
        .open(path)
        .and_then(|mut r| r.read_to_string(&mut text))
        .map_err(|e| Error::storage(path, e))?;
    Ok(text)
}

fn read_optional(storage: &dyn Storage, path: &str) -> Result<Option<String>> {
    if storage.exists(path) {
        read_text(storage, path).map(Some)
    } else {
        Ok(None)
    }
}

impl Bag {
    /**
     * Parse the package at `dir`.  `bagit.txt` and a payload manifest are
     * required.  Manifests are looked for in order of MD5, SHA256, SHA512
     * and SHA1, and the first one found is used.
     */
    pub fn open(storage: &dyn Storage, dir: &str) -> Result<Bag> {
        let declaration = parse_tags(&read_text(storage, &join(dir, BAGIT_FILE))?);

        let mut found = None;
        for digest in [Digest::MD5, Digest::SHA256, Digest::SHA512, Digest::SHA1] {
            let path = join(dir, &format!("manifest-{}.txt", digest.prefix()));
            if let Some(text) = read_optional(storage, &path)? {
                found = Some((digest, text));
                break;
            }
        }
        let (digest, manifest) = found.ok_or_else(|| {
            Error::Validation(format!("{dir}: no payload manifest found"))
        })?;

        let tagmanifest = format!("tagmanifest-{}.txt", digest.prefix());
        let tagmanifest = read_optional(storage, &join(dir, &tagmanifest))?;
        let info = read_optional(storage, &join(dir, BAGINFO_FILE))?;
        let fetch = read_optional(storage, &join(dir, FETCH_FILE))?;

        Ok(Bag {
            dir: dir.to_string(),
            digest,
            declaration,
            info: info.as_deref().map(parse_tags).unwrap_or_default(),
            manifest: parse_manifest(&manifest),
            tagmanifest: tagmanifest.as_deref().map(parse_manifest).unwrap_or_default(),
            fetch: fetch.as_deref().map(parse_fetch).unwrap_or_default(),
        })
    }

    /// The manifest digest algorithm.
    pub fn digest(&self) -> Digest {
        self.digest
    }

    /// `BagIt-Version` from `bagit.txt`.
    pub fn version(&self) -> Option<&str> {
        self.declaration.get("BagIt-Version").map(String::as_str)
    }

    /// Tags from `bag-info.txt`, in order.
    pub fn info(&self) -> &IndexMap<String, String> {
        &self.info
    }

    /// Payload manifest entries.
    pub fn manifest(&self) -> &[ManifestEntry] {
        &self.manifest
    }

    /// Tag manifest entries.
    pub fn tagmanifest(&self) -> &[ManifestEntry] {
        &self.tagmanifest
    }

    /// Fetch list entries.
    pub fn fetch(&self) -> &[FetchEntry] {
        &self.fetch
    }

    /*
     * Hash a file if it is present, returning its size and hex digest.
     */
    fn measure(&self, storage: &dyn Storage, filename: &str) -> Result<Option<(u64, String)>> {
        let path = join(&self.dir, filename);
        if !storage.exists(&path) {
            return Ok(None);
        }
        let mut reader = storage.open(&path).map_err(|e| Error::storage(&path, e))?;
        let (size, sum) = self.digest.checksum_reader(&mut reader)?;
        Ok(Some((size, parse_checksum(&sum, self.digest)?.to_string())))
    }

    fn check(
        &self,
        storage: &dyn Storage,
        entry: &ManifestEntry,
        problems: &mut Vec<Problem>,
    ) -> Result<Option<u64>> {
        let measured = self.measure(storage, &entry.filename)?;
        if let Some((_, actual)) = &measured {
            if *actual != entry.checksum {
                problems.push(Problem::Mismatch {
                    filename: entry.filename.clone(),
                    expected: entry.checksum.clone(),
                    actual: actual.clone(),
                });
            }
        }
        Ok(measured.map(|(size, _)| size))
    }

    /**
     * Check every listed file and the `Payload-Oxum` tag.  An empty result
     * means the package is valid.
     */
    pub fn verify(&self, storage: &dyn Storage) -> Result<Vec<Problem>> {
        let mut problems = Vec::new();
        let (mut octets, mut count) = (0u64, 0usize);
        for entry in &self.manifest {
            let fetched = self.fetch.iter().any(|f| f.filename == entry.filename);
            match self.check(storage, entry, &mut problems)? {
                Some(size) if !fetched => {
                    octets += size;
                    count += 1;
                }
                Some(_) => {}
                None if fetched => {}
                None => problems.push(Problem::Missing(entry.filename.clone())),
            }
        }
        for entry in &self.tagmanifest {
            if self.check(storage, entry, &mut problems)?.is_none() {
                problems.push(Problem::Missing(entry.filename.clone()));
            }
        }

        let payload = join(&self.dir, PAYLOAD_DIR);
        let present = storage
            .list_files(&payload)
            .map_err(|e| Error::storage(&payload, e))?;
        for key in present {
            let filename = join(PAYLOAD_DIR, &key);
            if !self.manifest.iter().any(|e| e.filename == filename) {
                problems.push(Problem::Unlisted(filename));
            }
        }

        if let Some(expected) = self.info.get("Payload-Oxum") {
            let actual = format!("{octets}.{count}");
            if *expected != actual {
                problems.push(Problem::Oxum {
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(problems)
    }
}
