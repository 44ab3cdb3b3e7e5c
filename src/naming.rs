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
 * Naming policies for files inside a package and for the package directory
 * itself.
 *
 * All policies are pure functions of their input, so planning the same
 * submission twice always produces the same names.  Each policy has a
 * `Custom` variant taking a closure; those variants are skipped when a
 * configuration is (de)serialized.
 *
 * ## Examples
 *
 * ```
 * use sipstore::naming::{chunks, secure_filename};
 *
 * assert_eq!(secure_filename("../../foobar.txt"), "foobar.txt");
 * assert_eq!(secure_filename("/etc/shadow"), "etc_shadow");
 * assert_eq!(chunks("1234567", &[1, 2, 3]), ["1", "23", "456", "7"]);
 * ```
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use unicode_normalization::UnicodeNormalization;

use crate::model::{MetadataEntry, Submission, SubmissionFile};

/**
 * A caller supplied naming function.
 */
pub type NameFn<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;

/**
 * Reduce an arbitrary filename to a safe ASCII form.
 *
 * The name is compatibility-decomposed and stripped of anything outside
 * ASCII, path separators become word breaks, runs of whitespace collapse to
 * a single `_`, and only `[A-Za-z0-9_.-]` survive.  Leading and trailing
 * `.` and `_` are removed so the result can never be a relative path
 * component or a hidden file.  The result may be empty.
 */
pub fn secure_filename(filename: &str) -> String {
    let ascii: String = filename
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' { ' ' } else { c })
        .collect();
    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

/**
 * Split `s` into consecutive pieces of the given sizes.  If the sizes do
 * not cover the whole string the remainder is returned as a final piece,
 * and sizes beyond the end of the string are ignored.
 */
pub fn chunks<'a>(s: &'a str, sizes: &[usize]) -> Vec<&'a str> {
    /* Char boundaries, plus the end of the string. */
    let bounds: Vec<usize> = s
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(s.len()))
        .collect();
    let len = bounds.len() - 1;
    let total: usize = sizes.iter().sum();
    let rest = (total < len).then_some(len);

    let mut pieces = Vec::new();
    let mut acc = 0;
    for size in sizes.iter().copied().chain(rest) {
        if acc >= len {
            break;
        }
        let end = (acc + size).min(len);
        pieces.push(&s[bounds[acc]..bounds[end]]);
        acc += size;
    }
    pieces
}

/**
 * How a file attachment is named inside the package payload directory.
 */
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileNaming {
    /// Use the attachment path unchanged.
    #[default]
    Identity,
    /// `<content id>-<secure filename>`, safe for any filesystem and
    /// unique even when attachment paths collide after sanitising.
    Secure,
    /// Caller supplied function.
    #[serde(skip)]
    Custom(NameFn<SubmissionFile>),
}

impl FileNaming {
    /**
     * Wrap a closure as a [`FileNaming::Custom`] policy.
     */
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&SubmissionFile) -> String + Send + Sync + 'static,
    {
        FileNaming::Custom(Arc::new(f))
    }

    /**
     * Produce the package-relative name of `file`, excluding the payload
     * directory prefix.
     */
    pub fn name(&self, file: &SubmissionFile) -> String {
        match self {
            FileNaming::Identity => file.filepath.clone(),
            FileNaming::Secure => {
                format!("{}-{}", file.file_id, secure_filename(&file.filepath))
            }
            FileNaming::Custom(f) => f(file),
        }
    }

    /**
     * Whether names are the attachment paths themselves, in which case no
     * filename mapping file is needed.
     */
    pub fn is_identity(&self) -> bool {
        matches!(self, FileNaming::Identity)
    }
}

impl fmt::Debug for FileNaming {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FileNaming::Identity => write!(f, "Identity"),
            FileNaming::Secure => write!(f, "Secure"),
            FileNaming::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/**
 * How the package directory of a submission is derived, relative to the
 * archive location.
 */
#[derive(Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubpathBuilder {
    /// Split the hyphenated submission id into chunks of the given sizes,
    /// joined with `/`.  The default of `[2, 2]` spreads packages over two
    /// levels of 256 directories each.
    Chunked(Vec<usize>),
    /// Caller supplied function.
    #[serde(skip)]
    Custom(NameFn<Submission>),
}

impl Default for SubpathBuilder {
    fn default() -> Self {
        SubpathBuilder::Chunked(vec![2, 2])
    }
}

impl SubpathBuilder {
    /**
     * Wrap a closure as a [`SubpathBuilder::Custom`] policy.
     */
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Submission) -> String + Send + Sync + 'static,
    {
        SubpathBuilder::Custom(Arc::new(f))
    }

    /**
     * Compute the subpath for `sip`.
     */
    pub fn build(&self, sip: &Submission) -> String {
        match self {
            SubpathBuilder::Chunked(sizes) => {
                chunks(&sip.id().to_string(), sizes).join("/")
            }
            SubpathBuilder::Custom(f) => f(sip),
        }
    }
}

impl fmt::Debug for SubpathBuilder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SubpathBuilder::Chunked(sizes) => {
                f.debug_tuple("Chunked").field(sizes).finish()
            }
            SubpathBuilder::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/**
 * How a metadata entry is named inside the package metadata directory.
 */
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetadataNaming {
    /// `<type name>.<format>`, e.g. `json.json`.
    #[default]
    TypeAndFormat,
    /// Caller supplied function.
    #[serde(skip)]
    Custom(NameFn<MetadataEntry>),
}

impl MetadataNaming {
    /**
     * Wrap a closure as a [`MetadataNaming::Custom`] policy.
     */
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&MetadataEntry) -> String + Send + Sync + 'static,
    {
        MetadataNaming::Custom(Arc::new(f))
    }

    /**
     * Produce the name of `entry`, excluding the metadata directory prefix.
     */
    pub fn name(&self, entry: &MetadataEntry) -> String {
        match self {
            MetadataNaming::TypeAndFormat => {
                format!("{}.{}", entry.kind.name, entry.kind.format)
            }
            MetadataNaming::Custom(f) => f(entry),
        }
    }
}

impl fmt::Debug for MetadataNaming {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MetadataNaming::TypeAndFormat => write!(f, "TypeAndFormat"),
            MetadataNaming::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}
