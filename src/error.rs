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

//! Error type shared by the planning, caching and writing stages.
//!
//! Nothing is retried internally.  A failed archival may leave a partially
//! written package directory behind, and re-running the archival is the
//! expected recovery.

use std::io;

use crate::digest::DigestError;
use crate::model::SubmissionId;

/// Result type for archival operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for archival operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Malformed checksum notation or unsupported digest.
    #[error("digest error: {0}")]
    Digest(#[from] DigestError),

    /// An entry or attachment is missing required fields or is otherwise
    /// ambiguous.
    #[error("validation error: {0}")]
    Validation(String),

    /// A document failed JSON schema validation.  Each element describes
    /// one violation.
    #[error("schema validation failed: {}", .0.join("; "))]
    Schema(Vec<String>),

    /// A manifest record already exists and overwriting was not requested.
    #[error("submission {0} already has a package manifest record")]
    Conflict(SubmissionId),

    /// A patch base has never been archived.
    #[error("submission {0} has no package manifest record")]
    NotFound(SubmissionId),

    /// The submission is flagged as not archivable.
    #[error("submission {0} is not archivable")]
    NotArchivable(SubmissionId),

    /// Bytes written did not hash to the checksum recorded in the manifest.
    #[error("checksum mismatch for {filename}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Package-relative filename.
        filename: String,
        /// Checksum recorded in the manifest.
        expected: String,
        /// Checksum of what was actually written.
        actual: String,
    },

    /// The progress callback asked for the archival to stop.  Contains the
    /// last file that was completely written.
    #[error("archival cancelled after {0}")]
    Cancelled(String),

    /// Manifest record (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error against a specific storage path or content locator.
    #[error("I/O error on {path}: {source}")]
    Storage {
        /// Path or locator that was being accessed.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn storage(path: impl Into<String>, source: io::Error) -> Self {
        Error::Storage {
            path: path.into(),
            source,
        }
    }
}
