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
 * # sipstore
 *
 * Archive submission information packages (SIPs) as [BagIt] packages.
 *
 * A [`Submission`] is a set of file attachments and metadata.  The
 * [`BagItArchiver`] plans a package for it, caches the plan on the
 * submission as a [`ManifestRecord`], and writes the package into a
 * [`Storage`].  Later submissions can be archived as lightweight patch
 * packages that reference unchanged content in an earlier package through
 * `fetch.txt` instead of copying it again.
 *
 * [BagIt]: https://www.rfc-editor.org/rfc/rfc8493
 */

#![deny(missing_docs)]

pub mod bagit;
pub mod cache;
pub mod config;
pub mod delta;
pub mod digest;
pub mod error;
pub mod manifest;
pub mod model;
pub mod naming;
pub mod schema;
pub mod serialize;
pub mod storage;
pub mod verify;
pub mod writer;

pub use crate::bagit::{ArchiveOptions, Archiver, BagItArchiver, PatchBase};
pub use crate::config::{ArchiverConfig, TagValue};
pub use crate::digest::{Digest, DigestError};
pub use crate::error::{Error, Result};
pub use crate::manifest::{FileInfo, ManifestRecord};
pub use crate::model::{
    ContentArena, ContentId, ContentSource, MetadataType, Submission, SubmissionId,
};
pub use crate::naming::{FileNaming, MetadataNaming, SubpathBuilder};
pub use crate::storage::{LocalStorage, Storage};
pub use crate::verify::Bag;
pub use crate::writer::Progress;
