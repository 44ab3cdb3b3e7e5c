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
 * Manifest entries and the planning of them.
 *
 * A [`FileInfo`] describes one file of a package: its package-relative
 * name, the locator it is (or will be) stored at, its size and checksum,
 * and where its bytes come from.  Exactly which source applies is decided
 * by [`FileInfo::kind`]:
 *
 * * `file_uuid` set: a data file copied from stored content.
 * * `metadata_id` set: a metadata file serialized from the submission.
 * * `content` set: a generated text file, such as a tag file.
 *
 * The full list of entries for a package is a [`ManifestRecord`], which is
 * what gets cached on the submission.  Planning never touches storage
 * other than to ask it for locators.
 */

use serde::{Deserialize, Serialize};

use crate::config::ArchiverConfig;
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::model::{
    ContentId, ContentSource, MetadataEntry, RESERVED_METADATA_TYPE, Submission,
    SubmissionFile,
};
use crate::schema::BAGIT_SCHEMA_ID;
use crate::storage::{Storage, join};

/**
 * One file of a package.
 */
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct FileInfo {
    /// Package-relative name, `/`-separated.
    pub filename: String,
    /// Locator of the stored copy.  For fetched entries this is where the
    /// base package keeps it.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Prefixed checksum, e.g. `md5:<hex>`.
    pub checksum: String,
    /// Attachment path, for data files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filepath: Option<String>,
    /// Source content, for data files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_uuid: Option<ContentId>,
    /// Source metadata type name, for metadata files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_id: Option<String>,
    /// Literal content, for generated text files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Whether the file lives in another package and is only referenced
    /// from `fetch.txt`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fetched: bool,
}

/**
 * The source of a [`FileInfo`], as returned by [`FileInfo::kind`].
 */
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Entry<'a> {
    /// Copy stored content.
    Data(ContentId),
    /// Serialize the metadata entry of this type.
    Metadata(&'a str),
    /// Write this literal text.
    Text(&'a str),
}

impl FileInfo {
    /**
     * Determine where the bytes of this entry come from.  `file_uuid` takes
     * precedence over `metadata_id`, which takes precedence over `content`.
     * An entry with none of them is rejected.
     */
    pub fn kind(&self) -> Result<Entry<'_>> {
        if let Some(id) = self.file_uuid {
            Ok(Entry::Data(id))
        } else if let Some(name) = &self.metadata_id {
            Ok(Entry::Metadata(name))
        } else if let Some(text) = &self.content {
            Ok(Entry::Text(text))
        } else {
            Err(Error::Validation(format!(
                "{}: entry has no file_uuid, metadata_id or content",
                self.filename
            )))
        }
    }

    /**
     * Whether this is a data file.
     */
    pub fn is_data(&self) -> bool {
        self.file_uuid.is_some()
    }
}

/**
 * The cached plan of a package.
 */
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ManifestRecord {
    /// Schema identifier the record conforms to.
    #[serde(rename = "$schema")]
    pub schema: String,
    /// Every file of the package, payload first and tag files last.
    pub files: Vec<FileInfo>,
}

impl ManifestRecord {
    /**
     * Create a record for the given entries.
     */
    pub fn new(files: Vec<FileInfo>) -> Self {
        ManifestRecord {
            schema: BAGIT_SCHEMA_ID.to_string(),
            files,
        }
    }

    /// Data file entries, fetched or not.
    pub fn data_files(&self) -> impl Iterator<Item = &FileInfo> {
        self.files.iter().filter(|f| f.is_data())
    }

    /// Entries referenced from `fetch.txt`.
    pub fn fetched(&self) -> impl Iterator<Item = &FileInfo> {
        self.files.iter().filter(|f| f.fetched)
    }

    /// Entries that are physically written into the package.
    pub fn stored(&self) -> impl Iterator<Item = &FileInfo> {
        self.files.iter().filter(|f| !f.fetched)
    }

    /// Look up an entry by package-relative name.
    pub fn get(&self, filename: &str) -> Option<&FileInfo> {
        self.files.iter().find(|f| f.filename == filename)
    }
}

/**
 * Plans [`FileInfo`] entries for a single package.
 */
pub struct Planner<'a> {
    storage: &'a dyn Storage,
    config: &'a ArchiverConfig,
    package_dir: String,
    digest: Digest,
}

impl<'a> Planner<'a> {
    /**
     * Create a planner for the package of `sip`.
     */
    pub fn new(
        storage: &'a dyn Storage,
        config: &'a ArchiverConfig,
        sip: &Submission,
    ) -> Self {
        Planner {
            storage,
            config,
            package_dir: config.package_dir(sip),
            digest: Digest::MD5,
        }
    }

    /// Storage key of the package directory.
    pub fn package_dir(&self) -> &str {
        &self.package_dir
    }

    /**
     * The locator of a package-relative filename.
     */
    pub fn locator(&self, filename: &str) -> String {
        self.storage.locator(&join(&self.package_dir, filename))
    }

    /**
     * The package-relative filename of a data file.
     */
    pub fn data_filename(&self, file: &SubmissionFile) -> String {
        join(&self.config.data_dir, &self.config.naming.name(file))
    }

    /**
     * The package-relative filename of a metadata file.
     */
    pub fn metadata_filename(&self, entry: &MetadataEntry) -> String {
        join(&self.config.metadata_dir, &self.config.metadata_naming.name(entry))
    }

    /**
     * Plan data file entries.  Size and checksum come from the content
     * source, so nothing is read.
     */
    pub fn plan_files<'f, I>(
        &self,
        files: I,
        content: &dyn ContentSource,
    ) -> Result<Vec<FileInfo>>
    where
        I: IntoIterator<Item = &'f SubmissionFile>,
    {
        files
            .into_iter()
            .map(|file| {
                let instance = content.instance(&file.file_id).ok_or_else(|| {
                    Error::Validation(format!(
                        "{}: unknown content {}",
                        file.filepath, file.file_id
                    ))
                })?;
                let filename = self.data_filename(file);
                Ok(FileInfo {
                    path: self.locator(&filename),
                    filename,
                    size: instance.size,
                    checksum: instance.checksum.clone(),
                    filepath: Some(file.filepath.clone()),
                    file_uuid: Some(file.file_id),
                    ..Default::default()
                })
            })
            .collect()
    }

    /**
     * Plan metadata file entries for every metadata type that is in the
     * configured allow-list.  The reserved manifest record type is never
     * included.
     */
    pub fn plan_metadata(&self, sip: &Submission) -> Vec<FileInfo> {
        sip.metadata()
            .iter()
            .filter(|m| m.kind.name != RESERVED_METADATA_TYPE)
            .filter(|m| self.config.metadata_types.contains(&m.kind.name))
            .map(|m| {
                let filename = self.metadata_filename(m);
                FileInfo {
                    path: self.locator(&filename),
                    filename,
                    size: m.content.len() as u64,
                    checksum: self.digest.checksum(m.content.as_bytes()),
                    metadata_id: Some(m.kind.name.clone()),
                    ..Default::default()
                }
            })
            .collect()
    }

    /**
     * Plan a generated text file.
     */
    pub fn plan_text(&self, filename: &str, content: String) -> FileInfo {
        FileInfo {
            filename: filename.to_string(),
            path: self.locator(filename),
            size: content.len() as u64,
            checksum: self.digest.checksum(content.as_bytes()),
            content: Some(content),
            ..Default::default()
        }
    }

    /**
     * Plan the full, non-incremental payload of `sip`: every data file
     * followed by every allowed metadata file.
     */
    pub fn build_manifest(
        &self,
        sip: &Submission,
        content: &dyn ContentSource,
    ) -> Result<Vec<FileInfo>> {
        let mut files = self.plan_files(sip.files(), content)?;
        files.extend(self.plan_metadata(sip));
        Ok(files)
    }
}
