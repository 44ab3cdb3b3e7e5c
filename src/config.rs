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
 * Archiver configuration.
 *
 * Every field has a default, so an empty JSON object is a valid
 * configuration.  Keys use kebab-case.
 *
 * ```
 * use sipstore::config::{ArchiverConfig, TagValue};
 * use sipstore::naming::FileNaming;
 *
 * let config: ArchiverConfig = serde_json::from_str(r#"{
 *     "location": "/srv/archive",
 *     "naming": "secure",
 *     "metadata-types": ["json"]
 * }"#).unwrap();
 * assert!(matches!(config.naming, FileNaming::Secure));
 * assert_eq!(config.data_dir, "data/files");
 * assert_eq!(
 *     config.tags.get("External-Identifier"),
 *     Some(&TagValue::SubmissionId)
 * );
 * ```
 */

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::model::Submission;
use crate::naming::{FileNaming, MetadataNaming, SubpathBuilder};
use crate::storage::join;

/**
 * The `Bag-Software-Agent` value written by default.
 */
pub const SOFTWARE_AGENT: &str =
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/**
 * Value of a configured `bag-info.txt` tag.
 */
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TagValue {
    /// Literal text.
    Text(String),
    /// The identifier of the submission being archived.
    SubmissionId,
    /// The archiver name and version, e.g. `sipstore/0.3.0`.
    Software,
    /// Placeholder for a value computed at planning time.  Only
    /// `Bagging-Date` and `Payload-Oxum` are computed; anywhere else the tag
    /// is omitted.  Use it to choose where those two tags appear.
    Generated,
}

/**
 * Configuration of a [`BagItArchiver`].
 *
 * [`BagItArchiver`]: crate::bagit::BagItArchiver
 */
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ArchiverConfig {
    /// Storage key under which all packages live.
    pub location: String,
    /// Package directory below [`location`](Self::location).
    pub subpath: SubpathBuilder,
    /// Naming of data files.
    pub naming: FileNaming,
    /// Naming of metadata files.
    pub metadata_naming: MetadataNaming,
    /// Metadata type names written into packages.  Types not listed here
    /// are not archived.
    pub metadata_types: Vec<String>,
    /// Tags written to `bag-info.txt`, in order.
    pub tags: IndexMap<String, TagValue>,
    /// Payload file mapping generated names back to attachment paths.  Only
    /// written when [`naming`](Self::naming) is not the identity.
    pub filenames_file: Option<String>,
    /// Directory for data files, relative to the package root.
    pub data_dir: String,
    /// Directory for metadata files, relative to the package root.
    pub metadata_dir: String,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        let tags = IndexMap::from([
            ("Bagging-Date".to_string(), TagValue::Generated),
            ("Payload-Oxum".to_string(), TagValue::Generated),
            ("External-Identifier".to_string(), TagValue::SubmissionId),
            (
                "External-Description".to_string(),
                TagValue::Text("BagIt archive of SIP.".to_string()),
            ),
            ("Bag-Software-Agent".to_string(), TagValue::Software),
        ]);
        ArchiverConfig {
            location: "archive".to_string(),
            subpath: SubpathBuilder::default(),
            naming: FileNaming::default(),
            metadata_naming: MetadataNaming::default(),
            metadata_types: vec!["json".to_string(), "marcxml".to_string()],
            tags,
            filenames_file: Some("data/filenames.txt".to_string()),
            data_dir: "data/files".to_string(),
            metadata_dir: "data/metadata".to_string(),
        }
    }
}

impl ArchiverConfig {
    /// Set the archive location.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Set the package subpath policy.
    #[must_use]
    pub fn with_subpath(mut self, subpath: SubpathBuilder) -> Self {
        self.subpath = subpath;
        self
    }

    /// Set the data file naming policy.
    #[must_use]
    pub fn with_naming(mut self, naming: FileNaming) -> Self {
        self.naming = naming;
        self
    }

    /// Set the metadata file naming policy.
    #[must_use]
    pub fn with_metadata_naming(mut self, naming: MetadataNaming) -> Self {
        self.metadata_naming = naming;
        self
    }

    /// Replace the list of archived metadata types.
    #[must_use]
    pub fn with_metadata_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Add or replace a `bag-info.txt` tag.  New tags are appended.
    #[must_use]
    pub fn with_tag(mut self, name: impl Into<String>, value: TagValue) -> Self {
        self.tags.insert(name.into(), value);
        self
    }

    /// Set or disable the filename mapping file.
    #[must_use]
    pub fn with_filenames_file(mut self, name: Option<String>) -> Self {
        self.filenames_file = name;
        self
    }

    /// Set the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<String>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Set the metadata directory.
    #[must_use]
    pub fn with_metadata_dir(mut self, dir: impl Into<String>) -> Self {
        self.metadata_dir = dir.into();
        self
    }

    /**
     * The storage key of the package directory for `sip`.
     */
    pub fn package_dir(&self, sip: &Submission) -> String {
        join(&self.location, &self.subpath.build(sip))
    }
}
