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
 * Submission information packages and the content they refer to.
 *
 * A [`Submission`] is a set of named file attachments plus typed metadata
 * entries.  Attachments do not hold bytes themselves, they reference a
 * [`ContentId`] which a [`ContentSource`] can resolve to a [`FileInstance`]
 * and a byte stream.  Two attachments with the same [`ContentId`] refer to
 * the same bytes, which is what patch packages rely on to detect unchanged
 * content between submissions.
 *
 * ## Examples
 *
 * ```
 * use sipstore::model::{ContentArena, ContentSource, MetadataType, Submission};
 *
 * fn main() -> sipstore::Result<()> {
 *     let mut arena = ContentArena::new();
 *     let id = arena.add_bytes("test");
 *
 *     let mut sip = Submission::create(true, None)?;
 *     sip.attach_file("docs/readme.txt", id)?;
 *     sip.attach_metadata(MetadataType::new("json", "json"), "{}")?;
 *
 *     assert_eq!(sip.files().len(), 1);
 *     assert_eq!(arena.instance(&id).map(|i| i.size), Some(4));
 *
 *     /* Paths are unique within a submission. */
 *     assert!(sip.attach_file("docs/readme.txt", id).is_err());
 *     Ok(())
 * }
 * ```
 */

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::schema;

/**
 * Maximum length of an attachment path within a submission.
 */
pub const FILEPATH_MAX_LEN: usize = 1024;

/**
 * Name of the metadata type used to store the package manifest record.  It
 * is reserved and cannot be attached by callers, and it is never written
 * into a package as a metadata file.
 */
pub const RESERVED_METADATA_TYPE: &str = "bagit";

/**
 * Unique identifier of a [`Submission`].
 */
#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SubmissionId(Uuid);

/**
 * Unique identifier of a piece of stored content.  Equal identifiers always
 * refer to identical bytes.
 */
#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ContentId(Uuid);

impl SubmissionId {
    /// Generate a new random identifier.
    pub fn generate() -> Self {
        SubmissionId(Uuid::new_v4())
    }
}

impl ContentId {
    /// Generate a new random identifier.
    pub fn generate() -> Self {
        ContentId(Uuid::new_v4())
    }
}

impl From<Uuid> for SubmissionId {
    fn from(uuid: Uuid) -> Self {
        SubmissionId(uuid)
    }
}

impl From<Uuid> for ContentId {
    fn from(uuid: Uuid) -> Self {
        ContentId(uuid)
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for SubmissionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(SubmissionId(Uuid::parse_str(s)?))
    }
}

impl FromStr for ContentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(ContentId(Uuid::parse_str(s)?))
    }
}

/**
 * Stored content as known to a [`ContentSource`].
 */
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FileInstance {
    /// Content identifier.
    pub id: ContentId,
    /// Size in bytes.
    pub size: u64,
    /// Prefixed checksum, e.g. `md5:<hex>`.
    pub checksum: String,
    /// Where the content currently lives.  Informational only.
    pub uri: String,
    /// Last modification time of the content.
    pub last_modified: DateTime<Utc>,
}

/**
 * Resolves [`ContentId`] values to stored content.
 *
 * Implementations must return the same bytes for the same identifier every
 * time, and [`FileInstance::checksum`] must describe those bytes.
 */
pub trait ContentSource {
    /**
     * Look up the instance record for `id`.
     */
    fn instance(&self, id: &ContentId) -> Option<&FileInstance>;

    /**
     * Open a byte stream for the content identified by `id`.
     */
    fn open(&self, id: &ContentId) -> io::Result<Box<dyn Read + '_>>;
}

#[derive(Debug)]
enum Blob {
    Memory(Vec<u8>),
    File(PathBuf),
}

/**
 * A simple in-process [`ContentSource`] holding either in-memory buffers or
 * references to files on disk.
 */
#[derive(Debug, Default)]
pub struct ContentArena {
    blobs: IndexMap<ContentId, (FileInstance, Blob)>,
}

impl ContentArena {
    /**
     * Create an empty arena.
     */
    pub fn new() -> Self {
        Self::default()
    }

    /**
     * Store a byte buffer and return its new identifier.
     */
    pub fn add_bytes(&mut self, bytes: impl Into<Vec<u8>>) -> ContentId {
        let bytes = bytes.into();
        let id = ContentId::generate();
        let instance = FileInstance {
            id,
            size: bytes.len() as u64,
            checksum: Digest::MD5.checksum(&bytes),
            uri: format!("memory:{id}"),
            last_modified: Utc::now(),
        };
        self.blobs.insert(id, (instance, Blob::Memory(bytes)));
        id
    }

    /**
     * Register a file on disk.  The file is hashed immediately and must not
     * change afterwards.
     */
    pub fn add_path(&mut self, path: impl AsRef<Path>) -> Result<ContentId> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let mut file =
            File::open(path).map_err(|e| Error::storage(&display, e))?;
        let mtime = file
            .metadata()
            .and_then(|m| m.modified())
            .map_err(|e| Error::storage(&display, e))?;
        let (size, checksum) = Digest::MD5.checksum_reader(&mut file)?;
        let id = ContentId::generate();
        let instance = FileInstance {
            id,
            size,
            checksum,
            uri: display,
            last_modified: DateTime::<Utc>::from(mtime),
        };
        self.blobs
            .insert(id, (instance, Blob::File(path.to_path_buf())));
        Ok(id)
    }

}

impl ContentSource for ContentArena {
    fn instance(&self, id: &ContentId) -> Option<&FileInstance> {
        self.blobs.get(id).map(|(instance, _)| instance)
    }

    fn open(&self, id: &ContentId) -> io::Result<Box<dyn Read + '_>> {
        match self.blobs.get(id) {
            Some((_, Blob::Memory(bytes))) => Ok(Box::new(bytes.as_slice())),
            Some((_, Blob::File(path))) => Ok(Box::new(File::open(path)?)),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("unknown content {id}"),
            )),
        }
    }
}

/**
 * A file attachment: a path within the submission and the content it
 * refers to.
 */
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SubmissionFile {
    /// Path of the file as the depositor named it.
    pub filepath: String,
    /// The content this attachment refers to.
    pub file_id: ContentId,
}

/**
 * A metadata type, e.g. `json` or `marcxml`.
 */
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct MetadataType {
    /// Unique type name.
    pub name: String,
    /// Serialization format, used as a file extension.
    pub format: String,
    /// Optional schema identifier the content conforms to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

impl MetadataType {
    /// Create a metadata type without a schema.
    pub fn new(name: impl Into<String>, format: impl Into<String>) -> Self {
        MetadataType {
            name: name.into(),
            format: format.into(),
            schema: None,
        }
    }

    /// Attach a schema identifier.
    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }
}

/**
 * Serialized metadata of a single [`MetadataType`] attached to a
 * submission.
 */
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MetadataEntry {
    /// The metadata type.
    #[serde(rename = "type")]
    pub kind: MetadataType,
    /// Serialized content.
    pub content: String,
}

/**
 * A submission information package.
 */
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Submission {
    id: SubmissionId,
    agent: serde_json::Value,
    archivable: bool,
    archived: bool,
    files: Vec<SubmissionFile>,
    metadata: Vec<MetadataEntry>,
}

impl Submission {
    /**
     * Create a new submission with a fresh identifier.  The optional
     * `agent` describes who deposited it and is validated against the agent
     * schema; `None` records an empty agent.  An agent object without a
     * `$schema` key is stamped with [`AGENT_SCHEMA_ID`].
     *
     * [`AGENT_SCHEMA_ID`]: crate::schema::AGENT_SCHEMA_ID
     */
    pub fn create(
        archivable: bool,
        agent: Option<serde_json::Value>,
    ) -> Result<Self> {
        Self::with_id(SubmissionId::generate(), archivable, agent)
    }

    /**
     * Create a submission with a caller supplied identifier.
     */
    pub fn with_id(
        id: SubmissionId,
        archivable: bool,
        agent: Option<serde_json::Value>,
    ) -> Result<Self> {
        let mut agent = agent.unwrap_or_else(|| serde_json::json!({}));
        if let Some(obj) = agent.as_object_mut() {
            obj.entry("$schema")
                .or_insert_with(|| schema::AGENT_SCHEMA_ID.into());
        }
        schema::validate_agent(&agent)?;
        Ok(Submission {
            id,
            agent,
            archivable,
            archived: false,
            files: Vec::new(),
            metadata: Vec::new(),
        })
    }

    /// The submission identifier.
    pub fn id(&self) -> SubmissionId {
        self.id
    }

    /// The depositing agent.
    pub fn agent(&self) -> &serde_json::Value {
        &self.agent
    }

    /// Whether the submission may be archived.
    pub fn archivable(&self) -> bool {
        self.archivable
    }

    /// Whether a package has been successfully written.
    pub fn archived(&self) -> bool {
        self.archived
    }

    pub(crate) fn set_archived(&mut self, archived: bool) {
        self.archived = archived;
    }

    /// File attachments in attachment order.
    pub fn files(&self) -> &[SubmissionFile] {
        &self.files
    }

    /// Metadata entries in attachment order, including the reserved
    /// manifest record entry if one has been saved.
    pub fn metadata(&self) -> &[MetadataEntry] {
        &self.metadata
    }

    /**
     * Look up the metadata entry of a given type name.
     */
    pub fn metadata_entry(&self, name: &str) -> Option<&MetadataEntry> {
        self.metadata.iter().find(|m| m.kind.name == name)
    }

    /**
     * Attach content under `filepath`.  Paths must be unique within the
     * submission and no longer than [`FILEPATH_MAX_LEN`].
     */
    pub fn attach_file(
        &mut self,
        filepath: impl Into<String>,
        file_id: ContentId,
    ) -> Result<&SubmissionFile> {
        let filepath = filepath.into();
        if filepath.is_empty() {
            return Err(Error::Validation("empty filepath".to_string()));
        }
        if filepath.len() > FILEPATH_MAX_LEN {
            return Err(Error::Validation(format!(
                "filepath exceeds {FILEPATH_MAX_LEN} bytes: {filepath}"
            )));
        }
        if self.files.iter().any(|f| f.filepath == filepath) {
            return Err(Error::Validation(format!(
                "duplicate filepath in submission {}: {filepath}",
                self.id
            )));
        }
        self.files.push(SubmissionFile { filepath, file_id });
        Ok(&self.files[self.files.len() - 1])
    }

    /**
     * Attach metadata of a given type.  At most one entry per type is
     * allowed, and the reserved manifest record type is rejected.
     */
    pub fn attach_metadata(
        &mut self,
        kind: MetadataType,
        content: impl Into<String>,
    ) -> Result<&MetadataEntry> {
        if kind.name == RESERVED_METADATA_TYPE {
            return Err(Error::Validation(format!(
                "metadata type '{RESERVED_METADATA_TYPE}' is reserved"
            )));
        }
        if self.metadata_entry(&kind.name).is_some() {
            return Err(Error::Validation(format!(
                "duplicate metadata type in submission {}: {}",
                self.id, kind.name
            )));
        }
        self.metadata.push(MetadataEntry {
            kind,
            content: content.into(),
        });
        Ok(&self.metadata[self.metadata.len() - 1])
    }

    /*
     * Insert or replace an entry without the reserved-name check, used for
     * persisting the manifest record.
     */
    pub(crate) fn replace_metadata(&mut self, kind: MetadataType, content: String) {
        match self.metadata.iter_mut().find(|m| m.kind.name == kind.name) {
            Some(entry) => {
                entry.kind = kind;
                entry.content = content;
            }
            None => self.metadata.push(MetadataEntry { kind, content }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_arena_bytes() {
        let mut arena = ContentArena::new();
        let id = arena.add_bytes("test");
        let instance = arena.instance(&id).cloned();
        assert_eq!(instance.as_ref().map(|i| i.size), Some(4));
        assert_eq!(
            instance.map(|i| i.checksum),
            Some("md5:098f6bcd4621d373cade4e832627b4f6".to_string())
        );
        let mut buf = String::new();
        arena
            .open(&id)
            .and_then(|mut r| r.read_to_string(&mut buf))
            .ok();
        assert_eq!(buf, "test");
        assert!(arena.open(&ContentId::generate()).is_err());
    }

    #[test]
    fn content_arena_path() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("third.txt");
        std::fs::write(&path, "test-third")?;
        let mut arena = ContentArena::new();
        let id = arena.add_path(&path)?;
        let instance = arena.instance(&id);
        assert_eq!(instance.map(|i| i.size), Some(10));
        assert_eq!(
            instance.map(|i| i.checksum.as_str()),
            Some("md5:f1d2f9e84f147fed5fab05c6f8210c6f")
        );
        assert!(matches!(
            arena.add_path(dir.path().join("missing")),
            Err(Error::Storage { .. })
        ));
        Ok(())
    }

    #[test]
    fn attach_file_rules() -> Result<()> {
        let mut sip = Submission::create(true, None)?;
        let id = ContentId::generate();
        sip.attach_file("a.txt", id)?;
        /* Same content under a different path is fine. */
        sip.attach_file("b.txt", id)?;
        assert!(matches!(
            sip.attach_file("a.txt", ContentId::generate()),
            Err(Error::Validation(_))
        ));
        let long = "x".repeat(FILEPATH_MAX_LEN + 1);
        assert!(matches!(
            sip.attach_file(long, id),
            Err(Error::Validation(_))
        ));
        sip.attach_file("y".repeat(FILEPATH_MAX_LEN), id)?;
        assert_eq!(sip.files().len(), 3);
        Ok(())
    }

    #[test]
    fn attach_metadata_rules() -> Result<()> {
        let mut sip = Submission::create(true, None)?;
        sip.attach_metadata(MetadataType::new("json", "json"), "{}")?;
        assert!(
            sip.attach_metadata(MetadataType::new("json", "json"), "[]")
                .is_err()
        );
        assert!(
            sip.attach_metadata(MetadataType::new("bagit", "json"), "{}")
                .is_err()
        );
        sip.replace_metadata(MetadataType::new("bagit", "json"), "{}".into());
        sip.replace_metadata(MetadataType::new("bagit", "json"), "[]".into());
        assert_eq!(sip.metadata().len(), 2);
        assert_eq!(
            sip.metadata_entry("bagit").map(|m| m.content.as_str()),
            Some("[]")
        );
        Ok(())
    }

    #[test]
    fn agent_is_validated() -> Result<()> {
        let sip = Submission::create(
            false,
            Some(serde_json::json!({"email": "user@example.org"})),
        )?;
        assert!(!sip.archivable());
        assert!(!sip.archived());
        assert_eq!(sip.agent()["email"], "user@example.org");
        assert_eq!(sip.agent()["$schema"], schema::AGENT_SCHEMA_ID);

        /* An explicit schema is kept, and an absent agent is stamped too. */
        let custom = Submission::create(
            true,
            Some(serde_json::json!({"$schema": "urn:custom"})),
        )?;
        assert_eq!(custom.agent()["$schema"], "urn:custom");
        let anonymous = Submission::create(true, None)?;
        assert_eq!(
            anonymous.agent(),
            &serde_json::json!({"$schema": schema::AGENT_SCHEMA_ID})
        );
        assert!(matches!(
            Submission::create(true, Some(serde_json::json!("nobody"))),
            Err(Error::Schema(_))
        ));
        Ok(())
    }

    #[test]
    fn id_round_trip() -> std::result::Result<(), uuid::Error> {
        let s = "abcd0000-1111-2222-3333-444455556666";
        let id = SubmissionId::from_str(s)?;
        assert_eq!(id.to_string(), s);
        assert!(ContentId::from_str("not-a-uuid").is_err());
        Ok(())
    }
}
