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
 * Archive submissions as BagIt packages.
 *
 * A package is planned once, the plan is cached on the submission as a
 * [`ManifestRecord`], and the record is then written out by a
 * [`PackageWriter`].  Archiving the same submission again reuses the
 * cached record, so the package is rewritten byte for byte.
 *
 * A package laid out with the default configuration looks like this:
 *
 * ```text
 * archive/ab/cd/0000-1111-2222-3333-444455556666/
 *     bagit.txt
 *     bag-info.txt
 *     fetch.txt               (patch packages only)
 *     manifest-md5.txt
 *     tagmanifest-md5.txt
 *     data/files/...          (data files)
 *     data/metadata/...       (metadata files)
 *     data/filenames.txt      (non-identity naming only)
 * ```
 *
 * ## Patch packages
 *
 * When archived with [`ArchiveOptions::patch_of`], content that the base
 * submission's package already holds is not copied again.  It is listed in
 * `fetch.txt` with the base package's locator, and still appears in
 * `manifest-md5.txt` so that the package is complete once fetched.  See
 * [`delta`](crate::delta) for the exact rules.
 *
 * ## Examples
 *
 * ```
 * use sipstore::bagit::{ArchiveOptions, BagItArchiver};
 * use sipstore::config::ArchiverConfig;
 * use sipstore::model::{ContentArena, Submission};
 * use sipstore::storage::LocalStorage;
 * use sipstore::writer::no_progress;
 *
 * fn main() -> anyhow::Result<()> {
 *     let dir = tempfile::tempdir()?;
 *     let storage = LocalStorage::new(dir.path())?;
 *     let archiver = BagItArchiver::new(&storage, ArchiverConfig::default());
 *
 *     let mut arena = ContentArena::new();
 *     let mut sip = Submission::create(true, None)?;
 *     sip.attach_file("foobar.txt", arena.add_bytes("test"))?;
 *
 *     let files = archiver.archive(
 *         &mut sip,
 *         &arena,
 *         &ArchiveOptions::default(),
 *         &mut no_progress,
 *     )?;
 *     assert!(sip.archived());
 *     assert_eq!(files.len(), 5);
 *     Ok(())
 * }
 * ```
 */

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::{debug, info};

use crate::cache;
use crate::config::{ArchiverConfig, SOFTWARE_AGENT, TagValue};
use crate::delta;
use crate::digest::{Digest, parse_checksum};
use crate::error::{Error, Result};
use crate::manifest::{FileInfo, ManifestRecord, Planner};
use crate::model::{ContentSource, Submission, SubmissionFile};
use crate::storage::{Storage, join};
use crate::writer::{PackageWriter, ProgressFn};

/** Bag declaration filename. */
pub const BAGIT_FILE: &str = "bagit.txt";
/** Bag metadata filename. */
pub const BAGINFO_FILE: &str = "bag-info.txt";
/** Fetch list filename. */
pub const FETCH_FILE: &str = "fetch.txt";
/** Payload manifest filename. */
pub const MANIFEST_FILE: &str = "manifest-md5.txt";
/** Tag manifest filename. */
pub const TAGMANIFEST_FILE: &str = "tagmanifest-md5.txt";

/** BagIt version written to `bagit.txt`. */
pub const BAGIT_VERSION: &str = "0.97";

/** `strftime` format of the `Bagging-Date` tag. */
pub const BAGGING_DATE_FORMAT: &str = "%Y-%m-%d_%H:%M:%S:%6f";

const BAGGING_DATE: &str = "Bagging-Date";
const PAYLOAD_OXUM: &str = "Payload-Oxum";

/**
 * Contents of `fetch.txt`: `<path> <size> <filename>` for each fetched
 * entry.
 */
pub fn fetch_file(files: &[FileInfo]) -> String {
    files
        .iter()
        .filter(|f| f.fetched)
        .map(|f| format!("{} {} {}", f.path, f.size, f.filename))
        .collect::<Vec<_>>()
        .join("\n")
}

/**
 * Contents of an MD5 manifest: `<hex> <filename>` for each entry.  Every
 * checksum must use the `md5:` prefix.
 */
pub fn manifest_file<'f, I>(files: I) -> Result<String>
where
    I: IntoIterator<Item = &'f FileInfo>,
{
    let lines = files
        .into_iter()
        .map(|f| {
            let hex = parse_checksum(&f.checksum, Digest::MD5)?;
            Ok(format!("{hex} {}", f.filename))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(lines.join("\n"))
}

/**
 * Contents of `bagit.txt`.
 */
pub fn bagit_file() -> String {
    format!("BagIt-Version: {BAGIT_VERSION}\nTag-File-Character-Encoding: UTF-8")
}

/**
 * Contents of `bag-info.txt`: `<Tag>: <value>` for each tag, in order.
 */
pub fn baginfo_file(tags: &IndexMap<String, String>) -> String {
    tags.iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/**
 * `Payload-Oxum` value of a set of payload entries: total octets, a dot,
 * and the number of files.
 */
pub fn payload_oxum<'f, I>(files: I) -> String
where
    I: IntoIterator<Item = &'f FileInfo>,
{
    let (size, count) = files
        .into_iter()
        .fold((0u64, 0usize), |(size, count), f| (size + f.size, count + 1));
    format!("{size}.{count}")
}

/**
 * The base a patch package is resolved against.
 */
#[derive(Clone, Copy, Debug)]
pub struct PatchBase<'a> {
    /// Manifest record of the base submission.
    pub record: &'a ManifestRecord,
    /// Keep content that was removed since the base in the fetch list.
    pub include_missing: bool,
}

/**
 * An archive format.  Implementations split archiving into a pure
 * planning step and a writing step.
 */
pub trait Archiver {
    /**
     * Plan the complete package of `sip`, as a patch of `base` if given.
     * Does not write anything.
     */
    fn plan(
        &self,
        sip: &Submission,
        content: &dyn ContentSource,
        base: Option<PatchBase<'_>>,
    ) -> Result<ManifestRecord>;

    /**
     * Write a planned package.  Returns every entry of the record, with
     * written entries updated to what was actually stored.
     */
    fn write(
        &self,
        sip: &Submission,
        content: &dyn ContentSource,
        record: &ManifestRecord,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Vec<FileInfo>>;
}

/**
 * Options for [`BagItArchiver::archive`].
 */
#[derive(Clone, Copy, Debug, Default)]
pub struct ArchiveOptions<'a> {
    /// Write a patch package against this previously archived submission.
    pub patch_of: Option<&'a Submission>,
    /// With `patch_of`, keep content removed since the base.
    pub include_missing: bool,
    /// Replan even if a manifest record is already cached.
    pub overwrite: bool,
}

impl<'a> ArchiveOptions<'a> {
    /// Archive as a patch of `base`.
    #[must_use]
    pub fn patch_of(mut self, base: &'a Submission) -> Self {
        self.patch_of = Some(base);
        self
    }

    /// Keep content removed since the patch base.
    #[must_use]
    pub fn include_missing(mut self, include: bool) -> Self {
        self.include_missing = include;
        self
    }

    /// Replace a cached manifest record.
    #[must_use]
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/**
 * Archives submissions as BagIt packages into a [`Storage`].
 */
pub struct BagItArchiver<'a> {
    storage: &'a dyn Storage,
    config: ArchiverConfig,
}

impl<'a> BagItArchiver<'a> {
    /**
     * Create an archiver writing into `storage`.
     */
    pub fn new(storage: &'a dyn Storage, config: ArchiverConfig) -> Self {
        BagItArchiver { storage, config }
    }

    /// The configuration in use.
    pub fn config(&self) -> &ArchiverConfig {
        &self.config
    }

    /**
     * Storage key of the package directory of `sip`.
     */
    pub fn package_dir(&self, sip: &Submission) -> String {
        self.config.package_dir(sip)
    }

    /**
     * Plan the package of `sip` as if it was bagged at `date`.  Given the
     * same inputs and date the result is always identical.
     */
    pub fn plan_at(
        &self,
        sip: &Submission,
        content: &dyn ContentSource,
        base: Option<PatchBase<'_>>,
        date: DateTime<Utc>,
    ) -> Result<ManifestRecord> {
        let planner = Planner::new(self.storage, &self.config, sip);

        let mut payload = Vec::new();
        let stored: Vec<&SubmissionFile> = match base {
            Some(base) => {
                let delta = delta::resolve(
                    sip.files(),
                    base.record,
                    base.include_missing,
                    |f| planner.data_filename(f),
                );
                debug!(
                    submission = %sip.id(),
                    fetched = delta.fetch.len(),
                    stored = delta.store.len(),
                    "resolved patch package"
                );
                payload.extend(delta.fetch);
                delta.store
            }
            None => sip.files().iter().collect(),
        };
        payload.extend(planner.plan_files(stored, content)?);
        payload.extend(planner.plan_metadata(sip));
        if let Some((name, text)) = self.filenames_mapping(&payload) {
            payload.push(planner.plan_text(name, text));
        }

        let tags = self.tags(sip, &payload, date);
        let mut tag_files = Vec::new();
        if payload.iter().any(|f| f.fetched) {
            tag_files.push(planner.plan_text(FETCH_FILE, fetch_file(&payload)));
        }
        tag_files.push(planner.plan_text(BAGINFO_FILE, baginfo_file(&tags)));
        tag_files.push(planner.plan_text(MANIFEST_FILE, manifest_file(&payload)?));
        tag_files.push(planner.plan_text(BAGIT_FILE, bagit_file()));
        let tagmanifest = manifest_file(&tag_files)?;
        tag_files.push(planner.plan_text(TAGMANIFEST_FILE, tagmanifest));

        payload.extend(tag_files);
        Ok(ManifestRecord::new(payload))
    }

    /*
     * The filename mapping file, when naming is not the identity and a
     * mapping file is configured.
     */
    fn filenames_mapping<'c>(&'c self, payload: &[FileInfo]) -> Option<(&'c str, String)> {
        if self.config.naming.is_identity() {
            return None;
        }
        let name = self.config.filenames_file.as_deref().filter(|n| !n.is_empty())?;
        let text = payload
            .iter()
            .filter_map(|f| f.filepath.as_ref().map(|p| format!("{} {p}", f.filename)))
            .collect::<Vec<_>>()
            .join("\n");
        Some((name, text))
    }

    /*
     * Resolve the configured tags.  Bagging-Date and Payload-Oxum are
     * always computed, and are appended if the configuration does not
     * place them.  Payload-Oxum only counts what this package stores, so
     * fetched entries are left out and the mapping file is counted.
     */
    fn tags(
        &self,
        sip: &Submission,
        payload: &[FileInfo],
        date: DateTime<Utc>,
    ) -> IndexMap<String, String> {
        let generated = [
            (BAGGING_DATE, date.format(BAGGING_DATE_FORMAT).to_string()),
            (PAYLOAD_OXUM, payload_oxum(payload.iter().filter(|f| !f.fetched))),
        ];
        let mut tags = IndexMap::new();
        for (name, value) in &self.config.tags {
            if let Some((_, v)) = generated.iter().find(|(g, _)| *g == name.as_str()) {
                tags.insert(name.clone(), v.clone());
                continue;
            }
            let value = match value {
                TagValue::Text(text) => text.clone(),
                TagValue::SubmissionId => sip.id().to_string(),
                TagValue::Software => SOFTWARE_AGENT.to_string(),
                TagValue::Generated => continue,
            };
            tags.insert(name.clone(), value);
        }
        for (name, value) in generated {
            tags.entry(name.to_string()).or_insert(value);
        }
        tags
    }

    /**
     * Archive `sip`, creating or reusing its manifest record and writing
     * the package.  Sets the archived flag on success.
     */
    pub fn archive(
        &self,
        sip: &mut Submission,
        content: &dyn ContentSource,
        options: &ArchiveOptions<'_>,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Vec<FileInfo>> {
        if !sip.archivable() {
            return Err(Error::NotArchivable(sip.id()));
        }

        let record = match cache::get(sip)? {
            Some(record) if !options.overwrite => {
                debug!(submission = %sip.id(), "reusing cached package manifest record");
                record
            }
            previous => {
                let base_record = match options.patch_of {
                    Some(base) => Some(cache::get(base)?.ok_or(Error::NotFound(base.id()))?),
                    None => None,
                };
                let base = base_record.as_ref().map(|record| PatchBase {
                    record,
                    include_missing: options.include_missing,
                });
                let record = self.plan(sip, content, base)?;
                cache::save(sip, &record, options.overwrite)?;
                if let Some(previous) = previous {
                    self.remove_stale(sip, &previous, &record)?;
                }
                record
            }
        };

        let files = self.write(sip, content, &record, progress)?;
        sip.set_archived(true);
        info!(
            submission = %sip.id(),
            package = %self.package_dir(sip),
            files = files.len(),
            fetched = record.fetched().count(),
            "archived submission"
        );
        Ok(files)
    }

    /*
     * Delete files that a replaced record stored and the new record does
     * not, so that the package directory holds nothing unlisted.
     */
    fn remove_stale(
        &self,
        sip: &Submission,
        previous: &ManifestRecord,
        record: &ManifestRecord,
    ) -> Result<()> {
        let dir = self.package_dir(sip);
        for old in previous.stored() {
            if record.stored().any(|f| f.filename == old.filename) {
                continue;
            }
            let key = join(&dir, &old.filename);
            self.storage
                .remove_file(&key)
                .map_err(|e| Error::storage(&key, e))?;
            debug!(
                submission = %sip.id(),
                filename = %old.filename,
                "removed file no longer in the package"
            );
        }
        Ok(())
    }

    /**
     * Every file of the package of `sip`, from its cached manifest record.
     */
    pub fn all_files(&self, sip: &Submission) -> Result<Vec<FileInfo>> {
        match cache::get(sip)? {
            Some(record) => Ok(record.files),
            None => Err(Error::NotFound(sip.id())),
        }
    }

    /**
     * Delete the package directory of `sip`.  The cached manifest record is
     * kept.
     */
    pub fn remove(&self, sip: &Submission) -> Result<()> {
        let dir = self.package_dir(sip);
        self.storage
            .remove_dir(&dir, true)
            .map_err(|e| Error::storage(&dir, e))?;
        info!(submission = %sip.id(), package = %dir, "removed package");
        Ok(())
    }
}

impl Archiver for BagItArchiver<'_> {
    fn plan(
        &self,
        sip: &Submission,
        content: &dyn ContentSource,
        base: Option<PatchBase<'_>>,
    ) -> Result<ManifestRecord> {
        self.plan_at(sip, content, base, Utc::now())
    }

    fn write(
        &self,
        sip: &Submission,
        content: &dyn ContentSource,
        record: &ManifestRecord,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Vec<FileInfo>> {
        let writer = PackageWriter::new(self.storage, self.package_dir(sip));
        let mut written = writer
            .write_all(sip, content, &record.files, progress)?
            .into_iter();
        record
            .files
            .iter()
            .map(|f| {
                if f.fetched {
                    Ok(f.clone())
                } else {
                    written.next().ok_or_else(|| {
                        Error::Validation(format!("{}: not written", f.filename))
                    })
                }
            })
            .collect()
    }
}
