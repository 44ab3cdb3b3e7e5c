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
 * Persist [`ManifestRecord`] values on their submission.
 *
 * The record is stored as JSON in a metadata entry of the reserved
 * [`RESERVED_METADATA_TYPE`] type.  Once saved it is the authoritative plan
 * of the package: archiving the submission again writes exactly the same
 * files, and patch packages of later submissions resolve against it.
 */

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::manifest::ManifestRecord;
use crate::model::{MetadataType, RESERVED_METADATA_TYPE, Submission};
use crate::schema::{self, BAGIT_SCHEMA_ID};

/**
 * The metadata type the record is stored under.
 */
pub fn record_type() -> MetadataType {
    MetadataType::new(RESERVED_METADATA_TYPE, "json").with_schema(BAGIT_SCHEMA_ID)
}

/**
 * Load the cached record of `sip`, if it has one.
 */
pub fn get(sip: &Submission) -> Result<Option<ManifestRecord>> {
    match sip.metadata_entry(RESERVED_METADATA_TYPE) {
        Some(entry) => Ok(Some(serde_json::from_str(&entry.content)?)),
        None => Ok(None),
    }
}

/**
 * Validate `record` against the manifest record schema and store it on
 * `sip`.
 *
 * An existing record is only replaced when `overwrite` is set.  Note that
 * replacing a record does not revisit patch packages of other submissions
 * that were built against it.
 */
pub fn save(sip: &mut Submission, record: &ManifestRecord, overwrite: bool) -> Result<()> {
    let existing = sip.metadata_entry(RESERVED_METADATA_TYPE).is_some();
    if existing && !overwrite {
        return Err(Error::Conflict(sip.id()));
    }
    let value = serde_json::to_value(record)?;
    schema::validate_manifest_record(&value)?;
    if existing {
        warn!(
            submission = %sip.id(),
            "replacing package manifest record, dependent patch packages are not revalidated"
        );
    }
    sip.replace_metadata(record_type(), serde_json::to_string(&value)?);
    debug!(submission = %sip.id(), files = record.files.len(), "saved package manifest record");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::FileInfo;

    fn record(content: &str) -> ManifestRecord {
        ManifestRecord::new(vec![FileInfo {
            filename: "bagit.txt".to_string(),
            path: "/p/bagit.txt".to_string(),
            size: content.len() as u64,
            checksum: "md5:00".to_string(),
            content: Some(content.to_string()),
            ..Default::default()
        }])
    }

    #[test]
    fn save_and_get() -> Result<()> {
        let mut sip = Submission::create(true, None)?;
        assert_eq!(get(&sip)?, None);
        save(&mut sip, &record("a"), false)?;
        assert_eq!(get(&sip)?, Some(record("a")));
        assert_eq!(
            sip.metadata_entry("bagit").and_then(|m| m.kind.schema.clone()),
            Some(BAGIT_SCHEMA_ID.to_string())
        );

        assert!(matches!(
            save(&mut sip, &record("b"), false),
            Err(Error::Conflict(id)) if id == sip.id()
        ));
        assert_eq!(get(&sip)?, Some(record("a")));

        save(&mut sip, &record("b"), true)?;
        assert_eq!(get(&sip)?, Some(record("b")));
        assert_eq!(sip.metadata().len(), 1);
        Ok(())
    }

    #[test]
    fn invalid_record_rejected() -> Result<()> {
        let mut sip = Submission::create(true, None)?;
        let mut bad = record("a");
        bad.files[0].content = None;
        assert!(matches!(save(&mut sip, &bad, false), Err(Error::Schema(_))));
        assert_eq!(get(&sip)?, None);
        Ok(())
    }
}
