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
 * Split the files of a submission into those a patch package fetches from
 * a base package and those it stores itself.
 *
 * Content is compared by [`ContentId`] only.  Given the data files of the
 * base's manifest record and the attachments of the current submission:
 *
 * * content in both is fetched from wherever the base keeps it;
 * * content only in the current submission is stored;
 * * content only in the base is dropped, or fetched anyway when
 *   `include_missing` is set, so that the patch still describes the full
 *   base payload.
 *
 * A fetched entry keeps the base's size, checksum and locator.  When the
 * content is still attached, the entry takes the name the current
 * submission would give it, so renames are honoured.  Content removed from
 * the current submission keeps the base's filename.
 */

use indexmap::{IndexMap, IndexSet};

use crate::manifest::{FileInfo, ManifestRecord};
use crate::model::{ContentId, SubmissionFile};

/**
 * Result of [`resolve`].
 */
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Delta<'a> {
    /// Fetched entries, in base manifest order.
    pub fetch: Vec<FileInfo>,
    /// Attachments to store, in attachment order.
    pub store: Vec<&'a SubmissionFile>,
}

impl Delta<'_> {
    /// Content identifiers referenced from `fetch.txt`.
    pub fn fetched_ids(&self) -> IndexSet<ContentId> {
        self.fetch.iter().filter_map(|f| f.file_uuid).collect()
    }

    /// Content identifiers physically stored in the patch.
    pub fn stored_ids(&self) -> IndexSet<ContentId> {
        self.store.iter().map(|f| f.file_id).collect()
    }
}

/**
 * Compare `current` against the `base` record.  `name` gives the
 * package-relative filename the current submission uses for an attachment.
 */
pub fn resolve<'a, F>(
    current: &'a [SubmissionFile],
    base: &ManifestRecord,
    include_missing: bool,
    name: F,
) -> Delta<'a>
where
    F: Fn(&SubmissionFile) -> String,
{
    let mut base_files: IndexMap<ContentId, &FileInfo> = IndexMap::new();
    for info in base.data_files() {
        if let Some(id) = info.file_uuid {
            base_files.entry(id).or_insert(info);
        }
    }

    let mut attached: IndexMap<ContentId, Vec<&SubmissionFile>> = IndexMap::new();
    for file in current {
        attached.entry(file.file_id).or_default().push(file);
    }

    let mut fetch = Vec::new();
    for (id, info) in &base_files {
        match attached.get(id) {
            Some(files) => {
                for file in files {
                    fetch.push(FileInfo {
                        filename: name(file),
                        filepath: Some(file.filepath.clone()),
                        fetched: true,
                        ..(*info).clone()
                    });
                }
            }
            None if include_missing => fetch.push(FileInfo {
                fetched: true,
                ..(*info).clone()
            }),
            None => {}
        }
    }

    let store: Vec<&SubmissionFile> = current
        .iter()
        .filter(|f| !base_files.contains_key(&f.file_id))
        .collect();

    let delta = Delta { fetch, store };
    debug_assert!(delta.fetched_ids().is_disjoint(&delta.stored_ids()));
    delta
}
