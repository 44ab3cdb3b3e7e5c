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
 *
 * Bag a set of local files as a submission, optionally as a patch of an
 * earlier submission.
 */

use anyhow::{Result, bail};
use sipstore::bagit::{ArchiveOptions, BagItArchiver};
use sipstore::config::ArchiverConfig;
use sipstore::model::{ContentArena, ContentId, Submission};
use sipstore::naming::FileNaming;
use sipstore::serialize::serialize_to_file;
use sipstore::storage::LocalStorage;
use sipstore::verify::Bag;
use sipstore::writer::Progress;
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::path::PathBuf;
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, StructOpt)]
#[structopt(name = "bag-submission", about = "Archive files as a BagIt package")]
pub struct OptArgs {
    /// Storage root directory
    #[structopt(short = "r", long = "root", default_value = "sipstore", parse(from_os_str))]
    root: PathBuf,

    /// Use sanitised filenames inside the package
    #[structopt(short = "s", long = "secure")]
    secure: bool,

    /// Files of an earlier submission to archive first and patch against
    #[structopt(short = "b", long = "base", parse(from_os_str))]
    base: Vec<PathBuf>,

    /// Include files removed since the base submission in fetch.txt
    #[structopt(short = "m", long = "include-missing")]
    include_missing: bool,

    /// Write the package as a tarball to this file as well
    #[structopt(short = "o", long = "output", parse(from_os_str))]
    output: Option<PathBuf>,

    /// Files to archive
    #[structopt(parse(from_os_str))]
    files: Vec<PathBuf>,
}

/*
 * Register each path once so that the same file in the base and the
 * current submission shares a content identifier.
 */
fn submission(
    paths: &[PathBuf],
    arena: &mut ContentArena,
    seen: &mut HashMap<PathBuf, ContentId>,
) -> Result<Submission> {
    let mut sip = Submission::create(true, None)?;
    for path in paths {
        let id = match seen.get(path) {
            Some(id) => *id,
            None => {
                let id = arena.add_path(path)?;
                seen.insert(path.clone(), id);
                id
            }
        };
        let Some(name) = path.file_name() else {
            bail!("{}: not a file", path.display());
        };
        sip.attach_file(name.to_string_lossy(), id)?;
    }
    Ok(sip)
}

fn report(p: &Progress<'_>) -> ControlFlow<()> {
    println!(
        "[{}/{}] {:>10} {}",
        p.copied_files, p.total_files, p.current_filesize, p.current_filename
    );
    ControlFlow::Continue(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = OptArgs::from_args();
    if args.files.is_empty() {
        bail!("no files to archive");
    }

    let storage = LocalStorage::new(&args.root)?;
    let mut config = ArchiverConfig::default();
    if args.secure {
        config = config.with_naming(FileNaming::Secure);
    }
    let archiver = BagItArchiver::new(&storage, config);

    let mut arena = ContentArena::new();
    let mut seen = HashMap::new();

    let base = if args.base.is_empty() {
        None
    } else {
        let mut base = submission(&args.base, &mut arena, &mut seen)?;
        archiver.archive(&mut base, &arena, &ArchiveOptions::default(), &mut report)?;
        println!("base {} -> {}", base.id(), archiver.package_dir(&base));
        Some(base)
    };

    let mut sip = submission(&args.files, &mut arena, &mut seen)?;
    let mut options = ArchiveOptions::default().include_missing(args.include_missing);
    if let Some(base) = &base {
        options = options.patch_of(base);
    }
    archiver.archive(&mut sip, &arena, &options, &mut report)?;

    let dir = archiver.package_dir(&sip);
    println!("submission {} -> {dir}", sip.id());

    let problems = Bag::open(&storage, &dir)?.verify(&storage)?;
    for problem in &problems {
        eprintln!("{problem}");
    }
    if !problems.is_empty() {
        bail!("package {dir} failed verification");
    }

    if let Some(output) = &args.output {
        serialize_to_file(storage.path(&dir)?, output)?;
        println!("wrote {}", output.display());
    }
    Ok(())
}
