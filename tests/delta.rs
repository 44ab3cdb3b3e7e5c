use anyhow::Result;
use indoc::formatdoc;
use sipstore::bagit::{ArchiveOptions, BagItArchiver};
use sipstore::cache;
use sipstore::config::ArchiverConfig;
use sipstore::error::Error;
use sipstore::model::{ContentArena, ContentId, Submission};
use sipstore::storage::LocalStorage;
use sipstore::verify::Bag;
use sipstore::writer::no_progress;
use std::fs;
use std::path::Path;

struct Contents {
    arena: ContentArena,
    test: ContentId,
    second: ContentId,
    third: ContentId,
}

fn contents() -> Contents {
    let mut arena = ContentArena::new();
    let test = arena.add_bytes("test");
    let second = arena.add_bytes("test-second");
    let third = arena.add_bytes("test-third");
    Contents {
        arena,
        test,
        second,
        third,
    }
}

fn sip(files: &[(&str, ContentId)]) -> Result<Submission> {
    let mut sip = Submission::create(true, None)?;
    for (path, id) in files {
        sip.attach_file(*path, *id)?;
    }
    Ok(sip)
}

fn read(root: &Path, dir: &str, name: &str) -> Result<String> {
    Ok(fs::read_to_string(root.join(dir).join(name))?)
}

#[test]
fn patch_package_fetches_unchanged_content() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let storage = LocalStorage::new(dir.path())?;
    let archiver = BagItArchiver::new(&storage, ArchiverConfig::default());
    let c = contents();

    let mut base = sip(&[("foobar.txt", c.test), ("foobar2.txt", c.second)])?;
    archiver.archive(&mut base, &c.arena, &ArchiveOptions::default(), &mut no_progress)?;
    let base_dir = storage.path(&archiver.package_dir(&base))?;

    let mut patch = sip(&[
        ("foobar.txt", c.test),
        ("foobar2-renamed.txt", c.second),
        ("foobar3.txt", c.third),
    ])?;
    let options = ArchiveOptions::default().patch_of(&base);
    let files = archiver.archive(&mut patch, &c.arena, &options, &mut no_progress)?;
    assert!(patch.archived());
    assert_eq!(files.iter().filter(|f| f.fetched).count(), 2);

    let patch_key = archiver.package_dir(&patch);
    let root = storage.root();
    assert_eq!(
        read(root, &patch_key, "fetch.txt")?,
        formatdoc! {"
            {base} 4 data/files/foobar.txt
            {base2} 11 data/files/foobar2-renamed.txt",
            base = base_dir.join("data/files/foobar.txt").display(),
            base2 = base_dir.join("data/files/foobar2.txt").display(),
        }
    );
    assert_eq!(
        read(root, &patch_key, "manifest-md5.txt")?,
        formatdoc! {"
            098f6bcd4621d373cade4e832627b4f6 data/files/foobar.txt
            {second} data/files/foobar2-renamed.txt
            f1d2f9e84f147fed5fab05c6f8210c6f data/files/foobar3.txt",
            second = sipstore::Digest::MD5.hash_bytes(b"test-second"),
        }
    );
    /* Payload-Oxum only counts what the patch stores itself. */
    assert!(read(root, &patch_key, "bag-info.txt")?.contains("\nPayload-Oxum: 10.1\n"));

    /* Only the new content is stored in the patch. */
    let pkg = storage.path(&patch_key)?;
    assert!(pkg.join("data/files/foobar3.txt").exists());
    assert!(!pkg.join("data/files/foobar.txt").exists());
    assert!(!pkg.join("data/files/foobar2-renamed.txt").exists());

    let tagmanifest = read(root, &patch_key, "tagmanifest-md5.txt")?;
    let names: Vec<&str> = tagmanifest
        .lines()
        .filter_map(|l| l.split_once(' ').map(|(_, n)| n))
        .collect();
    assert_eq!(
        names,
        ["fetch.txt", "bag-info.txt", "manifest-md5.txt", "bagit.txt"]
    );

    let bag = Bag::open(&storage, &patch_key)?;
    assert_eq!(bag.fetch().len(), 2);
    assert!(bag.verify(&storage)?.is_empty());
    Ok(())
}

#[test]
fn include_missing_keeps_removed_files() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let storage = LocalStorage::new(dir.path())?;
    let archiver = BagItArchiver::new(&storage, ArchiverConfig::default());
    let c = contents();

    let mut base = sip(&[("foobar.txt", c.test), ("foobar2.txt", c.second)])?;
    archiver.archive(&mut base, &c.arena, &ArchiveOptions::default(), &mut no_progress)?;

    let mut without = sip(&[("foobar2.txt", c.second), ("foobar3.txt", c.third)])?;
    let mut with = sip(&[("foobar2.txt", c.second), ("foobar3.txt", c.third)])?;

    let options = ArchiveOptions::default().patch_of(&base);
    archiver.archive(&mut without, &c.arena, &options, &mut no_progress)?;
    let record = cache::get(&without)?.ok_or_else(|| anyhow::anyhow!("no record"))?;
    let fetched: Vec<ContentId> = record.fetched().filter_map(|f| f.file_uuid).collect();
    assert_eq!(fetched, [c.second]);

    let options = options.include_missing(true);
    archiver.archive(&mut with, &c.arena, &options, &mut no_progress)?;
    let record = cache::get(&with)?.ok_or_else(|| anyhow::anyhow!("no record"))?;
    let fetched: Vec<&str> = record.fetched().map(|f| f.filename.as_str()).collect();
    assert_eq!(fetched, ["data/files/foobar.txt", "data/files/foobar2.txt"]);
    assert_eq!(record.stored().filter(|f| f.is_data()).count(), 1);

    /* The removed file is listed in the manifest and still verifies. */
    let bag = Bag::open(&storage, &archiver.package_dir(&with))?;
    assert_eq!(bag.manifest().len(), 3);
    assert!(bag.verify(&storage)?.is_empty());
    Ok(())
}

#[test]
fn chained_patches_point_at_stored_copies() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let storage = LocalStorage::new(dir.path())?;
    let archiver = BagItArchiver::new(&storage, ArchiverConfig::default());
    let c = contents();

    let mut first = sip(&[("foobar.txt", c.test)])?;
    archiver.archive(&mut first, &c.arena, &ArchiveOptions::default(), &mut no_progress)?;

    let mut second = sip(&[("foobar.txt", c.test), ("foobar2.txt", c.second)])?;
    let options = ArchiveOptions::default().patch_of(&first);
    archiver.archive(&mut second, &c.arena, &options, &mut no_progress)?;

    let mut third = sip(&[("foobar.txt", c.test), ("foobar2.txt", c.second)])?;
    let options = ArchiveOptions::default().patch_of(&second);
    let files = archiver.archive(&mut third, &c.arena, &options, &mut no_progress)?;
    assert!(files.iter().filter(|f| f.is_data()).all(|f| f.fetched));

    let first_dir = storage.path(&archiver.package_dir(&first))?;
    let second_dir = storage.path(&archiver.package_dir(&second))?;
    let bag = Bag::open(&storage, &archiver.package_dir(&third))?;
    let urls: Vec<&str> = bag.fetch().iter().map(|f| f.url.as_str()).collect();
    assert_eq!(
        urls,
        [
            first_dir.join("data/files/foobar.txt").display().to_string(),
            second_dir.join("data/files/foobar2.txt").display().to_string(),
        ]
    );
    assert!(bag.verify(&storage)?.is_empty());
    Ok(())
}

#[test]
fn patch_of_unarchived_submission() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let storage = LocalStorage::new(dir.path())?;
    let archiver = BagItArchiver::new(&storage, ArchiverConfig::default());
    let c = contents();

    let base = sip(&[("foobar.txt", c.test)])?;
    let mut patch = sip(&[("foobar.txt", c.test)])?;
    let options = ArchiveOptions::default().patch_of(&base);
    let err = archiver.archive(&mut patch, &c.arena, &options, &mut no_progress);
    assert!(matches!(err, Err(Error::NotFound(id)) if id == base.id()));
    assert!(!patch.archived());
    assert!(cache::get(&patch)?.is_none());
    Ok(())
}
