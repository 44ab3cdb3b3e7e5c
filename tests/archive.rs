use anyhow::Result;
use indoc::{formatdoc, indoc};
use serde_json::json;
use sipstore::bagit::{ArchiveOptions, BagItArchiver};
use sipstore::cache;
use sipstore::config::ArchiverConfig;
use sipstore::digest::Digest;
use sipstore::error::Error;
use sipstore::model::{ContentArena, MetadataType, Submission};
use sipstore::naming::FileNaming;
use sipstore::serialize::{Compression, serialize_bag};
use sipstore::storage::LocalStorage;
use sipstore::verify::{Bag, Problem};
use sipstore::writer::no_progress;
use std::collections::BTreeMap;
use std::fs;
use std::ops::ControlFlow;
use std::path::Path;

const JSON_META: &str = r#"{"title":"Test"}"#;
const MARC_META: &str = "<record/>";

fn snapshot(root: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<String, Vec<u8>>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                walk(root, &path, out)?;
            } else {
                let name = path.strip_prefix(root)?.to_string_lossy().replace('\\', "/");
                out.insert(name, fs::read(&path)?);
            }
        }
        Ok(())
    }
    let mut out = BTreeMap::new();
    walk(root, root, &mut out)?;
    Ok(out)
}

fn text(files: &BTreeMap<String, Vec<u8>>, name: &str) -> String {
    files
        .get(name)
        .map(|b| String::from_utf8_lossy(b).into_owned())
        .unwrap_or_default()
}

fn submission(arena: &mut ContentArena) -> Result<Submission> {
    let mut sip = Submission::create(true, Some(json!({"email": "depositor@example.org"})))?;
    sip.attach_file("foobar.txt", arena.add_bytes("test"))?;
    sip.attach_metadata(MetadataType::new("json", "json"), JSON_META)?;
    sip.attach_metadata(MetadataType::new("marcxml", "xml"), MARC_META)?;
    /* Not in the default allow-list. */
    sip.attach_metadata(MetadataType::new("dublincore", "xml"), "<dc/>")?;
    Ok(sip)
}

#[test]
fn package_contents() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let storage = LocalStorage::new(dir.path())?;
    let archiver = BagItArchiver::new(&storage, ArchiverConfig::default());
    let mut arena = ContentArena::new();
    let mut sip = submission(&mut arena)?;

    let mut events = Vec::new();
    let files = archiver.archive(&mut sip, &arena, &ArchiveOptions::default(), &mut |p| {
        events.push((p.copied_files, p.total_files, p.copied_size, p.total_size));
        ControlFlow::Continue(())
    })?;
    assert!(sip.archived());
    assert_eq!(files.len(), 7);
    assert_eq!(events.len(), 7);
    assert!(events.iter().all(|e| e.1 == 7));
    assert_eq!(events.last().map(|e| e.2), events.last().map(|e| e.3));

    let pkg = storage.path(&archiver.package_dir(&sip))?;
    let id = sip.id().to_string();
    assert!(pkg.ends_with(format!("archive/{}/{}/{}", &id[..2], &id[2..4], &id[4..])));

    let written = snapshot(&pkg)?;
    let names: Vec<&str> = written.keys().map(String::as_str).collect();
    assert_eq!(
        names,
        [
            "bag-info.txt",
            "bagit.txt",
            "data/files/foobar.txt",
            "data/metadata/json.json",
            "data/metadata/marcxml.xml",
            "manifest-md5.txt",
            "tagmanifest-md5.txt"
        ]
    );

    assert_eq!(
        text(&written, "bagit.txt"),
        indoc! {"
            BagIt-Version: 0.97
            Tag-File-Character-Encoding: UTF-8"}
    );
    assert_eq!(
        text(&written, "manifest-md5.txt"),
        formatdoc! {"
            098f6bcd4621d373cade4e832627b4f6 data/files/foobar.txt
            {json} data/metadata/json.json
            {marc} data/metadata/marcxml.xml",
            json = Digest::MD5.hash_bytes(JSON_META.as_bytes()),
            marc = Digest::MD5.hash_bytes(MARC_META.as_bytes()),
        }
    );

    let baginfo = text(&written, "bag-info.txt");
    let oxum = 4 + JSON_META.len() + MARC_META.len();
    assert!(baginfo.starts_with("Bagging-Date: "));
    assert!(baginfo.contains(&format!("\nPayload-Oxum: {oxum}.3\n")));
    assert!(baginfo.contains(&format!("\nExternal-Identifier: {id}\n")));
    assert!(baginfo.contains("\nExternal-Description: BagIt archive of SIP.\n"));
    assert!(baginfo.ends_with(&format!("Bag-Software-Agent: sipstore/{}", env!("CARGO_PKG_VERSION"))));

    let tagmanifest = text(&written, "tagmanifest-md5.txt");
    let lines: Vec<&str> = tagmanifest.lines().collect();
    assert_eq!(lines.len(), 3);
    for (line, name) in lines.iter().zip(["bag-info.txt", "manifest-md5.txt", "bagit.txt"]) {
        let expected = Digest::MD5.hash_bytes(&written[name]);
        assert_eq!(*line, format!("{expected} {name}"));
    }

    /* The record matches what was written, with absolute locators. */
    let record = cache::get(&sip)?.ok_or_else(|| anyhow::anyhow!("no record"))?;
    assert_eq!(record.files, files);
    for f in &files {
        assert_eq!(Path::new(&f.path), pkg.join(&f.filename));
        assert_eq!(f.size, written[&f.filename].len() as u64);
    }
    Ok(())
}

#[test]
fn archive_is_idempotent() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let storage = LocalStorage::new(dir.path())?;
    let archiver = BagItArchiver::new(&storage, ArchiverConfig::default());
    let mut arena = ContentArena::new();
    let mut sip = submission(&mut arena)?;

    let first = archiver.archive(&mut sip, &arena, &ArchiveOptions::default(), &mut no_progress)?;
    let pkg = storage.path(&archiver.package_dir(&sip))?;
    let before = snapshot(&pkg)?;

    let second = archiver.archive(&mut sip, &arena, &ArchiveOptions::default(), &mut no_progress)?;
    assert_eq!(first, second);
    assert_eq!(snapshot(&pkg)?, before);

    /* Removing and re-archiving restores the same bytes from the record. */
    archiver.remove(&sip)?;
    assert!(!pkg.exists());
    archiver.archive(&mut sip, &arena, &ArchiveOptions::default(), &mut no_progress)?;
    assert_eq!(snapshot(&pkg)?, before);
    assert_eq!(archiver.all_files(&sip)?, first);
    Ok(())
}

#[test]
fn overwrite_replans() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let storage = LocalStorage::new(dir.path())?;
    let mut arena = ContentArena::new();
    let mut sip = submission(&mut arena)?;

    let archiver = BagItArchiver::new(&storage, ArchiverConfig::default());
    archiver.archive(&mut sip, &arena, &ArchiveOptions::default(), &mut no_progress)?;

    /* A new configuration is ignored while the cached record is reused... */
    let json_only = ArchiverConfig::default().with_metadata_types(["json"]);
    let archiver = BagItArchiver::new(&storage, json_only);
    let reused = archiver.archive(&mut sip, &arena, &ArchiveOptions::default(), &mut no_progress)?;
    assert_eq!(reused.len(), 7);

    /* ...and takes effect once the record is regenerated. */
    let options = ArchiveOptions::default().overwrite(true);
    let replanned = archiver.archive(&mut sip, &arena, &options, &mut no_progress)?;
    assert_eq!(replanned.len(), 6);
    assert!(replanned.iter().all(|f| f.filename != "data/metadata/marcxml.xml"));
    assert_eq!(cache::get(&sip)?.map(|r| r.files), Some(replanned));

    /* Files dropped from the plan are removed from the package. */
    let pkg_dir = archiver.package_dir(&sip);
    let pkg = storage.path(&pkg_dir)?;
    assert!(!pkg.join("data/metadata/marcxml.xml").exists());
    assert!(pkg.join("data/metadata/json.json").exists());
    assert!(Bag::open(&storage, &pkg_dir)?.verify(&storage)?.is_empty());
    Ok(())
}

#[test]
fn written_package_verifies() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let storage = LocalStorage::new(dir.path())?;
    let archiver = BagItArchiver::new(&storage, ArchiverConfig::default());
    let mut arena = ContentArena::new();
    let mut sip = submission(&mut arena)?;
    archiver.archive(&mut sip, &arena, &ArchiveOptions::default(), &mut no_progress)?;

    let pkg_dir = archiver.package_dir(&sip);
    let bag = Bag::open(&storage, &pkg_dir)?;
    assert_eq!(bag.version(), Some("0.97"));
    assert_eq!(bag.digest(), Digest::MD5);
    assert_eq!(bag.manifest().len(), 3);
    assert_eq!(bag.tagmanifest().len(), 3);
    assert!(bag.fetch().is_empty());
    assert_eq!(
        bag.info().get("External-Identifier"),
        Some(&sip.id().to_string())
    );
    assert!(bag.verify(&storage)?.is_empty());

    let pkg = storage.path(&pkg_dir)?;
    fs::write(pkg.join("data/files/foobar.txt"), "TEST")?;
    let problems = bag.verify(&storage)?;
    assert_eq!(problems.len(), 1);
    assert!(matches!(
        &problems[0],
        Problem::Mismatch { filename, .. } if filename == "data/files/foobar.txt"
    ));

    fs::write(pkg.join("data/files/extra.txt"), "extra")?;
    assert!(
        bag.verify(&storage)?
            .contains(&Problem::Unlisted("data/files/extra.txt".to_string()))
    );
    fs::remove_file(pkg.join("data/files/extra.txt"))?;

    fs::remove_file(pkg.join("data/metadata/marcxml.xml"))?;
    let problems = bag.verify(&storage)?;
    assert!(problems.contains(&Problem::Missing("data/metadata/marcxml.xml".to_string())));
    assert!(problems.iter().any(|p| matches!(p, Problem::Oxum { .. })));
    Ok(())
}

#[test]
fn secure_naming_and_mapping_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let storage = LocalStorage::new(dir.path())?;
    let mut arena = ContentArena::new();
    let mut sip = Submission::create(true, None)?;
    let id = arena.add_bytes("test");
    sip.attach_file("../../foobar.txt", id)?;
    sip.attach_file("/etc/shadow", arena.add_bytes("test-second"))?;

    /* Identity naming refuses to escape the package directory. */
    let mut unsafe_sip = sip.clone();
    let archiver = BagItArchiver::new(&storage, ArchiverConfig::default());
    let err = archiver.archive(&mut unsafe_sip, &arena, &ArchiveOptions::default(), &mut no_progress);
    assert!(matches!(err, Err(Error::Storage { .. })));
    assert!(!unsafe_sip.archived());

    let config = ArchiverConfig::default().with_naming(FileNaming::Secure);
    let archiver = BagItArchiver::new(&storage, config);
    archiver.archive(&mut sip, &arena, &ArchiveOptions::default(), &mut no_progress)?;

    let written = snapshot(&storage.path(&archiver.package_dir(&sip))?)?;
    let foobar = format!("data/files/{id}-foobar.txt");
    assert!(written.contains_key(&foobar));
    let shadow = format!("data/files/{}-etc_shadow", sip.files()[1].file_id);
    assert!(written.contains_key(&shadow));

    assert_eq!(
        text(&written, "data/filenames.txt"),
        format!("{foobar} ../../foobar.txt\n{shadow} /etc/shadow")
    );
    assert!(text(&written, "manifest-md5.txt").contains(" data/filenames.txt"));
    assert!(Bag::open(&storage, &archiver.package_dir(&sip))?.verify(&storage)?.is_empty());
    Ok(())
}

#[test]
fn mapping_file_can_be_disabled() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let storage = LocalStorage::new(dir.path())?;
    let mut arena = ContentArena::new();
    let mut sip = Submission::create(true, None)?;
    sip.attach_file("a b.txt", arena.add_bytes("test"))?;
    let config = ArchiverConfig::default()
        .with_naming(FileNaming::Secure)
        .with_filenames_file(None);
    let archiver = BagItArchiver::new(&storage, config);
    let files = archiver.archive(&mut sip, &arena, &ArchiveOptions::default(), &mut no_progress)?;
    assert!(files.iter().all(|f| f.filename != "data/filenames.txt"));
    assert_eq!(files.len(), 5);
    Ok(())
}

#[test]
fn cancelled_archive_can_resume() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let storage = LocalStorage::new(dir.path())?;
    let archiver = BagItArchiver::new(&storage, ArchiverConfig::default());
    let mut arena = ContentArena::new();
    let mut sip = submission(&mut arena)?;

    let err = archiver.archive(&mut sip, &arena, &ArchiveOptions::default(), &mut |p| {
        if p.copied_files == 2 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });
    assert!(matches!(err, Err(Error::Cancelled(ref f)) if f == "data/metadata/json.json"));
    assert!(!sip.archived());
    assert!(cache::get(&sip)?.is_some());

    archiver.archive(&mut sip, &arena, &ArchiveOptions::default(), &mut no_progress)?;
    assert!(sip.archived());
    Ok(())
}

#[test]
fn serialized_package() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let storage = LocalStorage::new(dir.path())?;
    let archiver = BagItArchiver::new(&storage, ArchiverConfig::default());
    let mut arena = ContentArena::new();
    let mut sip = submission(&mut arena)?;
    archiver.archive(&mut sip, &arena, &ArchiveOptions::default(), &mut no_progress)?;

    let pkg = storage.path(&archiver.package_dir(&sip))?;
    let name = format!("bag-{}", sip.id());
    let tarball = serialize_bag(&pkg, &name, Vec::new(), Compression::None)?;

    let mut archive = tar::Archive::new(tarball.as_slice());
    let mut paths = Vec::new();
    for entry in archive.entries()? {
        paths.push(entry?.path()?.to_string_lossy().into_owned());
    }
    assert!(paths.iter().all(|p| p.starts_with(&name)));
    assert!(paths.contains(&format!("{name}/data/files/foobar.txt")));
    assert!(paths.contains(&format!("{name}/tagmanifest-md5.txt")));
    Ok(())
}
