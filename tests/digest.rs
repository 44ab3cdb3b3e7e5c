use sipstore::digest::*;
use std::fs::File;
use std::io::Write;
use std::str::FromStr;

#[test]
fn test_digest_file() -> DigestResult<()> {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("digest.txt");
    File::create(&file)?.write_all(b"test")?;

    let mut f = File::open(&file)?;
    let d = Digest::from_str("MD5")?;
    let h = d.hash_file(&mut f)?;
    assert_eq!(h, "098f6bcd4621d373cade4e832627b4f6");

    let mut f = File::open(&file)?;
    let d = Digest::from_str("SHA1")?;
    let h = d.hash_file(&mut f)?;
    assert_eq!(h, "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3");

    let mut f = File::open(&file)?;
    let d = Digest::from_str("SHA256")?;
    let h = d.hash_file(&mut f)?;
    assert_eq!(
        h,
        "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
    );

    let mut f = File::open(&file)?;
    let d = Digest::from_str("SHA512")?;
    let h = d.hash_file(&mut f)?;
    assert_eq!(h, "ee26b0dd4af7e749aa1a8ee3c10ae9923f618980772e473f8819a5d4940e0db27ac185f8a0e1d5f84f88bc887fd67b143732c304cc5fa9ad8e6f57f50028a8ff");

    Ok(())
}

#[test]
fn test_checksum_notation() -> DigestResult<()> {
    let mut f = &b"test-third"[..];
    let (size, sum) = Digest::MD5.checksum_reader(&mut f)?;
    assert_eq!(size, 10);
    assert_eq!(sum, "md5:f1d2f9e84f147fed5fab05c6f8210c6f");
    assert_eq!(checksum_algorithm(&sum)?, Digest::MD5);
    assert_eq!(
        parse_checksum(&sum, Digest::MD5)?,
        "f1d2f9e84f147fed5fab05c6f8210c6f"
    );

    let sha = Digest::SHA256.checksum(b"test");
    assert!(sha.starts_with("sha256:"));
    assert_eq!(
        parse_checksum(&sha, Digest::MD5),
        Err(DigestError::Format(sha.clone()))
    );
    Ok(())
}
