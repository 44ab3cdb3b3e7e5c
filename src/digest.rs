/*
 * Copyright (c) 2024 Jonathan Perkin <jonathan@perkin.org.uk>
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
 * Digest hashing and checksum notation.  The [`Digest`] module is mostly a
 * thin wrapper around the [`digest`] crate and the subset of [`hashes`]
 * provided by the [`RustCrypto`] project that BagIt manifests recognise.
 *
 * Checksums are carried around as prefixed strings, for example
 * `"md5:098f6bcd4621d373cade4e832627b4f6"`, so that the algorithm always
 * travels with the value.  MD5 is the default, as that is what the
 * `manifest-md5.txt` and `tagmanifest-md5.txt` tag files use.  It is used
 * for integrity and deduplication only, and provides no security.
 *
 * ## Examples
 *
 * ```
 * use sipstore::digest::{Digest, DigestResult, parse_checksum};
 * use std::str::FromStr;
 *
 * fn main() -> DigestResult<()> {
 *     let d = Digest::MD5;
 *     let h = d.hash_str("hello")?;
 *     assert_eq!(h, "5d41402abc4b2a76b9719d911017c592");
 *
 *     /* Prefixed notation, as stored in manifest records. */
 *     let c = d.checksum(b"hello");
 *     assert_eq!(c, "md5:5d41402abc4b2a76b9719d911017c592");
 *     assert_eq!(parse_checksum(&c, Digest::MD5)?, h);
 *
 *     /* The prefix must match the expected algorithm. */
 *     assert!(parse_checksum("sha1:abc", Digest::MD5).is_err());
 *
 *     let d = Digest::from_str("sha256")?;
 *     assert_eq!(d.prefix(), "sha256");
 *
 *     Ok(())
 * }
 * ```
 *
 * [`RustCrypto`]: https://github.com/RustCrypto
 * [`digest`]: https://docs.rs/digest/latest/digest/
 * [`hashes`]: https://github.com/RustCrypto/hashes
 */

use serde_with::{DeserializeFromStr, SerializeDisplay};
use std::fmt;
use std::io::Read;
use std::str::FromStr;

/**
 * A type alias for the result from the creation of a [`Digest`], with
 * [`DigestError`] returned in [`Err`] variants.
 */
pub type DigestResult<T> = std::result::Result<T, DigestError>;

/**
 * The [`DigestError`] enum contains all of the possible [`Digest`] errors.
 */
#[derive(Debug)]
pub enum DigestError {
    /**
     * An I/O error when reading a file for hashing.
     */
    Io(std::io::Error),
    /**
     * An unknown digest type.
     */
    Unsupported(String),
    /**
     * A checksum string that is not in `algorithm:hex` notation, or whose
     * algorithm prefix is not the one that was expected.
     */
    Format(String),
}

impl PartialEq for DigestError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DigestError::Io(e1), DigestError::Io(e2)) => {
                e1.kind() == e2.kind()
            }
            (DigestError::Unsupported(e1), DigestError::Unsupported(e2)) => {
                e1 == e2
            }
            (DigestError::Format(e1), DigestError::Format(e2)) => e1 == e2,
            _ => false,
        }
    }
}

impl From<std::io::Error> for DigestError {
    fn from(err: std::io::Error) -> Self {
        DigestError::Io(err)
    }
}

impl fmt::Display for DigestError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DigestError::Io(s) => write!(f, "I/O error: {}", s),
            DigestError::Unsupported(s) => {
                write!(f, "Unsupported digest: {}", s)
            }
            DigestError::Format(s) => {
                write!(f, "Checksum format is not correct: {}", s)
            }
        }
    }
}

impl std::error::Error for DigestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DigestError::Io(err) => Some(err),
            DigestError::Unsupported(_) | DigestError::Format(_) => None,
        }
    }
}

/**
 * The [`Digest`] enum contains an entry for every supported digest algorithm.
 * These are the algorithms that BagIt allows in `manifest-<alg>.txt` names.
 */
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    Hash,
    PartialEq,
    SerializeDisplay,
    DeserializeFromStr,
)]
pub enum Digest {
    /**
     * Implements `MD5` hash support using `Md5` from the [`md5`] crate.
     * This is the default, and the only algorithm used when writing
     * packages.
     *
     * [`md5`]: https://docs.rs/md-5/
     */
    #[default]
    MD5,
    /**
     * Implements `SHA1` hash support using `Sha1` from the [`sha1`] crate.
     *
     * [`sha1`]: https://docs.rs/sha1/
     */
    SHA1,
    /**
     * Implements `SHA256` hash support using `Sha256` from the [`sha2`] crate.
     *
     * [`sha2`]: https://docs.rs/sha2/
     */
    SHA256,
    /**
     * Implements `SHA512` hash support using `Sha512` from the [`sha2`] crate.
     *
     * [`sha2`]: https://docs.rs/sha2/
     */
    SHA512,
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::new(), |mut output, b| {
        output.push_str(&format!("{b:02x}"));
        output
    })
}

fn hash_file_internal<R: Read, D: digest::Digest + std::io::Write>(
    reader: &mut R,
) -> DigestResult<(u64, String)> {
    let mut hasher = D::new();
    let size = std::io::copy(reader, &mut hasher)?;
    Ok((size, to_hex(&hasher.finalize())))
}

fn hash_bytes_internal<D: digest::Digest>(bytes: &[u8]) -> String {
    let mut hasher = D::new();
    hasher.update(bytes);
    to_hex(&hasher.finalize())
}

impl Digest {
    /**
     * Hash a file.  The full contents of the file are hashed, it is not
     * processed in any way.
     */
    pub fn hash_file<R: Read>(&self, reader: &mut R) -> DigestResult<String> {
        Ok(self.hash_reader(reader)?.1)
    }

    /*
     * Shared by hash_file() and checksum_reader(), returning the number of
     * bytes consumed alongside the hash.
     */
    fn hash_reader<R: Read>(&self, reader: &mut R) -> DigestResult<(u64, String)> {
        match self {
            Digest::MD5 => hash_file_internal::<_, md5::Md5>(reader),
            Digest::SHA1 => hash_file_internal::<_, sha1::Sha1>(reader),
            Digest::SHA256 => hash_file_internal::<_, sha2::Sha256>(reader),
            Digest::SHA512 => hash_file_internal::<_, sha2::Sha512>(reader),
        }
    }

    /**
     * Hash a byte slice.
     */
    pub fn hash_bytes(&self, bytes: &[u8]) -> String {
        match self {
            Digest::MD5 => hash_bytes_internal::<md5::Md5>(bytes),
            Digest::SHA1 => hash_bytes_internal::<sha1::Sha1>(bytes),
            Digest::SHA256 => hash_bytes_internal::<sha2::Sha256>(bytes),
            Digest::SHA512 => hash_bytes_internal::<sha2::Sha512>(bytes),
        }
    }

    /**
     * Hash a string.  Text is always hashed as its UTF-8 encoding.
     */
    pub fn hash_str(&self, s: &str) -> DigestResult<String> {
        Ok(self.hash_bytes(s.as_bytes()))
    }

    /**
     * Compute a prefixed checksum of a byte slice, e.g. `md5:<hex>`.
     */
    pub fn checksum(&self, bytes: &[u8]) -> String {
        format!("{}:{}", self.prefix(), self.hash_bytes(bytes))
    }

    /**
     * Compute the size and prefixed checksum of everything read from
     * `reader`.
     */
    pub fn checksum_reader<R: Read>(
        &self,
        reader: &mut R,
    ) -> DigestResult<(u64, String)> {
        let (size, hash) = self.hash_reader(reader)?;
        Ok((size, format!("{}:{}", self.prefix(), hash)))
    }

    /**
     * Return a boxed incremental hasher, for callers that need to hash data
     * as it is being written elsewhere.
     */
    pub fn hasher(&self) -> Box<dyn digest::DynDigest> {
        match self {
            Digest::MD5 => Box::new(md5::Md5::default()),
            Digest::SHA1 => Box::new(sha1::Sha1::default()),
            Digest::SHA256 => Box::new(sha2::Sha256::default()),
            Digest::SHA512 => Box::new(sha2::Sha512::default()),
        }
    }

    /**
     * Finish a hasher returned by [`hasher`] and return the lowercase hex
     * result.
     *
     * [`hasher`]: Digest::hasher
     */
    pub fn finish(hasher: Box<dyn digest::DynDigest>) -> String {
        to_hex(&hasher.finalize())
    }

    /**
     * The lowercase name used both as the checksum prefix and in BagIt
     * manifest filenames.
     */
    pub fn prefix(&self) -> &'static str {
        match self {
            Digest::MD5 => "md5",
            Digest::SHA1 => "sha1",
            Digest::SHA256 => "sha256",
            Digest::SHA512 => "sha512",
        }
    }
}

/**
 * Split a prefixed checksum such as `md5:<hex>` and return the hex portion,
 * as long as the prefix matches `expected`.
 *
 * Returns [`DigestError::Format`] if the value has no prefix, contains more
 * than one separator, or uses a different algorithm.
 */
pub fn parse_checksum(value: &str, expected: Digest) -> DigestResult<&str> {
    let mut parts = value.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(prefix), Some(hex), None) if prefix == expected.prefix() => {
            Ok(hex)
        }
        _ => Err(DigestError::Format(value.to_string())),
    }
}

/**
 * Return the [`Digest`] named by the prefix of a checksum string.
 */
pub fn checksum_algorithm(value: &str) -> DigestResult<Digest> {
    match value.split_once(':') {
        Some((prefix, _)) => Digest::from_str(prefix),
        None => Err(DigestError::Format(value.to_string())),
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> DigestResult<Self> {
        match s.to_lowercase().as_str() {
            "md5" => Ok(Digest::MD5),
            "sha1" => Ok(Digest::SHA1),
            "sha256" => Ok(Digest::SHA256),
            "sha512" => Ok(Digest::SHA512),
            _ => Err(DigestError::Unsupported(s.to_string())),
        }
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Digest::MD5 => write!(f, "MD5"),
            Digest::SHA1 => write!(f, "SHA1"),
            Digest::SHA256 => write!(f, "SHA256"),
            Digest::SHA512 => write!(f, "SHA512"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_invalid() -> DigestResult<()> {
        let moo = String::from("moo");
        let d = Digest::from_str(&moo);
        assert_eq!(d, Err(DigestError::Unsupported(moo)));
        Ok(())
    }

    #[test]
    fn digest_str() -> DigestResult<()> {
        let d = Digest::from_str("SHA1")?;
        let h = d.hash_str("hello there")?;
        assert_eq!(h, "6e71b3cac15d32fe2d36c270887df9479c25c640");
        Ok(())
    }

    #[test]
    fn digest_md5_checksum() {
        assert_eq!(
            Digest::MD5.checksum(b"test"),
            "md5:098f6bcd4621d373cade4e832627b4f6"
        );
        assert_eq!(
            Digest::MD5.checksum(b""),
            "md5:d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn digest_checksum_reader() -> DigestResult<()> {
        let mut input = &b"test-second"[..];
        let (size, sum) = Digest::MD5.checksum_reader(&mut input)?;
        assert_eq!(size, 11);
        assert_eq!(sum, "md5:652b054df498ace88fef9857785fce34");
        Ok(())
    }

    #[test]
    fn digest_incremental_matches_oneshot() {
        let mut h = Digest::MD5.hasher();
        h.update(b"te");
        h.update(b"st");
        assert_eq!(Digest::finish(h), Digest::MD5.hash_bytes(b"test"));
    }

    #[test]
    fn parse_checksum_valid() -> DigestResult<()> {
        let hex = parse_checksum(
            "md5:5d41402abc4b2a76b9719d911017c592",
            Digest::MD5,
        )?;
        assert_eq!(hex, "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(parse_checksum("md5:12", Digest::MD5)?, "12");
        Ok(())
    }

    #[test]
    fn parse_checksum_invalid() {
        for bad in ["sha1:abc", "md5", "md5:ab:cd", ":abc", ""] {
            assert_eq!(
                parse_checksum(bad, Digest::MD5),
                Err(DigestError::Format(bad.to_string()))
            );
        }
    }

    #[test]
    fn checksum_algorithm_prefix() -> DigestResult<()> {
        assert_eq!(checksum_algorithm("sha256:00")?, Digest::SHA256);
        assert!(matches!(
            checksum_algorithm("nohex"),
            Err(DigestError::Format(_))
        ));
        assert!(matches!(
            checksum_algorithm("crc32:00"),
            Err(DigestError::Unsupported(_))
        ));
        Ok(())
    }

    #[test]
    fn digest_serde() -> Result<(), serde_json::Error> {
        let s = serde_json::to_string(&Digest::SHA256)?;
        assert_eq!(s, "\"SHA256\"");
        let d: Digest = serde_json::from_str("\"md5\"")?;
        assert_eq!(d, Digest::MD5);
        Ok(())
    }
}
