//! Checksum support for the `checksum` and `checksum-trailer` protocol
//! extensions: a registry of streaming hash backends plus the plumbing
//! that carries a digest either in the `Upload-Checksum` header (chunked
//! uploads) or in an HTTP trailer (streamed uploads).

mod hash;
mod trailer;

pub use hash::{HashBase64ReadWriter, HashTeeReader, SharedHash};
pub use trailer::DeferTrailerReader;

use std::mem;

use crc::{Crc, CRC_64_GO_ISO};
use digest::consts::{U32, U48};
use digest::DynDigest;

/// Streaming interface of a checksum backend. The stream resets the
/// state before every chunk or body, feeds it through `update` and takes
/// the digest with `finalize_reset`.
pub trait Hash {
    fn update(&mut self, data: &[u8]);

    /// Digest of everything written since the last reset. Resets the
    /// state.
    fn finalize_reset(&mut self) -> Vec<u8>;

    fn reset(&mut self);

    /// Digest length in bytes.
    fn output_size(&self) -> usize;
}

type Factory = fn() -> Box<dyn Hash>;

static ALGORITHMS: &[(&str, Factory)] = &[
    ("md5", digest_hash::<md5::Md5>),
    ("sha1", digest_hash::<sha1::Sha1>),
    ("sha224", digest_hash::<sha2::Sha224>),
    ("sha256", digest_hash::<sha2::Sha256>),
    ("sha384", digest_hash::<sha2::Sha384>),
    ("sha512", digest_hash::<sha2::Sha512>),
    ("sha512224", digest_hash::<sha2::Sha512_224>),
    ("sha512256", digest_hash::<sha2::Sha512_256>),
    ("sha3224", digest_hash::<sha3::Sha3_224>),
    ("sha3256", digest_hash::<sha3::Sha3_256>),
    ("sha3384", digest_hash::<sha3::Sha3_384>),
    ("sha3512", digest_hash::<sha3::Sha3_512>),
    ("blake2s256", digest_hash::<blake2::Blake2s256>),
    ("blake2b256", digest_hash::<blake2::Blake2b<U32>>),
    ("blake2b384", digest_hash::<blake2::Blake2b<U48>>),
    ("blake2b512", digest_hash::<blake2::Blake2b512>),
    ("adler32", adler32_hash),
    ("crc32", crc32_hash),
    ("crc64", crc64_hash),
    ("fnv1a", fnv1a_hash),
];

/// Collapses an algorithm name to its canonical spelling: lowercase,
/// with everything that is not a letter or a digit removed. `"SHA-1"`,
/// `"sha_1"` and `"sha1"` all canonicalize to `"sha1"`.
pub fn canonical_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Canonical name of a registered algorithm, or `None` if no backend
/// exists for it.
pub fn find(name: &str) -> Option<&'static str> {
    let canon = canonical_name(name);
    ALGORITHMS
        .iter()
        .find(|(n, _)| *n == canon)
        .map(|(n, _)| *n)
}

/// Canonical name plus a fresh hash state, or `None` if no backend
/// exists for the given name.
pub fn lookup(name: &str) -> Option<(&'static str, Box<dyn Hash>)> {
    let canon = canonical_name(name);
    ALGORITHMS
        .iter()
        .find(|(n, _)| *n == canon)
        .map(|(n, f)| (*n, f()))
}

fn digest_hash<D: DynDigest + Default + 'static>() -> Box<dyn Hash> {
    Box::new(DigestHash(D::default()))
}

struct DigestHash<D>(D);

impl<D: DynDigest> Hash for DigestHash<D> {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize_reset(&mut self) -> Vec<u8> {
        self.0.finalize_reset().into_vec()
    }

    fn reset(&mut self) {
        self.0.reset();
    }

    fn output_size(&self) -> usize {
        self.0.output_size()
    }
}

fn crc32_hash() -> Box<dyn Hash> {
    Box::new(Crc32Hash(crc32fast::Hasher::new()))
}

struct Crc32Hash(crc32fast::Hasher);

impl Hash for Crc32Hash {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize_reset(&mut self) -> Vec<u8> {
        mem::take(&mut self.0).finalize().to_be_bytes().to_vec()
    }

    fn reset(&mut self) {
        self.0.reset();
    }

    fn output_size(&self) -> usize {
        4
    }
}

static CRC64_ISO: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

fn crc64_hash() -> Box<dyn Hash> {
    Box::new(Crc64Hash(CRC64_ISO.digest()))
}

struct Crc64Hash(crc::Digest<'static, u64>);

impl Hash for Crc64Hash {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize_reset(&mut self) -> Vec<u8> {
        mem::replace(&mut self.0, CRC64_ISO.digest())
            .finalize()
            .to_be_bytes()
            .to_vec()
    }

    fn reset(&mut self) {
        self.0 = CRC64_ISO.digest();
    }

    fn output_size(&self) -> usize {
        8
    }
}

fn adler32_hash() -> Box<dyn Hash> {
    Box::new(Adler32Hash(adler32::RollingAdler32::new()))
}

struct Adler32Hash(adler32::RollingAdler32);

impl Hash for Adler32Hash {
    fn update(&mut self, data: &[u8]) {
        self.0.update_buffer(data);
    }

    fn finalize_reset(&mut self) -> Vec<u8> {
        let sum = self.0.hash();
        self.reset();
        sum.to_be_bytes().to_vec()
    }

    fn reset(&mut self) {
        self.0 = adler32::RollingAdler32::new();
    }

    fn output_size(&self) -> usize {
        4
    }
}

fn fnv1a_hash() -> Box<dyn Hash> {
    Box::new(Fnv1aHash(fnv::FnvHasher::default()))
}

struct Fnv1aHash(fnv::FnvHasher);

impl Hash for Fnv1aHash {
    fn update(&mut self, data: &[u8]) {
        std::hash::Hasher::write(&mut self.0, data);
    }

    fn finalize_reset(&mut self) -> Vec<u8> {
        let sum = std::hash::Hasher::finish(&self.0);
        self.reset();
        sum.to_be_bytes().to_vec()
    }

    fn reset(&mut self) {
        self.0 = fnv::FnvHasher::default();
    }

    fn output_size(&self) -> usize {
        8
    }
}
