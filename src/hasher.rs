use digest::DynDigest;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::{fmt, fmt::Write, fs, io, io::Read, path::Path};

/// HashBox is a Box<[u8]> type that implements hexadecimal formatting.
///
/// `HashBox` is a wrapper type for a boxed byte array (`Box<[u8]>`) that
/// represents a finalized digest.
struct HashBox(Box<[u8]>);

impl fmt::LowerHex for HashBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|byte| write!(f, "{:02x}", byte))
    }
}

impl HashBox {
    fn to_hex(&self) -> String {
        let mut hex_string = String::with_capacity(self.0.len() * 2);
        // Writing into a String never fails.
        let _ = write!(hex_string, "{:x}", self);
        hex_string
    }
}

/// The change-detection value stored in the ledger for every synced file.
///
/// A fingerprint is the lowercase hexadecimal SHA-1 digest of the file
/// contents. Modification times are never used: two runs over an unchanged
/// file always produce the same fingerprint, even after the file was touched
/// or restored from a backup.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Fingerprint {
    fn from(hex: String) -> Self {
        Self(hex)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns the hash of a single file.
///
/// This function streams the specified file through the provided hasher in
/// 4 KiB chunks and returns the hexadecimal digest. The hasher is reset
/// afterwards so it can be reused for the next file.
///
/// # Example
///
/// ```rust
/// use playlist_mirror::hasher::get_file_hash;
/// use sha1::{Digest, Sha1};
///
/// let mut hasher = Sha1::new();
/// match get_file_hash("/path/to/file.flac", &mut hasher) {
///     Ok(hash) => println!("File hash: {}", hash),
///     Err(err) => eprintln!("Error calculating file hash: {:?}", err),
/// }
/// ```
pub fn get_file_hash<Hasher, P>(path: P, hash: &mut Hasher) -> Result<String, io::Error>
where
    Hasher: DynDigest + Clone,
    P: AsRef<Path>,
{
    let mut file = fs::File::open(path)?;
    let mut buf = [0u8; 4096];

    loop {
        let i = file.read(&mut buf)?;
        if i == 0 {
            return Ok(HashBox(hash.finalize_reset()).to_hex());
        }
        hash.update(&buf[..i]);
    }
}

/// Computes the [`Fingerprint`] of a file on disk.
pub fn file_fingerprint<P: AsRef<Path>>(path: P) -> Result<Fingerprint, io::Error> {
    get_file_hash(path, &mut Sha1::new()).map(Fingerprint)
}

/// Returns the hexadecimal SHA-1 digest of a string.
///
/// Used to derive stable file names from paths, e.g. the ledger identifier
/// of a destination directory.
pub fn str_digest(value: &str) -> String {
    let mut hasher = Sha1::new();
    Digest::update(&mut hasher, value.as_bytes());
    HashBox(Digest::finalize(hasher).to_vec().into_boxed_slice()).to_hex()
}
