use crate::{hasher::str_digest, hasher::Fingerprint, utils::get_ron_formatter, *};
use ron::ser::to_string_pretty;
use std::{
    collections::BTreeMap,
    io::Write,
    path::{Path, PathBuf},
};

/// Persisted record of which source files were synced to one destination,
/// and with which fingerprint.
///
/// A ledger is never merged: every run builds a fresh one from the files it
/// actually synced and replaces the previous file on disk.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct Ledger {
    entries: BTreeMap<PathBuf, Fingerprint>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Location of the ledger belonging to `output_dir` inside `data_dir`.
    ///
    /// The file name is the SHA-1 of the destination path, so it stays the
    /// same across runs even when the target's playlists change.
    pub fn path_for(data_dir: &Path, output_dir: &Path) -> PathBuf {
        let id = str_digest(&output_dir.to_string_lossy());
        data_dir.join(format!("{id}.ron"))
    }

    /// Load a ledger, treating a missing file as an empty ledger.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read ledger {}", path.display()))
            }
        };

        Options::default()
            .with_default_extension(Extensions::IMPLICIT_SOME)
            .from_str(&contents)
            .with_context(|| format!("Failed to parse ledger {}", path.display()))
    }

    /// Persist the ledger, replacing the previous file atomically.
    ///
    /// The data is written to a temporary file next to `path` and renamed
    /// over it, so an interrupted save leaves the old ledger intact.
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow!("Ledger path {} has no parent", path.display()))?;
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory {}", parent.display()))?;

        let data = to_string_pretty(self, get_ron_formatter()).context("Failed to serialize ledger")?;

        let mut file = tempfile::NamedTempFile::new_in(parent)
            .context("Failed to create temporary ledger file")?;
        file.write_all(data.as_bytes())
            .context("Failed to write ledger")?;
        file.as_file().sync_all().context("Failed to flush ledger")?;
        file.persist(path)
            .with_context(|| format!("Failed to replace ledger {}", path.display()))?;

        Ok(())
    }

    pub fn get(&self, source: &Path) -> Option<&Fingerprint> {
        self.entries.get(source)
    }

    pub fn contains(&self, source: &Path) -> bool {
        self.entries.contains_key(source)
    }

    pub fn insert(&mut self, source: PathBuf, fingerprint: Fingerprint) {
        self.entries.insert(source, fingerprint);
    }

    pub fn keys(&self) -> impl Iterator<Item = &PathBuf> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
