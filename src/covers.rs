use crate::{
    hasher::{file_fingerprint, Fingerprint},
    ledger::Ledger,
    materialize::{Action, Materializer},
    utils::is_hidden,
    *,
};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Image extensions recognized as cover art.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];

/// Whether `path` names a cover image: the lowercased file name contains
/// `cover` and the extension is a known image type.
pub fn is_cover_file(path: &Path) -> bool {
    let Some(name) = path.file_name() else {
        return false;
    };
    if is_hidden(name) || !name.to_string_lossy().to_lowercase().contains("cover") {
        return false;
    }
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Covers already handled during the current run.
#[derive(Debug, Default)]
pub struct CoverSet {
    scanned: HashSet<PathBuf>,
    synced: HashSet<PathBuf>,
}

impl CoverSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `dir` as scanned; returns false if it was already.
    fn mark_scanned(&mut self, dir: &Path) -> bool {
        self.scanned.insert(dir.to_path_buf())
    }

    pub fn contains(&self, cover: &Path) -> bool {
        self.synced.contains(cover)
    }

    pub fn len(&self) -> usize {
        self.synced.len()
    }

    pub fn is_empty(&self) -> bool {
        self.synced.is_empty()
    }
}

/// Result of mirroring one cover file.
#[derive(Debug)]
pub struct CoverOutcome {
    pub source: PathBuf,
    pub result: Result<(Fingerprint, Action)>,
}

/// Mirror the companion covers of `source_dir` into `dest_dir`.
///
/// Every cover is handled at most once per run: directories already scanned
/// and covers already in `covers` are skipped. The returned outcomes carry
/// the fingerprint to record in the new ledger.
pub fn sync_covers(
    source_dir: &Path,
    dest_dir: &Path,
    materializer: &Materializer,
    prior: &Ledger,
    covers: &mut CoverSet,
) -> Vec<CoverOutcome> {
    if !covers.mark_scanned(source_dir) {
        return Vec::new();
    }

    WalkDir::new(source_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_cover_file(entry.path()))
        .filter_map(|entry| {
            let source = entry.into_path();
            if !covers.synced.insert(source.clone()) {
                return None;
            }

            let result = mirror_cover(&source, dest_dir, materializer, prior);
            Some(CoverOutcome { source, result })
        })
        .collect()
}

fn mirror_cover(
    source: &Path,
    dest_dir: &Path,
    materializer: &Materializer,
    prior: &Ledger,
) -> Result<(Fingerprint, Action)> {
    let name = source
        .file_name()
        .ok_or_else(|| anyhow!("Cover {} has no file name", source.display()))?;
    // Ledger keys are stored as text.
    if source.to_str().is_none() {
        bail!("Cover {} is not valid UTF-8", source.display());
    }
    let fingerprint = file_fingerprint(source)
        .with_context(|| format!("Failed to fingerprint {}", source.display()))?;
    let action = materializer.materialize_cover(
        source,
        &dest_dir.join(name),
        &fingerprint,
        prior.get(source),
    )?;

    Ok((fingerprint, action))
}
