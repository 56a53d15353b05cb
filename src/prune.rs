use crate::{covers::is_cover_file, logging::*, utils::is_hidden, *};
use std::path::{Path, PathBuf};

/// Remove every directory under `root` that is empty once its children have
/// been pruned. `root` itself is always kept.
///
/// Returns the directories that were removed, deepest first.
pub fn prune_empty_dirs(root: &Path) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    for child in child_dirs(root) {
        prune_dir(&child, &mut removed);
    }
    removed
}

/// Non-hidden subdirectories of `dir`; symlinks are not followed.
fn child_dirs(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| !is_hidden(&entry.file_name()))
            .filter(|entry| entry.file_type().is_ok_and(|ft| ft.is_dir()))
            .map(|entry| entry.path())
            .collect(),
        Err(e) => {
            warn!("Failed to read {}: {e}", dir.display());
            Vec::new()
        }
    }
}

/// Post-order pruning of one directory. Returns whether `dir` was removed.
fn prune_dir(dir: &Path, removed: &mut Vec<PathBuf>) -> bool {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to read {}: {e}", dir.display());
            return false;
        }
    };

    let mut keep = false;
    let mut covers = Vec::new();

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Failed to read an entry of {}: {e}", dir.display());
                keep = true;
                continue;
            }
        };
        let path = entry.path();

        // Hidden entries are never touched and keep their parent alive.
        if is_hidden(&entry.file_name()) {
            keep = true;
            continue;
        }

        match entry.file_type() {
            Ok(ft) if ft.is_dir() => {
                if !prune_dir(&path, removed) {
                    keep = true;
                }
            }
            // Covers mirrored in symlink mode are links; only the link goes.
            Ok(ft) if (ft.is_file() || ft.is_symlink()) && is_cover_file(&path) => {
                covers.push(path)
            }
            _ => keep = true,
        }
    }

    if keep {
        return false;
    }

    // Only cover art left: the directory counts as empty.
    for cover in &covers {
        if let Err(e) = fs::remove_file(cover) {
            warn!("Failed to remove {}: {e}", cover.display());
            return false;
        }
        println!("removed {}", cover.display());
    }

    match fs::remove_dir(dir) {
        Ok(()) => {
            removed.push(dir.to_path_buf());
            true
        }
        Err(e) => {
            warn!("Failed to remove {}: {e}", dir.display());
            false
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_prune_nested_empty_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("dst");
        fs::create_dir_all(root.join("a/b/c")).unwrap();
        fs::create_dir_all(root.join("d")).unwrap();
        fs::create_dir_all(root.join("e")).unwrap();
        fs::write(root.join("e/song.mp3"), "x").unwrap();

        let removed = prune_empty_dirs(&root);
        assert_eq!(removed.len(), 4);
        let position = |p: &str| removed.iter().position(|r| r == &root.join(p)).unwrap();
        assert!(position("a/b/c") < position("a/b"));
        assert!(position("a/b") < position("a"));
        assert!(root.exists());
        assert!(!root.join("a").exists());
        assert!(!root.join("d").exists());
        assert!(root.join("e/song.mp3").exists());
    }

    #[test]
    fn test_root_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        assert!(prune_empty_dirs(dir.path()).is_empty());
        assert!(dir.path().exists());
    }

    #[test]
    fn test_hidden_dirs_survive() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join(".stfolder")).unwrap();
        fs::create_dir_all(root.join("album/.thumbnails")).unwrap();
        fs::create_dir_all(root.join("other")).unwrap();
        fs::write(root.join("other/.nomedia"), "").unwrap();

        prune_empty_dirs(root);
        assert!(root.join(".stfolder").exists());
        assert!(root.join("album/.thumbnails").exists());
        assert!(root.join("other/.nomedia").exists());
    }

    #[test]
    fn test_cover_only_dirs_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("artist/album")).unwrap();
        fs::write(root.join("artist/album/cover.jpg"), "img").unwrap();
        fs::write(root.join("artist/Cover.png"), "img").unwrap();
        fs::create_dir_all(root.join("kept")).unwrap();
        fs::write(root.join("kept/cover.jpg"), "img").unwrap();
        fs::write(root.join("kept/song.mp3"), "x").unwrap();

        prune_empty_dirs(root);
        assert!(!root.join("artist").exists());
        assert!(root.join("kept/cover.jpg").exists());
        assert!(root.join("kept/song.mp3").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_cover_only_dir_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let art = dir.path().join("art.jpg");
        let root = dir.path().join("dst");
        fs::write(&art, "img").unwrap();
        fs::create_dir_all(root.join("album")).unwrap();
        std::os::unix::fs::symlink(&art, root.join("album/cover.jpg")).unwrap();

        let removed = prune_empty_dirs(&root);
        assert_eq!(removed, vec![root.join("album")]);
        assert!(art.exists());
    }
}
