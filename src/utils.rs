use ron::{extensions::Extensions, ser::PrettyConfig};
use std::{
    env,
    ffi::OsStr,
    path::{Path, PathBuf},
};

/// A macro that expands a configured path, falling back to the path itself.
///
/// The `fix_path` macro evaluates `path` through the [`FixPath`] trait and
/// returns the expanded `PathBuf`. If nothing had to be expanded the original
/// path is converted into a `PathBuf` unchanged.
///
/// # Examples
///
/// ```rust
/// use playlist_mirror::fix_path;
/// use playlist_mirror::utils::FixPath;
/// use std::path::PathBuf;
///
/// let absolute_path = fix_path!("/media/player");
/// assert_eq!(absolute_path, PathBuf::from("/media/player"));
/// ```
#[macro_export]
macro_rules! fix_path {
    ($path:expr) => {
        $path.fix_path().unwrap_or($path.into())
    };
}

/// A trait for expanding user-written paths from the configuration file.
/// For example, ~/Music will be converted to /home/username/Music and
/// ./playlists to ${cwd}/playlists.
pub trait FixPath<T> {
    /// Returns the expanded path, or `None` if the path needs no expansion.
    fn fix_path(&self) -> Option<PathBuf>;
}

fn expand(path: &Path) -> Option<PathBuf> {
    if let Ok(rest) = path.strip_prefix("~") {
        return home::home_dir().map(|home| home.join(rest));
    }
    if let Ok(rest) = path.strip_prefix(".") {
        return env::current_dir().ok().map(|cwd| cwd.join(rest));
    }
    None
}

/// Expand paths of type `std::path::PathBuf`
///
/// ```rust
/// use playlist_mirror::utils::FixPath;
/// use std::path::PathBuf;
///
/// assert!(PathBuf::from("/srv/music").fix_path().is_none());
/// assert!(PathBuf::from("~/Music").fix_path().is_some());
/// ```
impl FixPath<PathBuf> for PathBuf {
    fn fix_path(&self) -> Option<PathBuf> {
        expand(self)
    }
}

/// Expand paths of type `std::string::String`
impl FixPath<String> for String {
    fn fix_path(&self) -> Option<PathBuf> {
        if self.is_empty() {
            return Some(PathBuf::new());
        }
        expand(Path::new(self))
    }
}

/// Expand paths of type `&str`
///
/// ```rust
/// use playlist_mirror::utils::FixPath;
///
/// let path = "./playlists".fix_path();
/// assert_eq!(path, Some(std::env::current_dir().unwrap().join("playlists")));
/// ```
impl FixPath<&str> for &str {
    fn fix_path(&self) -> Option<PathBuf> {
        if self.is_empty() {
            return Some(PathBuf::new());
        }
        expand(Path::new(self))
    }
}

/// Make a path absolute against the current working directory.
///
/// Symlinks created in the destination must point at absolute sources, so
/// every configured root goes through here after `~` expansion.
pub fn absolutize(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}

/// Returns true when the file name starts with the hidden-file marker.
pub fn is_hidden(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// Get a pretty printer configuration for RON (Rusty Object Notation)
/// serialization.
///
/// Used for both the configuration template and the persisted ledgers.
pub fn get_ron_formatter() -> PrettyConfig {
    PrettyConfig::new()
        .depth_limit(3)
        .extensions(Extensions::IMPLICIT_SOME)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fix_path_home() {
        let home = home::home_dir().unwrap();
        assert_eq!("~/Music".fix_path(), Some(home.join("Music")));
        assert_eq!(
            String::from("~/Music/playlists").fix_path(),
            Some(home.join("Music/playlists"))
        );
    }

    #[test]
    fn test_fix_path_untouched() {
        assert!("/srv/music".fix_path().is_none());
        assert!(PathBuf::from("relative/dir").fix_path().is_none());
        assert_eq!(fix_path!("/srv/music"), PathBuf::from("/srv/music"));
    }

    #[test]
    fn test_absolutize() {
        assert_eq!(absolutize("/a/b".into()), PathBuf::from("/a/b"));
        assert!(absolutize("a/b".into()).is_absolute());
    }

    #[test]
    fn test_is_hidden() {
        assert!(is_hidden(OsStr::new(".git")));
        assert!(is_hidden(OsStr::new(".stfolder")));
        assert!(!is_hidden(OsStr::new("artist")));
    }
}
