use crate::{
    fix_path,
    rules::{ConversionRule, RuleSet},
    utils::{absolutize, get_ron_formatter, FixPath},
    *,
};
use ron::ser::to_string_pretty;
use std::{fmt, path::Path};

/// Top-level configuration file.
///
/// The file is written in RON with the `IMPLICIT_SOME` extension enabled,
/// so optional values can be given without wrapping them in `Some(..)`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MirrorConfig {
    /// Root the playlist entries are relative to.
    #[serde(default = "default_relative_to")]
    pub relative_to: String,
    /// Directory the playlist files are read from.
    #[serde(default)]
    pub playlists_dir: Option<String>,
    /// Where ledgers are kept, `~/.local/share/playlist-mirror` by default.
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub sync: Option<Vec<TargetConfig>>,
}

fn default_relative_to() -> String {
    String::from("/")
}

/// One mirroring job as written in the configuration file.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TargetConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub playlists: Vec<String>,
    pub output_dir: String,
    /// Overrides the global `relative_to`.
    #[serde(default)]
    pub relative_to: Option<String>,
    /// Overrides the global `playlists_dir`.
    #[serde(default)]
    pub playlists_dir: Option<String>,
    #[serde(default)]
    pub playlist_output_dir: Option<String>,
    #[serde(default)]
    pub playlist_prefix: Option<String>,
    #[serde(default)]
    pub symlink: bool,
    #[serde(default)]
    pub convert: Vec<ConversionRule>,
}

impl TargetConfig {
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.output_dir)
    }

    /// A target is selected by its name or by any of its playlist names.
    pub fn matches(&self, selection: &[String]) -> bool {
        selection
            .iter()
            .any(|s| s == self.name() || self.playlists.contains(s))
    }
}

/// A fully resolved mirroring job: all paths expanded and absolute, rules
/// validated. Immutable for the duration of a run.
#[derive(Debug, Clone)]
pub struct SyncTarget {
    pub name: String,
    pub playlists: Vec<String>,
    pub relative_to: PathBuf,
    pub playlists_dir: PathBuf,
    pub output_dir: PathBuf,
    pub playlist_output_dir: Option<PathBuf>,
    pub playlist_prefix: Option<String>,
    pub symlink: bool,
    pub rules: RuleSet,
}

fn resolve_dir(path: &str) -> PathBuf {
    absolutize(fix_path!(path))
}

/// Look for the configuration file in the usual places.
///
/// `~/.playlist-mirror.ron`, then `~/.config/playlist-mirror/config.ron`,
/// then `config.ron` in the current directory. Returns `None` if none exist.
fn get_default_config_path() -> Option<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(home_dir) = home::home_dir() {
        candidates.push(home_dir.join(".playlist-mirror.ron"));
        candidates.push(home_dir.join(".config/playlist-mirror/config.ron"));
    }
    candidates.push(PathBuf::from("config.ron"));

    candidates.into_iter().find(|path| path.is_file())
}

impl MirrorConfig {
    /// Parses the configuration file.
    ///
    /// If the user did not pass a path with `--cpath` the default locations
    /// are searched: `~/.playlist-mirror.ron`,
    /// `~/.config/playlist-mirror/config.ron`, then `./config.ron`.
    pub fn parse_config(filepath: &Option<String>) -> Result<Self> {
        let path = match filepath {
            Some(path) => fix_path!(path),
            None => get_default_config_path()
                .ok_or_else(|| anyhow!("No config file found, pass one with --cpath"))?,
        };

        Self::parse_file(&path)
    }

    pub fn parse_file(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)
            .with_context(|| format!("Failed to open config file {}", path.display()))?;

        Options::default()
            .with_default_extension(Extensions::IMPLICIT_SOME)
            .from_reader(file)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn parse_str(contents: &str) -> Result<Self> {
        Options::default()
            .with_default_extension(Extensions::IMPLICIT_SOME)
            .from_str(contents)
            .context("Failed to parse config")
    }

    /// Directory holding the per-target ledgers.
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(resolve_dir(dir));
        }
        home::home_dir()
            .map(|home| home.join(".local/share/playlist-mirror"))
            .ok_or_else(|| anyhow!("Failed to get home directory, set data_dir in the config"))
    }

    /// The configured targets restricted to `selection` (all of them when
    /// `selection` is empty).
    pub fn selected_targets(&self, selection: &[String]) -> Result<Vec<&TargetConfig>> {
        let sync = match &self.sync {
            Some(sync) if !sync.is_empty() => sync,
            _ => bail!("No sync targets specified. Exiting"),
        };

        Ok(sync
            .iter()
            .filter(|target| selection.is_empty() || target.matches(selection))
            .collect())
    }

    /// Resolve one target against the global settings.
    pub fn resolve(&self, target: &TargetConfig) -> Result<SyncTarget> {
        let playlists_dir = target
            .playlists_dir
            .as_ref()
            .or(self.playlists_dir.as_ref())
            .ok_or_else(|| anyhow!("No playlist directory specified. Exiting"))?;
        let relative_to = target.relative_to.as_ref().unwrap_or(&self.relative_to);

        if target.playlists.is_empty() {
            bail!("Target {:?} lists no playlists", target.name());
        }
        if target.output_dir.is_empty() {
            bail!("Target {:?} has no output_dir", target.name());
        }

        let rules = RuleSet::new(target.convert.clone())
            .with_context(|| format!("Invalid conversion rules for {:?}", target.name()))?;

        Ok(SyncTarget {
            name: target.name().to_string(),
            playlists: target.playlists.clone(),
            relative_to: resolve_dir(relative_to),
            playlists_dir: resolve_dir(playlists_dir),
            output_dir: resolve_dir(&target.output_dir),
            playlist_output_dir: target.playlist_output_dir.as_deref().map(resolve_dir),
            playlist_prefix: target.playlist_prefix.clone(),
            symlink: target.symlink,
            rules,
        })
    }
}

/// Default implementation for MirrorConfig.
///
/// This is the template printed by `--new`.
impl Default for MirrorConfig {
    fn default() -> Self {
        MirrorConfig {
            relative_to: String::from("~/Music"),
            playlists_dir: Some(String::from("~/Music/playlists")),
            data_dir: None,
            sync: Some(vec![TargetConfig {
                name: Some(String::from("player")),
                playlists: vec![String::from("favourites.m3u")],
                output_dir: String::from("/media/player/Music"),
                relative_to: None,
                playlists_dir: None,
                playlist_output_dir: Some(String::from("/media/player/Playlists")),
                playlist_prefix: Some(String::from("/Music/")),
                symlink: false,
                convert: vec![ConversionRule {
                    extension: String::from(".flac"),
                    output_extension: String::from(".mp3"),
                    command: ["ffmpeg", "-y", "-i", "{source}", "-q:a", "2", "{output}"]
                        .map(String::from)
                        .to_vec(),
                    staging: None,
                }],
            }]),
        }
    }
}

/// Display implementation for MirrorConfig: the pretty-printed RON form.
impl fmt::Display for MirrorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ron = to_string_pretty(self, get_ron_formatter()).map_err(|_| fmt::Error)?;
        f.write_str(&ron)
    }
}
