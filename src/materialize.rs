use crate::{
    hasher::Fingerprint,
    logging::*,
    rules::{render_template, ConversionRule, RuleSet},
    *,
};
use std::{
    fmt, io,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

/// What happened to one destination file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Copied,
    Linked,
    Converted,
    Skipped,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Action::Copied => "copied",
            Action::Linked => "linked",
            Action::Converted => "converted",
            Action::Skipped => "skipped",
        };
        f.write_str(verb)
    }
}

/// Produces or refreshes destination files from their sources.
///
/// A conversion rule matching the source takes priority over the symlink
/// flag; without a rule the file is symlinked when `symlink` is set and
/// copied otherwise.
pub struct Materializer<'a> {
    rules: &'a RuleSet,
    symlink: bool,
    force: bool,
    dry_run: bool,
}

impl<'a> Materializer<'a> {
    pub fn new(rules: &'a RuleSet, symlink: bool) -> Self {
        Self {
            rules,
            symlink,
            force: false,
            dry_run: false,
        }
    }

    /// Ignore the ledger and reproduce every file.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Decide, but never touch the filesystem.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// The file that actually ends up on disk for `dst`: the converted
    /// sibling when a rule applies, `dst` itself otherwise.
    pub fn output_path(&self, dst: &Path) -> PathBuf {
        self.rules
            .lookup_path(dst)
            .and_then(|rule| rule.output_path(dst))
            .unwrap_or_else(|| dst.to_path_buf())
    }

    /// Decision for a playlist-tracked media file.
    ///
    /// `previous` is the fingerprint recorded in the prior ledger, `None` if
    /// the source was not synced to this destination before.
    pub fn needs_update(
        &self,
        dst: &Path,
        fingerprint: &Fingerprint,
        previous: Option<&Fingerprint>,
    ) -> bool {
        if self.force {
            return true;
        }

        let converted = self
            .rules
            .lookup_path(dst)
            .and_then(|rule| rule.output_path(dst));

        match (converted, previous) {
            // Unrecorded sources are always produced, so output left behind
            // by an interrupted run is never trusted.
            (_, None) => true,
            (Some(converted), Some(_)) if !converted.exists() => true,
            (None, Some(_)) if !dst.exists() => true,
            (_, Some(previous)) => previous != fingerprint,
        }
    }

    /// Decision for a companion cover: existence-checked, and refreshed only
    /// when a recorded fingerprint says the source changed.
    pub fn cover_needs_update(
        &self,
        dst: &Path,
        fingerprint: &Fingerprint,
        previous: Option<&Fingerprint>,
    ) -> bool {
        if self.force || !self.output_path(dst).exists() {
            return true;
        }
        previous.is_some_and(|previous| previous != fingerprint)
    }

    pub fn materialize(
        &self,
        src: &Path,
        dst: &Path,
        fingerprint: &Fingerprint,
        previous: Option<&Fingerprint>,
    ) -> Result<Action> {
        if !self.needs_update(dst, fingerprint, previous) {
            debug!("{} is up to date", dst.display());
            return Ok(Action::Skipped);
        }
        self.produce(src, dst)
    }

    pub fn materialize_cover(
        &self,
        src: &Path,
        dst: &Path,
        fingerprint: &Fingerprint,
        previous: Option<&Fingerprint>,
    ) -> Result<Action> {
        if !self.cover_needs_update(dst, fingerprint, previous) {
            debug!("cover {} is up to date", dst.display());
            return Ok(Action::Skipped);
        }
        self.produce(src, dst)
    }

    /// Copy, link or convert `src` into `dst`, creating parent directories
    /// on demand.
    pub fn produce(&self, src: &Path, dst: &Path) -> Result<Action> {
        let rule = self.rules.lookup_path(src);
        let action = match rule {
            Some(_) => Action::Converted,
            None if self.symlink => Action::Linked,
            None => Action::Copied,
        };

        if self.dry_run {
            return Ok(action);
        }

        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        match rule {
            Some(rule) => convert(rule, src, dst)?,
            None if self.symlink => link_file(src, dst)?,
            None => copy_file(src, dst)?,
        }

        Ok(action)
    }
}

/// Remove `path` if it is a symlink, so writes never go through to the
/// file it points at.
fn unlink_symlink(path: &Path) -> io::Result<()> {
    match path.symlink_metadata() {
        Ok(meta) if meta.file_type().is_symlink() => fs::remove_file(path),
        _ => Ok(()),
    }
}

fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    unlink_symlink(dst).with_context(|| format!("Failed to replace {}", dst.display()))?;

    if let Err(e) = fs::copy(src, dst) {
        let _ = fs::remove_file(dst);
        return Err(e).with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()));
    }

    Ok(())
}

#[cfg(unix)]
fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

#[cfg(windows)]
fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(src, dst)
}

fn link_file(src: &Path, dst: &Path) -> Result<()> {
    if dst.symlink_metadata().is_ok() {
        fs::remove_file(dst).with_context(|| format!("Failed to replace {}", dst.display()))?;
    }

    symlink(src, dst)
        .with_context(|| format!("Failed to link {} to {}", dst.display(), src.display()))
}

/// Run one converter invocation. Standard output and error are discarded,
/// only the exit status matters.
fn run_converter(template: &[String], source: &Path, output: &Path) -> Result<()> {
    let args = render_template(template, source, output);
    let (program, args) = args
        .split_first()
        .ok_or_else(|| anyhow!("Empty conversion command"))?;

    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .with_context(|| format!("Failed to run converter {:?}", program))?;

    if !status.success() {
        bail!(
            "Converter {:?} failed on {} ({status})",
            program,
            source.display()
        );
    }

    Ok(())
}

/// Convert `src` into the rule's output path for `dst`.
///
/// With a staging step the intermediate file lives in a scratch directory
/// that is removed when this function returns, whatever the outcome. On
/// failure any partially written output is deleted.
fn convert(rule: &ConversionRule, src: &Path, dst: &Path) -> Result<()> {
    let output = rule
        .output_path(dst)
        .ok_or_else(|| anyhow!("Cannot derive converted path for {}", dst.display()))?;

    // Some converters refuse to overwrite an existing output.
    if output.symlink_metadata().is_ok() {
        fs::remove_file(&output)
            .with_context(|| format!("Failed to replace {}", output.display()))?;
    }

    let result = match &rule.staging {
        Some(staging) => {
            let scratch = tempfile::Builder::new()
                .prefix("playlist-mirror-")
                .tempdir()
                .context("Failed to create scratch directory")?;
            let stem = src.file_stem().unwrap_or_else(|| "staged".as_ref());
            let mut staged = scratch.path().join(stem).into_os_string();
            staged.push(&staging.extension);
            let staged = PathBuf::from(staged);

            run_converter(&staging.command, src, &staged)
                .and_then(|_| run_converter(&rule.command, &staged, &output))
        }
        None => run_converter(&rule.command, src, &output),
    };

    if let Err(e) = result {
        if output.exists() {
            if let Err(remove) = fs::remove_file(&output) {
                warn!("Failed to remove partial output {}: {remove}", output.display());
            }
        }
        return Err(e);
    }

    if !output.exists() {
        bail!("Converter produced no output at {}", output.display());
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{hasher::file_fingerprint, rules::Staging};

    fn copy_rule(extension: &str, output_extension: &str) -> ConversionRule {
        ConversionRule {
            extension: extension.into(),
            output_extension: output_extension.into(),
            command: vec![
                "sh".into(),
                "-c".into(),
                "cp \"$0\" \"$1\"".into(),
                "{source}".into(),
                "{output}".into(),
            ],
            staging: None,
        }
    }

    fn fp(hex: &str) -> Fingerprint {
        Fingerprint::from(hex.to_string())
    }

    #[test]
    fn test_decision_table_plain_files() {
        let dir = tempfile::tempdir().unwrap();
        let rules = RuleSet::default();
        let materializer = Materializer::new(&rules, false);
        let dst = dir.path().join("a.ogg");

        // missing destination
        assert!(materializer.needs_update(&dst, &fp("1"), Some(&fp("1"))));

        fs::write(&dst, "x").unwrap();
        // not in the prior ledger
        assert!(materializer.needs_update(&dst, &fp("1"), None));
        // unchanged
        assert!(!materializer.needs_update(&dst, &fp("1"), Some(&fp("1"))));
        // changed
        assert!(materializer.needs_update(&dst, &fp("2"), Some(&fp("1"))));
        // forced
        assert!(Materializer::new(&rules, false)
            .force(true)
            .needs_update(&dst, &fp("1"), Some(&fp("1"))));
    }

    #[test]
    fn test_decision_table_converted_files() {
        let dir = tempfile::tempdir().unwrap();
        let rules = RuleSet::new(vec![copy_rule(".flac", ".mp3")]).unwrap();
        let materializer = Materializer::new(&rules, false);
        let dst = dir.path().join("a.flac");

        assert!(materializer.needs_update(&dst, &fp("1"), None));
        assert!(materializer.needs_update(&dst, &fp("1"), Some(&fp("1"))));

        fs::write(dir.path().join("a.mp3"), "x").unwrap();
        assert!(materializer.needs_update(&dst, &fp("1"), None));
        assert!(!materializer.needs_update(&dst, &fp("1"), Some(&fp("1"))));
        assert!(materializer.needs_update(&dst, &fp("2"), Some(&fp("1"))));
    }

    #[test]
    fn test_copy_and_skip() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src/a.ogg");
        let dst = dir.path().join("dst/artist/a.ogg");
        fs::create_dir_all(src.parent().unwrap()).unwrap();
        fs::write(&src, "audio").unwrap();
        let fingerprint = file_fingerprint(&src).unwrap();

        let rules = RuleSet::default();
        let materializer = Materializer::new(&rules, false);
        assert_eq!(
            materializer.materialize(&src, &dst, &fingerprint, None).unwrap(),
            Action::Copied
        );
        assert_eq!(fs::read_to_string(&dst).unwrap(), "audio");
        assert_eq!(
            materializer
                .materialize(&src, &dst, &fingerprint, Some(&fingerprint))
                .unwrap(),
            Action::Skipped
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.ogg");
        let dst = dir.path().join("out/a.ogg");
        fs::write(&src, "audio").unwrap();

        let rules = RuleSet::default();
        let materializer = Materializer::new(&rules, true);
        let fingerprint = file_fingerprint(&src).unwrap();
        assert_eq!(
            materializer.materialize(&src, &dst, &fingerprint, None).unwrap(),
            Action::Linked
        );
        assert_eq!(fs::read_link(&dst).unwrap(), src);

        // relinking replaces the existing link
        assert_eq!(materializer.produce(&src, &dst).unwrap(), Action::Linked);
        assert_eq!(fs::read_link(&dst).unwrap(), src);
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_replaces_symlink_without_touching_source() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.ogg");
        let dst = dir.path().join("out/a.ogg");
        fs::write(&src, "audio").unwrap();

        let rules = RuleSet::default();
        Materializer::new(&rules, true).produce(&src, &dst).unwrap();
        Materializer::new(&rules, false).produce(&src, &dst).unwrap();

        assert!(!dst.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&src).unwrap(), "audio");
    }

    #[cfg(unix)]
    #[test]
    fn test_conversion_beats_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.flac");
        let dst = dir.path().join("out/a.flac");
        fs::write(&src, "lossless").unwrap();

        let rules = RuleSet::new(vec![copy_rule(".flac", ".mp3")]).unwrap();
        let materializer = Materializer::new(&rules, true);
        assert_eq!(materializer.produce(&src, &dst).unwrap(), Action::Converted);
        assert!(!dst.exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("out/a.mp3")).unwrap(),
            "lossless"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_staged_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.flac");
        let dst = dir.path().join("out/a.flac");
        fs::write(&src, "lossless").unwrap();

        let mut rule = copy_rule(".flac", ".mp3");
        rule.staging = Some(Staging {
            extension: ".wav".into(),
            command: vec![
                "sh".into(),
                "-c".into(),
                "case \"$1\" in *.wav) cp \"$0\" \"$1\";; *) exit 1;; esac".into(),
                "{source}".into(),
                "{output}".into(),
            ],
        });
        let rules = RuleSet::new(vec![rule]).unwrap();

        Materializer::new(&rules, false).produce(&src, &dst).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("out/a.mp3")).unwrap(),
            "lossless"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_conversion_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.flac");
        let dst = dir.path().join("out/a.flac");
        fs::write(&src, "lossless").unwrap();

        let mut rule = copy_rule(".flac", ".mp3");
        rule.command = vec![
            "sh".into(),
            "-c".into(),
            "echo partial > \"$1\"; exit 3".into(),
            "{source}".into(),
            "{output}".into(),
        ];
        let rules = RuleSet::new(vec![rule]).unwrap();

        assert!(Materializer::new(&rules, false).produce(&src, &dst).is_err());
        assert!(!dir.path().join("out/a.mp3").exists());
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.ogg");
        let dst = dir.path().join("out/a.ogg");
        fs::write(&src, "audio").unwrap();

        let rules = RuleSet::default();
        let materializer = Materializer::new(&rules, false).dry_run(true);
        assert_eq!(materializer.produce(&src, &dst).unwrap(), Action::Copied);
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_cover_decision() {
        let dir = tempfile::tempdir().unwrap();
        let rules = RuleSet::default();
        let materializer = Materializer::new(&rules, false);
        let dst = dir.path().join("cover.jpg");

        assert!(materializer.cover_needs_update(&dst, &fp("1"), None));
        fs::write(&dst, "img").unwrap();
        assert!(!materializer.cover_needs_update(&dst, &fp("1"), None));
        assert!(!materializer.cover_needs_update(&dst, &fp("1"), Some(&fp("1"))));
        assert!(materializer.cover_needs_update(&dst, &fp("2"), Some(&fp("1"))));
    }
}
