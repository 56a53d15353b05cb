use crate::{
    config::SyncTarget,
    covers::{sync_covers, CoverSet},
    hasher::{file_fingerprint, Fingerprint},
    ledger::Ledger,
    logging::*,
    materialize::{Action, Materializer},
    playlist::{read_playlist, write_playlist, PlaylistLine, PlaylistRewriter},
    prune::prune_empty_dirs,
    *,
};
use rayon::prelude::*;
use std::{
    collections::HashSet,
    fmt,
    path::{Component, Path},
};

/// Settings shared by every target of one invocation.
#[derive(Debug, Clone)]
pub struct SyncContext {
    /// Directory holding the per-target ledgers.
    pub data_dir: PathBuf,
    /// Report what would happen without touching the destination or ledger.
    pub dry_run: bool,
    /// Reproduce every file regardless of the ledger.
    pub force: bool,
}

impl SyncContext {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            dry_run: false,
            force: false,
        }
    }
}

/// A file that could not be synced or removed during a run.
#[derive(Debug)]
pub struct Failure {
    pub path: PathBuf,
    pub reason: String,
}

/// Summary of one target's run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub target: String,
    pub copied: usize,
    pub linked: usize,
    pub converted: usize,
    /// Cover images copied, linked or converted.
    pub covers: usize,
    /// Files (and covers) that were already up to date.
    pub skipped: usize,
    pub removed: usize,
    pub pruned: usize,
    pub failures: Vec<Failure>,
}

impl RunReport {
    fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            ..Default::default()
        }
    }

    /// Number of copy, link, convert and delete operations performed.
    pub fn changes(&self) -> usize {
        self.copied + self.linked + self.converted + self.covers + self.removed
    }

    fn record(&mut self, action: Action) {
        match action {
            Action::Copied => self.copied += 1,
            Action::Linked => self.linked += 1,
            Action::Converted => self.converted += 1,
            Action::Skipped => self.skipped += 1,
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} copied, {} linked, {} converted, {} covers, {} up to date, {} removed, {} failed",
            self.target,
            self.copied,
            self.linked,
            self.converted,
            self.covers,
            self.skipped,
            self.removed,
            self.failures.len()
        )
    }
}

/// What the playlists of a target ask for, read before anything is mutated.
struct Plan {
    /// Unique playlist entries in first-seen order.
    entries: Vec<String>,
    /// Rewritten destination playlists, by playlist name.
    playlists: Vec<(String, Vec<String>)>,
}

/// Read every playlist of `target`. A missing playlist aborts the target.
fn plan(target: &SyncTarget) -> Result<Plan> {
    let rewriter = PlaylistRewriter::new(&target.rules, target.playlist_prefix.as_deref());
    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    let mut playlists = Vec::with_capacity(target.playlists.len());

    for name in &target.playlists {
        let path = target.playlists_dir.join(name);
        if !path.is_file() {
            bail!("Error: playlist file {} not found", path.display());
        }

        let lines = read_playlist(&path)?;
        let mut rewritten = Vec::with_capacity(lines.len());
        for line in &lines {
            if let PlaylistLine::Entry(entry) = line {
                if seen.insert(entry.clone()) {
                    entries.push(entry.clone());
                }
            }
            rewritten.push(rewriter.rewrite_line(line));
        }
        playlists.push((name.clone(), rewritten));
    }

    Ok(Plan { entries, playlists })
}

/// Split a playlist entry into its absolute source path and its path
/// relative to the relocation root.
fn locate(target: &SyncTarget, entry: &str) -> Result<(PathBuf, PathBuf)> {
    let path = Path::new(entry);
    let relative = match path.strip_prefix(&target.relative_to) {
        Ok(relative) => relative,
        Err(_) if path.is_absolute() => bail!(
            "{entry} is outside of {}",
            target.relative_to.display()
        ),
        Err(_) => path,
    };

    let mut normalized = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            _ => bail!("{entry} points outside of {}", target.relative_to.display()),
        }
    }
    if normalized.as_os_str().is_empty() {
        bail!("{entry} does not name a file");
    }

    Ok((target.relative_to.join(&normalized), normalized))
}

/// Per-run state of one target, threaded through every step.
struct RunState<'a> {
    target: &'a SyncTarget,
    materializer: Materializer<'a>,
    dry_run: bool,
    prior: Ledger,
    synced: Ledger,
    /// Every source the playlists reference this run, synced or not.
    referenced: HashSet<PathBuf>,
    /// Destination files claimed by referenced sources.
    outputs: HashSet<PathBuf>,
    covers: CoverSet,
    report: RunReport,
}

impl RunState<'_> {
    fn announce(&self, action: Action, path: &Path) {
        if action == Action::Skipped {
            return;
        }
        if self.dry_run {
            println!("[dry-run] {action} {}", path.display());
        } else {
            println!("{action} {}", path.display());
        }
    }

    fn fail(&mut self, path: PathBuf, error: anyhow::Error) {
        warn!("Skipping {}: {error:#}", path.display());
        self.report.failures.push(Failure {
            path,
            reason: format!("{error:#}"),
        });
    }

    fn sync_entry(&mut self, entry: &str) {
        let (source, relative) = match locate(self.target, entry) {
            Ok(located) => located,
            Err(e) => return self.fail(PathBuf::from(entry), e),
        };
        if !self.referenced.insert(source.clone()) {
            return;
        }

        let dst = self.target.output_dir.join(relative);
        self.outputs.insert(self.materializer.output_path(&dst));

        match self.materialize(&source, &dst) {
            Ok((fingerprint, action)) => {
                self.announce(action, &source);
                self.report.record(action);
                self.synced.insert(source.clone(), fingerprint);
            }
            Err(e) => self.fail(source.clone(), e),
        }

        if let (Some(source_dir), Some(dest_dir)) = (source.parent(), dst.parent()) {
            self.sync_covers(source_dir, dest_dir);
        }
    }

    fn materialize(&self, source: &Path, dst: &Path) -> Result<(Fingerprint, Action)> {
        let fingerprint = file_fingerprint(source)
            .with_context(|| format!("Failed to read {}", source.display()))?;
        let action =
            self.materializer
                .materialize(source, dst, &fingerprint, self.prior.get(source))?;
        Ok((fingerprint, action))
    }

    fn sync_covers(&mut self, source_dir: &Path, dest_dir: &Path) {
        let outcomes = sync_covers(
            source_dir,
            dest_dir,
            &self.materializer,
            &self.prior,
            &mut self.covers,
        );

        for outcome in outcomes {
            self.referenced.insert(outcome.source.clone());
            if let Some(name) = outcome.source.file_name() {
                self.outputs
                    .insert(self.materializer.output_path(&dest_dir.join(name)));
            }

            match outcome.result {
                Ok((fingerprint, action)) => {
                    self.announce(action, &outcome.source);
                    match action {
                        Action::Skipped => self.report.skipped += 1,
                        _ => self.report.covers += 1,
                    }
                    self.synced.insert(outcome.source, fingerprint);
                }
                Err(e) => self.fail(outcome.source, e),
            }
        }
    }

    /// Delete the destinations of prior ledger entries no longer referenced.
    fn remove_stale(&mut self) {
        let stale: Vec<PathBuf> = self
            .prior
            .keys()
            .filter(|source| !self.referenced.contains(*source))
            .cloned()
            .collect();

        for source in stale {
            let Ok(relative) = source.strip_prefix(&self.target.relative_to) else {
                warn!(
                    "{} is outside of {}, leaving its destination alone",
                    source.display(),
                    self.target.relative_to.display()
                );
                continue;
            };

            let dst = self.target.output_dir.join(relative);
            let converted = self
                .target
                .rules
                .lookup_path(&source)
                .and_then(|rule| rule.output_path(&dst));

            self.remove_output(&dst);
            if let Some(converted) = converted {
                self.remove_output(&converted);
            }
        }
    }

    fn remove_output(&mut self, path: &Path) {
        if path.symlink_metadata().is_err() || self.outputs.contains(path) {
            return;
        }

        if self.dry_run {
            println!("[dry-run] removed {}", path.display());
            self.report.removed += 1;
            return;
        }

        match fs::remove_file(path) {
            Ok(()) => {
                println!("removed {}", path.display());
                self.report.removed += 1;
            }
            Err(e) => self.fail(
                path.to_path_buf(),
                anyhow!(e).context("Failed to remove stale file"),
            ),
        }
    }
}

/// Bring the destination of `target` in line with its playlists.
///
/// Nothing is written before every playlist has been read, so a missing
/// playlist leaves both the destination and the previous ledger untouched.
/// Per-file failures are collected in the report; those files get no
/// ledger entry and are retried on the next run.
pub fn sync_target(target: &SyncTarget, ctx: &SyncContext) -> Result<RunReport> {
    info!("Syncing {} into {}", target.name, target.output_dir.display());

    let ledger_path = Ledger::path_for(&ctx.data_dir, &target.output_dir);
    let prior = Ledger::load(&ledger_path)?;
    debug!("Loaded {} ledger entries from {}", prior.len(), ledger_path.display());

    let plan = plan(target)?;

    if !ctx.dry_run {
        fs::create_dir_all(&target.output_dir).with_context(|| {
            format!("Failed to create output directory {}", target.output_dir.display())
        })?;
    }

    let mut state = RunState {
        target,
        materializer: Materializer::new(&target.rules, target.symlink)
            .force(ctx.force)
            .dry_run(ctx.dry_run),
        dry_run: ctx.dry_run,
        prior,
        synced: Ledger::new(),
        referenced: HashSet::new(),
        outputs: HashSet::new(),
        covers: CoverSet::new(),
        report: RunReport::new(&target.name),
    };

    if let Some(dir) = &target.playlist_output_dir {
        for (name, lines) in &plan.playlists {
            let path = dir.join(name);
            if ctx.dry_run {
                println!("[dry-run] playlist {}", path.display());
            } else if let Err(e) = write_playlist(&path, lines) {
                state.fail(path, e);
            }
        }
    }

    for entry in &plan.entries {
        state.sync_entry(entry);
    }

    state.remove_stale();

    if ctx.dry_run {
        return Ok(state.report);
    }

    state.report.pruned = prune_empty_dirs(&target.output_dir).len();
    state.synced.save(&ledger_path)?;

    Ok(state.report)
}

/// Sync several targets.
///
/// Targets writing to distinct destinations own distinct ledgers and run in
/// parallel; otherwise they run one after the other in configuration order.
pub fn sync_all(targets: &[SyncTarget], ctx: &SyncContext) -> Vec<(String, Result<RunReport>)> {
    let destinations: HashSet<&PathBuf> = targets.iter().map(|t| &t.output_dir).collect();
    let run = |target: &SyncTarget| (target.name.clone(), sync_target(target, ctx));

    if destinations.len() == targets.len() {
        targets.par_iter().map(run).collect()
    } else {
        targets.iter().map(run).collect()
    }
}
