pub use anyhow::{anyhow, bail, Context, Result};
pub use ron::{extensions::Extensions, Options};
pub use serde::{Deserialize, Serialize};
pub use std::{fs, path::PathBuf};

/// Command line arguments of the `playlist-mirror` binary.
pub mod args;
/// Configuration file parsing and resolution of sync targets.
pub mod config;
/// Mirroring of companion cover images.
pub mod covers;
/// File fingerprints and digest helpers.
pub mod hasher;
/// The persisted per-target change ledger.
pub mod ledger;
/// Tracing setup and logging prelude.
pub mod logging;
/// Copy, symlink and conversion of single files.
pub mod materialize;
/// Reading and rewriting playlists.
pub mod playlist;
/// Removal of empty destination directories.
pub mod prune;
/// Extension-keyed conversion rules.
pub mod rules;
/// The sync orchestrator.
pub mod sync;
/// Path helpers and formatting utilities.
pub mod utils;
