//! The Worktree Resolver (§4.2): produces a usable, conflict-free local
//! directory for a clone.

use std::path::{Path, PathBuf};

/// Whether the resolver may synthesize an alternative path on conflict
/// (`Probe`) or must reject (`Commit`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolveMode {
    /// May append `-1`, `-2`, … to dodge a conflict.
    Probe,
    /// Must fail on conflict or on a non-directory existing path.
    Commit,
}

/// What `resolve` found the candidate path to currently be.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PathClass {
    Nonexistent,
    ExistingDirectory,
    /// Existing non-directory, or the path could not be `stat`-ed.
    ExistingNonDirectoryOrUnstattable,
}

/// Failures the resolver can report in [`ResolveMode::Commit`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// The path (or every synthesized alternative) conflicts with a known
    /// repository or non-terminal task.
    #[error("'{0}' is already in sync")]
    AlreadyInSync(PathBuf),
    /// The path exists and is not a directory.
    #[error("invalid local directory: '{0}'")]
    InvalidLocalDirectory(PathBuf),
    /// Directory creation failed.
    #[error("failed to create directory '{path}': {detail}")]
    CreateFailed {
        /// The path that could not be created.
        path: PathBuf,
        /// The underlying I/O error, rendered.
        detail: String,
    },
}

fn classify(path: &Path) -> PathClass {
    match path.metadata() {
        Ok(meta) if meta.is_dir() => PathClass::ExistingDirectory,
        Ok(_) => PathClass::ExistingNonDirectoryOrUnstattable,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => PathClass::Nonexistent,
        Err(_) => PathClass::ExistingNonDirectoryOrUnstattable,
    }
}

fn strip_trailing_separators(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    let trimmed = s.trim_end_matches(['/', std::path::MAIN_SEPARATOR]);
    PathBuf::from(if trimmed.is_empty() { "/" } else { trimmed })
}

/// Resolve `candidate` into a usable, conflict-free worktree path.
///
/// `conflicts` reports whether a path equals the worktree of any known
/// repository or non-terminal task (the "conflict oracle," §4.2 step 4).
/// `synth_cap` bounds the number of `-N` alternates tried in
/// [`ResolveMode::Probe`].
///
/// # Errors
/// In [`ResolveMode::Commit`]: [`ResolveError::AlreadyInSync`] on conflict,
/// [`ResolveError::InvalidLocalDirectory`] on an existing non-directory
/// path, or [`ResolveError::CreateFailed`] if directory creation fails. In
/// [`ResolveMode::Probe`] this function does not fail on conflict — it
/// tries alternatives — but can still fail if the synthesis cap is
/// exhausted.
pub fn resolve(
    candidate: &Path,
    mode: ResolveMode,
    synth_cap: u32,
    conflicts: &dyn Fn(&Path) -> bool,
) -> Result<PathBuf, ResolveError> {
    let candidate = strip_trailing_separators(candidate);

    match classify(&candidate) {
        PathClass::Nonexistent => {
            if mode == ResolveMode::Commit {
                create_dir_all(&candidate)?;
            }
            Ok(candidate)
        }
        PathClass::ExistingNonDirectoryOrUnstattable => match mode {
            ResolveMode::Probe => {
                create_dir_all(&candidate)?;
                Ok(candidate)
            }
            ResolveMode::Commit => Err(ResolveError::InvalidLocalDirectory(candidate)),
        },
        PathClass::ExistingDirectory => {
            if !conflicts(&candidate) {
                return Ok(candidate);
            }
            match mode {
                ResolveMode::Commit => Err(ResolveError::AlreadyInSync(candidate)),
                ResolveMode::Probe => synthesize(&candidate, synth_cap, conflicts)
                    .ok_or(ResolveError::AlreadyInSync(candidate)),
            }
        }
    }
}

fn synthesize(base: &Path, cap: u32, conflicts: &dyn Fn(&Path) -> bool) -> Option<PathBuf> {
    for n in 1..=cap {
        let mut os = base.as_os_str().to_owned();
        os.push(format!("-{n}"));
        let candidate = PathBuf::from(os);
        if !conflicts(&candidate) && classify(&candidate) != PathClass::ExistingDirectory {
            return Some(candidate);
        }
    }
    None
}

fn create_dir_all(path: &Path) -> Result<(), ResolveError> {
    std::fs::create_dir_all(path).map_err(|e| ResolveError::CreateFailed {
        path: path.to_owned(),
        detail: e.to_string(),
    })
}

/// `gen_default_worktree` (§6): a non-colliding path under `parent_dir`
/// named after `repo_name`. Never fails to return a path — on synthesis-cap
/// exhaustion it falls back to the naive join.
#[must_use]
pub fn gen_default_worktree(
    parent_dir: &Path,
    repo_name: &str,
    synth_cap: u32,
    conflicts: &dyn Fn(&Path) -> bool,
) -> PathBuf {
    let naive = parent_dir.join(repo_name);
    match resolve(&naive, ResolveMode::Probe, synth_cap, conflicts) {
        Ok(path) => path,
        Err(_) => naive,
    }
}
