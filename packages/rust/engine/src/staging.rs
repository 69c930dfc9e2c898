//! Staged file trees and the working directories they are materialised into.
//!
//! A [`StagedTree`] maps relative destination paths to their sources. Trees
//! are assembled with a [`TreeBuilder`], which rejects collisions and paths
//! that would escape the working root before anything touches the disk.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, instrument, warn};
use uuid::Uuid;

use probs_runner_shared::{ProbsError, Result};

// ---------------------------------------------------------------------------
// FileSource
// ---------------------------------------------------------------------------

/// Where the content of a staged entry comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// A file or directory on disk, copied when the tree is materialised.
    Path(PathBuf),
    /// In-memory content. `label` names the origin in error messages.
    Inline {
        label: Option<String>,
        content: Vec<u8>,
    },
}

impl FileSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// Unlabelled in-memory text.
    pub fn text(content: impl Into<String>) -> Self {
        Self::Inline {
            label: None,
            content: content.into().into_bytes(),
        }
    }

    /// In-memory text that reports `label` as its origin.
    pub fn labelled(label: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self::Inline {
            label: Some(label.into()),
            content: content.into(),
        }
    }

    /// Human-readable origin, used in collision errors and logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Inline {
                label: Some(label), ..
            } => label.clone(),
            Self::Inline { content, .. } => format!("<inline, {} bytes>", content.len()),
        }
    }

    /// Bytes that identify this source for content-addressed naming.
    ///
    /// Paths contribute their (absolute) path bytes, labelled inline sources
    /// their label, and anonymous inline sources their content.
    pub fn identity(&self) -> Vec<u8> {
        match self {
            Self::Path(path) => std::path::absolute(path)
                .unwrap_or_else(|_| path.clone())
                .into_os_string()
                .into_encoded_bytes(),
            Self::Inline {
                label: Some(label), ..
            } => label.as_bytes().to_vec(),
            Self::Inline { content, .. } => content.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// TreeBuilder / StagedTree
// ---------------------------------------------------------------------------

/// Builder that assembles a [`StagedTree`], failing on the first collision.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    entries: BTreeMap<String, FileSource>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `source` at `dest` (a relative, `/`-separated path).
    pub fn insert(&mut self, dest: impl Into<String>, source: FileSource) -> Result<&mut Self> {
        let dest = normalize_dest(&dest.into())?;
        if let Some(existing) = self.entries.get(&dest) {
            return Err(ProbsError::Collision {
                path: dest,
                existing: existing.describe(),
                incoming: source.describe(),
            });
        }
        self.entries.insert(dest, source);
        Ok(self)
    }

    /// Stage every entry of `tree`, failing if any destination is already taken.
    pub fn merge(&mut self, tree: StagedTree) -> Result<&mut Self> {
        for (dest, source) in tree.entries {
            self.insert(dest, source)?;
        }
        Ok(self)
    }

    pub fn build(self) -> StagedTree {
        StagedTree {
            entries: self.entries,
        }
    }
}

/// Relative destination path → source. Iteration order is sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedTree {
    entries: BTreeMap<String, FileSource>,
}

impl StagedTree {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, dest: &str) -> Option<&FileSource> {
        self.entries.get(dest)
    }

    pub fn contains(&self, dest: &str) -> bool {
        self.entries.contains_key(dest)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileSource)> {
        self.entries.iter().map(|(dest, src)| (dest.as_str(), src))
    }

    /// Write every entry below `root`, creating parent directories as needed.
    ///
    /// Entries are written in sorted order, so a directory source and files
    /// staged inside it always land the same way.
    #[instrument(skip_all, fields(root = %root.display(), entries = self.len()))]
    pub fn materialize(&self, root: &Path) -> Result<()> {
        for (dest, source) in &self.entries {
            let target = root.join(dest);
            match source {
                FileSource::Path(path) if path.is_dir() => copy_dir(path, &target)?,
                FileSource::Path(path) if path.is_file() => {
                    create_parent(&target)?;
                    std::fs::copy(path, &target).map_err(|e| ProbsError::io(path, e))?;
                }
                FileSource::Path(path) => {
                    return Err(ProbsError::NotFound { path: path.clone() });
                }
                FileSource::Inline { content, .. } => {
                    create_parent(&target)?;
                    std::fs::write(&target, content).map_err(|e| ProbsError::io(&target, e))?;
                }
            }
            debug!(%dest, source = %source.describe(), "staged");
        }
        Ok(())
    }
}

/// Validate a destination path and strip any trailing separator.
fn normalize_dest(dest: &str) -> Result<String> {
    let invalid = |reason: &str| ProbsError::InvalidPath {
        path: dest.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = dest.trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(invalid("empty path"));
    }
    if trimmed.contains('\\') {
        return Err(invalid("use '/' as the separator"));
    }

    let path = Path::new(trimmed);
    if path.is_absolute() || trimmed.starts_with('/') {
        return Err(invalid("must be relative"));
    }
    for component in path.components() {
        match component {
            Component::Normal(_) => {}
            Component::ParentDir => return Err(invalid("must not contain '..'")),
            _ => return Err(invalid("must not contain '.' or a root")),
        }
    }
    if trimmed.split('/').any(str::is_empty) {
        return Err(invalid("contains an empty component"));
    }

    Ok(trimmed.to_string())
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ProbsError::io(parent, e))?;
    }
    Ok(())
}

/// Recursively copy `src` into `dest`, merging with anything already there.
fn copy_dir(src: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest).map_err(|e| ProbsError::io(dest, e))?;
    let entries = std::fs::read_dir(src).map_err(|e| ProbsError::io(src, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| ProbsError::io(src, e))?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| ProbsError::io(&from, e))?;
        if file_type.is_dir() {
            copy_dir(&from, &to)?;
        } else {
            std::fs::copy(&from, &to).map_err(|e| ProbsError::io(&from, e))?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

/// A directory an engine session runs in.
///
/// Ephemeral workspaces are created under the system temp directory and
/// removed when dropped; caller-supplied ones are left in place.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    ephemeral: bool,
}

impl Workspace {
    /// Materialise `tree` into `working_dir`, or into a fresh ephemeral
    /// directory when none is given.
    pub fn stage(tree: &StagedTree, working_dir: Option<&Path>) -> Result<Self> {
        let workspace = match working_dir {
            Some(dir) => Self::at(dir)?,
            None => Self::ephemeral()?,
        };
        tree.materialize(&workspace.root)?;
        Ok(workspace)
    }

    /// A fresh directory under the system temp dir, removed on drop.
    pub fn ephemeral() -> Result<Self> {
        let root = std::env::temp_dir().join(format!("probs-runner-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&root).map_err(|e| ProbsError::io(&root, e))?;
        debug!(root = %root.display(), "created ephemeral workspace");
        Ok(Self {
            root,
            ephemeral: true,
        })
    }

    /// Use (and create if missing) a caller-owned directory.
    pub fn at(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| ProbsError::io(dir, e))?;
        Ok(Self {
            root: dir.to_path_buf(),
            ephemeral: false,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    /// Absolute path of a `/`-separated path relative to the root.
    pub fn path(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .filter(|part| !part.is_empty())
            .fold(self.root.clone(), |path, part| path.join(part))
    }

    /// Delete a file left in the workspace by an earlier session, if any.
    pub fn remove(&self, relative: &str) -> Result<()> {
        let path = self.path(relative);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed stale file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProbsError::io(&path, e)),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.ephemeral {
            return;
        }
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => debug!(root = %self.root.display(), "removed ephemeral workspace"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(root = %self.root.display(), "failed to remove workspace: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("probs-staging-test-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn builder_rejects_collisions() {
        let mut builder = TreeBuilder::new();
        builder
            .insert("data/a.ttl", FileSource::path("/tmp/one/a.ttl"))
            .unwrap();
        let err = builder
            .insert("data/a.ttl/", FileSource::path("/tmp/two/a.ttl"))
            .unwrap_err();
        match err {
            ProbsError::Collision {
                path,
                existing,
                incoming,
            } => {
                assert_eq!(path, "data/a.ttl");
                assert_eq!(existing, "/tmp/one/a.ttl");
                assert_eq!(incoming, "/tmp/two/a.ttl");
            }
            other => panic!("expected collision, got {other:?}"),
        }
    }

    #[test]
    fn builder_rejects_escaping_paths() {
        let mut builder = TreeBuilder::new();
        for dest in ["", "/etc/passwd", "../outside", "data/../../x", "a//b", "./a"] {
            let err = builder.insert(dest, FileSource::text("x")).unwrap_err();
            assert!(
                matches!(err, ProbsError::InvalidPath { .. }),
                "{dest:?} gave {err:?}"
            );
        }
        assert!(builder.build().is_empty());
    }

    #[test]
    fn merge_detects_cross_tree_collisions() {
        let mut first = TreeBuilder::new();
        first
            .insert("data/x.csv", FileSource::labelled("first", "1"))
            .unwrap();

        let mut second = TreeBuilder::new();
        second
            .insert("data/x.csv", FileSource::labelled("second", "2"))
            .unwrap();

        let err = first.merge(second.build()).unwrap_err();
        assert!(err.to_string().contains("first"));
        assert!(err.to_string().contains("second"));
    }

    #[test]
    fn materialize_writes_files_and_directories() {
        let src = temp_dir();
        std::fs::create_dir_all(src.join("shared/nested")).unwrap();
        std::fs::write(src.join("shared/a.rdfox"), "echo a").unwrap();
        std::fs::write(src.join("shared/nested/b.rdfox"), "echo b").unwrap();
        std::fs::write(src.join("facts.ttl"), ":a :b :c .").unwrap();

        let mut builder = TreeBuilder::new();
        builder
            .insert("scripts/shared", FileSource::path(src.join("shared")))
            .unwrap()
            .insert("data/facts.ttl", FileSource::path(src.join("facts.ttl")))
            .unwrap()
            .insert("scripts/run/master.rdfox", FileSource::text("quit"))
            .unwrap();
        let tree = builder.build();
        assert_eq!(
            tree.paths().collect::<Vec<_>>(),
            ["data/facts.ttl", "scripts/run/master.rdfox", "scripts/shared"]
        );

        let root = temp_dir();
        tree.materialize(&root).unwrap();
        assert_eq!(
            std::fs::read_to_string(root.join("scripts/shared/nested/b.rdfox")).unwrap(),
            "echo b"
        );
        assert_eq!(
            std::fs::read_to_string(root.join("data/facts.ttl")).unwrap(),
            ":a :b :c ."
        );
        assert_eq!(
            std::fs::read_to_string(root.join("scripts/run/master.rdfox")).unwrap(),
            "quit"
        );

        std::fs::remove_dir_all(&src).ok();
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn materialize_reports_missing_sources() {
        let mut builder = TreeBuilder::new();
        builder
            .insert("data/gone.ttl", FileSource::path("/nonexistent/probs/gone.ttl"))
            .unwrap();
        let root = temp_dir();
        let err = builder.build().materialize(&root).unwrap_err();
        assert!(matches!(err, ProbsError::NotFound { .. }));
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn ephemeral_workspace_removed_on_drop() {
        let mut builder = TreeBuilder::new();
        builder
            .insert("data/x.ttl", FileSource::text(":a :b :c ."))
            .unwrap();
        let workspace = Workspace::stage(&builder.build(), None).unwrap();
        let root = workspace.root().to_path_buf();
        assert!(workspace.is_ephemeral());
        assert!(workspace.path("data/x.ttl").is_file());

        drop(workspace);
        assert!(!root.exists());
    }

    #[test]
    fn caller_workspace_survives_drop() {
        let dir = temp_dir().join("work");
        let workspace = Workspace::stage(&StagedTree::default(), Some(&dir)).unwrap();
        assert!(!workspace.is_ephemeral());
        drop(workspace);
        assert!(dir.is_dir());
        std::fs::remove_dir_all(dir.parent().unwrap()).ok();
    }

    #[test]
    fn remove_clears_stale_files_only_once() {
        let dir = temp_dir().join("work");
        let workspace = Workspace::stage(&StagedTree::default(), Some(&dir)).unwrap();
        std::fs::create_dir_all(dir.join("data")).unwrap();
        std::fs::write(dir.join("data/old.nt.gz"), "stale").unwrap();

        workspace.remove("data/old.nt.gz").unwrap();
        assert!(!dir.join("data/old.nt.gz").exists());
        workspace.remove("data/old.nt.gz").unwrap();
        workspace.remove("data/never-written.log").unwrap();
        std::fs::remove_dir_all(dir.parent().unwrap()).ok();
    }

    #[test]
    fn identity_of_inline_sources() {
        assert_eq!(FileSource::labelled("facts", "x").identity(), b"facts");
        assert_eq!(FileSource::text("abc").identity(), b"abc");
        assert_eq!(FileSource::text("abc").describe(), "<inline, 3 bytes>");
    }
}
