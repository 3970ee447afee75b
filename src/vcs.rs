//! Git plumbing for the sync working copy.
//!
//! Thin wrapper over `git2` scoped to what synchronization needs: a
//! single `master` branch tracking `origin/master`, whole-tree commits,
//! merges with conflict extraction, and a private `synced` ref marking
//! the last imported commit.

use std::path::{Path, PathBuf};

use git2::build::CheckoutBuilder;
use git2::{
    AnnotatedCommit, ErrorCode, IndexAddOption, Oid, PushOptions, RemoteCallbacks, Repository,
    Signature, StatusOptions,
};
use tracing::debug;

use crate::error::{Error, Result};

/// Ref recording the last commit whose changes were imported into the
/// store.
pub const SYNC_REF: &str = "refs/yokadi/synced";

const BRANCH: &str = "master";
const REMOTE: &str = "origin";
const REMOTE_BRANCH_REF: &str = "refs/remotes/origin/master";

/// Outcome of merging the remote branch into the working branch.
#[derive(Debug)]
pub enum MergeOutcome {
    /// Nothing to merge.
    UpToDate,
    /// Local had no own commits; the branch was fast-forwarded.
    FastForward,
    /// A merge commit is pending in the index with no conflicts. The
    /// caller finishes it with `commit_merge`.
    Clean,
    /// Conflicting relative paths. The merge stays open until the caller
    /// resolves and commits, or aborts.
    Conflicts(Vec<PathBuf>),
}

/// The three stages of one conflicting path.
#[derive(Debug, Default)]
pub struct ConflictVersions {
    pub ancestor: Option<Vec<u8>>,
    pub local: Option<Vec<u8>>,
    pub remote: Option<Vec<u8>>,
}

/// Paths touched between two trees.
#[derive(Debug, Default)]
pub struct ChangeSet {
    pub added: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

/// A sync working copy.
pub struct Vcs {
    repo: Repository,
    workdir: PathBuf,
}

impl Vcs {
    /// Initialize a fresh repository with `master` as the initial branch.
    pub fn init(path: &Path) -> Result<Self> {
        let mut options = git2::RepositoryInitOptions::new();
        options.initial_head(&format!("refs/heads/{BRANCH}"));
        options.mkpath(true);
        let repo = Repository::init_opts(path, &options)?;
        Self::wrap(repo)
    }

    /// Clone `url` into `path`.
    pub fn clone(url: &str, path: &Path) -> Result<Self> {
        let repo = git2::build::RepoBuilder::new().clone(url, path)?;
        Self::wrap(repo)
    }

    /// Open an existing working copy.
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::open(path)?;
        Self::wrap(repo)
    }

    fn wrap(repo: Repository) -> Result<Self> {
        let workdir = repo
            .workdir()
            .ok_or_else(|| Error::Vcs("repository has no working directory".to_string()))?
            .to_path_buf();
        Ok(Self { repo, workdir })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn signature(&self) -> Result<Signature<'static>> {
        match self.repo.signature() {
            Ok(signature) => Ok(signature),
            // No user.name/user.email configured; sync commits are
            // machine-generated anyway.
            Err(_) => Ok(Signature::now("Yokadi", "yokadi@localhost")?),
        }
    }

    /// True when index and working tree carry no changes, untracked files
    /// included.
    pub fn is_clean(&self) -> Result<bool> {
        let mut options = StatusOptions::new();
        options.include_untracked(true).recurse_untracked_dirs(true);
        let statuses = self.repo.statuses(Some(&mut options))?;
        Ok(statuses.is_empty())
    }

    /// Stage everything and commit. Returns `None` when there was nothing
    /// to commit.
    pub fn commit_all(&self, message: &str) -> Result<Option<Oid>> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;

        let parents = match self.repo.head() {
            Ok(head) => vec![head.peel_to_commit()?],
            Err(err) if err.code() == ErrorCode::UnbornBranch => vec![],
            Err(err) => return Err(Error::Git(err)),
        };
        if let Some(parent) = parents.first() {
            if parent.tree_id() == tree_oid {
                return Ok(None);
            }
        }

        let signature = self.signature()?;
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        let oid = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parent_refs,
        )?;
        debug!(%oid, "committed working tree");
        Ok(Some(oid))
    }

    /// Stage specific relative paths (adds and deletions alike).
    pub fn stage(&self, paths: &[PathBuf]) -> Result<()> {
        let mut index = self.repo.index()?;
        for path in paths {
            if self.workdir.join(path).exists() {
                index.add_path(path)?;
            } else {
                index.remove_path(path)?;
            }
        }
        index.write()?;
        Ok(())
    }

    /// Fetch the remote using its configured refspecs.
    pub fn fetch(&self) -> Result<()> {
        let mut remote = self.repo.find_remote(REMOTE)?;
        remote.fetch(&[] as &[&str], None, None)?;
        Ok(())
    }

    fn remote_commit(&self) -> Result<AnnotatedCommit<'_>> {
        let reference = self.repo.find_reference(REMOTE_BRANCH_REF)?;
        Ok(self.repo.reference_to_annotated_commit(&reference)?)
    }

    /// Merge `origin/master` into the working branch.
    pub fn merge_remote(&self) -> Result<MergeOutcome> {
        let remote = self.remote_commit()?;
        let (analysis, _) = self.repo.merge_analysis(&[&remote])?;

        if analysis.is_up_to_date() {
            return Ok(MergeOutcome::UpToDate);
        }
        if analysis.is_fast_forward() {
            let target = remote.id();
            let mut reference = self.repo.find_reference(&format!("refs/heads/{BRANCH}"))?;
            reference.set_target(target, "fast-forward")?;
            self.repo.set_head(&format!("refs/heads/{BRANCH}"))?;
            self.repo
                .checkout_head(Some(CheckoutBuilder::new().force()))?;
            debug!(%target, "fast-forwarded");
            return Ok(MergeOutcome::FastForward);
        }

        self.repo.merge(&[&remote], None, None)?;
        let index = self.repo.index()?;
        if !index.has_conflicts() {
            return Ok(MergeOutcome::Clean);
        }

        let mut paths = Vec::new();
        for conflict in index.conflicts()? {
            let conflict = conflict?;
            let entry = conflict
                .our
                .as_ref()
                .or(conflict.their.as_ref())
                .or(conflict.ancestor.as_ref());
            if let Some(entry) = entry {
                paths.push(PathBuf::from(String::from_utf8_lossy(&entry.path).as_ref()));
            }
        }
        paths.sort();
        paths.dedup();
        Ok(MergeOutcome::Conflicts(paths))
    }

    /// The three stages of a conflicting path during an open merge.
    pub fn conflict_versions(&self, path: &Path) -> Result<ConflictVersions> {
        let wanted = path.to_string_lossy();
        let index = self.repo.index()?;
        for conflict in index.conflicts()? {
            let conflict = conflict?;
            let matches = [&conflict.ancestor, &conflict.our, &conflict.their]
                .into_iter()
                .flatten()
                .any(|entry| String::from_utf8_lossy(&entry.path) == wanted);
            if !matches {
                continue;
            }
            let blob = |entry: &Option<git2::IndexEntry>| -> Result<Option<Vec<u8>>> {
                match entry {
                    Some(entry) => {
                        Ok(Some(self.repo.find_blob(entry.id)?.content().to_vec()))
                    }
                    None => Ok(None),
                }
            };
            return Ok(ConflictVersions {
                ancestor: blob(&conflict.ancestor)?,
                local: blob(&conflict.our)?,
                remote: blob(&conflict.their)?,
            });
        }
        Err(Error::Vcs(format!(
            "no conflict recorded for '{}'",
            path.display()
        )))
    }

    /// Throw away an open merge and restore the pre-merge working tree.
    pub fn abort_merge(&self) -> Result<()> {
        self.repo.cleanup_state()?;
        let head = self.repo.head()?.peel_to_commit()?;
        self.repo
            .reset(head.as_object(), git2::ResetType::Hard, None)?;
        Ok(())
    }

    /// Commit an open merge with HEAD and MERGE_HEAD as parents.
    pub fn commit_merge(&self, message: &str) -> Result<Oid> {
        let mut index = self.repo.index()?;
        if index.has_conflicts() {
            return Err(Error::Vcs(
                "cannot commit a merge with unresolved conflicts".to_string(),
            ));
        }
        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;

        let local = self.repo.head()?.peel_to_commit()?;
        let merge_head = self.repo.find_reference("MERGE_HEAD")?.peel_to_commit()?;
        let signature = self.signature()?;
        let oid = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &[&local, &merge_head],
        )?;
        self.repo.cleanup_state()?;
        debug!(%oid, "committed merge");
        Ok(oid)
    }

    /// Content of a file at a revision, `None` when the file does not
    /// exist there.
    pub fn file_content_at(&self, refname: &str, path: &Path) -> Result<Option<Vec<u8>>> {
        let commit = match self.repo.revparse_single(refname) {
            Ok(object) => object.peel_to_commit()?,
            Err(err) if err.code() == ErrorCode::NotFound => return Ok(None),
            Err(err) => return Err(Error::Git(err)),
        };
        let tree = commit.tree()?;
        match tree.get_path(path) {
            Ok(entry) => {
                let blob = self.repo.find_blob(entry.id())?;
                Ok(Some(blob.content().to_vec()))
            }
            Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
            Err(err) => Err(Error::Git(err)),
        }
    }

    /// Paths added, modified and removed between `refname` and HEAD.
    /// An unresolvable `refname` counts as the empty tree, so everything
    /// reachable from HEAD shows up as added.
    pub fn changes_since(&self, refname: &str) -> Result<ChangeSet> {
        let old_tree = match self.repo.revparse_single(refname) {
            Ok(object) => Some(object.peel_to_commit()?.tree()?),
            Err(err) if err.code() == ErrorCode::NotFound => None,
            Err(err) => return Err(Error::Git(err)),
        };
        let head_tree = self.repo.head()?.peel_to_commit()?.tree()?;

        let diff =
            self.repo
                .diff_tree_to_tree(old_tree.as_ref(), Some(&head_tree), None)?;
        let mut changes = ChangeSet::default();
        for delta in diff.deltas() {
            match delta.status() {
                git2::Delta::Added => {
                    if let Some(path) = delta.new_file().path() {
                        changes.added.push(path.to_path_buf());
                    }
                }
                git2::Delta::Modified | git2::Delta::Typechange => {
                    if let Some(path) = delta.new_file().path() {
                        changes.modified.push(path.to_path_buf());
                    }
                }
                git2::Delta::Deleted => {
                    if let Some(path) = delta.old_file().path() {
                        changes.removed.push(path.to_path_buf());
                    }
                }
                git2::Delta::Renamed | git2::Delta::Copied => {
                    if let Some(path) = delta.old_file().path() {
                        changes.removed.push(path.to_path_buf());
                    }
                    if let Some(path) = delta.new_file().path() {
                        changes.added.push(path.to_path_buf());
                    }
                }
                _ => {}
            }
        }
        Ok(changes)
    }

    pub fn head_oid(&self) -> Result<Oid> {
        Ok(self.repo.head()?.peel_to_commit()?.id())
    }

    /// Move the sync ref to `oid`.
    pub fn set_synced(&self, oid: Oid) -> Result<()> {
        self.repo.reference(SYNC_REF, oid, true, "sync point")?;
        Ok(())
    }

    /// The current sync point, if one was ever recorded.
    pub fn synced(&self) -> Result<Option<Oid>> {
        match self.repo.find_reference(SYNC_REF) {
            Ok(reference) => Ok(reference.target()),
            Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
            Err(err) => Err(Error::Git(err)),
        }
    }

    /// Commits ahead of and behind `origin/master`.
    pub fn ahead_behind(&self) -> Result<(usize, usize)> {
        let local = self.head_oid()?;
        let remote = self.remote_commit()?.id();
        Ok(self.repo.graph_ahead_behind(local, remote)?)
    }

    /// Push `master`. A rejected non-fast-forward update surfaces as
    /// `NotFastForward` so the caller can pull first.
    pub fn push(&self) -> Result<()> {
        let mut rejection: Option<String> = None;
        {
            let mut callbacks = RemoteCallbacks::new();
            callbacks.push_update_reference(|_refname, status| {
                if let Some(message) = status {
                    rejection = Some(message.to_string());
                }
                Ok(())
            });
            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);

            let mut remote = self.repo.find_remote(REMOTE)?;
            let refspec = format!("refs/heads/{BRANCH}:refs/heads/{BRANCH}");
            match remote.push(&[refspec.as_str()], Some(&mut options)) {
                Ok(()) => {}
                Err(err) if err.code() == ErrorCode::NotFastForward => {
                    return Err(Error::NotFastForward);
                }
                Err(err) => return Err(Error::Git(err)),
            }
        }
        match rejection {
            None => Ok(()),
            Some(message)
                if message.contains("fast-forward") || message.contains("fetch first") =>
            {
                Err(Error::NotFastForward)
            }
            Some(message) => Err(Error::Vcs(message)),
        }
    }
}
