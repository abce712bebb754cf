//! three-way merge of two commits
//!
//! a merge attempt ends in exactly one of four states: already up to date,
//! fast-forward, resolved (merge commit written, branch advanced) or needs
//! resolution (conflicting paths returned, nothing written to refs). the
//! compare-and-swap on the target branch is the only externally visible
//! commit point.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::index::{write_path_tree, Index};
use crate::object::{empty_tree, peel_to_commit, read_commit};
use crate::ops::merge_base::CommitGraph;
use crate::ops::{commit, flatten_tree, resolve_commit, CommitOptions};
use crate::refs;
use crate::repo::Repo;
use crate::types::PathState;

/// knobs for a merge
#[derive(Clone, Debug, Default)]
pub struct MergeOptions {
    /// defaults to the configured user identity
    pub author: Option<String>,
    /// defaults to "Merge <theirs> into <branch>"
    pub message: Option<String>,
    pub timestamp: Option<i64>,
    /// always create a merge commit, even when a fast-forward is possible
    pub no_fast_forward: bool,
    /// merge histories without a common ancestor against the empty tree
    pub allow_unrelated_histories: bool,
}

impl MergeOptions {
    fn commit_options(&self) -> CommitOptions {
        CommitOptions {
            author: self.author.clone(),
            timestamp: self.timestamp,
            allow_empty: true,
            ..Default::default()
        }
    }
}

/// how a single path differs between base, ours and theirs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PathClass {
    Unchanged,
    ChangedInOurs,
    ChangedInTheirs,
    ChangedInBothSame,
    ChangedInBothDifferent,
    AddedInOurs,
    AddedInTheirs,
    AddedInBothSame,
    AddedInBothDifferent,
    DeletedInOurs,
    DeletedInTheirs,
    DeletedInBoth,
    DeletedInOursChangedInTheirs,
    DeletedInTheirsChangedInOurs,
}

impl PathClass {
    fn of(
        base: Option<&PathState>,
        ours: Option<&PathState>,
        theirs: Option<&PathState>,
    ) -> Option<Self> {
        use PathClass::*;

        let class = match (base, ours, theirs) {
            (Some(b), Some(o), Some(t)) => match (o == b, t == b) {
                (true, true) => Unchanged,
                (false, true) => ChangedInOurs,
                (true, false) => ChangedInTheirs,
                (false, false) if o == t => ChangedInBothSame,
                (false, false) => ChangedInBothDifferent,
            },
            (None, Some(_), None) => AddedInOurs,
            (None, None, Some(_)) => AddedInTheirs,
            (None, Some(o), Some(t)) if o == t => AddedInBothSame,
            (None, Some(_), Some(_)) => AddedInBothDifferent,
            (Some(b), None, Some(t)) if t == b => DeletedInOurs,
            (Some(_), None, Some(_)) => DeletedInOursChangedInTheirs,
            (Some(b), Some(o), None) if o == b => DeletedInTheirs,
            (Some(_), Some(_), None) => DeletedInTheirsChangedInOurs,
            (Some(_), None, None) => DeletedInBoth,
            (None, None, None) => return None,
        };
        Some(class)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            PathClass::ChangedInBothDifferent
                | PathClass::AddedInBothDifferent
                | PathClass::DeletedInOursChangedInTheirs
                | PathClass::DeletedInTheirsChangedInOurs
        )
    }
}

/// one path of a three-way comparison
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathMerge {
    pub path: String,
    pub class: PathClass,
    pub base: Option<PathState>,
    pub ours: Option<PathState>,
    pub theirs: Option<PathState>,
}

impl PathMerge {
    /// the merged state of a non-conflicting path; None means deleted
    pub fn resolution(&self) -> Option<PathState> {
        use PathClass::*;

        match self.class {
            Unchanged | ChangedInOurs | ChangedInBothSame | AddedInOurs | AddedInBothSame => {
                self.ours
            }
            ChangedInTheirs | AddedInTheirs => self.theirs,
            _ => None,
        }
    }
}

/// a conflicting path with each side's content
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeConflictEntry {
    pub path: String,
    pub base: Option<PathState>,
    pub ours: Option<PathState>,
    pub theirs: Option<PathState>,
}

/// a merge that stopped on conflicts
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingMerge {
    /// ref that will move when the merge is concluded
    pub target: String,
    pub ours: ObjectId,
    pub theirs: ObjectId,
    /// None for unrelated histories merged against the empty tree
    pub base: Option<ObjectId>,
    pub conflicts: Vec<MergeConflictEntry>,
    /// paths that merged cleanly
    pub resolved: BTreeMap<String, PathState>,
}

impl PendingMerge {
    pub fn conflict_paths(&self) -> Vec<String> {
        self.conflicts.iter().map(|c| c.path.clone()).collect()
    }

    /// an index holding every cleanly merged path, for the caller to
    /// complete with resolutions of the conflicting ones
    pub fn to_index(&self, repo: &Repo) -> Result<Index> {
        let mut index = Index::new();
        for (path, state) in &self.resolved {
            index.stage_object(repo, path, state.mode, state.id)?;
        }
        Ok(index)
    }
}

/// terminal state of a merge attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// theirs is already contained in ours
    AlreadyUpToDate { head: ObjectId },
    /// the branch moved straight to theirs; no commit was written
    FastForward { from: ObjectId, to: ObjectId },
    /// a merge commit was written and the branch advanced to it
    Resolved { commit: ObjectId, tree: ObjectId },
    /// conflicts need a caller-driven resolution
    NeedsResolution(PendingMerge),
}

impl MergeOutcome {
    /// turn `NeedsResolution` into `Error::MergeConflict`
    pub fn into_result(self) -> Result<MergeOutcome> {
        match self {
            MergeOutcome::NeedsResolution(pending) => Err(Error::MergeConflict {
                paths: pending.conflict_paths(),
            }),
            other => Ok(other),
        }
    }
}

/// merge `theirs` into the branch `target_ref` names (e.g. HEAD)
///
/// lower-level not-found, cycle and corruption errors abort the merge as
/// `MergeAborted`; a `Conflict` from the final ref update is returned as-is
/// so the caller can retry.
pub fn merge(repo: &Repo, target_ref: &str, theirs: &str, opts: &MergeOptions) -> Result<MergeOutcome> {
    merge_inner(repo, target_ref, theirs, opts).map_err(abort_on_store_error)
}

fn merge_inner(
    repo: &Repo,
    target_ref: &str,
    theirs_rev: &str,
    opts: &MergeOptions,
) -> Result<MergeOutcome> {
    let target = refs::resolve_target_name(repo, target_ref)?;
    let ours = peel_to_commit(repo, &refs::resolve(repo, &target)?)?;
    let theirs = resolve_commit(repo, theirs_rev)?;

    // one graph for every ancestry question this merge asks
    let mut graph = CommitGraph::new(repo);

    if graph.is_ancestor(&theirs, &ours)? {
        tracing::debug!(branch = %target, head = %ours, "already up to date");
        return Ok(MergeOutcome::AlreadyUpToDate { head: ours });
    }

    if !opts.no_fast_forward && graph.is_ancestor(&ours, &theirs)? {
        refs::update_ref(repo, &target, Some(ours), theirs)?;
        tracing::info!(branch = %target, from = %ours, to = %theirs, "fast-forward");
        return Ok(MergeOutcome::FastForward {
            from: ours,
            to: theirs,
        });
    }

    let base = graph.merge_bases(&ours, &theirs)?.into_iter().next();
    let base_tree = match base {
        Some(id) => read_commit(repo, &id)?.tree,
        None if opts.allow_unrelated_histories => empty_tree(repo)?,
        None => return Err(Error::UnrelatedHistories { ours, theirs }),
    };

    let base_files = flatten_tree(repo, &base_tree)?;
    let our_files = flatten_tree(repo, &read_commit(repo, &ours)?.tree)?;
    let their_files = flatten_tree(repo, &read_commit(repo, &theirs)?.tree)?;

    let (resolved, conflicts) = three_way(&base_files, &our_files, &their_files);

    if !conflicts.is_empty() {
        tracing::info!(
            branch = %target,
            theirs = %theirs,
            conflicts = conflicts.len(),
            "merge needs resolution"
        );
        return Ok(MergeOutcome::NeedsResolution(PendingMerge {
            target,
            ours,
            theirs,
            base,
            conflicts,
            resolved,
        }));
    }

    let tree = write_path_tree(repo, resolved.iter().map(|(p, s)| (p.as_str(), *s)))?;
    let message = opts
        .message
        .clone()
        .unwrap_or_else(|| format!("Merge {} into {}", theirs_rev, target));
    let commit_id = commit(repo, &tree, &[ours, theirs], &message, &opts.commit_options())?;

    refs::update_ref(repo, &target, Some(ours), commit_id)?;
    tracing::info!(branch = %target, commit = %commit_id, "merged");

    Ok(MergeOutcome::Resolved {
        commit: commit_id,
        tree,
    })
}

/// commit a caller-resolved index as the merge of a pending merge
///
/// fails with `Conflict` if the target branch moved since the merge
/// attempt.
pub fn conclude_merge(
    repo: &Repo,
    index: &Index,
    pending: &PendingMerge,
    opts: &MergeOptions,
) -> Result<ObjectId> {
    let tree = index.build_tree(repo)?;
    let message = opts
        .message
        .clone()
        .unwrap_or_else(|| format!("Merge {} into {}", pending.theirs.short(), pending.target));
    let commit_id = commit(
        repo,
        &tree,
        &[pending.ours, pending.theirs],
        &message,
        &opts.commit_options(),
    )?;

    refs::update_ref(repo, &pending.target, Some(pending.ours), commit_id)?;
    tracing::info!(branch = %pending.target, commit = %commit_id, "concluded merge");
    Ok(commit_id)
}

/// classify every path present in any of the three trees, sorted by path
pub fn classify_paths(
    base: &BTreeMap<String, PathState>,
    ours: &BTreeMap<String, PathState>,
    theirs: &BTreeMap<String, PathState>,
) -> Vec<PathMerge> {
    let paths: BTreeSet<&String> = base.keys().chain(ours.keys()).chain(theirs.keys()).collect();

    paths
        .into_iter()
        .filter_map(|path| {
            let (b, o, t) = (base.get(path), ours.get(path), theirs.get(path));
            PathClass::of(b, o, t).map(|class| PathMerge {
                path: path.clone(),
                class,
                base: b.copied(),
                ours: o.copied(),
                theirs: t.copied(),
            })
        })
        .collect()
}

fn three_way(
    base: &BTreeMap<String, PathState>,
    ours: &BTreeMap<String, PathState>,
    theirs: &BTreeMap<String, PathState>,
) -> (BTreeMap<String, PathState>, Vec<MergeConflictEntry>) {
    let classified = classify_paths(base, ours, theirs);

    let mut resolved = BTreeMap::new();
    let mut conflicted = BTreeSet::new();
    for path_merge in &classified {
        if path_merge.class.is_conflict() {
            conflicted.insert(path_merge.path.clone());
        } else if let Some(state) = path_merge.resolution() {
            resolved.insert(path_merge.path.clone(), state);
        }
    }

    // a clean result can still use one name as both a file and a directory
    let all_paths: Vec<String> = resolved.keys().chain(conflicted.iter()).cloned().collect();
    for path in &all_paths {
        let mut end = 0;
        while let Some(pos) = path[end..].find('/') {
            end += pos;
            let parent = &path[..end];
            if resolved.contains_key(parent) || conflicted.contains(parent) {
                conflicted.insert(parent.to_string());
                conflicted.insert(path.clone());
            }
            end += 1;
        }
    }
    resolved.retain(|path, _| !conflicted.contains(path));

    let conflicts = classified
        .into_iter()
        .filter(|m| conflicted.contains(&m.path))
        .map(|m| MergeConflictEntry {
            path: m.path,
            base: m.base,
            ours: m.ours,
            theirs: m.theirs,
        })
        .collect();

    (resolved, conflicts)
}

fn abort_on_store_error(e: Error) -> Error {
    match e {
        Error::ObjectNotFound(_)
        | Error::RefNotFound(_)
        | Error::ReferenceCycle { .. }
        | Error::CorruptObject(_)
        | Error::CorruptObjectMessage(_)
        | Error::UnexpectedKind { .. }
        | Error::CborDecode(_)
        | Error::Io { .. } => {
            tracing::warn!(error = %e, "merge aborted");
            Error::MergeAborted(Box::new(e))
        }
        other => other,
    }
}
