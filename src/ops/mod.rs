//! high-level operations on cairn repositories

mod commit;
mod diff;
mod fsck;
mod log;
mod ls_tree;
mod merge;
mod merge_base;
mod tag;

pub use commit::{commit, commit_index, commit_index_to, CommitOptions};
pub use diff::{diff, diff_trees};
pub use fsck::{fsck, BrokenRef, CorruptObject, FsckReport, MissingObject};
pub use log::{log, walk, LogEntry, RevWalk, WalkOrder};
pub use ls_tree::{flatten_tree, ls_tree, ls_tree_recursive, LsTreeEntry};
pub use merge::{
    classify_paths, conclude_merge, merge, MergeConflictEntry, MergeOptions, MergeOutcome,
    PathClass, PathMerge, PendingMerge,
};
pub use merge_base::{is_ancestor, merge_base, merge_bases};
pub use tag::create_tag;

use crate::error::Result;
use crate::hash::ObjectId;
use crate::object::peel_to_commit;
use crate::refs;
use crate::repo::Repo;

/// resolve a ref name or hex id to a commit, peeling annotated tags
pub fn resolve_commit(repo: &Repo, rev: &str) -> Result<ObjectId> {
    let id = refs::resolve(repo, rev)?;
    peel_to_commit(repo, &id)
}
