//! best common ancestors of two commits
//!
//! commits are read from the object store one at a time as the walk reaches
//! them and visited newest first by commit timestamp. a commit painted from
//! both sides is a candidate; its ancestors are painted STALE so they never
//! become candidates themselves, and the walk ends once every queued commit
//! is stale. like git's date-ordered walk this assumes a commit is not older
//! than its parents.

use std::collections::{BinaryHeap, HashMap, HashSet};

use bitflags::bitflags;

use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::object::read_commit;
use crate::repo::Repo;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    struct Paint: u8 {
        const OURS = 0b0001;
        const THEIRS = 0b0010;
        const BOTH = Self::OURS.bits() | Self::THEIRS.bits();
        const STALE = 0b0100;
        const RESULT = 0b1000;
    }
}

/// parents and timestamp of a loaded commit
#[derive(Clone, Debug)]
pub(crate) struct GraphNode {
    pub parents: Vec<ObjectId>,
    pub timestamp: i64,
}

/// cache of the commits a set of queries has touched
///
/// nothing is read ahead; a node is loaded the first time a traversal
/// reaches it.
pub(crate) struct CommitGraph<'r> {
    repo: &'r Repo,
    nodes: HashMap<ObjectId, GraphNode>,
    generations: HashMap<ObjectId, u64>,
}

impl<'r> CommitGraph<'r> {
    pub fn new(repo: &'r Repo) -> Self {
        Self {
            repo,
            nodes: HashMap::new(),
            generations: HashMap::new(),
        }
    }

    pub fn node(&mut self, id: &ObjectId) -> Result<&GraphNode> {
        if !self.nodes.contains_key(id) {
            let commit = read_commit(self.repo, id)?;
            self.nodes.insert(
                *id,
                GraphNode {
                    parents: commit.parents,
                    timestamp: commit.timestamp,
                },
            );
        }
        self.nodes.get(id).ok_or(Error::ObjectNotFound(*id))
    }

    /// 1 for a root, otherwise 1 + the largest parent generation
    ///
    /// reads the whole ancestry of `id`; only used to rank several equally
    /// good merge bases.
    pub fn generation(&mut self, id: &ObjectId) -> Result<u64> {
        // iterative post-order so deep histories don't blow the stack
        let mut stack = vec![*id];
        while let Some(&current) = stack.last() {
            if self.generations.contains_key(&current) {
                stack.pop();
                continue;
            }

            let parents = self.node(&current)?.parents.clone();
            let mut pending = false;
            let mut highest = 0;
            for parent in parents {
                match self.generations.get(&parent) {
                    Some(generation) => highest = highest.max(*generation),
                    None => {
                        pending = true;
                        stack.push(parent);
                    }
                }
            }

            if !pending {
                self.generations.insert(current, highest + 1);
                stack.pop();
            }
        }

        self.generations
            .get(id)
            .copied()
            .ok_or(Error::ObjectNotFound(*id))
    }

    /// true if `ancestor` is reachable from `descendant` (or equal to it)
    pub fn is_ancestor(&mut self, ancestor: &ObjectId, descendant: &ObjectId) -> Result<bool> {
        if ancestor == descendant {
            return Ok(true);
        }

        let cutoff = self.node(ancestor)?.timestamp;
        let mut seen = HashSet::from([*descendant]);
        let mut stack = vec![*descendant];

        while let Some(id) = stack.pop() {
            let parents = self.node(&id)?.parents.clone();
            for parent in parents {
                if parent == *ancestor {
                    return Ok(true);
                }
                if !seen.insert(parent) {
                    continue;
                }
                // older than the ancestor, so it can't lead back to it
                if self.node(&parent)?.timestamp >= cutoff {
                    stack.push(parent);
                }
            }
        }

        Ok(false)
    }

    /// all best common ancestors of `a` and `b`, best first
    pub fn merge_bases(&mut self, a: &ObjectId, b: &ObjectId) -> Result<Vec<ObjectId>> {
        if a == b {
            self.node(a)?;
            return Ok(vec![*a]);
        }

        let candidates = self.paint_down_to_common(a, b)?;
        let bases = self.remove_redundant(candidates)?;
        if bases.len() < 2 {
            return Ok(bases);
        }

        let mut ranked = Vec::with_capacity(bases.len());
        for id in bases {
            let generation = self.generation(&id)?;
            let timestamp = self.node(&id)?.timestamp;
            ranked.push((generation, timestamp, id));
        }
        // highest generation, newest, then smallest id
        ranked.sort_by(|x, y| y.0.cmp(&x.0).then(y.1.cmp(&x.1)).then(x.2.cmp(&y.2)));
        Ok(ranked.into_iter().map(|(_, _, id)| id).collect())
    }

    fn paint_down_to_common(&mut self, a: &ObjectId, b: &ObjectId) -> Result<Vec<ObjectId>> {
        let mut paint: HashMap<ObjectId, Paint> = HashMap::new();
        let mut queue = PaintQueue::default();
        let mut results = Vec::new();

        paint.insert(*a, Paint::OURS);
        paint.insert(*b, Paint::THEIRS);
        queue.push(self, *a, false, Paint::OURS)?;
        queue.push(self, *b, false, Paint::THEIRS)?;

        while queue.live > 0 {
            let Some(id) = queue.pop(&paint) else {
                break;
            };

            let mut flags = paint.get(&id).copied().unwrap_or_default();
            if flags.contains(Paint::BOTH) && !flags.contains(Paint::STALE) {
                flags |= Paint::RESULT | Paint::STALE;
                paint.insert(id, flags);
                results.push(id);
                tracing::trace!(commit = %id, "common ancestor candidate");
            }

            let propagate = flags & (Paint::BOTH | Paint::STALE);
            let parents = self.node(&id)?.parents.clone();
            for parent in parents {
                let parent_flags = paint.entry(parent).or_default();
                if parent_flags.contains(propagate) {
                    continue;
                }
                let was_stale = parent_flags.contains(Paint::STALE);
                *parent_flags |= propagate;
                let now = *parent_flags;
                queue.push(self, parent, was_stale, now)?;
            }
        }

        Ok(results)
    }

    /// drop candidates that are ancestors of other candidates
    fn remove_redundant(&mut self, candidates: Vec<ObjectId>) -> Result<Vec<ObjectId>> {
        if candidates.len() < 2 {
            return Ok(candidates);
        }

        let mut kept = Vec::with_capacity(candidates.len());
        for (i, candidate) in candidates.iter().enumerate() {
            let mut redundant = false;
            for (j, other) in candidates.iter().enumerate() {
                if i != j && self.is_ancestor(candidate, other)? {
                    redundant = true;
                    break;
                }
            }
            if redundant {
                tracing::trace!(commit = %candidate, "dropping redundant merge base");
            } else {
                kept.push(*candidate);
            }
        }
        Ok(kept)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct QueueEntry {
    timestamp: i64,
    id: ObjectId,
}

/// newest-first queue holding each commit at most once
///
/// `live` counts queued commits not yet painted STALE.
#[derive(Default)]
struct PaintQueue {
    heap: BinaryHeap<QueueEntry>,
    queued: HashSet<ObjectId>,
    live: usize,
}

impl PaintQueue {
    fn push(
        &mut self,
        graph: &mut CommitGraph<'_>,
        id: ObjectId,
        was_stale: bool,
        flags: Paint,
    ) -> Result<()> {
        let stale = flags.contains(Paint::STALE);
        if self.queued.contains(&id) {
            if stale && !was_stale {
                self.live -= 1;
            }
            return Ok(());
        }

        let timestamp = graph.node(&id)?.timestamp;
        self.heap.push(QueueEntry { timestamp, id });
        self.queued.insert(id);
        if !stale {
            self.live += 1;
        }
        Ok(())
    }

    fn pop(&mut self, paint: &HashMap<ObjectId, Paint>) -> Option<ObjectId> {
        let entry = self.heap.pop()?;
        self.queued.remove(&entry.id);
        let stale = paint
            .get(&entry.id)
            .is_some_and(|flags| flags.contains(Paint::STALE));
        if !stale {
            self.live -= 1;
        }
        Some(entry.id)
    }
}

/// the single best common ancestor of two commits
///
/// among several best common ancestors (criss-cross histories) the one with
/// the greatest generation wins, then the newest timestamp, then the
/// smallest id. returns None when the histories are disjoint.
pub fn merge_base(repo: &Repo, a: &ObjectId, b: &ObjectId) -> Result<Option<ObjectId>> {
    Ok(merge_bases(repo, a, b)?.into_iter().next())
}

/// all best common ancestors, best first
pub fn merge_bases(repo: &Repo, a: &ObjectId, b: &ObjectId) -> Result<Vec<ObjectId>> {
    let bases = CommitGraph::new(repo).merge_bases(a, b)?;
    tracing::debug!(a = %a, b = %b, bases = bases.len(), "computed merge bases");
    Ok(bases)
}

/// true if `ancestor` is reachable from `descendant` (or equal to it)
pub fn is_ancestor(repo: &Repo, ancestor: &ObjectId, descendant: &ObjectId) -> Result<bool> {
    CommitGraph::new(repo).is_ancestor(ancestor, descendant)
}
