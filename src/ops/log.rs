use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use crate::error::Result;
use crate::hash::ObjectId;
use crate::object::read_commit;
use crate::ops::resolve_commit;
use crate::repo::Repo;
use crate::types::Commit;

/// commit with its id for log output
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub id: ObjectId,
    pub commit: Commit,
}

/// order in which a walk yields commits
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WalkOrder {
    /// newest timestamp first, ties by id
    #[default]
    Chronological,
    /// no parent before any of its children, ties newest first
    Topological,
}

/// lazy walk over the history reachable from a set of commits
///
/// every reachable commit is yielded exactly once. after an error the
/// walk is finished.
pub struct RevWalk<'r> {
    repo: &'r Repo,
    state: WalkState,
    failed: bool,
}

enum WalkState {
    Chronological {
        queue: BinaryHeap<(i64, ObjectId)>,
        loaded: HashMap<ObjectId, Commit>,
        seen: HashSet<ObjectId>,
        /// parents of the last yielded commit, queued on the next call
        unqueued: Vec<ObjectId>,
    },
    Topological {
        ready: BinaryHeap<(i64, ObjectId)>,
        commits: HashMap<ObjectId, Commit>,
        children_left: HashMap<ObjectId, usize>,
    },
}

/// start a walk from `starts`
///
/// topological walks load the whole reachable graph up front to count
/// children; chronological walks read commits as they go.
pub fn walk<'r>(repo: &'r Repo, starts: &[ObjectId], order: WalkOrder) -> Result<RevWalk<'r>> {
    let state = match order {
        WalkOrder::Chronological => {
            let mut queue = BinaryHeap::new();
            let mut loaded = HashMap::new();
            let mut seen = HashSet::new();
            for id in starts {
                if seen.insert(*id) {
                    let commit = read_commit(repo, id)?;
                    queue.push((commit.timestamp, *id));
                    loaded.insert(*id, commit);
                }
            }
            WalkState::Chronological {
                queue,
                loaded,
                seen,
                unqueued: Vec::new(),
            }
        }
        WalkOrder::Topological => topological_state(repo, starts)?,
    };

    Ok(RevWalk {
        repo,
        state,
        failed: false,
    })
}

fn topological_state(repo: &Repo, starts: &[ObjectId]) -> Result<WalkState> {
    let mut commits: HashMap<ObjectId, Commit> = HashMap::new();
    let mut children_left: HashMap<ObjectId, usize> = HashMap::new();
    let mut queue: VecDeque<ObjectId> = starts.iter().copied().collect();

    while let Some(id) = queue.pop_front() {
        if commits.contains_key(&id) {
            continue;
        }
        let commit = read_commit(repo, &id)?;
        for parent in unique_parents(&commit) {
            *children_left.entry(parent).or_default() += 1;
            queue.push_back(parent);
        }
        commits.insert(id, commit);
    }

    let ready = commits
        .iter()
        .filter(|(id, _)| !children_left.contains_key(*id))
        .map(|(id, commit)| (commit.timestamp, *id))
        .collect();

    tracing::trace!(commits = commits.len(), "loaded graph for topological walk");
    Ok(WalkState::Topological {
        ready,
        commits,
        children_left,
    })
}

fn unique_parents(commit: &Commit) -> Vec<ObjectId> {
    let mut parents = Vec::with_capacity(commit.parents.len());
    for parent in &commit.parents {
        if !parents.contains(parent) {
            parents.push(*parent);
        }
    }
    parents
}

impl Iterator for RevWalk<'_> {
    type Item = Result<LogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let result = match &mut self.state {
            WalkState::Chronological {
                queue,
                loaded,
                seen,
                unqueued,
            } => next_chronological(self.repo, queue, loaded, seen, unqueued),
            WalkState::Topological {
                ready,
                commits,
                children_left,
            } => Ok(next_topological(ready, commits, children_left)),
        };

        match result {
            Ok(entry) => entry.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

fn next_chronological(
    repo: &Repo,
    queue: &mut BinaryHeap<(i64, ObjectId)>,
    loaded: &mut HashMap<ObjectId, Commit>,
    seen: &mut HashSet<ObjectId>,
    unqueued: &mut Vec<ObjectId>,
) -> Result<Option<LogEntry>> {
    // a commit is yielded before its parents are read
    for parent in unqueued.drain(..) {
        if seen.insert(parent) {
            let parent_commit = read_commit(repo, &parent)?;
            queue.push((parent_commit.timestamp, parent));
            loaded.insert(parent, parent_commit);
        }
    }

    let Some((_, id)) = queue.pop() else {
        return Ok(None);
    };
    let commit = match loaded.remove(&id) {
        Some(commit) => commit,
        None => read_commit(repo, &id)?,
    };
    unqueued.extend_from_slice(&commit.parents);

    Ok(Some(LogEntry { id, commit }))
}

fn next_topological(
    ready: &mut BinaryHeap<(i64, ObjectId)>,
    commits: &mut HashMap<ObjectId, Commit>,
    children_left: &mut HashMap<ObjectId, usize>,
) -> Option<LogEntry> {
    let (_, id) = ready.pop()?;
    let commit = commits.remove(&id)?;

    for parent in unique_parents(&commit) {
        if let Some(left) = children_left.get_mut(&parent) {
            *left -= 1;
            if *left == 0 {
                children_left.remove(&parent);
                if let Some(parent_commit) = commits.get(&parent) {
                    ready.push((parent_commit.timestamp, parent));
                }
            }
        }
    }

    Some(LogEntry { id, commit })
}

/// get commit history for a ref, newest first
pub fn log(repo: &Repo, rev: &str, max_count: Option<usize>) -> Result<Vec<LogEntry>> {
    let head = resolve_commit(repo, rev)?;
    let walker = walk(repo, &[head], WalkOrder::Chronological)?;

    match max_count {
        Some(max) => walker.take(max).collect(),
        None => walker.collect(),
    }
}

/// format a log entry for display
impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "commit {}", self.id)?;
        if self.commit.is_merge() {
            let parents: Vec<String> = self.commit.parents.iter().map(|p| p.short()).collect();
            writeln!(f, "Merge: {}", parents.join(" "))?;
        }
        writeln!(f, "Author: {}", self.commit.author)?;
        writeln!(f, "Date:   {}", self.commit.timestamp)?;

        writeln!(f)?;
        for line in self.commit.message.lines() {
            writeln!(f, "    {}", line)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::index::Index;
    use crate::object::empty_tree;
    use crate::ops::{commit, commit_index, CommitOptions};
    use tempfile::tempdir;

    fn test_repo() -> (tempfile::TempDir, Repo) {
        let dir = tempdir().unwrap();
        let repo = Repo::init(&dir.path().join("repo")).unwrap();
        (dir, repo)
    }

    fn mk(repo: &Repo, parents: &[ObjectId], name: &str, timestamp: i64) -> ObjectId {
        let tree = empty_tree(repo).unwrap();
        let opts = CommitOptions {
            timestamp: Some(timestamp),
            allow_empty: true,
            ..Default::default()
        };
        commit(repo, &tree, parents, name, &opts).unwrap()
    }

    fn ids(walker: RevWalk<'_>) -> Vec<ObjectId> {
        walker.map(|entry| entry.unwrap().id).collect()
    }

    fn position(order: &[ObjectId], id: &ObjectId) -> usize {
        order.iter().position(|x| x == id).unwrap()
    }

    #[test]
    fn test_log_single_commit() {
        let (_dir, repo) = test_repo();
        let mut index = Index::new();
        index.stage(&repo, "file.txt", b"content").unwrap();
        commit_index(&repo, &index, "first commit", &CommitOptions::default()).unwrap();

        let entries = log(&repo, "HEAD", None).unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].commit.message, "first commit");
    }

    #[test]
    fn test_log_multiple_commits_newest_first() {
        let (_dir, repo) = test_repo();
        let mut index = Index::new();

        for i in 0..3 {
            index
                .stage(&repo, "file.txt", format!("v{}", i).as_bytes())
                .unwrap();
            let opts = CommitOptions {
                timestamp: Some(100 + i),
                ..Default::default()
            };
            commit_index(&repo, &index, &format!("commit {}", i), &opts).unwrap();
        }

        let entries = log(&repo, "refs/heads/main", None).unwrap();
        let messages: Vec<_> = entries.iter().map(|e| e.commit.message.as_str()).collect();
        assert_eq!(messages, vec!["commit 2", "commit 1", "commit 0"]);
    }

    #[test]
    fn test_log_max_count() {
        let (_dir, repo) = test_repo();
        let mut tip = mk(&repo, &[], "c0", 0);
        for i in 1..5 {
            tip = mk(&repo, &[tip], &format!("c{}", i), i);
        }
        crate::refs::update_ref(&repo, "refs/heads/main", None, tip).unwrap();

        let entries = log(&repo, "HEAD", Some(2)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, tip);
    }

    #[test]
    fn test_chronological_walk_interleaves_branches() {
        let (_dir, repo) = test_repo();
        let a = mk(&repo, &[], "a", 1);
        let b = mk(&repo, &[a], "b", 2);
        let c = mk(&repo, &[a], "c", 3);
        let d = mk(&repo, &[b], "d", 4);
        let m = mk(&repo, &[d, c], "m", 5);

        let order = ids(walk(&repo, &[m], WalkOrder::Chronological).unwrap());
        assert_eq!(order, vec![m, d, c, b, a]);
    }

    #[test]
    fn test_topological_never_yields_parent_before_child() {
        let (_dir, repo) = test_repo();
        // a skewed clock: the child b claims to be older than its parent a
        let a = mk(&repo, &[], "a", 10);
        let b = mk(&repo, &[a], "b", 5);
        let c = mk(&repo, &[a], "c", 7);
        let m = mk(&repo, &[b, c], "m", 8);

        let chrono = ids(walk(&repo, &[m], WalkOrder::Chronological).unwrap());
        assert_eq!(chrono.len(), 4);

        let topo = ids(walk(&repo, &[m], WalkOrder::Topological).unwrap());
        assert_eq!(topo.len(), 4);
        assert_eq!(topo[0], m);
        assert!(position(&topo, &b) < position(&topo, &a));
        assert!(position(&topo, &c) < position(&topo, &a));
        // ties broken newest first
        assert_eq!(topo, vec![m, c, b, a]);
    }

    #[test]
    fn test_walk_from_multiple_starts_yields_each_once() {
        let (_dir, repo) = test_repo();
        let a = mk(&repo, &[], "a", 1);
        let b = mk(&repo, &[a], "b", 2);
        let c = mk(&repo, &[a], "c", 3);

        for order in [WalkOrder::Chronological, WalkOrder::Topological] {
            let mut seen = ids(walk(&repo, &[b, c, b], order).unwrap());
            seen.sort();
            let mut expected = vec![a, b, c];
            expected.sort();
            assert_eq!(seen, expected);
        }
    }

    #[test]
    fn test_walks_are_restartable() {
        let (_dir, repo) = test_repo();
        let a = mk(&repo, &[], "a", 1);
        let b = mk(&repo, &[a], "b", 2);

        let first = ids(walk(&repo, &[b], WalkOrder::Chronological).unwrap());
        let second = ids(walk(&repo, &[b], WalkOrder::Chronological).unwrap());
        assert_eq!(first, second);
    }

    #[test]
    fn test_walk_yields_commit_before_missing_parent() {
        let (_dir, repo) = test_repo();
        let a = mk(&repo, &[], "a", 1);
        let b = mk(&repo, &[a], "b", 2);
        std::fs::remove_file(crate::object::object_path(&repo, &a)).unwrap();

        let mut walker = walk(&repo, &[b], WalkOrder::Chronological).unwrap();
        assert_eq!(walker.next().unwrap().unwrap().id, b);
        assert!(matches!(walker.next(), Some(Err(Error::ObjectNotFound(_)))));
        assert!(walker.next().is_none());

        // a bounded log never touches the missing parent
        crate::refs::update_ref(&repo, "refs/heads/main", None, b).unwrap();
        let entries = log(&repo, "HEAD", Some(1)).unwrap();
        assert_eq!(entries[0].id, b);

        assert!(matches!(
            walk(&repo, &[b], WalkOrder::Topological),
            Err(Error::ObjectNotFound(_))
        ));
    }

    #[test]
    fn test_log_entry_display() {
        let (_dir, repo) = test_repo();
        let mut index = Index::new();
        index.stage(&repo, "file.txt", b"content").unwrap();
        let opts = CommitOptions {
            author: Some("Test Author".to_string()),
            ..Default::default()
        };
        commit_index(&repo, &index, "test message", &opts).unwrap();

        let entries = log(&repo, "HEAD", None).unwrap();
        let display = format!("{}", entries[0]);

        assert!(display.contains("commit"));
        assert!(display.contains("Author: Test Author"));
        assert!(display.contains("test message"));
    }
}
