use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::object::{self, list_objects, ObjectKind, RawObject};
use crate::refs::{self, HEAD};
use crate::repo::Repo;
use crate::object::tree::decode_tree;
use crate::types::{Commit, Tag};

/// fsck report
#[derive(Debug, Default)]
pub struct FsckReport {
    /// objects checked
    pub objects_checked: usize,
    /// objects that fail to decode or hash to the wrong id
    pub corrupt_objects: Vec<CorruptObject>,
    /// missing objects referenced by other objects
    pub missing_objects: Vec<MissingObject>,
    /// dangling objects (not reachable from any ref)
    pub dangling_objects: Vec<ObjectId>,
    /// refs that don't resolve
    pub broken_refs: Vec<BrokenRef>,
}

impl FsckReport {
    pub fn is_ok(&self) -> bool {
        self.corrupt_objects.is_empty()
            && self.missing_objects.is_empty()
            && self.broken_refs.is_empty()
    }
}

#[derive(Debug)]
pub struct CorruptObject {
    pub id: ObjectId,
    pub message: String,
}

#[derive(Debug)]
pub struct MissingObject {
    pub id: ObjectId,
    pub kind: ObjectKind,
    pub referenced_by: String,
}

#[derive(Debug)]
pub struct BrokenRef {
    pub name: String,
    pub message: String,
}

/// verify repository integrity
///
/// every stored object is decompressed and re-hashed, then everything
/// reachable from HEAD and refs/ is walked to find missing objects.
/// whatever is stored but unreachable is reported as dangling.
pub fn fsck(repo: &Repo) -> Result<FsckReport> {
    let mut report = FsckReport::default();

    // verify object hashes
    let all_objects = list_objects(repo)?;
    let mut decoded: HashMap<ObjectId, RawObject> = HashMap::new();
    for id in &all_objects {
        report.objects_checked += 1;
        match object::get(repo, id) {
            Ok(raw) => {
                decoded.insert(*id, raw);
            }
            Err(e) if is_corruption(&e) => report.corrupt_objects.push(CorruptObject {
                id: *id,
                message: e.to_string(),
            }),
            Err(e) => return Err(e),
        }
    }

    // walk everything reachable from refs
    let mut reachable = HashSet::new();
    let mut pending: Vec<(ObjectId, ObjectKind, String)> = Vec::new();

    let mut ref_names = vec![HEAD.to_string()];
    ref_names.extend(refs::list_refs(repo)?);
    for name in ref_names {
        match refs::resolve(repo, &name) {
            Ok(id) => pending.push((id, ObjectKind::Commit, name)),
            // an unborn HEAD is a normal state for a fresh repository
            Err(Error::RefNotFound(_)) if name == HEAD => {}
            Err(e @ (Error::RefNotFound(_) | Error::ReferenceCycle { .. })) => {
                report.broken_refs.push(BrokenRef {
                    name,
                    message: e.to_string(),
                })
            }
            Err(e) => return Err(e),
        }
    }

    while let Some((id, expected, referenced_by)) = pending.pop() {
        if !reachable.insert(id) {
            continue;
        }

        let Some(raw) = decoded.get(&id) else {
            if !report.corrupt_objects.iter().any(|c| c.id == id) {
                report.missing_objects.push(MissingObject {
                    id,
                    kind: expected,
                    referenced_by,
                });
            }
            continue;
        };

        // refs may point at tags; everything else must match its referrer
        let kind_ok = raw.kind == expected
            || (expected == ObjectKind::Commit && raw.kind == ObjectKind::Tag);
        if !kind_ok {
            report.corrupt_objects.push(CorruptObject {
                id,
                message: format!(
                    "{} expects a {}, found a {}",
                    referenced_by, expected, raw.kind
                ),
            });
            continue;
        }

        if let Err(e) = push_links(&id, raw, &mut pending) {
            report.corrupt_objects.push(CorruptObject {
                id,
                message: e.to_string(),
            });
        }
    }

    report.dangling_objects = all_objects
        .into_iter()
        .filter(|id| decoded.contains_key(id) && !reachable.contains(id))
        .collect();

    tracing::info!(
        checked = report.objects_checked,
        corrupt = report.corrupt_objects.len(),
        missing = report.missing_objects.len(),
        dangling = report.dangling_objects.len(),
        "fsck finished"
    );
    Ok(report)
}

fn push_links(
    id: &ObjectId,
    raw: &RawObject,
    pending: &mut Vec<(ObjectId, ObjectKind, String)>,
) -> Result<()> {
    match raw.kind {
        ObjectKind::Blob => {}
        ObjectKind::Tree => {
            let tree = decode_tree(id, &raw.content)?;
            for entry in tree.entries() {
                pending.push((
                    entry.id,
                    entry.kind(),
                    format!("tree {} entry {}", id, entry.name),
                ));
            }
        }
        ObjectKind::Commit => {
            let commit: Commit = ciborium::from_reader(&raw.content[..])?;
            pending.push((commit.tree, ObjectKind::Tree, format!("commit {}", id)));
            for parent in commit.parents {
                pending.push((parent, ObjectKind::Commit, format!("commit {}", id)));
            }
        }
        ObjectKind::Tag => {
            let tag: Tag = ciborium::from_reader(&raw.content[..])?;
            pending.push((tag.target, tag.target_kind, format!("tag {}", id)));
        }
    }
    Ok(())
}

fn is_corruption(e: &Error) -> bool {
    matches!(
        e,
        Error::CorruptObject(_)
            | Error::CorruptObjectMessage(_)
            | Error::InvalidObjectType(_)
            | Error::Io { .. }
    )
}
