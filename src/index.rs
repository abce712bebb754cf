//! the staging area
//!
//! an ordered table of path -> staged blob that the next commit is built
//! from. persisted at `<repo>/index` as CBOR followed by a sha256 trailer
//! over the CBOR bytes.

use std::collections::BTreeMap;
use std::fs;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::object::{self, write_blob, write_tree, ObjectKind};
use crate::repo::{FileLock, Repo};
use crate::types::{now_secs, validate_entry_name, EntryMode, PathState, Tree, TreeEntry};

const INDEX_VERSION: u32 = 1;
const CHECKSUM_LEN: usize = 32;

/// one staged file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub path: String,
    pub id: ObjectId,
    pub mode: EntryMode,
    pub size: u64,
    pub staged_at: i64,
}

impl IndexEntry {
    /// the (mode, id) pair this entry contributes to a tree
    pub fn state(&self) -> PathState {
        PathState::new(self.mode, self.id)
    }
}

#[derive(Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    entries: Vec<IndexEntry>,
}

/// in-memory index, keyed and ordered by path bytes
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Index {
    entries: BTreeMap<String, IndexEntry>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// load the index from disk; a missing file is an empty index
    pub fn load(repo: &Repo) -> Result<Self> {
        let path = repo.index_path();
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(Error::Io { path, source: e }),
        };

        if data.len() < CHECKSUM_LEN {
            return Err(Error::CorruptIndex("file too short".to_string()));
        }

        let (body, trailer) = data.split_at(data.len() - CHECKSUM_LEN);
        if Sha256::digest(body).as_slice() != trailer {
            tracing::warn!(path = %path.display(), "index checksum mismatch");
            return Err(Error::CorruptIndex("checksum mismatch".to_string()));
        }

        let file: IndexFile = ciborium::from_reader(body)?;
        if file.version != INDEX_VERSION {
            return Err(Error::CorruptIndex(format!(
                "unsupported version {}",
                file.version
            )));
        }

        let mut entries = BTreeMap::new();
        for entry in file.entries {
            if entries.insert(entry.path.clone(), entry).is_some() {
                return Err(Error::CorruptIndex("duplicate path".to_string()));
            }
        }

        Ok(Self { entries })
    }

    /// write the index atomically under `index.lock`
    pub fn save(&self, repo: &Repo) -> Result<()> {
        let index_path = repo.index_path();
        let _lock = FileLock::acquire(&repo.path().join("index.lock"))?;

        let file = IndexFile {
            version: INDEX_VERSION,
            entries: self.entries.values().cloned().collect(),
        };
        let mut data = Vec::new();
        ciborium::into_writer(&file, &mut data)?;
        let checksum = Sha256::digest(&data);
        data.extend_from_slice(&checksum);

        repo.write_atomic(&index_path, &data)?;

        tracing::debug!(entries = self.entries.len(), "saved index");
        Ok(())
    }

    /// stage content as a regular file
    pub fn stage(&mut self, repo: &Repo, path: &str, content: &[u8]) -> Result<ObjectId> {
        self.stage_with_mode(repo, path, content, EntryMode::Regular)
    }

    /// write content as a blob and upsert the entry for `path`
    pub fn stage_with_mode(
        &mut self,
        repo: &Repo,
        path: &str,
        content: &[u8],
        mode: EntryMode,
    ) -> Result<ObjectId> {
        let path = normalize_path(path)?;
        check_file_mode(&path, mode)?;

        let id = write_blob(repo, content)?;
        self.insert(IndexEntry {
            path,
            id,
            mode,
            size: content.len() as u64,
            staged_at: now_secs(),
        });
        Ok(id)
    }

    /// stage a blob that is already in the object store
    pub fn stage_object(
        &mut self,
        repo: &Repo,
        path: &str,
        mode: EntryMode,
        id: ObjectId,
    ) -> Result<()> {
        let path = normalize_path(path)?;
        check_file_mode(&path, mode)?;

        let (kind, size) = object::read_header(repo, &id)?;
        if kind != ObjectKind::Blob {
            return Err(Error::UnexpectedKind {
                id,
                expected: ObjectKind::Blob,
                actual: kind,
            });
        }

        self.insert(IndexEntry {
            path,
            id,
            mode,
            size,
            staged_at: now_secs(),
        });
        Ok(())
    }

    /// remove an entry
    pub fn unstage(&mut self, path: &str) -> Result<IndexEntry> {
        let path = normalize_path(path)?;
        self.entries
            .remove(&path)
            .ok_or(Error::PathNotFound(path))
    }

    /// fold all entries into nested trees and return the root tree id
    pub fn build_tree(&self, repo: &Repo) -> Result<ObjectId> {
        write_path_tree(
            repo,
            self.entries
                .values()
                .map(|entry| (entry.path.as_str(), entry.state())),
        )
    }

    /// replace every entry with the contents of a tree
    pub fn read_tree(&mut self, repo: &Repo, tree_id: &ObjectId) -> Result<()> {
        let files = crate::ops::flatten_tree(repo, tree_id)?;
        let staged_at = now_secs();

        let mut entries = BTreeMap::new();
        for (path, state) in files {
            let (_, size) = object::read_header(repo, &state.id)?;
            entries.insert(
                path.clone(),
                IndexEntry {
                    path,
                    id: state.id,
                    mode: state.mode,
                    size,
                    staged_at,
                },
            );
        }

        self.entries = entries;
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&IndexEntry> {
        self.entries.get(path)
    }

    /// entries in path order
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// upsert, dropping entries that would clash as file vs directory
    fn insert(&mut self, entry: IndexEntry) {
        // "a/b/c" displaces files "a" and "a/b"
        let mut end = 0;
        while let Some(pos) = entry.path[end..].find('/') {
            end += pos;
            self.entries.remove(&entry.path[..end]);
            end += 1;
        }

        // "a" displaces everything under "a/"
        let prefix = format!("{}/", entry.path);
        let children: Vec<String> = self
            .entries
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .map(|(path, _)| path.clone())
            .collect();
        for child in children {
            self.entries.remove(&child);
        }

        tracing::trace!(path = %entry.path, id = %entry.id, "staged");
        self.entries.insert(entry.path.clone(), entry);
    }
}

/// build and store nested trees for a set of file paths
///
/// paths must already be normalized; a path used both as a file and as a
/// directory is rejected with `InvalidPath`.
pub(crate) fn write_path_tree<'a>(
    repo: &Repo,
    files: impl IntoIterator<Item = (&'a str, PathState)>,
) -> Result<ObjectId> {
    let mut root = DirNode::default();
    for (path, state) in files {
        root.insert(path, path, state)?;
    }
    root.write(repo)
}

#[derive(Default)]
struct DirNode {
    files: BTreeMap<String, PathState>,
    dirs: BTreeMap<String, DirNode>,
}

impl DirNode {
    fn insert(&mut self, full_path: &str, rest: &str, state: PathState) -> Result<()> {
        match rest.split_once('/') {
            Some((dir, rest)) => {
                if self.files.contains_key(dir) {
                    return Err(Error::InvalidPath(format!(
                        "{} is both a file and a directory",
                        full_path
                    )));
                }
                self.dirs
                    .entry(dir.to_string())
                    .or_default()
                    .insert(full_path, rest, state)
            }
            None => {
                if self.dirs.contains_key(rest) {
                    return Err(Error::InvalidPath(format!(
                        "{} is both a file and a directory",
                        full_path
                    )));
                }
                self.files.insert(rest.to_string(), state);
                Ok(())
            }
        }
    }

    fn write(&self, repo: &Repo) -> Result<ObjectId> {
        let mut entries = Vec::with_capacity(self.files.len() + self.dirs.len());
        for (name, state) in &self.files {
            entries.push(TreeEntry::new(name.clone(), state.mode, state.id));
        }
        for (name, node) in &self.dirs {
            let id = node.write(repo)?;
            entries.push(TreeEntry::new(name.clone(), EntryMode::Directory, id));
        }
        write_tree(repo, &Tree::new(entries)?)
    }
}

/// validate a slash-separated repository path
pub(crate) fn normalize_path(path: &str) -> Result<String> {
    if path.is_empty() || path.starts_with('/') || path.ends_with('/') {
        return Err(Error::InvalidPath(path.to_string()));
    }
    for component in path.split('/') {
        validate_entry_name(component).map_err(|_| Error::InvalidPath(path.to_string()))?;
    }
    Ok(path.to_string())
}

fn check_file_mode(path: &str, mode: EntryMode) -> Result<()> {
    if mode == EntryMode::Directory {
        return Err(Error::InvalidPath(format!(
            "cannot stage a directory entry: {}",
            path
        )));
    }
    Ok(())
}
