//! named, mutable pointers into the object store
//!
//! refs are plain files under the repository root: `HEAD` plus everything
//! below `refs/`. a file holds either a 64-char hex id or `ref: <name>`.
//! all mutations go through a per-ref `<name>.lock` taken without blocking;
//! a writer that cannot take the lock or finds an unexpected value gets
//! `Error::Conflict` and is expected to re-read and retry.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, IoResultExt, Result};
use crate::hash::ObjectId;
use crate::repo::{FileLock, Repo};

/// name of the symbolic ref naming the current branch
pub const HEAD: &str = "HEAD";

const SYMBOLIC_PREFIX: &str = "ref: ";
const LOCK_SUFFIX: &str = ".lock";

/// value stored in a ref
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reference {
    /// points straight at an object
    Direct(ObjectId),
    /// points at another ref by name
    Symbolic(String),
}

impl Reference {
    /// parse the on-disk form
    pub fn parse(content: &str) -> Result<Self> {
        let content = content.trim();
        match content.strip_prefix(SYMBOLIC_PREFIX) {
            Some(target) => Ok(Reference::Symbolic(target.trim().to_string())),
            None => Ok(Reference::Direct(ObjectId::from_hex(content)?)),
        }
    }

    pub fn as_direct(&self) -> Option<&ObjectId> {
        match self {
            Reference::Direct(id) => Some(id),
            Reference::Symbolic(_) => None,
        }
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, Reference::Symbolic(_))
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Direct(id) => write!(f, "{}", id),
            Reference::Symbolic(target) => write!(f, "{}{}", SYMBOLIC_PREFIX, target),
        }
    }
}

/// full ref name for a branch
pub fn branch_ref(branch: &str) -> String {
    format!("refs/heads/{}", branch)
}

/// full ref name for a tag
pub fn tag_ref(tag: &str) -> String {
    format!("refs/tags/{}", tag)
}

/// read a ref without following symbolic links
pub fn read_ref(repo: &Repo, ref_name: &str) -> Result<Reference> {
    read_ref_opt(repo, ref_name)?.ok_or_else(|| Error::RefNotFound(ref_name.to_string()))
}

/// read a ref, returning None if it doesn't exist
pub fn read_ref_opt(repo: &Repo, ref_name: &str) -> Result<Option<Reference>> {
    validate_ref_name(ref_name)?;
    let path = ref_path(repo, ref_name);

    match fs::read_to_string(&path) {
        Ok(content) => Ok(Some(Reference::parse(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        // a directory where a ref would be (e.g. reading "refs/heads")
        Err(e) if path.is_dir() => {
            tracing::trace!(ref_name, error = %e, "ref path is a directory");
            Ok(None)
        }
        Err(e) => Err(Error::Io { path, source: e }),
    }
}

/// check if a ref exists
pub fn ref_exists(repo: &Repo, ref_name: &str) -> bool {
    validate_ref_name(ref_name).is_ok() && ref_path(repo, ref_name).is_file()
}

/// resolve a ref name (or a literal hex id) to an object id
///
/// symbolic refs are followed for at most `core.symref_max_hops` hops;
/// longer chains fail with `ReferenceCycle`. a chain that ends at a missing
/// ref fails with `RefNotFound` naming the missing link.
pub fn resolve(repo: &Repo, ref_or_hash: &str) -> Result<ObjectId> {
    if ObjectId::looks_like_hex(ref_or_hash) && !ref_exists(repo, ref_or_hash) {
        return ObjectId::from_hex(ref_or_hash);
    }

    let (target, value) = follow(repo, ref_or_hash)?;
    match value {
        Some(Reference::Direct(id)) => Ok(id),
        _ => Err(Error::RefNotFound(target)),
    }
}

/// name of the last ref in a symbolic chain
///
/// for `HEAD -> refs/heads/main` this is `refs/heads/main`, whether or not
/// the branch has been born yet. a detached HEAD resolves to `HEAD` itself.
pub fn resolve_target_name(repo: &Repo, ref_name: &str) -> Result<String> {
    follow(repo, ref_name).map(|(target, _)| target)
}

/// current direct value of the ref a chain ends at, if it has one
pub fn resolve_opt(repo: &Repo, ref_name: &str) -> Result<Option<ObjectId>> {
    let (_, value) = follow(repo, ref_name)?;
    Ok(value.and_then(|r| r.as_direct().copied()))
}

/// walk a symbolic chain, returning the final name and its value
fn follow(repo: &Repo, ref_name: &str) -> Result<(String, Option<Reference>)> {
    let max_hops = repo.config().core.symref_max_hops;
    let mut current = ref_name.to_string();

    for _ in 0..=max_hops {
        match read_ref_opt(repo, &current)? {
            Some(Reference::Symbolic(target)) => current = target,
            other => return Ok((current, other)),
        }
    }

    tracing::warn!(ref_name, max_hops, "symbolic ref chain too long");
    Err(Error::ReferenceCycle {
        name: ref_name.to_string(),
        hops: max_hops,
    })
}

/// compare-and-swap a ref to point directly at `new`
///
/// `expected` is the value the caller last observed: `Some(id)` requires the
/// ref to currently hold exactly `id`, `None` requires it not to exist. any
/// other state, including a concurrent writer holding the lock, yields
/// `Error::Conflict` and leaves the ref untouched.
pub fn update_ref(
    repo: &Repo,
    ref_name: &str,
    expected: Option<ObjectId>,
    new: ObjectId,
) -> Result<()> {
    validate_ref_name(ref_name)?;

    let _lock = lock_ref(repo, ref_name, expected)?;
    check_expected(repo, ref_name, expected)?;

    write_ref_file(repo, ref_name, &Reference::Direct(new))?;
    tracing::debug!(
        ref_name,
        old = ?expected,
        new = %new,
        "updated ref"
    );
    Ok(())
}

/// point a ref at another ref by name (e.g. HEAD at a branch)
pub fn write_symbolic_ref(repo: &Repo, ref_name: &str, target: &str) -> Result<()> {
    validate_ref_name(ref_name)?;
    validate_ref_name(target)?;
    if ref_name == target {
        return Err(Error::InvalidRef(format!("{} cannot point at itself", ref_name)));
    }

    let lock_path = lock_path(repo, ref_name);
    ensure_parent(&lock_path)?;
    let _lock = FileLock::acquire(&lock_path)?;

    write_ref_file(repo, ref_name, &Reference::Symbolic(target.to_string()))?;
    tracing::debug!(ref_name, target, "wrote symbolic ref");
    Ok(())
}

/// delete a ref
///
/// with `expected = Some(id)` the delete only happens if the ref still holds
/// `id`; `None` deletes whatever is there.
pub fn delete_ref(repo: &Repo, ref_name: &str, expected: Option<ObjectId>) -> Result<()> {
    validate_ref_name(ref_name)?;
    if !ref_path(repo, ref_name).is_file() {
        return Err(Error::RefNotFound(ref_name.to_string()));
    }

    let _lock = lock_ref(repo, ref_name, expected)?;
    if expected.is_some() {
        check_expected(repo, ref_name, expected)?;
    }

    let path = ref_path(repo, ref_name);
    fs::remove_file(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::RefNotFound(ref_name.to_string())
        } else {
            Error::Io { path, source: e }
        }
    })?;

    tracing::debug!(ref_name, "deleted ref");
    Ok(())
}

/// list all refs under refs/
pub fn list_refs(repo: &Repo) -> Result<Vec<String>> {
    let refs_dir = repo.refs_path();
    let mut refs = Vec::new();

    if refs_dir.exists() {
        collect_refs(repo.path(), &refs_dir, &mut refs)?;
    }

    refs.sort();
    Ok(refs)
}

/// list refs matching a glob pattern
pub fn list_refs_matching(repo: &Repo, pattern: &str) -> Result<Vec<String>> {
    let all_refs = list_refs(repo)?;
    let glob = glob::Pattern::new(pattern).map_err(|e| Error::InvalidRef(e.to_string()))?;

    Ok(all_refs.into_iter().filter(|r| glob.matches(r)).collect())
}

fn lock_ref(repo: &Repo, ref_name: &str, expected: Option<ObjectId>) -> Result<FileLock> {
    let lock_path = lock_path(repo, ref_name);
    ensure_parent(&lock_path)?;

    match FileLock::try_acquire(&lock_path)? {
        Some(lock) => Ok(lock),
        None => {
            tracing::debug!(ref_name, "lost race for ref lock");
            Err(Error::Conflict {
                name: ref_name.to_string(),
                expected,
                actual: read_ref_opt(repo, ref_name).unwrap_or(None),
            })
        }
    }
}

fn check_expected(repo: &Repo, ref_name: &str, expected: Option<ObjectId>) -> Result<()> {
    let current = read_ref_opt(repo, ref_name)?;
    let matches = match (&expected, &current) {
        (None, None) => true,
        (Some(want), Some(Reference::Direct(have))) => want == have,
        _ => false,
    };

    if matches {
        Ok(())
    } else {
        Err(Error::Conflict {
            name: ref_name.to_string(),
            expected,
            actual: current,
        })
    }
}

/// atomic write: temp -> fsync -> rename -> fsync dir
fn write_ref_file(repo: &Repo, ref_name: &str, value: &Reference) -> Result<()> {
    let ref_path = ref_path(repo, ref_name);
    ensure_parent(&ref_path)?;

    repo.write_atomic(&ref_path, format!("{}\n", value).as_bytes())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_path(parent)?;
    }
    Ok(())
}

/// get filesystem path for a ref
fn ref_path(repo: &Repo, ref_name: &str) -> PathBuf {
    repo.path().join(ref_name)
}

fn lock_path(repo: &Repo, ref_name: &str) -> PathBuf {
    repo.path().join(format!("{}{}", ref_name, LOCK_SUFFIX))
}

/// recursively collect refs from directory
fn collect_refs(root: &Path, dir: &Path, refs: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(dir).with_path(dir)? {
        let entry = entry.with_path(dir)?;
        let path = entry.path();

        if path.is_dir() {
            collect_refs(root, &path, refs)?;
        } else if path.is_file() {
            if let Ok(rel) = path.strip_prefix(root) {
                let ref_name = rel.to_string_lossy().to_string();
                if !ref_name.ends_with(LOCK_SUFFIX) {
                    refs.push(ref_name);
                }
            }
        }
    }
    Ok(())
}

/// validate ref name
fn validate_ref_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidRef("empty ref name".to_string()));
    }

    if name != HEAD && !name.starts_with("refs/") {
        return Err(Error::InvalidRef(format!(
            "ref name must be HEAD or start with 'refs/': {}",
            name
        )));
    }

    if name.ends_with('/') {
        return Err(Error::InvalidRef(format!(
            "ref name cannot end with '/': {}",
            name
        )));
    }

    if name.contains("//") {
        return Err(Error::InvalidRef(format!(
            "ref name cannot contain '//': {}",
            name
        )));
    }

    if name.contains('\0') || name.chars().any(char::is_whitespace) {
        return Err(Error::InvalidRef(format!(
            "ref name cannot contain whitespace or null bytes: {:?}",
            name
        )));
    }

    for component in name.split('/') {
        if component == "." || component == ".." {
            return Err(Error::InvalidRef(format!(
                "ref name cannot contain '.' or '..': {}",
                name
            )));
        }
        if component.ends_with(LOCK_SUFFIX) {
            return Err(Error::InvalidRef(format!(
                "ref name cannot end a component with '.lock': {}",
                name
            )));
        }
    }

    Ok(())
}
