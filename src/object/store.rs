use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, IoResultExt, Result};
use crate::hash::{canonical_bytes, digest_canonical, ObjectId};
use crate::object::ObjectKind;
use crate::repo::{fsync_dir, Repo};

// "commit " plus a u64 length and the terminator, with room to spare
const MAX_HEADER_LEN: u64 = 32;

/// an object as stored: kind plus body bytes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawObject {
    pub kind: ObjectKind,
    pub content: Vec<u8>,
}

/// write an object to the store
///
/// the id is the SHA-256 of `"<kind> <len>\0" ++ content`. the canonical
/// bytes are zstd compressed and written via temp file -> fsync -> rename,
/// so the object is durable once this returns. writing an object that is
/// already present is a no-op returning the same id.
pub fn put(repo: &Repo, kind: ObjectKind, content: &[u8]) -> Result<ObjectId> {
    let canonical = canonical_bytes(kind.as_str(), content);
    let id = digest_canonical(&canonical);

    let (dir, file) = id.to_path_components();
    let object_dir = repo.objects_path().join(&dir);
    let object_path = object_dir.join(&file);

    // deduplication: if the object already exists, we're done
    if object_path.exists() {
        tracing::trace!(%id, %kind, "object already stored");
        return Ok(id);
    }

    let compressed = zstd::encode_all(&canonical[..], repo.config().core.compression_level)
        .map_err(|e| Error::Io {
            path: PathBuf::from("<zstd>"),
            source: e,
        })?;

    if !object_dir.is_dir() {
        fs::create_dir_all(&object_dir).with_path(&object_dir)?;
        // make the new fan-out directory itself durable
        fsync_dir(&repo.objects_path())?;
    }

    // concurrent writers of the same id each use their own temp file; the
    // renames race harmlessly because the bytes are identical
    repo.write_atomic(&object_path, &compressed)?;

    tracing::debug!(%id, %kind, size = content.len(), "stored object");
    Ok(id)
}

/// read an object from the store, verifying its digest
pub fn get(repo: &Repo, id: &ObjectId) -> Result<RawObject> {
    let path = object_path(repo, id);

    let compressed = fs::read(&path).map_err(|e| not_found_or_io(id, &path, e))?;

    let canonical = zstd::decode_all(&compressed[..]).map_err(|e| Error::Io {
        path: path.clone(),
        source: e,
    })?;

    if digest_canonical(&canonical) != *id {
        tracing::warn!(%id, path = %path.display(), "object failed digest check");
        return Err(Error::CorruptObject(*id));
    }

    let (kind, content) = split_canonical(&canonical)?;
    Ok(RawObject {
        kind,
        content: content.to_vec(),
    })
}

/// kind and body length of a stored object
///
/// only the header is decompressed, so the digest is not verified.
pub fn read_header(repo: &Repo, id: &ObjectId) -> Result<(ObjectKind, u64)> {
    let path = object_path(repo, id);
    let file = File::open(&path).map_err(|e| not_found_or_io(id, &path, e))?;
    let decoder = zstd::stream::read::Decoder::new(file).with_path(&path)?;

    let mut header = Vec::new();
    BufReader::new(decoder.take(MAX_HEADER_LEN))
        .read_until(0, &mut header)
        .with_path(&path)?;
    if header.pop() != Some(0) {
        return Err(Error::CorruptObjectMessage(format!(
            "object {} has no header terminator",
            id
        )));
    }

    let (kind, len) = parse_header(&header)?;
    Ok((kind, len as u64))
}

fn not_found_or_io(id: &ObjectId, path: &Path, e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::ObjectNotFound(*id)
    } else {
        Error::Io {
            path: path.to_path_buf(),
            source: e,
        }
    }
}

/// check if an object exists in the store
pub fn contains(repo: &Repo, id: &ObjectId) -> bool {
    object_path(repo, id).exists()
}

/// get the filesystem path to an object
pub fn object_path(repo: &Repo, id: &ObjectId) -> PathBuf {
    let (dir, file) = id.to_path_components();
    repo.objects_path().join(dir).join(file)
}

/// enumerate every object id present on disk
pub fn list_objects(repo: &Repo) -> Result<Vec<ObjectId>> {
    let root = repo.objects_path();
    let mut ids = Vec::new();

    for entry in WalkDir::new(&root).min_depth(2).max_depth(2) {
        let entry = entry.map_err(|e| Error::Io {
            path: root.clone(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let file = entry.file_name().to_string_lossy();
        let dir = entry
            .path()
            .parent()
            .and_then(Path::file_name)
            .map(|d| d.to_string_lossy().to_string())
            .unwrap_or_default();

        let hex = format!("{}{}", dir, file);
        if ObjectId::looks_like_hex(&hex) {
            ids.push(ObjectId::from_hex(&hex)?);
        }
    }

    ids.sort();
    Ok(ids)
}

/// parse `"<kind> <len>\0"` and return the kind and body
fn split_canonical(canonical: &[u8]) -> Result<(ObjectKind, &[u8])> {
    let nul = canonical
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| Error::CorruptObjectMessage("missing header terminator".to_string()))?;
    let (kind, len) = parse_header(&canonical[..nul])?;

    let body = &canonical[nul + 1..];
    if body.len() != len {
        return Err(Error::CorruptObjectMessage(format!(
            "header says {} bytes, found {}",
            len,
            body.len()
        )));
    }

    Ok((kind, body))
}

fn parse_header(header: &[u8]) -> Result<(ObjectKind, usize)> {
    let header = std::str::from_utf8(header)
        .map_err(|_| Error::CorruptObjectMessage("header is not utf-8".to_string()))?;
    let (kind, len) = header
        .split_once(' ')
        .ok_or_else(|| Error::CorruptObjectMessage(format!("malformed header: {}", header)))?;

    let kind: ObjectKind = kind.parse()?;
    let len: usize = len
        .parse()
        .map_err(|_| Error::CorruptObjectMessage(format!("bad length in header: {}", header)))?;
    Ok((kind, len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use tempfile::tempdir;

    fn test_repo() -> (tempfile::TempDir, Repo) {
        let dir = tempdir().unwrap();
        let repo_path = dir.path().join("repo");
        let repo = Repo::init(&repo_path).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_put_and_get() {
        let (_dir, repo) = test_repo();

        let id = put(&repo, ObjectKind::Blob, b"hello, world!").unwrap();
        assert!(contains(&repo, &id));

        let object = get(&repo, &id).unwrap();
        assert_eq!(object.kind, ObjectKind::Blob);
        assert_eq!(object.content, b"hello, world!");
    }

    #[test]
    fn test_put_is_idempotent() {
        let (_dir, repo) = test_repo();

        let h1 = put(&repo, ObjectKind::Blob, b"duplicate content").unwrap();
        let h2 = put(&repo, ObjectKind::Blob, b"duplicate content").unwrap();

        assert_eq!(h1, h2);
        assert_eq!(list_objects(&repo).unwrap(), vec![h1]);
    }

    #[test]
    fn test_same_bytes_different_kind() {
        let (_dir, repo) = test_repo();

        let blob = put(&repo, ObjectKind::Blob, b"payload").unwrap();
        let tag = put(&repo, ObjectKind::Tag, b"payload").unwrap();

        assert_ne!(blob, tag);
        assert_eq!(get(&repo, &tag).unwrap().kind, ObjectKind::Tag);
    }

    #[test]
    fn test_empty_content() {
        let (_dir, repo) = test_repo();

        let id = put(&repo, ObjectKind::Blob, b"").unwrap();
        assert!(get(&repo, &id).unwrap().content.is_empty());
    }

    #[test]
    fn test_object_path_structure() {
        let (_dir, repo) = test_repo();

        let id = put(&repo, ObjectKind::Blob, b"test").unwrap();
        let path = object_path(&repo, &id);

        let hex = id.to_hex();
        assert!(path.ends_with(format!("{}/{}", &hex[..2], &hex[2..])));
        assert!(path.is_file());
    }

    #[test]
    fn test_get_missing() {
        let (_dir, repo) = test_repo();

        let result = get(&repo, &ObjectId::ZERO);
        assert!(matches!(result, Err(Error::ObjectNotFound(_))));
        assert!(!contains(&repo, &ObjectId::ZERO));
    }

    #[test]
    fn test_get_detects_corruption() {
        let (_dir, repo) = test_repo();

        let id = put(&repo, ObjectKind::Blob, b"original").unwrap();
        let other = zstd::encode_all(&canonical_bytes("blob", b"tampered")[..], 3).unwrap();
        fs::write(object_path(&repo, &id), other).unwrap();

        assert!(matches!(get(&repo, &id), Err(Error::CorruptObject(_))));
    }

    #[test]
    fn test_read_header() {
        let (_dir, repo) = test_repo();
        let content = vec![7u8; 100_000];
        let id = put(&repo, ObjectKind::Blob, &content).unwrap();

        assert_eq!(read_header(&repo, &id).unwrap(), (ObjectKind::Blob, 100_000));
        assert!(matches!(
            read_header(&repo, &ObjectId::ZERO),
            Err(Error::ObjectNotFound(_))
        ));

        let raw = zstd::encode_all(&[b'x'; 64][..], 3).unwrap();
        fs::write(object_path(&repo, &id), raw).unwrap();
        assert!(matches!(
            read_header(&repo, &id),
            Err(Error::CorruptObjectMessage(_))
        ));
    }

    #[test]
    fn test_split_canonical_rejects_bad_length() {
        assert!(split_canonical(b"blob 3\0ab").is_err());
        assert!(split_canonical(b"blob 2").is_err());
        assert!(split_canonical(b"widget 0\0").is_err());
        let (kind, body) = split_canonical(b"tree 2\0ab").unwrap();
        assert_eq!(kind, ObjectKind::Tree);
        assert_eq!(body, b"ab");
    }

    #[test]
    fn test_concurrent_identical_puts() {
        let (_dir, repo) = test_repo();
        let repo = Arc::new(repo);
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let repo = Arc::clone(&repo);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    put(&repo, ObjectKind::Blob, b"racing content").unwrap()
                })
            })
            .collect();

        let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));

        assert_eq!(list_objects(&repo).unwrap(), vec![ids[0]]);
        assert_eq!(get(&repo, &ids[0]).unwrap().content, b"racing content");

        // no temp files left behind
        assert_eq!(fs::read_dir(repo.tmp_path()).unwrap().count(), 0);
    }

    #[test]
    fn test_concurrent_distinct_puts() {
        let (_dir, repo) = test_repo();
        let repo = Arc::new(repo);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let repo = Arc::clone(&repo);
                std::thread::spawn(move || {
                    put(&repo, ObjectKind::Blob, format!("content {}", i).as_bytes()).unwrap()
                })
            })
            .collect();

        for handle in handles {
            let id = handle.join().unwrap();
            assert!(contains(&repo, &id));
        }
        assert_eq!(list_objects(&repo).unwrap().len(), 8);
    }
}
