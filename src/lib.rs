//! cairn - local version-control engine
//!
//! content-addressed objects, compare-and-swap refs, a staging index, a
//! commit graph with merge-base and history walks, and three-way merge.
//!
//! # Core concepts
//!
//! - **Blob**: raw file content
//! - **Tree**: sorted directory entries (CBOR)
//! - **Commit**: a tree snapshot plus parents, author, time and message (CBOR)
//! - **Tag**: an annotated pointer at another object (CBOR)
//! - **Ref**: a named pointer to an object or to another ref (`HEAD`)
//!
//! # Object id
//!
//! id = SHA256("<kind> <len>\0" | body)
//!
//! objects are stored zstd-compressed under `objects/<2 hex>/<62 hex>`.
//!
//! # Example usage
//!
//! ```no_run
//! use cairn::{ops, Index, Repo};
//! use std::path::Path;
//!
//! let repo = Repo::init(Path::new("/path/to/repo")).unwrap();
//!
//! let mut index = Index::new();
//! index.stage(&repo, "README", b"hello\n").unwrap();
//! ops::commit_index(&repo, &index, "initial commit", &ops::CommitOptions::default()).unwrap();
//!
//! match ops::merge(&repo, "HEAD", "refs/heads/feature", &ops::MergeOptions::default()).unwrap() {
//!     ops::MergeOutcome::NeedsResolution(pending) => println!("{:?}", pending.conflict_paths()),
//!     outcome => println!("{:?}", outcome),
//! }
//! ```

mod config;
mod error;
mod hash;
mod index;
mod repo;

pub mod object;
pub mod ops;
pub mod refs;
pub mod types;

pub use config::{Config, CoreConfig, UserConfig};
pub use error::{Error, Result};
pub use hash::{compute_object_id, ObjectId};
pub use index::{Index, IndexEntry};
pub use object::{
    contains, get, put, read_blob, read_commit, read_tag, read_tree, write_blob, write_commit,
    write_tag, write_tree, ObjectKind, RawObject,
};
pub use refs::{
    delete_ref, list_refs, list_refs_matching, read_ref, ref_exists, resolve, update_ref,
    write_symbolic_ref, Reference, HEAD,
};
pub use repo::{FileLock, Repo};
pub use types::{ChangeKind, Commit, DiffEntry, EntryMode, PathState, Tag, Tree, TreeEntry};
