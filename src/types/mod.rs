mod commit;
mod metadata;
mod tag;
mod tree;

pub use commit::Commit;
pub use metadata::{ChangeKind, DiffEntry, PathState};
pub use tag::Tag;
pub use tree::{EntryMode, Tree, TreeEntry};

pub(crate) use commit::now_secs;
pub(crate) use tree::validate_entry_name;
