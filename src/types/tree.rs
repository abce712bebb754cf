use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::object::ObjectKind;

/// a directory tree - collection of entries sorted by name
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    /// create a new tree, validating and sorting entries
    pub fn new(mut entries: Vec<TreeEntry>) -> Result<Self> {
        for entry in &entries {
            validate_entry_name(&entry.name)?;
        }

        // sort by name (byte-wise)
        entries.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));

        for window in entries.windows(2) {
            if window[0].name == window[1].name {
                return Err(Error::DuplicateEntryName(window[0].name.clone()));
            }
        }

        Ok(Self { entries })
    }

    /// check a decoded tree: valid names in strictly increasing byte order
    pub fn validate(&self) -> Result<()> {
        for entry in &self.entries {
            validate_entry_name(&entry.name)?;
        }
        for window in self.entries.windows(2) {
            match window[0].name.as_bytes().cmp(window[1].name.as_bytes()) {
                std::cmp::Ordering::Less => {}
                std::cmp::Ordering::Equal => {
                    return Err(Error::DuplicateEntryName(window[0].name.clone()))
                }
                std::cmp::Ordering::Greater => {
                    return Err(Error::InvalidEntryName(format!(
                        "{} sorted after {}",
                        window[1].name, window[0].name
                    )))
                }
            }
        }
        Ok(())
    }

    /// create an empty tree
    pub fn empty() -> Self {
        Self { entries: vec![] }
    }

    /// get entries slice
    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    /// consume and return entries
    pub fn into_entries(self) -> Vec<TreeEntry> {
        self.entries
    }

    /// look up entry by name
    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries
            .binary_search_by(|e| e.name.as_bytes().cmp(name.as_bytes()))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// is tree empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// validate a single path segment
pub(crate) fn validate_entry_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidEntryName("empty name".to_string()));
    }
    if name.contains('/') {
        return Err(Error::InvalidEntryName(format!(
            "name contains '/': {}",
            name
        )));
    }
    if name.contains('\0') {
        return Err(Error::InvalidEntryName(format!(
            "name contains null byte: {}",
            name
        )));
    }
    if name == "." || name == ".." {
        return Err(Error::InvalidEntryName(format!("reserved name: {}", name)));
    }
    Ok(())
}

/// a single entry in a tree
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub name: String,
    pub mode: EntryMode,
    pub id: ObjectId,
}

impl TreeEntry {
    pub fn new(name: impl Into<String>, mode: EntryMode, id: ObjectId) -> Self {
        Self {
            name: name.into(),
            mode,
            id,
        }
    }

    /// kind of the object this entry points at
    pub fn kind(&self) -> ObjectKind {
        self.mode.object_kind()
    }

    pub fn is_directory(&self) -> bool {
        self.mode == EntryMode::Directory
    }
}

/// file mode recorded for a tree or index entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryMode {
    Regular,
    Executable,
    Symlink,
    Directory,
}

impl EntryMode {
    /// git-style octal mode
    pub fn as_octal(&self) -> u32 {
        match self {
            EntryMode::Regular => 0o100644,
            EntryMode::Executable => 0o100755,
            EntryMode::Symlink => 0o120000,
            EntryMode::Directory => 0o040000,
        }
    }

    /// parse a git-style octal mode
    pub fn from_octal(mode: u32) -> Option<Self> {
        match mode {
            0o100644 => Some(EntryMode::Regular),
            0o100755 => Some(EntryMode::Executable),
            0o120000 => Some(EntryMode::Symlink),
            0o040000 => Some(EntryMode::Directory),
            _ => None,
        }
    }

    /// directories point at trees, everything else at blobs
    pub fn object_kind(&self) -> ObjectKind {
        match self {
            EntryMode::Directory => ObjectKind::Tree,
            _ => ObjectKind::Blob,
        }
    }
}

impl fmt::Display for EntryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06o}", self.as_octal())
    }
}
