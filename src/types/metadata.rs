use crate::hash::ObjectId;
use crate::types::EntryMode;

/// diff entry change kind
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    /// same content, different mode
    ModeChanged,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Added => write!(f, "A"),
            ChangeKind::Modified => write!(f, "M"),
            ChangeKind::Deleted => write!(f, "D"),
            ChangeKind::ModeChanged => write!(f, "T"),
        }
    }
}

/// entry in a diff result
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffEntry {
    pub path: String,
    pub kind: ChangeKind,
}

impl std::fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.path)
    }
}

/// a file as it appears at one path of a flattened tree
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PathState {
    pub mode: EntryMode,
    pub id: ObjectId,
}

impl PathState {
    pub fn new(mode: EntryMode, id: ObjectId) -> Self {
        Self { mode, id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_kind_display() {
        assert_eq!(format!("{}", ChangeKind::Added), "A");
        assert_eq!(format!("{}", ChangeKind::Modified), "M");
        assert_eq!(format!("{}", ChangeKind::Deleted), "D");
        assert_eq!(format!("{}", ChangeKind::ModeChanged), "T");
    }

    #[test]
    fn test_diff_entry_display() {
        let entry = DiffEntry {
            path: "dir/file.txt".to_string(),
            kind: ChangeKind::Modified,
        };
        assert_eq!(entry.to_string(), "M dir/file.txt");
    }
}
