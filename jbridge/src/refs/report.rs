//! Diagnostic views over the handle table.

use std::collections::BTreeMap;

/// What a table dump reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DumpMode {
    /// `(identity hash, refcount)` per entry.
    #[default]
    Hashes,
    /// `(string value, refcount)` per entry.
    Values,
    /// Kind name to number of live instances.
    ByKind,
}

impl DumpMode {
    /// Pick a mode from the two boolean switches of `_dumpRefs`.
    ///
    /// Grouping by kind wins over values when both are set.
    pub fn from_flags(group_by_kind: bool, include_values: bool) -> Self {
        match (group_by_kind, include_values) {
            (true, _) => DumpMode::ByKind,
            (false, true) => DumpMode::Values,
            (false, false) => DumpMode::Hashes,
        }
    }
}

/// Result of [`HandleTable::dump`](super::HandleTable::dump).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefReport {
    Hashes(Vec<(i32, usize)>),
    Values(Vec<(String, usize)>),
    ByKind(BTreeMap<String, usize>),
}

impl RefReport {
    /// Number of rows (entries, or distinct kinds).
    pub fn len(&self) -> usize {
        match self {
            RefReport::Hashes(rows) => rows.len(),
            RefReport::Values(rows) => rows.len(),
            RefReport::ByKind(kinds) => kinds.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(false, false, DumpMode::Hashes)]
    #[case(false, true, DumpMode::Values)]
    #[case(true, false, DumpMode::ByKind)]
    #[case(true, true, DumpMode::ByKind)]
    fn test_mode_from_flags(#[case] classes: bool, #[case] values: bool, #[case] expected: DumpMode) {
        assert_eq!(DumpMode::from_flags(classes, values), expected);
    }
}
