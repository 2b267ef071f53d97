//! Nesting scope tracking and structural marker selection.

use crate::options::{Markers, ObjectMode};

/// Marker for the first occurrence of a deduplicated object, followed by
/// its id.
pub(crate) const DEDUP_DEF: u8 = b'#';
/// Marker for a back-reference, followed by the id it refers to.
pub(crate) const DEDUP_REF: u8 = b'@';
/// Marker before a type tag string.
pub(crate) const TYPE_TAG: u8 = b'T';
/// Start marker for lists, tuples, strings, and byte arrays.
pub(crate) const LIST_START: u8 = b'[';
/// End marker matching [`LIST_START`].
pub(crate) const LIST_END: u8 = b']';

/// Whether `mode` asks for an impossible scope shape.
pub(crate) fn mode_conflict(mode: ObjectMode) -> bool {
    mode.contains(ObjectMode::LIST | ObjectMode::TUPLE)
}

/// The kind of compound scope a [`StackEntry`] tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScopeKind {
    Object,
    List,
    Tuple,
}

impl ScopeKind {
    pub(crate) fn from_mode(mode: ObjectMode) -> Self {
        if mode.contains(ObjectMode::LIST) {
            Self::List
        } else if mode.contains(ObjectMode::TUPLE) {
            Self::Tuple
        } else {
            Self::Object
        }
    }

    /// The start/end marker byte pair for a scope sitting at `depth`.
    ///
    /// Object pairs alternate between `()` and `{}` by depth so that a
    /// mismatched end marker is caught one level up at the latest.
    pub(crate) fn marker_pair(self, depth: usize) -> (u8, u8) {
        match self {
            Self::Object if depth % 2 == 0 => (b'(', b')'),
            Self::Object => (b'{', b'}'),
            Self::List | Self::Tuple => (LIST_START, LIST_END),
        }
    }

    pub(crate) fn start_enabled(self, markers: Markers) -> bool {
        let flag = match self {
            Self::Object => Markers::OBJECT_START,
            Self::List => Markers::LIST_START,
            Self::Tuple => Markers::TUPLE_START,
        };
        markers.contains(flag)
    }

    pub(crate) fn end_enabled(self, markers: Markers) -> bool {
        let flag = match self {
            Self::Object => Markers::OBJECT_END,
            Self::List => Markers::LIST_END,
            Self::Tuple => Markers::TUPLE_END,
        };
        markers.contains(flag)
    }
}

/// One open scope.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StackEntry {
    /// Dedup id the scope was opened with, if any.
    pub id: Option<u64>,
    pub kind: ScopeKind,
    /// Read side only: this scope holds the window pin.
    pub pinned: bool,
}

/// The stack of currently open scopes.
pub(crate) struct NestingStack {
    entries: Vec<StackEntry>,
}

impl NestingStack {
    pub(crate) fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub(crate) fn depth(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn push(&mut self, entry: StackEntry) {
        self.entries.push(entry);
    }

    pub(crate) fn pop(&mut self) -> Option<StackEntry> {
        self.entries.pop()
    }

    pub(crate) fn top_mut(&mut self) -> Option<&mut StackEntry> {
        self.entries.last_mut()
    }
}
