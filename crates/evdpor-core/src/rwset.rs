//! Per-event read/write sets and the conflict rule between them.
//!
//! A location is a (field key, owning object) pair. Each set keeps one owner
//! per field key for reads and one for writes; recording the same field on a
//! different owner replaces the earlier owner.

use crate::ids::ObjectId;
use std::collections::BTreeMap;
use std::fmt;

/// Kind of a field access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Read,
    Write,
}

/// A single field access reported by the host for one executed instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Access {
    pub field: String,
    pub owner: ObjectId,
    pub kind: AccessKind,
}

impl Access {
    pub fn read(field: impl Into<String>, owner: ObjectId) -> Self {
        Self {
            field: field.into(),
            owner,
            kind: AccessKind::Read,
        }
    }

    pub fn write(field: impl Into<String>, owner: ObjectId) -> Self {
        Self {
            field: field.into(),
            owner,
            kind: AccessKind::Write,
        }
    }

    #[inline]
    pub fn is_write(&self) -> bool {
        self.kind == AccessKind::Write
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            AccessKind::Read => "R",
            AccessKind::Write => "W",
        };
        write!(f, "{} {}{}", kind, self.field, self.owner)
    }
}

/// Read and write locations touched by one event.
///
/// Ordered maps keep conflict reporting deterministic: when several
/// locations conflict, the lexicographically first field is reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadWriteSet {
    reads: BTreeMap<String, ObjectId>,
    writes: BTreeMap<String, ObjectId>,
}

impl ReadWriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_read(&mut self, field: impl Into<String>, owner: ObjectId) {
        self.reads.insert(field.into(), owner);
    }

    pub fn record_write(&mut self, field: impl Into<String>, owner: ObjectId) {
        self.writes.insert(field.into(), owner);
    }

    pub fn record(&mut self, access: &Access) {
        match access.kind {
            AccessKind::Read => self.record_read(access.field.clone(), access.owner),
            AccessKind::Write => self.record_write(access.field.clone(), access.owner),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.reads.is_empty() && self.writes.is_empty()
    }

    /// Total number of recorded locations (reads plus writes).
    #[inline]
    pub fn len(&self) -> usize {
        self.reads.len() + self.writes.len()
    }

    pub fn reads(&self) -> impl Iterator<Item = (&str, ObjectId)> {
        self.reads.iter().map(|(f, o)| (f.as_str(), *o))
    }

    pub fn writes(&self) -> impl Iterator<Item = (&str, ObjectId)> {
        self.writes.iter().map(|(f, o)| (f.as_str(), *o))
    }

    pub fn reads_location(&self, field: &str, owner: ObjectId) -> bool {
        self.reads.get(field) == Some(&owner)
    }

    pub fn writes_location(&self, field: &str, owner: ObjectId) -> bool {
        self.writes.get(field) == Some(&owner)
    }

    /// Merge `self` into `recorded` and return the residual: the entries of
    /// `self` that `recorded` did not already hold with the same owner.
    pub fn union_into(mut self, recorded: &mut ReadWriteSet) -> ReadWriteSet {
        self.writes
            .retain(|field, owner| recorded.writes.get(field) != Some(owner));
        self.reads
            .retain(|field, owner| recorded.reads.get(field) != Some(owner));
        recorded
            .writes
            .extend(self.writes.iter().map(|(f, o)| (f.clone(), *o)));
        recorded
            .reads
            .extend(self.reads.iter().map(|(f, o)| (f.clone(), *o)));
        self
    }

    /// Whether any location of `self` conflicts with `earlier`.
    pub fn conflicts_with(&self, earlier: &ReadWriteSet) -> bool {
        self.first_conflict(earlier).is_some()
    }

    /// Report one conflict against `earlier` and drop the conflicting entry.
    ///
    /// Writes are checked first (against reads and writes of `earlier`), then
    /// reads (against writes only). Each location yields at most one report
    /// against a given ancestor because the entry is removed here.
    pub fn take_conflict(&mut self, earlier: &ReadWriteSet) -> bool {
        match self.first_conflict(earlier) {
            Some((AccessKind::Write, field)) => {
                self.writes.remove(&field);
                true
            }
            Some((AccessKind::Read, field)) => {
                self.reads.remove(&field);
                true
            }
            None => false,
        }
    }

    fn first_conflict(&self, earlier: &ReadWriteSet) -> Option<(AccessKind, String)> {
        let write_hit = self.writes.iter().find(|(field, owner)| {
            earlier.reads.get(*field) == Some(*owner) || earlier.writes.get(*field) == Some(*owner)
        });
        if let Some((field, _)) = write_hit {
            return Some((AccessKind::Write, field.clone()));
        }
        self.reads
            .iter()
            .find(|(field, owner)| earlier.writes.get(*field) == Some(*owner))
            .map(|(field, _)| (AccessKind::Read, field.clone()))
    }
}

impl fmt::Display for ReadWriteSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        let mut first = true;
        for (field, owner) in &self.reads {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "R {field}{owner}")?;
            first = false;
        }
        for (field, owner) in &self.writes {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "W {field}{owner}")?;
            first = false;
        }
        write!(f, "}}")
    }
}
