//! Field relevance filtering.
//!
//! Hosts report every field access; a [`FieldFilter`] decides which ones the
//! explorer tracks. Library and infrastructure locations are noise: they
//! would make every pair of events look dependent.

use crate::rwset::Access;
use std::collections::HashSet;

/// Decides whether an access is tracked.
pub trait FieldFilter {
    fn is_relevant(&mut self, access: &Access) -> bool;
}

/// Tracks every access.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl FieldFilter for AcceptAll {
    fn is_relevant(&mut self, _access: &Access) -> bool {
        true
    }
}

/// Pattern-based exclusion with memoised per-field decisions.
///
/// A field excluded by `write_starts_with` on a write is remembered as
/// non-relevant, so later reads of it are dropped too.
#[derive(Debug, Default, Clone)]
pub struct PatternFilter {
    starts_with: Vec<String>,
    ends_with: Vec<String>,
    contains: Vec<String>,
    write_starts_with: Vec<String>,
    relevant: HashSet<String>,
    non_relevant: HashSet<String>,
}

impl PatternFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starts_with<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.starts_with.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn ends_with<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ends_with.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn contains<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.contains.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Prefixes excluded only when the field is written.
    pub fn write_starts_with<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.write_starts_with
            .extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Exclusions for JVM/Groovy library state and event-handler plumbing.
    pub fn with_library_defaults() -> Self {
        Self::new()
            .starts_with(["java", "org", "sun", "com", "gov", "groovy"])
            .ends_with([
                "stMC",
                "callSiteArray",
                "metaClass",
                "staticClassInfo",
                "__constructor__",
                "sendEvent",
                "Object",
                "reference",
                "location",
                "app",
                "state",
                "log",
                "functionList",
                "objectList",
                "eventList",
                "valueList",
                "settings",
                "printToConsole",
                "app1",
                "app2",
            ])
            .contains(["_closure"])
            .write_starts_with(["Event"])
    }

    fn excluded(&self, field: &str) -> bool {
        self.starts_with.iter().any(|p| field.starts_with(p.as_str()))
            || self.ends_with.iter().any(|p| field.ends_with(p.as_str()))
            || self.contains.iter().any(|p| field.contains(p.as_str()))
    }
}

impl FieldFilter for PatternFilter {
    fn is_relevant(&mut self, access: &Access) -> bool {
        let field = access.field.as_str();
        if self.non_relevant.contains(field) {
            return false;
        }
        if access.is_write()
            && self
                .write_starts_with
                .iter()
                .any(|p| field.starts_with(p.as_str()))
        {
            self.non_relevant.insert(field.to_owned());
            return false;
        }
        if self.relevant.contains(field) {
            return true;
        }
        if self.excluded(field) {
            self.non_relevant.insert(field.to_owned());
            false
        } else {
            self.relevant.insert(field.to_owned());
            true
        }
    }
}

impl<F: FieldFilter + ?Sized> FieldFilter for Box<F> {
    fn is_relevant(&mut self, access: &Access) -> bool {
        (**self).is_relevant(access)
    }
}
