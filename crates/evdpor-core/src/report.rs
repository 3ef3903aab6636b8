//! Search statistics and the end-of-search report.

use crate::error::{ExploreError, ExploreResult};
use crate::execution::ExecutionId;
use crate::ids::{Event, StateId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Running transition counters.
#[derive(Debug, Default)]
pub struct Statistics {
    transitions: usize,
    unique: HashMap<StateId, HashSet<Event>>,
}

impl Statistics {
    /// Count one transition; in reduction mode the (state, event) pair is also
    /// tracked for the unique count.
    pub fn record(&mut self, pair: Option<(StateId, Event)>) {
        self.transitions += 1;
        if let Some((state, event)) = pair {
            self.unique.entry(state).or_default().insert(event);
        }
    }

    pub fn transitions(&self) -> usize {
        self.transitions
    }

    /// Distinct (state, event) pairs taken.
    pub fn unique_transitions(&self) -> usize {
        self.unique.values().map(HashSet::len).sum()
    }
}

/// Where and with which order an execution started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionStart {
    pub execution: ExecutionId,
    pub state: StateId,
    pub schedule: Vec<Event>,
}

/// Final numbers of a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSummary {
    pub state_reduction: bool,
    pub events: usize,
    pub transitions: usize,
    pub unique_transitions: usize,
    pub executions: usize,
    pub backtrack_points: usize,
}

impl SearchSummary {
    /// Append the summary to `path`, creating the file if needed.
    pub fn append_to(&self, path: &Path) -> ExploreResult<()> {
        let write = || -> std::io::Result<()> {
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(file, "{self}")
        };
        write().map_err(|source| ExploreError::Report {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl fmt::Display for SearchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "State reduction mode         : {}", self.state_reduction)?;
        writeln!(f, "Number of events             : {}", self.events)?;
        writeln!(f, "Number of transitions        : {}", self.transitions)?;
        writeln!(f, "Number of unique transitions : {}", self.unique_transitions)?;
        writeln!(f, "Executions started           : {}", self.executions)?;
        write!(f, "Backtrack points created     : {}", self.backtrack_points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> SearchSummary {
        SearchSummary {
            state_reduction: true,
            events: 2,
            transitions: 7,
            unique_transitions: 4,
            executions: 3,
            backtrack_points: 2,
        }
    }

    #[test]
    fn test_unique_transitions() {
        let mut stats = Statistics::default();
        stats.record(Some((StateId::new(1), Event::new(0))));
        stats.record(Some((StateId::new(1), Event::new(0))));
        stats.record(Some((StateId::new(1), Event::new(1))));
        stats.record(None);
        assert_eq!(stats.transitions(), 4);
        assert_eq!(stats.unique_transitions(), 2);
    }

    #[test]
    fn test_append_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        summary().append_to(&path).unwrap();
        summary().append_to(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("Number of transitions        : 7").count(), 2);
    }

    #[test]
    fn test_append_to_bad_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("report.txt");
        let err = summary().append_to(&path).unwrap_err();
        assert!(matches!(err, ExploreError::Report { .. }));
    }
}
