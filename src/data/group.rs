//! Policy-Exposure Group Module
//! Labels each state by its shall-issue history across the panel.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Per-state classification of shall-issue exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyGroup {
    Unassigned,
    Always,
    Never,
    Transitioned,
}

impl PolicyGroup {
    /// Groups a fully transformed panel may contain, in code order.
    pub const ASSIGNED: [PolicyGroup; 3] = [
        PolicyGroup::Always,
        PolicyGroup::Never,
        PolicyGroup::Transitioned,
    ];

    /// Numeric code stored in the `group` column.
    pub fn code(self) -> i32 {
        match self {
            PolicyGroup::Unassigned => 0,
            PolicyGroup::Always => 1,
            PolicyGroup::Never => 2,
            PolicyGroup::Transitioned => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(PolicyGroup::Unassigned),
            1 => Some(PolicyGroup::Always),
            2 => Some(PolicyGroup::Never),
            3 => Some(PolicyGroup::Transitioned),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PolicyGroup::Unassigned => "Unassigned",
            PolicyGroup::Always => "Always shall-issue",
            PolicyGroup::Never => "Never shall-issue",
            PolicyGroup::Transitioned => "Transitioned to shall-issue",
        }
    }
}

impl fmt::Display for PolicyGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.code())
    }
}

/// A law indicator only counts when it is exactly 0 or 1.
fn valid_indicator(value: Option<f64>) -> Option<bool> {
    match value {
        Some(v) if v == 0.0 => Some(false),
        Some(v) if v == 1.0 => Some(true),
        _ => None,
    }
}

#[derive(Debug, Default)]
struct StateHistory {
    /// Indicator on the first row with a valid value, in scan order.
    first: Option<bool>,
    any_issue: bool,
    /// A 0 row seen after the state started out shall-issue.
    repealed: bool,
}

impl StateHistory {
    fn group(&self) -> PolicyGroup {
        match self.first {
            Some(true) => PolicyGroup::Always,
            Some(false) if self.any_issue => PolicyGroup::Transitioned,
            Some(false) => PolicyGroup::Never,
            None => PolicyGroup::Unassigned,
        }
    }
}

/// Row labels plus the states that need a diagnostic.
#[derive(Debug, Clone)]
pub struct GroupAssignment<K> {
    pub groups: Vec<PolicyGroup>,
    /// States with no valid indicator on any row.
    pub unassigned: Vec<K>,
    /// Always-group states that later show a 0 indicator.
    pub repealed: Vec<K>,
}

/// Two linear passes: resolve one group per state, then label every row.
pub struct GroupAssigner;

impl GroupAssigner {
    pub fn assign<K>(states: &[K], indicators: &[Option<f64>]) -> GroupAssignment<K>
    where
        K: Eq + Hash + Clone + Ord,
    {
        debug_assert_eq!(states.len(), indicators.len());

        let mut history: HashMap<&K, StateHistory> = HashMap::new();
        for (state, &raw) in states.iter().zip(indicators) {
            let entry = history.entry(state).or_default();
            let Some(issue) = valid_indicator(raw) else {
                continue;
            };
            match entry.first {
                None => entry.first = Some(issue),
                Some(true) if !issue => entry.repealed = true,
                _ => {}
            }
            entry.any_issue |= issue;
        }

        let groups = states
            .iter()
            .map(|state| {
                history
                    .get(state)
                    .map(StateHistory::group)
                    .unwrap_or(PolicyGroup::Unassigned)
            })
            .collect();

        let mut unassigned: Vec<K> = history
            .iter()
            .filter(|(_, h)| h.group() == PolicyGroup::Unassigned)
            .map(|(k, _)| (*k).clone())
            .collect();
        unassigned.sort();

        let mut repealed: Vec<K> = history
            .iter()
            .filter(|(_, h)| h.repealed)
            .map(|(k, _)| (*k).clone())
            .collect();
        repealed.sort();

        GroupAssignment {
            groups,
            unassigned,
            repealed,
        }
    }
}
