//! Label sets and equality-based selectors.
//!
//! A `Selector` matches any label set that contains every one of its
//! `key=value` pairs (superset match). The empty selector matches
//! everything.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A set of labels attached to a pod or pod template.
pub type Labels = BTreeMap<String, String>;

/// An equality-based label selector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selector {
    requirements: Labels,
}

impl Selector {
    /// A selector that matches every label set.
    pub fn everything() -> Self {
        Self::default()
    }

    /// Build a selector requiring all of `labels`.
    pub fn from_labels(labels: &Labels) -> Self {
        Self {
            requirements: labels.clone(),
        }
    }

    /// True if `labels` carries every required `key=value` pair.
    pub fn matches(&self, labels: &Labels) -> bool {
        self.requirements
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.requirements.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}
