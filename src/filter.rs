//! Metadata filter evaluator.
//!
//! Applied in memory when the store can't push a constraint down. Missing
//! metadata fails any constraint that references it — an entry with no
//! `metadata` at all therefore fails every filter that isn't the default.

use crate::model::{Entry, XliffState};

/// A metadata filter applied over candidate entries.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub states: Option<Vec<XliffState>>,
    pub min_state: Option<XliffState>,
    pub min_quality: Option<u8>,
    pub context_includes: Option<Vec<String>>,
    pub required_properties: Option<Vec<(String, String)>>,
    pub provider: Option<String>,
}

impl Filter {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_none()
            && self.min_state.is_none()
            && self.min_quality.is_none()
            && self.context_includes.is_none()
            && self.required_properties.is_none()
            && self.provider.is_none()
    }

    /// Evaluate every configured constraint against `entry`. States, then
    /// minimum state rank, then quality, context, required properties, and
    /// provider, short-circuiting on the first failed constraint.
    #[must_use]
    pub fn matches(&self, entry: &Entry) -> bool {
        let Some(metadata) = entry.metadata.as_ref() else {
            return self.is_empty();
        };

        if let Some(states) = &self.states {
            match metadata.state {
                Some(s) if states.contains(&s) => {}
                _ => return false,
            }
        }

        if let Some(min_state) = self.min_state {
            match metadata.state {
                Some(s) if s.rank() >= min_state.rank() => {}
                _ => return false,
            }
        }

        if let Some(min_quality) = self.min_quality {
            match metadata.quality {
                Some(q) if q >= min_quality => {}
                _ => return false,
            }
        }

        if let Some(needles) = &self.context_includes {
            match &metadata.context {
                Some(context) => {
                    let lower = context.to_lowercase();
                    if !needles.iter().all(|n| lower.contains(&n.to_lowercase())) {
                        return false;
                    }
                }
                None => return false,
            }
        }

        if let Some(required) = &self.required_properties {
            for (key, value) in required {
                match metadata.properties.get(key) {
                    Some(actual) if actual == value => {}
                    _ => return false,
                }
            }
        }

        if let Some(provider) = &self.provider {
            match metadata.segment.as_ref().map(|s| &s.provider) {
                Some(p) if p == provider => {}
                _ => return false,
            }
        }

        true
    }
}
