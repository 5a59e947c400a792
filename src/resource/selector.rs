use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Resource;

/// Equality-based label selector, e.g. `name=sherlock-operators,tier=web`.
///
/// An empty selector matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSelector {
    requirements: BTreeMap<String, String>,
}

impl LabelSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.requirements.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn matches_labels(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> bool {
        self.requirements
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
    }

    pub fn matches(
        &self,
        resource: &Resource,
    ) -> bool {
        self.matches_labels(resource.labels())
    }
}

impl FromStr for LabelSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut selector = LabelSelector::new();
        for term in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (key, value) = term
                .split_once('=')
                .ok_or_else(|| Error::InvalidConfig(format!("label selector term `{term}` has no `=`")))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "label selector term `{term}` has an empty key"
                )));
            }
            selector = selector.with(key, value.trim());
        }
        Ok(selector)
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let terms: Vec<String> = self.requirements.iter().map(|(k, v)| format!("{k}={v}")).collect();
        f.write_str(&terms.join(","))
    }
}

/// Options passed with every list and watch call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub label_selector: LabelSelector,
}

impl ListOptions {
    pub fn with_selector(selector: LabelSelector) -> Self {
        Self {
            label_selector: selector,
        }
    }
}
