//! Label matchers used by suppression rules and notification routing.

use crate::types::Labels;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    #[default]
    Equal,
    NotEqual,
    Regex,
    NotRegex,
}

/// Matches one label of an alert.
///
/// A label that is absent from the set is treated as the empty string, so
/// `env!=prod` matches alerts without an `env` label. Regular expressions are
/// anchored at both ends.
///
/// # Examples
///
/// ```
/// use vigil_common::matcher::{LabelMatcher, MatchType};
/// use vigil_common::types::Labels;
///
/// let m = LabelMatcher::new("env", "prod|staging", MatchType::Regex).unwrap();
/// let mut labels = Labels::new();
/// labels.insert("env".into(), "staging".into());
/// assert!(m.matches(&labels));
/// labels.insert("env".into(), "production".into());
/// assert!(!m.matches(&labels));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelMatcher {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub operator: MatchType,
    #[serde(skip)]
    regex: Option<Regex>,
}

impl PartialEq for LabelMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.value == other.value && self.operator == other.operator
    }
}

impl LabelMatcher {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        operator: MatchType,
    ) -> Result<Self, regex::Error> {
        let mut matcher = Self {
            name: name.into(),
            value: value.into(),
            operator,
            regex: None,
        };
        matcher.compile()?;
        Ok(matcher)
    }

    /// Compiles the pattern for regex matchers. Deserialized matchers must be
    /// compiled before use; an uncompiled regex matcher never matches.
    pub fn compile(&mut self) -> Result<(), regex::Error> {
        if matches!(self.operator, MatchType::Regex | MatchType::NotRegex) && self.regex.is_none()
        {
            self.regex = Some(Regex::new(&format!("^(?:{})$", self.value))?);
        }
        Ok(())
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        let actual = labels.get(&self.name).map(String::as_str).unwrap_or("");
        match self.operator {
            MatchType::Equal => actual == self.value,
            MatchType::NotEqual => actual != self.value,
            MatchType::Regex => self.regex.as_ref().is_some_and(|re| re.is_match(actual)),
            MatchType::NotRegex => self.regex.as_ref().is_some_and(|re| !re.is_match(actual)),
        }
    }
}

/// True when every matcher matches. An empty matcher list matches everything.
pub fn matches_all(matchers: &[LabelMatcher], labels: &Labels) -> bool {
    matchers.iter().all(|m| m.matches(labels))
}
