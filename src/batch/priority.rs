use std::cmp::Ordering;

use serde_json::Value;

use crate::paginate::Record;

/// One tie-break rule applied when two records map to the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupRule {
    /// Records whose `field` is truthy win.
    PreferTrue(String),
    /// Records whose `field` is not truthy win (a missing field counts as false).
    PreferFalse(String),
    /// Lower numeric `field` wins; records without a number sort last.
    Ascending(String),
}

impl DedupRule {
    /// The record field this rule reads.
    pub fn field(&self) -> &str {
        match self {
            Self::PreferTrue(f) | Self::PreferFalse(f) | Self::Ascending(f) => f.as_str(),
        }
    }

    fn compare(&self, a: &Record, b: &Record) -> Ordering {
        match self {
            Self::PreferTrue(f) => rank_true(a, f).cmp(&rank_true(b, f)),
            Self::PreferFalse(f) => rank_false(a, f).cmp(&rank_false(b, f)),
            Self::Ascending(f) => match (number(a.get(f)), number(b.get(f))) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        }
    }
}

/// Ordered collision rules for the batch fetcher.
///
/// Rules are tried in order; the first one that distinguishes two records
/// decides. When none does, the record seen first is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupPriority {
    rules: Vec<DedupRule>,
}

impl DedupPriority {
    /// No rules: the first-seen record always wins.
    pub fn new() -> Self {
        Self::default()
    }

    /// Curated before non-curated, not-removed before removed, then ascending id.
    pub fn curated_first(curated: &str, removed: &str, id: &str) -> Self {
        Self::new()
            .prefer_true(curated)
            .prefer_false(removed)
            .ascending(id)
    }

    #[must_use]
    pub fn prefer_true(mut self, field: impl Into<String>) -> Self {
        self.rules.push(DedupRule::PreferTrue(field.into()));
        self
    }

    #[must_use]
    pub fn prefer_false(mut self, field: impl Into<String>) -> Self {
        self.rules.push(DedupRule::PreferFalse(field.into()));
        self
    }

    #[must_use]
    pub fn ascending(mut self, field: impl Into<String>) -> Self {
        self.rules.push(DedupRule::Ascending(field.into()));
        self
    }

    pub fn rules(&self) -> &[DedupRule] {
        &self.rules
    }

    /// Fields the rules read, in rule order; a projection must keep them.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(DedupRule::field)
    }

    /// `Less` when `a` should be kept over `b`.
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        self.rules
            .iter()
            .map(|r| r.compare(a, b))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    /// Whether a newly seen `candidate` replaces the `incumbent`. Ties keep the incumbent.
    pub fn replaces(&self, candidate: &Record, incumbent: &Record) -> bool {
        self.compare(candidate, incumbent) == Ordering::Less
    }
}

fn rank_true(r: &Record, field: &str) -> u8 {
    u8::from(truthy(r.get(field)) != Some(true))
}

fn rank_false(r: &Record, field: &str) -> u8 {
    u8::from(truthy(r.get(field)) == Some(true))
}

/// Flags arrive as booleans, 0/1 integers or strings depending on the source.
fn truthy(v: Option<&Value>) -> Option<bool> {
    match v? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|x| x != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Some(true),
            "false" | "f" | "no" | "n" | "0" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Numeric value of an id; prefixed ids like `CHEMBL25` use their trailing digits.
fn number(v: Option<&Value>) -> Option<f64> {
    match v? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<f64>().ok().or_else(|| {
                let digits = s.trim_start_matches(|c: char| !c.is_ascii_digit());
                if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                    None
                } else {
                    digits.parse::<f64>().ok()
                }
            })
        }
        _ => None,
    }
}
