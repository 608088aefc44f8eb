//! Textual range-term spec the attribute limiter hands to the attribute
//! backend, kept as a typed value with a `Display` impl rather than built by
//! raw string concatenation (resolves an open question, see DESIGN.md).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiversityCutoffStrategy {
    #[default]
    Loose,
    Strict,
}

impl DiversityCutoffStrategy {
    fn as_str(self) -> &'static str {
        match self {
            DiversityCutoffStrategy::Loose => "loose",
            DiversityCutoffStrategy::Strict => "strict",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiversitySpec {
    pub attribute: String,
    pub max_group_size: u64,
    pub cutoff_groups: u64,
    pub strategy: DiversityCutoffStrategy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeSpec {
    pub low: f64,
    pub high: f64,
    pub descending: bool,
    pub want_hits: u64,
    pub diversity: Option<DiversitySpec>,
}

impl fmt::Display for RangeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = if self.descending { "-" } else { "" };
        write!(f, "[{};{};{}{}", self.low, self.high, dir, self.want_hits)?;
        if let Some(d) = &self.diversity {
            write!(f, ";{};{};{};{}", d.attribute, d.max_group_size, d.cutoff_groups, d.strategy.as_str())?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_without_diversity() {
        let spec = RangeSpec { low: 0.0, high: 100.0, descending: true, want_hits: 50, diversity: None };
        assert_eq!(spec.to_string(), "[0;100;-50]");
    }

    #[test]
    fn renders_with_diversity() {
        let spec = RangeSpec {
            low: 0.0,
            high: 100.0,
            descending: false,
            want_hits: 50,
            diversity: Some(DiversitySpec {
                attribute: "category".into(),
                max_group_size: 5,
                cutoff_groups: 10,
                strategy: DiversityCutoffStrategy::Strict,
            }),
        };
        assert_eq!(spec.to_string(), "[0;100;50;category;5;10;strict]");
    }
}
