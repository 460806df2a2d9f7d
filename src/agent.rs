//! Agent identity and opinion primitives.

use serde::{Deserialize, Serialize};

/// Agent identifier, stable for the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub usize);

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opinion score, guaranteed in [-1.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Opinion(f64);

impl Opinion {
    /// Lower bound of the opinion scale.
    pub const MIN: f64 = -1.0;
    /// Upper bound of the opinion scale.
    pub const MAX: f64 = 1.0;

    /// Create an opinion, clamping to the valid range.
    ///
    /// NaN collapses to neutral.
    pub fn new(v: f64) -> Self {
        if v.is_nan() {
            Self(0.0)
        } else {
            Self(v.clamp(Self::MIN, Self::MAX))
        }
    }

    /// Get the opinion value
    pub fn value(&self) -> f64 {
        self.0
    }

    /// Absolute distance between two opinions.
    pub fn distance(&self, other: Opinion) -> f64 {
        (self.0 - other.0).abs()
    }

    /// Five-level stance wording used in prompts and setup memory entries.
    pub fn stance(&self, topic: &str) -> String {
        let v = self.0;
        if v > 0.6 {
            format!("Strongly in favor of the position on {topic}")
        } else if v > 0.2 {
            format!("Somewhat in favor of the position on {topic}")
        } else if v > -0.2 {
            format!("Neutral / undecided on {topic}")
        } else if v > -0.6 {
            format!("Somewhat against the position on {topic}")
        } else {
            format!("Strongly against the position on {topic}")
        }
    }
}

impl Default for Opinion {
    fn default() -> Self {
        Self(0.0)
    }
}

impl From<f64> for Opinion {
    fn from(v: f64) -> Self {
        Self::new(v)
    }
}

impl From<Opinion> for f64 {
    fn from(o: Opinion) -> Self {
        o.0
    }
}

impl std::fmt::Display for Opinion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// One simulated participant.
#[derive(Debug, Clone, Serialize)]
pub struct Agent {
    /// Stable identifier
    pub id: AgentId,
    /// Current opinion
    pub opinion: Opinion,
    /// One-sentence rationale generated at setup, if enabled
    pub persona: Option<String>,
    /// Most recent conversation tick, `None` until the first conversation
    pub last_tick: Option<u64>,
}

impl Agent {
    /// Create an agent that has not yet talked to anyone.
    pub fn new(id: AgentId, opinion: Opinion) -> Self {
        Self {
            id,
            opinion,
            persona: None,
            last_tick: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opinion_clamps() {
        assert_eq!(Opinion::new(1.7).value(), 1.0);
        assert_eq!(Opinion::new(-3.0).value(), -1.0);
        assert_eq!(Opinion::new(0.25).value(), 0.25);
        assert_eq!(Opinion::new(f64::NAN).value(), 0.0);
    }

    #[test]
    fn test_deserialize_clamps() {
        let o: Opinion = serde_json::from_str("3.5").unwrap();
        assert_eq!(o.value(), 1.0);
        let o: Opinion = serde_json::from_str("-0.25").unwrap();
        assert_eq!(o.value(), -0.25);
        assert_eq!(serde_json::to_string(&Opinion::new(-2.0)).unwrap(), "-1.0");
    }

    #[test]
    fn test_stance_bands() {
        assert!(Opinion::new(0.9).stance("x").starts_with("Strongly in favor"));
        assert!(Opinion::new(0.3).stance("x").starts_with("Somewhat in favor"));
        assert!(Opinion::new(0.2).stance("x").starts_with("Neutral"));
        assert!(Opinion::new(-0.4).stance("x").starts_with("Somewhat against"));
        assert!(Opinion::new(-0.6).stance("x").starts_with("Strongly against"));
    }

    #[test]
    fn test_opinion_distance() {
        assert!((Opinion::new(0.1).distance(Opinion::new(-0.2)) - 0.3).abs() < 1e-12);
    }
}
