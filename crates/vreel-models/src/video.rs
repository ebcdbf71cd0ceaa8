//! Discovery candidate models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A source video returned by the discovery service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VideoCandidate {
    pub title: String,
    pub id: String,
    pub url: String,
    pub duration_seconds: u64,
    pub view_count: u64,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

impl VideoCandidate {
    /// Duration formatted as `m:ss`.
    pub fn duration_label(&self) -> String {
        format!("{}:{:02}", self.duration_seconds / 60, self.duration_seconds % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_label() {
        let candidate = VideoCandidate {
            title: "t".to_string(),
            id: "abc".to_string(),
            url: "https://example.com/watch?v=abc".to_string(),
            duration_seconds: 605,
            view_count: 10,
            thumbnail_url: None,
        };
        assert_eq!(candidate.duration_label(), "10:05");
    }
}
