//! Progress events emitted by the orchestrator.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Render stage of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RenderStage {
    /// Layer composition into the intermediate artifact
    Compose,
    /// Portrait reframing into the final artifact
    Reframe,
}

impl RenderStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStage::Compose => "compose",
            RenderStage::Reframe => "reframe",
        }
    }
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Category of a fatal job failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Source missing, unreadable or not decodable
    Acquisition,
    /// Main segment missing or an overlay asset is invalid
    Composition,
    /// Target aspect unachievable or reframe render failure
    Reframe,
    /// Codec or I/O failure while rendering
    Encode,
    /// Temporary storage could not be created
    Resource,
    /// Job was cancelled by the caller
    Cancelled,
    /// Job exceeded its time budget
    Timeout,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Acquisition => "acquisition",
            FailureKind::Composition => "composition",
            FailureKind::Reframe => "reframe",
            FailureKind::Encode => "encode",
            FailureKind::Resource => "resource",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Timeout => "timeout",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Notification sent from a running job to its caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Source asset is being resolved and probed
    Acquiring,

    /// Layer stack is being rendered
    Composing,

    /// Composited clip is being reframed
    Reframing,

    /// Encoder progress within a stage (0-100)
    Progress { stage: RenderStage, percent: u8 },

    /// Non-fatal degradation (e.g. subject detection fell back to center)
    Warning {
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Job finished; `output` is the final portrait artifact
    Done { output: PathBuf },

    /// Job aborted
    Failed { kind: FailureKind, reason: String },
}

impl JobEvent {
    /// Create a warning event stamped with the current time.
    pub fn warning(message: impl Into<String>) -> Self {
        JobEvent::Warning {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a failure event.
    pub fn failed(kind: FailureKind, reason: impl Into<String>) -> Self {
        JobEvent::Failed {
            kind,
            reason: reason.into(),
        }
    }

    /// Whether no further events follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Done { .. } | JobEvent::Failed { .. })
    }
}

impl fmt::Display for JobEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobEvent::Acquiring => write!(f, "acquiring"),
            JobEvent::Composing => write!(f, "composing"),
            JobEvent::Reframing => write!(f, "reframing"),
            JobEvent::Progress { stage, percent } => write!(f, "{}: {}%", stage, percent),
            JobEvent::Warning { message, .. } => write!(f, "warning: {}", message),
            JobEvent::Done { .. } => write!(f, "done"),
            JobEvent::Failed { reason, .. } => write!(f, "failed: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_labels() {
        assert_eq!(JobEvent::Acquiring.to_string(), "acquiring");
        assert_eq!(JobEvent::Composing.to_string(), "composing");
        assert_eq!(JobEvent::Reframing.to_string(), "reframing");
        assert_eq!(
            JobEvent::Done {
                output: PathBuf::from("/out/abc_9x16.mp4")
            }
            .to_string(),
            "done"
        );
        assert_eq!(
            JobEvent::failed(FailureKind::Reframe, "source too narrow").to_string(),
            "failed: source too narrow"
        );
    }

    #[test]
    fn test_serialization_tag() {
        let json = serde_json::to_string(&JobEvent::Progress {
            stage: RenderStage::Compose,
            percent: 42,
        })
        .unwrap();
        assert!(json.contains("\"type\":\"progress\""));
        assert!(json.contains("\"stage\":\"compose\""));

        let json = serde_json::to_string(&JobEvent::failed(FailureKind::Encode, "x")).unwrap();
        assert!(json.contains("\"kind\":\"encode\""));
    }

    #[test]
    fn test_terminal() {
        assert!(!JobEvent::Acquiring.is_terminal());
        assert!(!JobEvent::warning("w").is_terminal());
        assert!(JobEvent::failed(FailureKind::Resource, "disk").is_terminal());
    }
}
