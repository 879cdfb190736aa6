use serde::{Deserialize, Serialize};

/// Estado grueso de un worker.
///
/// Las transiciones válidas son:
/// - `Start` -> `Running`
/// - `Running` -> `Success`
/// - `Running` -> `Failed`
///
/// `Start` -> `Failed` también se admite (fallo antes de arrancar la fase).
/// Los estados terminales son definitivos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Start,
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Start => "start",
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "start" => Some(RunStatus::Start),
            "running" => Some(RunStatus::Running),
            "success" => Some(RunStatus::Success),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Failed)
    }

    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!((self, next),
                 (RunStatus::Start, RunStatus::Running)
                 | (RunStatus::Start, RunStatus::Failed)
                 | (RunStatus::Running, RunStatus::Success)
                 | (RunStatus::Running, RunStatus::Failed))
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_monotonic() {
        assert!(RunStatus::Start.can_transition_to(RunStatus::Running));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Failed));
        assert!(!RunStatus::Success.can_transition_to(RunStatus::Failed));
        assert!(!RunStatus::Failed.can_transition_to(RunStatus::Running));
        assert!(!RunStatus::Running.can_transition_to(RunStatus::Start));
    }

    #[test]
    fn parse_matches_as_str() {
        for s in [RunStatus::Start, RunStatus::Running, RunStatus::Success, RunStatus::Failed] {
            assert_eq!(RunStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(RunStatus::parse("success\n"), Some(RunStatus::Success));
        assert_eq!(RunStatus::parse("done"), None);
    }
}
