use std::env;

/// Exam gating thresholds, collected once at startup and injected into the
/// handlers. Grading uses `pass_threshold` platform-wide; the per-exam
/// `pass_score` column is authoring metadata only.
#[derive(Debug, Clone, Copy)]
pub struct ExamConfig {
    /// Attempt budget per (student, exam).
    pub max_attempts: i64,
    /// Minimum score_percent to pass, 0..=100.
    pub pass_threshold: i64,
}

impl Default for ExamConfig {
    fn default() -> Self {
        Self { max_attempts: 3, pass_threshold: 75 }
    }
}

impl ExamConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: env_i64("EXAM_MAX_ATTEMPTS", defaults.max_attempts),
            pass_threshold: env_i64("EXAM_PASS_THRESHOLD", defaults.pass_threshold),
        }
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_platform_rules() {
        let cfg = ExamConfig::default();
        assert_eq!(cfg.max_attempts, 3);
        assert_eq!(cfg.pass_threshold, 75);
    }

    #[test]
    fn env_fallback_ignores_garbage() {
        assert_eq!(env_i64("RUSTITRAIN_TEST_UNSET_VAR", 7), 7);
    }
}
