//! Error taxonomy of the evaluation pipeline.
//!
//! Per-test-case execution faults and malformed judge replies never show up here:
//! the former become a case's actual output, the latter a heuristic verdict.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// One failed attempt in the judge cascade.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelFailure {
  pub model: String,
  pub reason: String,
}

impl fmt::Display for ModelFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.model, self.reason)
  }
}

fn join_failures(failures: &[ModelFailure]) -> String {
  if failures.is_empty() {
    return "no models configured".into();
  }
  failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

#[derive(Debug, Error)]
pub enum JudgeError {
  /// Every model identifier in the cascade failed (or none were configured).
  #[error("AI judge unavailable ({})", join_failures(.0))]
  Unavailable(Vec<ModelFailure>),
}

#[derive(Debug, Error)]
pub enum EvalError {
  /// A required external-service credential or setting is missing.
  #[error("configuration error: {0}")]
  Configuration(String),
  #[error("problem not found: {0}")]
  NotFound(String),
  #[error(transparent)]
  JudgeUnavailable(#[from] JudgeError),
  #[error("evaluation exceeded deadline of {0:?}")]
  DeadlineExceeded(Duration),
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unavailable_lists_every_model() {
    let err = JudgeError::Unavailable(vec![
      ModelFailure { model: "a".into(), reason: "HTTP 429".into() },
      ModelFailure { model: "b".into(), reason: "timeout".into() },
    ]);
    assert_eq!(err.to_string(), "AI judge unavailable (a: HTTP 429; b: timeout)");
    let eval: EvalError = err.into();
    assert!(matches!(eval, EvalError::JudgeUnavailable(_)));
  }

  #[test]
  fn empty_cascade_is_described() {
    assert_eq!(JudgeError::Unavailable(vec![]).to_string(), "AI judge unavailable (no models configured)");
  }
}
