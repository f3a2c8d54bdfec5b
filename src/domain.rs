//! Domain models: problems with their test cases, contests, registrations and submissions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Difficulty tier of a problem. Each tier caps the score a submission can earn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Difficulty {
  Easy,
  Medium,
  Hard,
}

impl Difficulty {
  /// Maximum score awardable for this tier (monotonic in difficulty).
  pub fn max_score(self) -> u32 {
    match self {
      Difficulty::Easy => 20,
      Difficulty::Medium => 60,
      Difficulty::Hard => 100,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Difficulty::Easy => "EASY",
      Difficulty::Medium => "MEDIUM",
      Difficulty::Hard => "HARD",
    }
  }

  /// Case-insensitive parse; unknown values yield None.
  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_ascii_uppercase().as_str() {
      "EASY" => Some(Difficulty::Easy),
      "MEDIUM" => Some(Difficulty::Medium),
      "HARD" => Some(Difficulty::Hard),
      _ => None,
    }
  }
}

impl fmt::Display for Difficulty {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One (input, expected output) pair attached to a problem.
/// An empty `id` is replaced with a fresh one when the problem is stored.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
  #[serde(default)] pub id: String,
  pub input: String,
  pub expected_output: String,
  #[serde(default)] pub is_public: bool,
  #[serde(default)] pub explanation: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
  pub id: String,
  pub title: String,
  pub description: String,
  pub difficulty: Difficulty,
  /// Technologies the solution is expected to use (fed to the AI judge).
  #[serde(default)] pub technologies: Vec<String>,
  #[serde(default)] pub task_type: Option<String>,
  #[serde(default)] pub starter_code: Option<String>,
  #[serde(default)] pub tags: Vec<String>,
  /// Ordered; evaluation reports outcomes in this order.
  #[serde(default)] pub test_cases: Vec<TestCase>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContestStatus {
  Upcoming,
  Live,
  Completed,
}

impl ContestStatus {
  /// Status implied by a contest's time window at instant `now`.
  pub fn at(start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> Self {
    if now < start {
      ContestStatus::Upcoming
    } else if now < end {
      ContestStatus::Live
    } else {
      ContestStatus::Completed
    }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contest {
  pub id: String,
  pub name: String,
  #[serde(default)] pub description: Option<String>,
  pub start_time: DateTime<Utc>,
  pub end_time: DateTime<Utc>,
  /// Minutes.
  pub duration: u32,
  #[serde(default = "default_true")] pub is_public: bool,
  #[serde(default = "default_status")] pub status: ContestStatus,
}

fn default_true() -> bool { true }
fn default_status() -> ContestStatus { ContestStatus::Upcoming }

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContestRegistration {
  pub id: String,
  pub user_id: String,
  pub contest_id: String,
  pub created_at: DateTime<Utc>,
}

/// A scored submission. Written once after evaluation and never re-judged.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
  pub id: String,
  pub user_id: String,
  pub problem_id: String,
  #[serde(default)] pub contest_id: Option<String>,
  pub language: String,
  pub code: String,
  pub points: u32,
  pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  #[test]
  fn score_bands_grow_with_difficulty() {
    assert_eq!(Difficulty::Easy.max_score(), 20);
    assert_eq!(Difficulty::Medium.max_score(), 60);
    assert_eq!(Difficulty::Hard.max_score(), 100);
    assert!(Difficulty::Easy < Difficulty::Medium && Difficulty::Medium < Difficulty::Hard);
    assert!(Difficulty::Easy.max_score() < Difficulty::Medium.max_score());
    assert!(Difficulty::Medium.max_score() < Difficulty::Hard.max_score());
  }

  #[test]
  fn difficulty_parses_any_case_and_serializes_upper() {
    assert_eq!(Difficulty::parse("medium"), Some(Difficulty::Medium));
    assert_eq!(Difficulty::parse(" Hard "), Some(Difficulty::Hard));
    assert_eq!(Difficulty::parse("insane"), None);
    assert_eq!(serde_json::to_string(&Difficulty::Easy).unwrap(), "\"EASY\"");
  }

  #[test]
  fn contest_status_follows_time_window() {
    let now = Utc::now();
    let start = now + Duration::minutes(10);
    let end = start + Duration::minutes(90);
    assert_eq!(ContestStatus::at(start, end, now), ContestStatus::Upcoming);
    assert_eq!(ContestStatus::at(start, end, start), ContestStatus::Live);
    assert_eq!(ContestStatus::at(start, end, end), ContestStatus::Completed);
  }

  #[test]
  fn test_case_reads_camel_case_fields() {
    let tc: TestCase = serde_json::from_str(
      r#"{"input":"2 3","expectedOutput":"5","isPublic":true,"explanation":"sum"}"#,
    ).unwrap();
    assert_eq!(tc.expected_output, "5");
    assert!(tc.id.is_empty());
    assert!(tc.is_public);
    assert_eq!(tc.explanation.as_deref(), Some("sum"));
  }
}
