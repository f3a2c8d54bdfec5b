//! Public protocol structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Contest, ContestStatus, Difficulty, Problem, Submission, TestCase};
use crate::evaluator::EvaluationResult;
use crate::state::{Activity, SolvedCounts};

/// Problem as shown to contestants: hidden test cases are withheld.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemOut {
    pub id: String,
    pub title: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub technologies: Vec<String>,
    pub task_type: Option<String>,
    pub starter_code: Option<String>,
    pub tags: Vec<String>,
    pub test_cases: Vec<TestCase>,
    /// Count of all test cases, public and hidden.
    pub total_test_cases: usize,
}

/// Convert full `Problem` (internal) to the public DTO.
pub fn to_out(p: &Problem) -> ProblemOut {
    ProblemOut {
        id: p.id.clone(),
        title: p.title.clone(),
        description: p.description.clone(),
        difficulty: p.difficulty,
        technologies: p.technologies.clone(),
        task_type: p.task_type.clone(),
        starter_code: p.starter_code.clone(),
        tags: p.tags.clone(),
        test_cases: p.test_cases.iter().filter(|tc| tc.is_public).cloned().collect(),
        total_test_cases: p.test_cases.len(),
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionIn {
    pub problem_id: String,
    #[serde(default)]
    pub contest_id: Option<String>,
    pub code: String,
    pub language: String,
}

#[derive(Debug, Serialize)]
pub struct SubmissionOut {
    pub success: bool,
    pub submission: Submission,
    pub evaluation: EvaluationResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationIn {
    pub contest_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProblemIn {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub difficulty: String,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub task_type: Option<String>,
    #[serde(default)]
    pub starter_code: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

impl CreateProblemIn {
    /// Validate and build a new problem with a fresh id.
    pub fn into_problem(self) -> Result<Problem, String> {
        if self.title.trim().is_empty() {
            return Err("Problem title is required".into());
        }
        let difficulty = Difficulty::parse(&self.difficulty)
            .ok_or_else(|| format!("Unknown difficulty '{}' (expected EASY, MEDIUM or HARD)", self.difficulty))?;
        Ok(Problem {
            id: Uuid::new_v4().to_string(),
            title: self.title.trim().to_string(),
            description: self.description,
            difficulty,
            technologies: self.technologies,
            task_type: self.task_type,
            starter_code: self.starter_code,
            tags: self.tags,
            test_cases: self.test_cases,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContestIn {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Minutes; signed so non-positive values can be reported instead of failing to parse.
    pub duration: i64,
    #[serde(default)]
    pub is_public: Option<bool>,
}

impl CreateContestIn {
    /// Validate and build a new contest whose status reflects `now`.
    pub fn into_contest(self, now: DateTime<Utc>) -> Result<Contest, String> {
        if self.name.trim().is_empty() {
            return Err("Contest name is required".into());
        }
        if self.end_time <= self.start_time {
            return Err("End time must be after start time".into());
        }
        let duration = u32::try_from(self.duration)
            .ok()
            .filter(|d| *d > 0)
            .ok_or_else(|| "Duration must be a positive integer".to_string())?;
        Ok(Contest {
            id: Uuid::new_v4().to_string(),
            name: self.name.trim().to_string(),
            description: self.description,
            start_time: self.start_time,
            end_time: self.end_time,
            duration,
            is_public: self.is_public.unwrap_or(true),
            status: ContestStatus::at(self.start_time, self.end_time, now),
        })
    }
}

/// Partial problem update; absent fields keep their value.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProblemIn {
    pub title: Option<String>,
    pub description: Option<String>,
    pub difficulty: Option<String>,
    pub technologies: Option<Vec<String>>,
    pub task_type: Option<String>,
    pub starter_code: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl UpdateProblemIn {
    /// Validate every provided field before touching `p`.
    pub fn apply(self, p: &mut Problem) -> Result<(), String> {
        let title = match self.title {
            Some(t) if t.trim().is_empty() => return Err("Problem title is required".into()),
            Some(t) => Some(t.trim().to_string()),
            None => None,
        };
        let difficulty = match self.difficulty {
            Some(d) => Some(
                Difficulty::parse(&d).ok_or_else(|| format!("Unknown difficulty '{}' (expected EASY, MEDIUM or HARD)", d))?,
            ),
            None => None,
        };
        if let Some(t) = title {
            p.title = t;
        }
        if let Some(d) = difficulty {
            p.difficulty = d;
        }
        if let Some(d) = self.description {
            p.description = d;
        }
        if let Some(t) = self.technologies {
            p.technologies = t;
        }
        if self.task_type.is_some() {
            p.task_type = self.task_type;
        }
        if self.starter_code.is_some() {
            p.starter_code = self.starter_code;
        }
        if let Some(t) = self.tags {
            p.tags = t;
        }
        Ok(())
    }
}

/// Partial contest update; the merged window is validated as on creation.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContestIn {
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Option<i64>,
    pub is_public: Option<bool>,
}

impl UpdateContestIn {
    /// Merge into `current` and re-validate; the status is recomputed for `now`.
    pub fn apply(self, current: &Contest, now: DateTime<Utc>) -> Result<Contest, String> {
        let merged = CreateContestIn {
            name: self.name.unwrap_or_else(|| current.name.clone()),
            description: self.description.or_else(|| current.description.clone()),
            start_time: self.start_time.unwrap_or(current.start_time),
            end_time: self.end_time.unwrap_or(current.end_time),
            duration: self.duration.unwrap_or(current.duration as i64),
            is_public: Some(self.is_public.unwrap_or(current.is_public)),
        };
        let mut contest = merged.into_contest(now)?;
        contest.id = current.id.clone();
        Ok(contest)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTestCaseIn {
    pub problem_id: Option<String>,
    pub input: Option<String>,
    pub expected_output: Option<String>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub explanation: Option<String>,
}

impl CreateTestCaseIn {
    /// Split into the target problem id and the new case (its id is assigned on insert).
    pub fn into_test_case(self) -> Result<(String, TestCase), String> {
        let (Some(problem_id), Some(input), Some(expected_output)) = (self.problem_id, self.input, self.expected_output) else {
            return Err("problemId, input and expectedOutput are required".into());
        };
        if problem_id.trim().is_empty() {
            return Err("problemId, input and expectedOutput are required".into());
        }
        Ok((
            problem_id,
            TestCase { id: String::new(), input, expected_output, is_public: self.is_public, explanation: self.explanation },
        ))
    }
}

/// Partial test case update; absent fields keep their value.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTestCaseIn {
    pub input: Option<String>,
    pub expected_output: Option<String>,
    pub is_public: Option<bool>,
    pub explanation: Option<String>,
}

impl UpdateTestCaseIn {
    pub fn apply(self, tc: &mut TestCase) {
        if let Some(i) = self.input {
            tc.input = i;
        }
        if let Some(e) = self.expected_output {
            tc.expected_output = e;
        }
        if let Some(p) = self.is_public {
            tc.is_public = p;
        }
        if self.explanation.is_some() {
            tc.explanation = self.explanation;
        }
    }
}

/// Test case as listed to admins, tagged with its problem.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseOut {
    pub problem_id: String,
    #[serde(flatten)]
    pub test_case: TestCase,
}

impl From<(String, TestCase)> for TestCaseOut {
    fn from((problem_id, test_case): (String, TestCase)) -> Self {
        Self { problem_id, test_case }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressOut {
    pub success: bool,
    pub easy: usize,
    pub medium: usize,
    pub hard: usize,
    pub total_solved: usize,
}

impl From<SolvedCounts> for ProgressOut {
    fn from(c: SolvedCounts) -> Self {
        Self { success: true, easy: c.easy, medium: c.medium, hard: c.hard, total_solved: c.total() }
    }
}

/// One row of a user's recent activity. Title and difficulty are absent for deleted problems.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityOut {
    pub submission_id: String,
    pub problem_id: String,
    pub title: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub language: String,
    pub points: u32,
    pub submitted_at: DateTime<Utc>,
}

impl From<Activity> for ActivityOut {
    fn from(a: Activity) -> Self {
        let s = a.submission;
        Self {
            submission_id: s.id,
            problem_id: s.problem_id,
            title: a.problem.as_ref().map(|p| p.title.clone()),
            difficulty: a.problem.map(|p| p.difficulty),
            language: s.language,
            points: s.points,
            submitted_at: s.created_at,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthOut {
    pub ok: bool,
    pub judge_configured: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub success: bool,
    pub message: String,
}
