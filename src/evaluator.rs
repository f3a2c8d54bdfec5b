//! Submission evaluator: fetch problem → run every test case → tally → AI judge → blend.
//!
//! Single pass. The only retries live inside the judge cascade. The whole call runs under an
//! outer deadline so one submission cannot hold a request forever.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::config::JudgeFailurePolicy;
use crate::domain::{Difficulty, Problem};
use crate::error::{EvalError, JudgeError};
use crate::executor::{CodeRunner, OutcomeKind};
use crate::judge::{Judge, JudgeRequest, Verdict};
use crate::scoring::blend;

/// Read-only access to problems and their ordered test cases.
#[async_trait]
pub trait ProblemSource: Send + Sync {
  async fn find_problem_with_test_cases(&self, id: &str) -> Option<Problem>;
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemSummary {
  pub id: String,
  pub title: String,
  pub difficulty: Difficulty,
}

/// Outcome of one test case. `success` is exact string equality of actual vs expected.
/// `outcome` tells a wrong answer (`completed`) from a crash or a timeout.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseResult {
  pub input: String,
  pub expected: String,
  pub actual: String,
  pub success: bool,
  pub outcome: OutcomeKind,
  pub elapsed_ms: u64,
}

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scores {
  pub test_score: u32,
  pub ai_score: u32,
  pub final_score: u32,
  pub max_range: u32,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
  pub syntax_errors: Option<String>,
  pub logic_issues: Option<String>,
  pub style_suggestions: Option<String>,
  pub is_relevant: bool,
  pub note: Option<String>,
}

/// How the AI review went.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JudgeOutcome {
  Judged { model: String },
  /// Every model failed and the degrade policy kept the evaluation going.
  Unavailable { reasons: Vec<String> },
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
  pub problem: ProblemSummary,
  pub results: Vec<CaseResult>,
  pub passed: usize,
  pub total: usize,
  pub scores: Scores,
  pub feedback: Feedback,
  pub judge: JudgeOutcome,
  /// The problem has no test cases; the test score is 0 by convention.
  pub no_test_cases: bool,
}

#[derive(Clone)]
pub struct Evaluator {
  problems: Arc<dyn ProblemSource>,
  runner: Arc<dyn CodeRunner>,
  /// Err holds the operator-facing reason the judge could not be configured.
  judge: Result<Arc<dyn Judge>, String>,
  policy: JudgeFailurePolicy,
  deadline: Duration,
}

impl Evaluator {
  pub fn new(
    problems: Arc<dyn ProblemSource>,
    runner: Arc<dyn CodeRunner>,
    judge: Result<Arc<dyn Judge>, String>,
    policy: JudgeFailurePolicy,
    deadline: Duration,
  ) -> Self {
    Self { problems, runner, judge, policy, deadline }
  }

  pub fn policy(&self) -> JudgeFailurePolicy {
    self.policy
  }

  pub fn judge_configured(&self) -> bool {
    self.judge.is_ok()
  }

  /// Evaluate `code` against problem `problem_id`.
  #[instrument(level = "info", skip(self, code), fields(%problem_id, %language, code_len = code.len()))]
  pub async fn evaluate(&self, problem_id: &str, code: &str, language: &str) -> Result<EvaluationResult, EvalError> {
    let judge = match &self.judge {
      Ok(j) => j.clone(),
      Err(reason) => {
        error!(target: "judge", %reason, "AI judge is not configured; refusing to evaluate");
        return Err(EvalError::Configuration(reason.clone()));
      }
    };

    match tokio::time::timeout(self.deadline, self.run(judge.as_ref(), problem_id, code, language)).await {
      Ok(result) => result,
      Err(_) => {
        error!(target: "judge", deadline = ?self.deadline, "Evaluation exceeded its deadline");
        Err(EvalError::DeadlineExceeded(self.deadline))
      }
    }
  }

  async fn run(&self, judge: &dyn Judge, problem_id: &str, code: &str, language: &str) -> Result<EvaluationResult, EvalError> {
    // 1. Fetch
    let problem = self
      .problems
      .find_problem_with_test_cases(problem_id)
      .await
      .ok_or_else(|| EvalError::NotFound(problem_id.to_string()))?;
    let max_range = problem.difficulty.max_score();

    // 2. Execute
    let outcomes = self.runner.run_cases(language, code, &problem.test_cases).await;
    let results: Vec<CaseResult> = problem
      .test_cases
      .iter()
      .zip(outcomes)
      .map(|(tc, outcome)| CaseResult {
        success: outcome.output == tc.expected_output,
        input: tc.input.clone(),
        expected: tc.expected_output.clone(),
        actual: outcome.output,
        outcome: outcome.kind,
        elapsed_ms: outcome.elapsed_ms,
      })
      .collect();

    // 3. Tally
    let total = problem.test_cases.len();
    let passed = results.iter().filter(|r| r.success).count();
    let no_test_cases = total == 0;
    if no_test_cases {
      warn!(target: "judge", problem_id = %problem.id, "Problem has no test cases; test score forced to 0");
    }
    info!(target: "judge", problem_id = %problem.id, passed, total, "Test cases executed");

    // 4. Judge
    let req = JudgeRequest { problem: &problem, language, code, passed, total };
    let (verdict, judge_outcome) = match judge.judge(&req).await {
      Ok(reply) => (reply.verdict, JudgeOutcome::Judged { model: reply.model }),
      Err(JudgeError::Unavailable(failures)) => match self.policy {
        JudgeFailurePolicy::Fail => {
          error!(target: "judge", attempts = failures.len(), "AI judge unavailable; failing evaluation");
          return Err(JudgeError::Unavailable(failures).into());
        }
        JudgeFailurePolicy::Degrade => {
          warn!(target: "judge", attempts = failures.len(), "AI judge unavailable; degrading to test-score-only result");
          let verdict = Verdict {
            syntax_errors: None,
            logic_issues: None,
            style_suggestions: None,
            ai_score: 0,
            is_relevant: true,
            note: Some("AI review unavailable; score is based on test cases only".into()),
          };
          let reasons = failures.iter().map(ToString::to_string).collect();
          (verdict, JudgeOutcome::Unavailable { reasons })
        }
      },
    };

    // 5. Blend
    let ai_score = if verdict.is_relevant { verdict.ai_score } else { 0 };
    let s = blend(passed, total, ai_score, max_range);
    info!(target: "judge", problem_id = %problem.id, test_score = s.test_score, ai_score = s.ai_score, final_score = s.final_score, max_range, "Evaluation scored");

    // 6. Emit
    Ok(EvaluationResult {
      problem: ProblemSummary { id: problem.id.clone(), title: problem.title.clone(), difficulty: problem.difficulty },
      results,
      passed,
      total,
      scores: Scores { test_score: s.test_score, ai_score: s.ai_score, final_score: s.final_score, max_range: s.max_score },
      feedback: Feedback {
        syntax_errors: verdict.syntax_errors,
        logic_issues: verdict.logic_issues,
        style_suggestions: verdict.style_suggestions,
        is_relevant: verdict.is_relevant,
        note: verdict.note,
      },
      judge: judge_outcome,
      no_test_cases,
    })
  }
}
