//! Application state: in-memory stores and the submission evaluator.
//!
//! This module owns:
//!   - problem store (by id, plus insertion order for listing)
//!   - contests, contest registrations and submissions
//!   - per-user progress and recent activity derived from submissions
//!   - the evaluator wired to the local executor and (if configured) the AI judge
//!
//! Problems come from the TOML bank first, then built-in seeds that don't collide by id.

use std::{
  collections::{HashMap, HashSet},
  sync::Arc,
  time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::{AppConfig, ContestCfg, ProblemCfg};
use crate::domain::{Contest, ContestRegistration, ContestStatus, Difficulty, Problem, Submission, TestCase};
use crate::evaluator::{Evaluator, ProblemSource, ProblemSummary};
use crate::executor::LocalExecutor;
use crate::judge::{Judge, JudgeClient};
use crate::seeds::{seed_contests, seed_problems};

#[derive(Default)]
pub struct Store {
  problems: RwLock<HashMap<String, Problem>>,
  problem_order: RwLock<Vec<String>>,
  contests: RwLock<HashMap<String, Contest>>,
  registrations: RwLock<HashMap<String, ContestRegistration>>,
  submissions: RwLock<HashMap<String, Submission>>,
}

/// Distinct problems a user has submitted to, per difficulty.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SolvedCounts {
  pub easy: usize,
  pub medium: usize,
  pub hard: usize,
}

impl SolvedCounts {
  pub fn total(&self) -> usize {
    self.easy + self.medium + self.hard
  }
}

/// One submission with the problem it targeted (None once that problem is deleted).
#[derive(Clone, Debug)]
pub struct Activity {
  pub submission: Submission,
  pub problem: Option<ProblemSummary>,
}

/// Registration attempt result.
#[derive(Debug)]
pub enum RegisterOutcome {
  Registered(ContestRegistration),
  AlreadyRegistered,
  UnknownContest,
}

impl Store {
  /// Insert problem (idempotent on id: replaces content, keeps list position).
  /// Test cases without an id get a fresh one.
  #[instrument(level = "debug", skip(self, p), fields(id = %p.id))]
  pub async fn insert_problem(&self, mut p: Problem) {
    for tc in p.test_cases.iter_mut().filter(|tc| tc.id.is_empty()) {
      tc.id = Uuid::new_v4().to_string();
    }
    let mut problems = self.problems.write().await;
    let mut order = self.problem_order.write().await;
    if !problems.contains_key(&p.id) {
      order.push(p.id.clone());
    }
    problems.insert(p.id.clone(), p);
  }

  pub async fn get_problem(&self, id: &str) -> Option<Problem> {
    self.problems.read().await.get(id).cloned()
  }

  pub async fn list_problems(&self) -> Vec<Problem> {
    let problems = self.problems.read().await;
    let order = self.problem_order.read().await;
    order.iter().filter_map(|id| problems.get(id).cloned()).collect()
  }

  /// Remove a problem and every submission made to it. None when the problem is unknown,
  /// otherwise the number of submissions removed.
  #[instrument(level = "debug", skip(self))]
  pub async fn delete_problem(&self, id: &str) -> Option<usize> {
    {
      let mut problems = self.problems.write().await;
      problems.remove(id)?;
      self.problem_order.write().await.retain(|p| p != id);
    }
    let mut submissions = self.submissions.write().await;
    let before = submissions.len();
    submissions.retain(|_, s| s.problem_id != id);
    Some(before - submissions.len())
  }

  /// Append a test case to a problem. None when the problem is unknown.
  pub async fn add_test_case(&self, problem_id: &str, mut tc: TestCase) -> Option<TestCase> {
    let mut problems = self.problems.write().await;
    let problem = problems.get_mut(problem_id)?;
    tc.id = Uuid::new_v4().to_string();
    problem.test_cases.push(tc.clone());
    Some(tc)
  }

  /// Every test case with its problem id, in problem listing order.
  pub async fn all_test_cases(&self) -> Vec<(String, TestCase)> {
    self
      .list_problems()
      .await
      .into_iter()
      .flat_map(|p| {
        let pid = p.id;
        p.test_cases.into_iter().map(move |tc| (pid.clone(), tc))
      })
      .collect()
  }

  pub async fn find_test_case(&self, id: &str) -> Option<(String, TestCase)> {
    let problems = self.problems.read().await;
    problems
      .values()
      .find_map(|p| p.test_cases.iter().find(|tc| tc.id == id).map(|tc| (p.id.clone(), tc.clone())))
  }

  /// Edit a test case in place, keeping its position within the problem.
  pub async fn update_test_case(&self, id: &str, edit: impl FnOnce(&mut TestCase)) -> Option<(String, TestCase)> {
    let mut problems = self.problems.write().await;
    for p in problems.values_mut() {
      if let Some(tc) = p.test_cases.iter_mut().find(|tc| tc.id == id) {
        edit(tc);
        return Some((p.id.clone(), tc.clone()));
      }
    }
    None
  }

  pub async fn delete_test_case(&self, id: &str) -> bool {
    let mut problems = self.problems.write().await;
    for p in problems.values_mut() {
      if let Some(pos) = p.test_cases.iter().position(|tc| tc.id == id) {
        p.test_cases.remove(pos);
        return true;
      }
    }
    false
  }

  /// Ordered test cases of one problem. None when the problem is unknown.
  pub async fn test_cases_for_problem(&self, problem_id: &str) -> Option<Vec<TestCase>> {
    self.problems.read().await.get(problem_id).map(|p| p.test_cases.clone())
  }

  pub async fn insert_contest(&self, c: Contest) {
    self.contests.write().await.insert(c.id.clone(), c);
  }

  pub async fn get_contest(&self, id: &str) -> Option<Contest> {
    self.contests.read().await.get(id).cloned()
  }

  /// Remove a contest together with its registrations.
  #[instrument(level = "debug", skip(self))]
  pub async fn delete_contest(&self, id: &str) -> bool {
    if self.contests.write().await.remove(id).is_none() {
      return false;
    }
    self.registrations.write().await.retain(|_, r| r.contest_id != id);
    true
  }

  /// Contests sorted by start time, latest first.
  pub async fn list_contests(&self) -> Vec<Contest> {
    let mut all: Vec<Contest> = self.contests.read().await.values().cloned().collect();
    all.sort_by(|a, b| b.start_time.cmp(&a.start_time));
    all
  }

  /// Recompute every contest's status for instant `now`. Returns how many changed.
  pub async fn refresh_contest_statuses(&self, now: chrono::DateTime<Utc>) -> usize {
    let mut contests = self.contests.write().await;
    let mut changed = 0;
    for c in contests.values_mut() {
      let status = ContestStatus::at(c.start_time, c.end_time, now);
      if status != c.status {
        c.status = status;
        changed += 1;
      }
    }
    changed
  }

  #[instrument(level = "debug", skip(self))]
  pub async fn register(&self, user_id: &str, contest_id: &str) -> RegisterOutcome {
    if !self.contests.read().await.contains_key(contest_id) {
      return RegisterOutcome::UnknownContest;
    }
    let mut regs = self.registrations.write().await;
    if regs.values().any(|r| r.user_id == user_id && r.contest_id == contest_id) {
      return RegisterOutcome::AlreadyRegistered;
    }
    let reg = ContestRegistration {
      id: Uuid::new_v4().to_string(),
      user_id: user_id.to_string(),
      contest_id: contest_id.to_string(),
      created_at: Utc::now(),
    };
    regs.insert(reg.id.clone(), reg.clone());
    RegisterOutcome::Registered(reg)
  }

  /// Delete a registration owned by `user_id`. Returns false if absent or owned by someone else.
  pub async fn unregister(&self, user_id: &str, registration_id: &str) -> bool {
    let mut regs = self.registrations.write().await;
    match regs.get(registration_id) {
      Some(r) if r.user_id == user_id => {
        regs.remove(registration_id);
        true
      }
      _ => false,
    }
  }

  pub async fn insert_submission(&self, s: Submission) {
    self.submissions.write().await.insert(s.id.clone(), s);
  }

  pub async fn get_submission(&self, id: &str) -> Option<Submission> {
    self.submissions.read().await.get(id).cloned()
  }

  /// A user's submissions, newest first.
  pub async fn submissions_for_user(&self, user_id: &str) -> Vec<Submission> {
    let mut mine: Vec<Submission> = self
      .submissions
      .read()
      .await
      .values()
      .filter(|s| s.user_id == user_id)
      .cloned()
      .collect();
    mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    mine
  }

  /// Distinct problems the user submitted to, bucketed by difficulty.
  /// Submissions to since-deleted problems are not counted.
  pub async fn solved_counts(&self, user_id: &str) -> SolvedCounts {
    let submitted: HashSet<String> = self
      .submissions
      .read()
      .await
      .values()
      .filter(|s| s.user_id == user_id)
      .map(|s| s.problem_id.clone())
      .collect();
    let problems = self.problems.read().await;
    let mut counts = SolvedCounts::default();
    for p in submitted.iter().filter_map(|id| problems.get(id)) {
      match p.difficulty {
        Difficulty::Easy => counts.easy += 1,
        Difficulty::Medium => counts.medium += 1,
        Difficulty::Hard => counts.hard += 1,
      }
    }
    counts
  }

  /// The user's latest `limit` submissions, newest first, with their problem.
  pub async fn recent_activity(&self, user_id: &str, limit: usize) -> Vec<Activity> {
    let recent: Vec<Submission> = self.submissions_for_user(user_id).await.into_iter().take(limit).collect();
    let problems = self.problems.read().await;
    recent
      .into_iter()
      .map(|submission| Activity {
        problem: problems.get(&submission.problem_id).map(|p| ProblemSummary {
          id: p.id.clone(),
          title: p.title.clone(),
          difficulty: p.difficulty,
        }),
        submission,
      })
      .collect()
  }
}

#[async_trait]
impl ProblemSource for Store {
  async fn find_problem_with_test_cases(&self, id: &str) -> Option<Problem> {
    self.get_problem(id).await
  }
}

#[derive(Clone)]
pub struct AppState {
  pub store: Arc<Store>,
  pub evaluator: Evaluator,
}

impl AppState {
  /// Build state from config: seed stores, build the executor and the AI judge client.
  #[instrument(level = "info", skip_all)]
  pub async fn new(config: AppConfig) -> Self {
    let store = Arc::new(Store::default());

    for pc in &config.problems {
      match problem_from_cfg(pc) {
        Some(p) => store.insert_problem(p).await,
        None => error!(target: "devforces", title = %pc.title, difficulty = %pc.difficulty, "Skipping bank problem: unknown difficulty"),
      }
    }
    for p in seed_problems() {
      if store.get_problem(&p.id).await.is_none() {
        store.insert_problem(p).await;
      }
    }
    for cc in &config.contests {
      match contest_from_cfg(cc) {
        Some(c) => store.insert_contest(c).await,
        None => error!(target: "devforces", name = %cc.name, "Skipping bank contest: end time must follow start time and duration be positive"),
      }
    }
    if config.contests.is_empty() {
      for c in seed_contests() {
        store.insert_contest(c).await;
      }
    }

    let problems = store.list_problems().await;
    let empty = problems.iter().filter(|p| p.test_cases.is_empty()).count();
    info!(target: "devforces", problems = problems.len(), without_test_cases = empty, contests = store.list_contests().await.len(), "Startup inventory");
    if empty > 0 {
      warn!(target: "devforces", count = empty, "Some problems have no test cases; their test score will always be 0");
    }

    // Build the AI judge client (requires JUDGE_API_KEY).
    let judge: Result<Arc<dyn Judge>, String> = match JudgeClient::from_settings(&config.judge, config.prompts.clone()) {
      Ok(client) => {
        info!(target: "devforces", base_url = %client.base_url, models = ?client.models, "AI judge enabled.");
        Ok(Arc::new(client))
      }
      Err(e) => {
        error!(target: "devforces", error = %e, "AI judge disabled; submissions will be rejected until it is configured");
        Err(e.to_string())
      }
    };

    let evaluator = Evaluator::new(
      store.clone(),
      Arc::new(LocalExecutor::new(config.executor.clone())),
      judge,
      config.evaluation.judge_failure_policy,
      Duration::from_secs(config.evaluation.deadline_secs),
    );
    info!(target: "devforces", policy = ?config.evaluation.judge_failure_policy, timeout_ms = config.executor.timeout_ms, "Evaluator ready");

    Self { store, evaluator }
  }
}

fn problem_from_cfg(pc: &ProblemCfg) -> Option<Problem> {
  Some(Problem {
    id: pc.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string()),
    title: pc.title.clone(),
    description: pc.description.clone(),
    difficulty: pc.difficulty()?,
    technologies: pc.technologies.clone(),
    task_type: pc.task_type.clone(),
    starter_code: pc.starter_code.clone(),
    tags: pc.tags.clone(),
    test_cases: pc.test_cases.iter().cloned().map(Into::into).collect(),
  })
}

fn contest_from_cfg(cc: &ContestCfg) -> Option<Contest> {
  if cc.end_time <= cc.start_time || cc.duration == 0 {
    return None;
  }
  Some(Contest {
    id: cc.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string()),
    name: cc.name.clone(),
    description: cc.description.clone(),
    start_time: cc.start_time,
    end_time: cc.end_time,
    duration: cc.duration,
    is_public: cc.is_public.unwrap_or(true),
    status: ContestStatus::at(cc.start_time, cc.end_time, Utc::now()),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration as ChronoDuration;

  fn contest(id: &str, start_in_min: i64) -> Contest {
    let start = Utc::now() + ChronoDuration::minutes(start_in_min);
    Contest {
      id: id.into(),
      name: id.into(),
      description: None,
      start_time: start,
      end_time: start + ChronoDuration::minutes(60),
      duration: 60,
      is_public: true,
      status: ContestStatus::Upcoming,
    }
  }

  #[tokio::test]
  async fn state_without_api_key_still_serves_problems() {
    let state = AppState::new(AppConfig::default()).await;
    let problems = state.store.list_problems().await;
    assert_eq!(problems[0].id, "sum-two-numbers");
    assert!(state.store.find_problem_with_test_cases("reverse-words").await.is_some());
  }

  #[tokio::test]
  async fn bank_problem_wins_over_seed_with_same_id() {
    let cfg: AppConfig = toml::from_str(
      r#"
        [[problems]]
        id = "sum-two-numbers"
        title = "Custom Sum"
        difficulty = "HARD"
      "#,
    )
    .unwrap();
    let state = AppState::new(cfg).await;
    let p = state.store.get_problem("sum-two-numbers").await.unwrap();
    assert_eq!(p.title, "Custom Sum");
    assert_eq!(state.store.list_problems().await.iter().filter(|p| p.id == "sum-two-numbers").count(), 1);
  }

  #[tokio::test]
  async fn registration_is_unique_per_user_and_contest() {
    let store = Store::default();
    store.insert_contest(contest("c1", 10)).await;
    let reg = match store.register("u1", "c1").await {
      RegisterOutcome::Registered(r) => r,
      other => panic!("unexpected {other:?}"),
    };
    assert!(matches!(store.register("u1", "c1").await, RegisterOutcome::AlreadyRegistered));
    assert!(matches!(store.register("u2", "c1").await, RegisterOutcome::Registered(_)));
    assert!(matches!(store.register("u1", "nope").await, RegisterOutcome::UnknownContest));
    assert!(!store.unregister("u2", &reg.id).await);
    assert!(store.unregister("u1", &reg.id).await);
    assert!(matches!(store.register("u1", "c1").await, RegisterOutcome::Registered(_)));
  }

  #[tokio::test]
  async fn refresh_moves_contests_through_their_lifecycle() {
    let store = Store::default();
    store.insert_contest(contest("future", 30)).await;
    store.insert_contest(contest("running", -30)).await;
    store.insert_contest(contest("done", -120)).await;
    let changed = store.refresh_contest_statuses(Utc::now()).await;
    assert_eq!(changed, 2);
    assert_eq!(store.get_contest("future").await.unwrap().status, ContestStatus::Upcoming);
    assert_eq!(store.get_contest("running").await.unwrap().status, ContestStatus::Live);
    assert_eq!(store.get_contest("done").await.unwrap().status, ContestStatus::Completed);
    assert_eq!(store.refresh_contest_statuses(Utc::now()).await, 0);
  }

  fn submission(user: &str, problem: &str, minutes_ago: i64) -> Submission {
    Submission {
      id: Uuid::new_v4().to_string(),
      user_id: user.into(),
      problem_id: problem.into(),
      contest_id: None,
      language: "python".into(),
      code: "print(1)".into(),
      points: 5,
      created_at: Utc::now() - ChronoDuration::minutes(minutes_ago),
    }
  }

  async fn seeded() -> Store {
    let store = Store::default();
    for p in seed_problems() {
      store.insert_problem(p).await;
    }
    store
  }

  #[tokio::test]
  async fn stored_test_cases_get_distinct_ids() {
    let store = seeded().await;
    let all = store.all_test_cases().await;
    let ids: HashSet<&str> = all.iter().map(|(_, tc)| tc.id.as_str()).collect();
    assert_eq!(ids.len(), all.len());
    assert!(all.iter().all(|(_, tc)| !tc.id.is_empty()));
    assert_eq!(all[0].0, "sum-two-numbers");
  }

  #[tokio::test]
  async fn test_case_lifecycle_keeps_problem_order() {
    let store = seeded().await;
    let before = store.test_cases_for_problem("sum-two-numbers").await.unwrap();
    let added = store
      .add_test_case("sum-two-numbers", TestCase { id: String::new(), input: "7 8".into(), expected_output: "15".into(), is_public: false, explanation: None })
      .await
      .unwrap();
    assert!(store.add_test_case("ghost", added.clone()).await.is_none());

    let (pid, found) = store.find_test_case(&added.id).await.unwrap();
    assert_eq!(pid, "sum-two-numbers");
    assert_eq!(found.expected_output, "15");

    let (_, edited) = store.update_test_case(&before[0].id, |tc| tc.expected_output = "4".into()).await.unwrap();
    assert_eq!(edited.expected_output, "4");
    let cases = store.test_cases_for_problem("sum-two-numbers").await.unwrap();
    assert_eq!(cases.len(), before.len() + 1);
    assert_eq!(cases[0].expected_output, "4");
    assert_eq!(cases.last().unwrap().id, added.id);

    assert!(store.delete_test_case(&added.id).await);
    assert!(!store.delete_test_case(&added.id).await);
    assert!(store.update_test_case(&added.id, |_| {}).await.is_none());
    assert!(store.test_cases_for_problem("ghost").await.is_none());
  }

  #[tokio::test]
  async fn deleting_a_problem_drops_its_submissions() {
    let store = seeded().await;
    store.insert_submission(submission("u1", "sum-two-numbers", 1)).await;
    store.insert_submission(submission("u2", "sum-two-numbers", 2)).await;
    store.insert_submission(submission("u1", "reverse-words", 3)).await;
    assert_eq!(store.delete_problem("sum-two-numbers").await, Some(2));
    assert_eq!(store.delete_problem("sum-two-numbers").await, None);
    assert!(store.list_problems().await.iter().all(|p| p.id != "sum-two-numbers"));
    assert_eq!(store.submissions_for_user("u1").await.len(), 1);
  }

  #[tokio::test]
  async fn deleting_a_contest_drops_its_registrations() {
    let store = Store::default();
    store.insert_contest(contest("c1", 10)).await;
    let RegisterOutcome::Registered(reg) = store.register("u1", "c1").await else { panic!("not registered") };
    assert!(store.delete_contest("c1").await);
    assert!(!store.delete_contest("c1").await);
    assert!(!store.unregister("u1", &reg.id).await);
  }

  #[tokio::test]
  async fn progress_counts_distinct_problems_per_difficulty() {
    let store = seeded().await;
    store.insert_submission(submission("u1", "sum-two-numbers", 5)).await;
    store.insert_submission(submission("u1", "sum-two-numbers", 4)).await;
    store.insert_submission(submission("u1", "reverse-words", 3)).await;
    store.insert_submission(submission("u1", "ecommerce-checkout", 2)).await;
    store.insert_submission(submission("u2", "task-management-api", 1)).await;
    let counts = store.solved_counts("u1").await;
    let expected = seed_problems()
      .iter()
      .filter(|p| ["sum-two-numbers", "reverse-words", "ecommerce-checkout"].contains(&p.id.as_str()))
      .fold(SolvedCounts::default(), |mut c, p| {
        match p.difficulty {
          Difficulty::Easy => c.easy += 1,
          Difficulty::Medium => c.medium += 1,
          Difficulty::Hard => c.hard += 1,
        }
        c
      });
    assert_eq!(counts, expected);
    assert_eq!(counts.total(), 3);
    assert_eq!(store.solved_counts("nobody").await.total(), 0);
  }

  #[tokio::test]
  async fn recent_activity_is_newest_first_and_capped() {
    let store = seeded().await;
    for i in 0..12 {
      store.insert_submission(submission("u1", "reverse-words", 100 - i)).await;
    }
    store.insert_submission(submission("u1", "deleted-problem", 0)).await;
    let recent = store.recent_activity("u1", 10).await;
    assert_eq!(recent.len(), 10);
    assert!(recent[0].problem.is_none());
    assert_eq!(recent[1].problem.as_ref().unwrap().title, store.get_problem("reverse-words").await.unwrap().title);
    assert!(recent.windows(2).all(|w| w[0].submission.created_at >= w[1].submission.created_at));
  }

  #[test]
  fn invalid_bank_contest_is_rejected() {
    let now = Utc::now();
    let cc = ContestCfg {
      id: None,
      name: "bad".into(),
      description: None,
      start_time: now,
      end_time: now,
      duration: 60,
      is_public: None,
    };
    assert!(contest_from_cfg(&cc).is_none());
  }
}
