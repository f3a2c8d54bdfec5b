//! Service configuration: TOML file (judge, executor, evaluation, prompts, optional
//! problem/contest bank) plus environment overrides.
//!
//! See `AppConfig` for the expected schema. Every section is optional.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::domain::{Difficulty, TestCase};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub judge: JudgeSettings,
  #[serde(default)]
  pub executor: ExecutorSettings,
  #[serde(default)]
  pub evaluation: EvaluationSettings,
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub problems: Vec<ProblemCfg>,
  #[serde(default)]
  pub contests: Vec<ContestCfg>,
}

/// AI judge endpoint and the ordered model cascade.
/// The API key is only ever read from the environment.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct JudgeSettings {
  pub base_url: String,
  pub models: Vec<String>,
  pub timeout_secs: u64,
  pub temperature: f32,
  pub max_tokens: u32,
  #[serde(skip)]
  pub api_key: Option<String>,
}

impl Default for JudgeSettings {
  fn default() -> Self {
    Self {
      base_url: "https://openrouter.ai/api/v1".into(),
      models: vec![
        "deepseek/deepseek-chat-v3.1:free".into(),
        "meta-llama/llama-3.3-70b-instruct:free".into(),
        "mistralai/mistral-7b-instruct:free".into(),
      ],
      timeout_secs: 30,
      temperature: 0.2,
      max_tokens: 800,
      api_key: None,
    }
  }
}

/// Local runner limits. A zero `memory_limit_mb` or `max_processes` disables that limit.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
  pub timeout_ms: u64,
  pub max_output_bytes: usize,
  /// Address-space cap per process (RLIMIT_AS).
  pub memory_limit_mb: u64,
  /// RLIMIT_NPROC. Counts every process of the runner's user and is not enforced for root.
  pub max_processes: u64,
  pub node_bin: String,
  pub python_bin: String,
}

impl Default for ExecutorSettings {
  fn default() -> Self {
    Self {
      timeout_ms: 5000,
      max_output_bytes: 64 * 1024,
      memory_limit_mb: 4096,
      max_processes: 256,
      node_bin: "node".into(),
      python_bin: "python3".into(),
    }
  }
}

/// What to do when every model in the judge cascade failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeFailurePolicy {
  /// Abort the evaluation; no score is produced or persisted.
  Fail,
  /// Score from test cases only (aiScore = 0) and flag the judge as unavailable.
  Degrade,
}

impl JudgeFailurePolicy {
  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "fail" => Some(JudgeFailurePolicy::Fail),
      "degrade" => Some(JudgeFailurePolicy::Degrade),
      _ => None,
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EvaluationSettings {
  /// Outer deadline for one evaluation, covering execution and judging.
  pub deadline_secs: u64,
  pub judge_failure_policy: JudgeFailurePolicy,
}

impl Default for EvaluationSettings {
  fn default() -> Self {
    Self { deadline_secs: 120, judge_failure_policy: JudgeFailurePolicy::Fail }
  }
}

/// Prompt template for the AI judge. Placeholders: {title}, {description},
/// {difficulty}, {language}, {technologies}, {test_cases}, {total}, {passed},
/// {failed}, {max_score}, {code}.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub judge_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self { judge_template: DEFAULT_JUDGE_TEMPLATE.into() }
  }
}

const DEFAULT_JUDGE_TEMPLATE: &str = r#"You are a strict coding contest judge.

Problem: {title}
Difficulty: {difficulty}
Language: {language}
Required technologies: {technologies}

Description:
{description}

Test cases:
{test_cases}

The submission ran {total} test cases. Passed: {passed}, Failed: {failed}.

Submission:
```{language}
{code}
```

Step 1 - Relevance. If the code is unrelated to the problem, empty, or placeholder text
(TODO stubs, copied instructions, prose instead of code), set "isRelevant": false and "aiScore": 0.
Step 2 - Otherwise evaluate correctness, code quality, best practices, test coverage and,
where applicable, schema design.

Return ONLY valid JSON, no markdown:
{
  "syntaxErrors": string|null,
  "logicIssues": string|null,
  "styleSuggestions": string|null,
  "aiScore": integer (0-{max_score}),
  "isRelevant": boolean
}"#;

/// Problem entry accepted in the TOML bank.
#[derive(Clone, Debug, Deserialize)]
pub struct ProblemCfg {
  #[serde(default)] pub id: Option<String>,
  pub title: String,
  #[serde(default)] pub description: String,
  pub difficulty: String,
  #[serde(default)] pub technologies: Vec<String>,
  #[serde(default)] pub task_type: Option<String>,
  #[serde(default)] pub starter_code: Option<String>,
  #[serde(default)] pub tags: Vec<String>,
  #[serde(default)] pub test_cases: Vec<TestCaseCfg>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TestCaseCfg {
  pub input: String,
  pub expected_output: String,
  #[serde(default)] pub is_public: bool,
  #[serde(default)] pub explanation: Option<String>,
}

impl From<TestCaseCfg> for TestCase {
  fn from(tc: TestCaseCfg) -> Self {
    TestCase {
      id: String::new(),
      input: tc.input,
      expected_output: tc.expected_output,
      is_public: tc.is_public,
      explanation: tc.explanation,
    }
  }
}

impl ProblemCfg {
  pub fn difficulty(&self) -> Option<Difficulty> {
    Difficulty::parse(&self.difficulty)
  }
}

/// Contest entry accepted in the TOML bank. Timestamps are RFC 3339 strings.
#[derive(Clone, Debug, Deserialize)]
pub struct ContestCfg {
  #[serde(default)] pub id: Option<String>,
  pub name: String,
  #[serde(default)] pub description: Option<String>,
  pub start_time: DateTime<Utc>,
  pub end_time: DateTime<Utc>,
  pub duration: u32,
  #[serde(default)] pub is_public: Option<bool>,
}

impl AppConfig {
  /// Load the TOML file named by DEVFORCES_CONFIG_PATH (if any), then apply env overrides.
  pub fn load() -> Self {
    let mut cfg = load_config_from_env().unwrap_or_default();
    cfg.apply_env(|k| std::env::var(k).ok());
    cfg
  }

  /// Apply environment overrides through `get`, so tests can inject a fake environment.
  pub fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, get: F) {
    self.judge.api_key = get("JUDGE_API_KEY").filter(|k| !k.trim().is_empty());
    if let Some(url) = get("JUDGE_BASE_URL") {
      self.judge.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(models) = get("JUDGE_MODELS") {
      let list: Vec<String> = models
        .split(',')
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .collect();
      if list.is_empty() {
        warn!(target: "devforces", "JUDGE_MODELS is empty; keeping configured models");
      } else {
        self.judge.models = list;
      }
    }
    if let Some(secs) = get("JUDGE_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
      self.judge.timeout_secs = secs;
    }
    if let Some(ms) = get("EXECUTION_TIMEOUT_MS").and_then(|s| s.parse().ok()) {
      self.executor.timeout_ms = ms;
    }
    if let Some(raw) = get("JUDGE_FAILURE_POLICY") {
      match JudgeFailurePolicy::parse(&raw) {
        Some(p) => self.evaluation.judge_failure_policy = p,
        None => warn!(target: "devforces", value = %raw, "Unknown JUDGE_FAILURE_POLICY; expected 'fail' or 'degrade'"),
      }
    }
  }
}

/// Attempt to load `AppConfig` from DEVFORCES_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_config_from_env() -> Option<AppConfig> {
  let path = std::env::var("DEVFORCES_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AppConfig>(&s) {
      Ok(cfg) => {
        info!(target: "devforces", %path, "Loaded service config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "devforces", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "devforces", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  #[test]
  fn toml_sections_override_defaults() {
    let cfg: AppConfig = toml::from_str(
      r#"
        [judge]
        models = ["a/one", "b/two"]

        [evaluation]
        judge_failure_policy = "degrade"

        [[problems]]
        title = "Sum"
        difficulty = "easy"
        [[problems.test_cases]]
        input = "1 2"
        expected_output = "3"
        is_public = true
      "#,
    ).unwrap();
    assert_eq!(cfg.judge.models, vec!["a/one", "b/two"]);
    assert_eq!(cfg.judge.timeout_secs, 30);
    assert_eq!(cfg.evaluation.judge_failure_policy, JudgeFailurePolicy::Degrade);
    assert_eq!(cfg.executor.timeout_ms, 5000);
    assert_eq!(cfg.executor.memory_limit_mb, 4096);
    assert_eq!(cfg.problems[0].difficulty(), Some(Difficulty::Easy));
    assert_eq!(cfg.problems[0].test_cases.len(), 1);
  }

  #[test]
  fn contest_bank_reads_quoted_timestamps() {
    let cfg: AppConfig = toml::from_str(
      r#"
        [[contests]]
        name = "Weekly 1"
        start_time = "2026-01-01T10:00:00Z"
        end_time = "2026-01-01T12:00:00Z"
        duration = 120
      "#,
    ).unwrap();
    assert_eq!(cfg.contests[0].duration, 120);
    assert!(cfg.contests[0].end_time > cfg.contests[0].start_time);
  }

  #[test]
  fn env_overrides_apply() {
    let env: HashMap<&str, &str> = HashMap::from([
      ("JUDGE_API_KEY", "sk-test"),
      ("JUDGE_BASE_URL", "http://localhost:9999/v1/"),
      ("JUDGE_MODELS", "m1, m2,,"),
      ("EXECUTION_TIMEOUT_MS", "750"),
      ("JUDGE_FAILURE_POLICY", "DEGRADE"),
    ]);
    let mut cfg = AppConfig::default();
    cfg.apply_env(|k| env.get(k).map(|v| v.to_string()));
    assert_eq!(cfg.judge.api_key.as_deref(), Some("sk-test"));
    assert_eq!(cfg.judge.base_url, "http://localhost:9999/v1");
    assert_eq!(cfg.judge.models, vec!["m1", "m2"]);
    assert_eq!(cfg.executor.timeout_ms, 750);
    assert_eq!(cfg.evaluation.judge_failure_policy, JudgeFailurePolicy::Degrade);
  }

  #[test]
  fn blank_api_key_counts_as_missing() {
    let mut cfg = AppConfig::default();
    cfg.apply_env(|k| (k == "JUDGE_API_KEY").then(|| "   ".to_string()));
    assert!(cfg.judge.api_key.is_none());
  }

  #[test]
  fn default_template_names_every_verdict_field() {
    let t = Prompts::default().judge_template;
    for field in ["syntaxErrors", "logicIssues", "styleSuggestions", "aiScore", "isRelevant"] {
      assert!(t.contains(field), "missing {field}");
    }
  }
}
