//! AI judge client: asks a chat-completion service for a qualitative verdict on a submission.
//!
//! Models are tried strictly in order, one request at a time; the first HTTP success wins.
//! A reply that is not valid verdict JSON still counts as a success and is turned into a
//! heuristic verdict, so a chatty model never fails an evaluation.
//!
//! NOTE: We never log the API key or submitted code; only models, latencies and sizes.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::config::{JudgeSettings, Prompts};
use crate::domain::Problem;
use crate::error::{EvalError, JudgeError, ModelFailure};
use crate::scoring::{clamp_score, heuristic_ai_score};
use crate::util::{fill_template, strip_code_fences, trunc_for_log};

/// Everything the judge needs to know about one submission.
#[derive(Clone, Copy, Debug)]
pub struct JudgeRequest<'a> {
  pub problem: &'a Problem,
  pub language: &'a str,
  pub code: &'a str,
  pub passed: usize,
  pub total: usize,
}

/// Normalized verdict. `ai_score` is already clamped and zeroed for irrelevant code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
  pub syntax_errors: Option<String>,
  pub logic_issues: Option<String>,
  pub style_suggestions: Option<String>,
  pub ai_score: u32,
  pub is_relevant: bool,
  /// Set when the verdict was derived heuristically.
  pub note: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JudgeReply {
  /// Model identifier that produced the reply.
  pub model: String,
  pub verdict: Verdict,
}

#[async_trait]
pub trait Judge: Send + Sync {
  async fn judge(&self, req: &JudgeRequest<'_>) -> Result<JudgeReply, JudgeError>;
}

#[derive(Clone)]
pub struct JudgeClient {
  client: reqwest::Client,
  api_key: String,
  pub base_url: String,
  pub models: Vec<String>,
  temperature: f32,
  max_tokens: u32,
  prompts: Prompts,
}

impl JudgeClient {
  /// Build the client. A missing API key or an empty model list is a configuration error.
  pub fn from_settings(settings: &JudgeSettings, prompts: Prompts) -> Result<Self, EvalError> {
    let api_key = settings
      .api_key
      .clone()
      .ok_or_else(|| EvalError::Configuration("JUDGE_API_KEY is not set; the AI judge cannot run".into()))?;
    if settings.models.is_empty() {
      return Err(EvalError::Configuration("no AI judge models configured".into()));
    }
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(settings.timeout_secs))
      .build()
      .map_err(|e| EvalError::Configuration(format!("failed to build HTTP client: {e}")))?;

    Ok(Self {
      client,
      api_key,
      base_url: settings.base_url.trim_end_matches('/').to_string(),
      models: settings.models.clone(),
      temperature: settings.temperature,
      max_tokens: settings.max_tokens,
      prompts,
    })
  }

  /// One chat completion against one model. Err carries a short reason for the cascade log.
  #[instrument(level = "info", skip(self, prompt), fields(model = %model, prompt_len = prompt.len()))]
  async fn chat(&self, model: &str, prompt: &str) -> Result<String, String> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages: vec![ChatMessageReq { role: "user".into(), content: prompt.into() }],
      temperature: self.temperature,
      max_tokens: self.max_tokens,
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, "devforces-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_api_error(&body).unwrap_or_else(|| trunc_for_log(&body, 200));
      return Err(format!("HTTP {}: {}", status, msg));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| format!("unreadable response: {e}"))?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "Judge usage");
    }
    body.choices.into_iter().next()
      .and_then(|c| c.message.content)
      .ok_or_else(|| "response has no message content".to_string())
  }
}

#[async_trait]
impl Judge for JudgeClient {
  #[instrument(level = "info", skip(self, req), fields(problem_id = %req.problem.id, passed = req.passed, total = req.total))]
  async fn judge(&self, req: &JudgeRequest<'_>) -> Result<JudgeReply, JudgeError> {
    let prompt = build_prompt(&self.prompts.judge_template, req);
    let max_score = req.problem.difficulty.max_score();
    let mut failures = Vec::new();

    for model in &self.models {
      let start = Instant::now();
      match self.chat(model, &prompt).await {
        Ok(text) => {
          let verdict = parse_verdict(&text, max_score);
          info!(target: "judge", %model, elapsed = ?start.elapsed(), reply_len = text.len(), ai_score = verdict.ai_score, is_relevant = verdict.is_relevant, heuristic = verdict.note.is_some(), "Judge verdict received");
          return Ok(JudgeReply { model: model.clone(), verdict });
        }
        Err(reason) => {
          warn!(target: "judge", %model, elapsed = ?start.elapsed(), %reason, "Judge model failed; trying next");
          failures.push(ModelFailure { model: model.clone(), reason });
        }
      }
    }

    Err(JudgeError::Unavailable(failures))
  }
}

/// Render the judge prompt for one submission.
pub fn build_prompt(template: &str, req: &JudgeRequest<'_>) -> String {
  let p = req.problem;
  let technologies = if p.technologies.is_empty() { "none specified".to_string() } else { p.technologies.join(", ") };
  let test_cases = p
    .test_cases
    .iter()
    .enumerate()
    .map(|(i, tc)| {
      let mut s = format!("{}. Input: {}\n   Expected: {}", i + 1, tc.input, tc.expected_output);
      if let Some(exp) = tc.explanation.as_deref().filter(|e| !e.trim().is_empty()) {
        s.push_str(&format!("\n   Explanation: {}", exp));
      }
      s
    })
    .collect::<Vec<_>>()
    .join("\n");
  let test_cases = if test_cases.is_empty() { "(none)".to_string() } else { test_cases };

  let total = req.total.to_string();
  let passed = req.passed.to_string();
  let failed = req.total.saturating_sub(req.passed).to_string();
  let max_score = p.difficulty.max_score().to_string();

  fill_template(
    template,
    &[
      ("title", &p.title),
      ("description", &p.description),
      ("difficulty", p.difficulty.as_str()),
      ("language", req.language),
      ("technologies", &technologies),
      ("test_cases", &test_cases),
      ("total", &total),
      ("passed", &passed),
      ("failed", &failed),
      ("max_score", &max_score),
      ("code", req.code),
    ],
  )
}

/// Turn a raw model reply into a verdict bounded by `max_score`.
/// Unparseable replies yield the heuristic score with a note instead of an error.
pub fn parse_verdict(raw: &str, max_score: u32) -> Verdict {
  match raw_verdict(strip_code_fences(raw)) {
    Ok(v) => {
      let is_relevant = v.is_relevant.as_ref().and_then(as_bool).unwrap_or(true);
      let score = v.ai_score.as_ref().and_then(as_number).unwrap_or(0);
      Verdict {
        syntax_errors: v.syntax_errors.as_ref().and_then(as_text),
        logic_issues: v.logic_issues.as_ref().and_then(as_text),
        style_suggestions: v.style_suggestions.as_ref().and_then(as_text),
        ai_score: if is_relevant { clamp_score(score, max_score) } else { 0 },
        is_relevant,
        note: None,
      }
    }
    Err(e) => Verdict {
      syntax_errors: None,
      logic_issues: None,
      style_suggestions: None,
      ai_score: heuristic_ai_score(max_score),
      is_relevant: true,
      note: Some(format!("AI response could not be parsed: {e}")),
    },
  }
}

// serde accepts a positional array for a struct, so only objects count as verdicts.
fn raw_verdict(body: &str) -> Result<RawVerdict, String> {
  match serde_json::from_str::<Value>(body).map_err(|e| e.to_string())? {
    obj @ Value::Object(_) => serde_json::from_value(obj).map_err(|e| e.to_string()),
    _ => Err("expected a JSON object".to_string()),
  }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVerdict {
  #[serde(default)] syntax_errors: Option<Value>,
  #[serde(default)] logic_issues: Option<Value>,
  #[serde(default)] style_suggestions: Option<Value>,
  #[serde(default)] ai_score: Option<Value>,
  #[serde(default)] is_relevant: Option<Value>,
}

fn as_text(v: &Value) -> Option<String> {
  match v {
    Value::Null => None,
    Value::String(s) if s.trim().is_empty() => None,
    Value::String(s) => Some(s.clone()),
    other => Some(other.to_string()),
  }
}

fn as_number(v: &Value) -> Option<i64> {
  let f = match v {
    Value::Number(n) => n.as_f64()?,
    Value::String(s) => s.trim().parse::<f64>().ok()?,
    _ => return None,
  };
  f.is_finite().then(|| f.round() as i64)
}

fn as_bool(v: &Value) -> Option<bool> {
  match v {
    Value::Bool(b) => Some(*b),
    Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
      "true" => Some(true),
      "false" => Some(false),
      _ => None,
    },
    _ => None,
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  max_tokens: u32,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  #[serde(default)] choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from an API error body.
fn extract_api_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Difficulty, TestCase};
  use axum::{extract::State, http::{HeaderMap, StatusCode}, routing::post, Json, Router};
  use std::collections::HashMap;
  use std::sync::{Arc, Mutex};

  #[derive(Clone, Default)]
  struct FakeLlm {
    /// model -> (status, message content or raw body, delay)
    script: Arc<HashMap<String, (u16, String, u64)>>,
    calls: Arc<Mutex<Vec<String>>>,
    last_auth: Arc<Mutex<Option<String>>>,
    last_body: Arc<Mutex<Option<Value>>>,
  }

  async fn completions(State(llm): State<FakeLlm>, headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, String) {
    let model = body["model"].as_str().unwrap_or_default().to_string();
    llm.calls.lock().unwrap().push(model.clone());
    *llm.last_auth.lock().unwrap() = headers.get("authorization").and_then(|v| v.to_str().ok()).map(String::from);
    *llm.last_body.lock().unwrap() = Some(body);
    let (status, content, delay) = llm.script.get(&model).cloned().unwrap_or((404, "unknown model".into(), 0));
    if delay > 0 {
      tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    if status == 200 {
      let envelope = serde_json::json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
      });
      (StatusCode::OK, envelope.to_string())
    } else {
      let err = serde_json::json!({ "error": { "message": content } });
      (StatusCode::from_u16(status).unwrap(), err.to_string())
    }
  }

  async fn spawn_llm(script: &[(&str, u16, &str, u64)]) -> (String, FakeLlm) {
    let llm = FakeLlm {
      script: Arc::new(script.iter().map(|(m, s, c, d)| (m.to_string(), (*s, c.to_string(), *d))).collect()),
      ..FakeLlm::default()
    };
    let app = Router::new().route("/v1/chat/completions", post(completions)).with_state(llm.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    (format!("http://{}/v1", addr), llm)
  }

  fn client(base_url: &str, models: &[&str], timeout_secs: u64) -> JudgeClient {
    let settings = JudgeSettings {
      base_url: base_url.into(),
      models: models.iter().map(|m| m.to_string()).collect(),
      timeout_secs,
      api_key: Some("sk-test".into()),
      ..JudgeSettings::default()
    };
    JudgeClient::from_settings(&settings, Prompts::default()).unwrap()
  }

  fn problem() -> Problem {
    Problem {
      id: "p1".into(),
      title: "Sum Two Numbers".into(),
      description: "Read two integers and print their sum.".into(),
      difficulty: Difficulty::Easy,
      technologies: vec!["javascript".into(), "node".into()],
      task_type: None,
      starter_code: None,
      tags: vec![],
      test_cases: vec![
        TestCase { id: "t1".into(), input: "1 2".into(), expected_output: "3".into(), is_public: true, explanation: Some("1+2".into()) },
        TestCase { id: "t2".into(), input: "5 5".into(), expected_output: "10".into(), is_public: false, explanation: None },
      ],
    }
  }

  fn request(p: &Problem) -> JudgeRequest<'_> {
    JudgeRequest { problem: p, language: "javascript", code: "console.log(3)", passed: 1, total: 2 }
  }

  const GOOD: &str = r#"{"syntaxErrors":null,"logicIssues":"hardcoded output","styleSuggestions":null,"aiScore":12,"isRelevant":true}"#;

  #[tokio::test]
  async fn falls_back_to_next_model_on_http_error() {
    let (url, llm) = spawn_llm(&[("m/a", 500, "boom", 0), ("m/b", 200, GOOD, 0), ("m/c", 200, GOOD, 0)]).await;
    let p = problem();
    let reply = client(&url, &["m/a", "m/b", "m/c"], 5).judge(&request(&p)).await.unwrap();
    assert_eq!(reply.model, "m/b");
    assert_eq!(reply.verdict.ai_score, 12);
    assert_eq!(reply.verdict.logic_issues.as_deref(), Some("hardcoded output"));
    // Strictly sequential, and stops at the first success.
    assert_eq!(*llm.calls.lock().unwrap(), vec!["m/a", "m/b"]);
  }

  #[tokio::test]
  async fn all_models_failing_is_unavailable_with_reasons() {
    let (url, llm) = spawn_llm(&[("m/a", 429, "rate limited", 0), ("m/b", 503, "overloaded", 0)]).await;
    let p = problem();
    let err = client(&url, &["m/a", "m/b"], 5).judge(&request(&p)).await.unwrap_err();
    let JudgeError::Unavailable(failures) = err;
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].model, "m/a");
    assert!(failures[0].reason.contains("429") && failures[0].reason.contains("rate limited"));
    assert!(failures[1].reason.contains("503"));
    assert_eq!(llm.calls.lock().unwrap().len(), 2);
  }

  #[tokio::test]
  async fn unreachable_endpoint_is_unavailable() {
    // Bind then drop to get a port nobody listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let p = problem();
    let err = client(&format!("http://{}/v1", addr), &["m/a"], 2).judge(&request(&p)).await.unwrap_err();
    let JudgeError::Unavailable(failures) = err;
    assert_eq!(failures.len(), 1);
  }

  #[tokio::test]
  async fn slow_model_times_out_and_cascade_continues() {
    let (url, _llm) = spawn_llm(&[("m/slow", 200, GOOD, 2500), ("m/fast", 200, GOOD, 0)]).await;
    let p = problem();
    let reply = client(&url, &["m/slow", "m/fast"], 1).judge(&request(&p)).await.unwrap();
    assert_eq!(reply.model, "m/fast");
  }

  #[tokio::test]
  async fn sends_bearer_key_and_chat_body() {
    let (url, llm) = spawn_llm(&[("m/a", 200, GOOD, 0)]).await;
    let p = problem();
    client(&url, &["m/a"], 5).judge(&request(&p)).await.unwrap();
    assert_eq!(llm.last_auth.lock().unwrap().as_deref(), Some("Bearer sk-test"));
    let body = llm.last_body.lock().unwrap().clone().unwrap();
    assert_eq!(body["model"], "m/a");
    assert_eq!(body["messages"][0]["role"], "user");
    assert!(body["messages"][0]["content"].as_str().unwrap().contains("Sum Two Numbers"));
    assert_eq!(body["max_tokens"], 800);
    assert!(body["temperature"].is_number());
  }

  #[tokio::test]
  async fn malformed_reply_is_a_heuristic_success() {
    let (url, _llm) = spawn_llm(&[("m/a", 200, "I think this code is fine!", 0)]).await;
    let p = problem();
    let reply = client(&url, &["m/a"], 5).judge(&request(&p)).await.unwrap();
    assert_eq!(reply.verdict.ai_score, 6);
    assert!(reply.verdict.note.as_deref().unwrap().starts_with("AI response could not be parsed"));
  }

  #[test]
  fn missing_api_key_is_configuration_error() {
    let err = JudgeClient::from_settings(&JudgeSettings::default(), Prompts::default()).err().unwrap();
    assert!(matches!(err, EvalError::Configuration(_)));
  }

  #[test]
  fn parses_fenced_verdict() {
    let v = parse_verdict(&format!("```json\n{}\n```", GOOD), 20);
    assert_eq!(v.ai_score, 12);
    assert!(v.is_relevant);
    assert!(v.note.is_none());
  }

  #[test]
  fn clamps_out_of_range_and_odd_scores() {
    assert_eq!(parse_verdict(r#"{"aiScore": 150}"#, 60).ai_score, 60);
    assert_eq!(parse_verdict(r#"{"aiScore": -5}"#, 60).ai_score, 0);
    assert_eq!(parse_verdict(r#"{"aiScore": "17"}"#, 60).ai_score, 17);
    assert_eq!(parse_verdict(r#"{"aiScore": 7.6}"#, 60).ai_score, 8);
    assert_eq!(parse_verdict(r#"{"logicIssues": "x"}"#, 60).ai_score, 0);
  }

  #[test]
  fn irrelevant_forces_zero() {
    let v = parse_verdict(r#"{"aiScore": 18, "isRelevant": false}"#, 20);
    assert_eq!(v.ai_score, 0);
    assert!(!v.is_relevant);
    assert_eq!(parse_verdict(r#"{"aiScore": 18, "isRelevant": "false"}"#, 20).ai_score, 0);
  }

  #[test]
  fn heuristic_score_per_tier() {
    for d in [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard] {
      let v = parse_verdict("not json", d.max_score());
      assert_eq!(v.ai_score, d.max_score() * 3 / 10);
      assert!(v.note.is_some());
    }
    // A JSON array is not a verdict either.
    assert!(parse_verdict("[1,2]", 20).note.is_some());
  }

  #[test]
  fn positional_array_is_not_a_verdict() {
    let v = parse_verdict("[null,null,null,20,true]", 20);
    assert_eq!(v.ai_score, 6);
    assert!(v.note.as_deref().unwrap().contains("expected a JSON object"));
    let v = parse_verdict("```json\n[null,\"bad\",null,18,true]\n```", 60);
    assert_eq!(v.ai_score, 18);
    assert!(v.logic_issues.is_none());
    assert!(v.note.is_some());
  }

  #[test]
  fn prompt_carries_problem_context() {
    let p = problem();
    let prompt = build_prompt(&Prompts::default().judge_template, &request(&p));
    assert!(prompt.contains("Problem: Sum Two Numbers"));
    assert!(prompt.contains("Difficulty: EASY"));
    assert!(prompt.contains("Required technologies: javascript, node"));
    assert!(prompt.contains("Explanation: 1+2"));
    assert!(prompt.contains("Passed: 1, Failed: 1"));
    assert!(prompt.contains("aiScore\": integer (0-20)"));
    assert!(prompt.contains("```javascript\nconsole.log(3)\n```"));
    assert!(prompt.contains("\"isRelevant\": false"));
  }
}
