//! Score blending: deterministic pass rate and AI verdict folded into one bounded score.
//!
//! All functions are pure. Weights are fixed: 70% test cases, 30% AI review.

const TEST_WEIGHT: f64 = 0.7;
const AI_WEIGHT: f64 = 0.3;
/// Share of the band awarded when the judge reply could not be parsed.
const HEURISTIC_SHARE: f64 = 0.3;

/// The three scores of one evaluation, each within `[0, max_score]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScoreTriple {
  pub test_score: u32,
  pub ai_score: u32,
  pub final_score: u32,
  pub max_score: u32,
}

pub fn clamp_score(score: i64, max_score: u32) -> u32 {
  score.clamp(0, max_score as i64) as u32
}

/// `round(passed / total × max)`. Zero test cases score 0; callers flag that case.
pub fn test_score(passed: usize, total: usize, max_score: u32) -> u32 {
  if total == 0 {
    return 0;
  }
  let raw = (passed as f64 / total as f64 * max_score as f64).round();
  clamp_score(raw as i64, max_score)
}

/// `round(test × 0.7 + ai × 0.3)`, rounding half away from zero.
pub fn final_score(test_score: u32, ai_score: u32, max_score: u32) -> u32 {
  let raw = (test_score as f64 * TEST_WEIGHT + ai_score as f64 * AI_WEIGHT).round();
  clamp_score(raw as i64, max_score)
}

/// Fallback AI score when the verdict is unreadable: `floor(max × 0.3)`.
pub fn heuristic_ai_score(max_score: u32) -> u32 {
  (max_score as f64 * HEURISTIC_SHARE).floor() as u32
}

/// Clamp inputs and compute the full triple.
pub fn blend(passed: usize, total: usize, ai_score: u32, max_score: u32) -> ScoreTriple {
  let test_score = test_score(passed.min(total), total, max_score);
  let ai_score = ai_score.min(max_score);
  ScoreTriple {
    test_score,
    ai_score,
    final_score: final_score(test_score, ai_score, max_score),
    max_score,
  }
}
