//! Built-in problems and contests so the service is useful without a TOML bank.

use chrono::{Duration, Utc};

use crate::domain::{Contest, ContestStatus, Difficulty, Problem, TestCase};

fn tc(input: &str, expected: &str, is_public: bool, explanation: Option<&str>) -> TestCase {
  TestCase {
    id: String::new(),
    input: input.into(),
    expected_output: expected.into(),
    is_public,
    explanation: explanation.map(String::from),
  }
}

/// Minimal set of built-in problems: two runnable algorithm tasks and two backend design tasks.
pub fn seed_problems() -> Vec<Problem> {
  vec![
    Problem {
      id: "sum-two-numbers".into(),
      title: "Sum of Two Numbers".into(),
      description: "Read two integers separated by a space from standard input and print their sum.".into(),
      difficulty: Difficulty::Easy,
      technologies: vec!["javascript".into()],
      task_type: Some("ALGORITHM".into()),
      starter_code: Some("const [a, b] = require('fs').readFileSync(0, 'utf8').trim().split(' ').map(Number);\n".into()),
      tags: vec!["math".into()],
      test_cases: vec![
        tc("1 2", "3", true, Some("1 + 2 = 3")),
        tc("-5 5", "0", true, None),
        tc("1000000 2000000", "3000000", false, None),
      ],
    },
    Problem {
      id: "reverse-words".into(),
      title: "Reverse Words".into(),
      description: "Read one line of words separated by single spaces and print the words in reverse order.".into(),
      difficulty: Difficulty::Medium,
      technologies: vec![],
      task_type: Some("ALGORITHM".into()),
      starter_code: None,
      tags: vec!["strings".into()],
      test_cases: vec![
        tc("hello world", "world hello", true, None),
        tc("a b c d", "d c b a", false, None),
        tc("single", "single", false, Some("One word stays as is")),
      ],
    },
    Problem {
      id: "task-management-api".into(),
      title: "REST API for Task Management".into(),
      description: "Build an Express router exposing CRUD endpoints for tasks with pagination on the list endpoint.".into(),
      difficulty: Difficulty::Medium,
      technologies: vec!["node".into(), "express".into()],
      task_type: Some("BACKEND".into()),
      starter_code: Some("// Scaffold with Express router\n".into()),
      tags: vec!["rest".into(), "express".into()],
      test_cases: vec![
        tc("POST /tasks {title:'Test'}", "201 Created", true, None),
        tc("GET /tasks", "200 OK with list", true, None),
        tc("GET /tasks?page=2", "Paginated list", false, None),
      ],
    },
    Problem {
      id: "ecommerce-checkout".into(),
      title: "E-Commerce Checkout System".into(),
      description: "Design schemas for users, products and orders and implement a checkout flow that creates a payment session.".into(),
      difficulty: Difficulty::Hard,
      technologies: vec!["node".into(), "mongoose".into(), "stripe".into()],
      task_type: Some("BACKEND".into()),
      starter_code: Some("const orderSchema = new mongoose.Schema({ /* TODO */ })\n".into()),
      tags: vec!["schema-design".into(), "payments".into()],
      test_cases: vec![
        tc("POST /checkout {cart}", "Stripe session created", true, None),
        tc("POST /order {cart}", "Order saved", false, None),
        tc("GET /orders", "List of orders", false, None),
      ],
    },
  ]
}

/// One upcoming contest relative to startup time.
pub fn seed_contests() -> Vec<Contest> {
  let start = Utc::now() + Duration::days(1);
  vec![Contest {
    id: "weekly-1".into(),
    name: "Weekly Contest 1".into(),
    description: Some("Warm-up round.".into()),
    start_time: start,
    end_time: start + Duration::minutes(90),
    duration: 90,
    is_public: true,
    status: ContestStatus::Upcoming,
  }]
}
