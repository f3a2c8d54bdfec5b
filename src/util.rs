//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// Braces that do not name a provided key are left untouched.
/// Single pass: substituted values are never scanned for placeholders again.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = String::with_capacity(tpl.len());
  let mut rest = tpl;
  while let Some(open) = rest.find('{') {
    out.push_str(&rest[..open]);
    let after = &rest[open + 1..];
    let value = after
      .find('}')
      .and_then(|close| pairs.iter().find(|(k, _)| *k == &after[..close]).map(|(_, v)| (close, *v)));
    match value {
      Some((close, v)) => {
        out.push_str(v);
        rest = &after[close + 1..];
      }
      None => {
        out.push('{');
        rest = after;
      }
    }
  }
  out.push_str(rest);
  out
}

/// Strip an optional markdown code fence (```json ... ``` or ``` ... ```) around a model reply.
pub fn strip_code_fences(raw: &str) -> &str {
  let s = raw.trim();
  let Some(rest) = s.strip_prefix("```") else { return s };
  // Drop the info string ("json", "JSON", ...) up to the first newline,
  // or just the leading word when the reply sits on the fence line.
  let body = match rest.find('\n') {
    Some(nl) => &rest[nl + 1..],
    None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
  };
  body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) { cut -= 1; }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fill_template_leaves_unknown_braces() {
    let out = fill_template("{a} + {b} = {\"c\": 1}", &[("a", "1"), ("b", "2")]);
    assert_eq!(out, "1 + 2 = {\"c\": 1}");
  }

  #[test]
  fn fill_template_does_not_expand_inside_values() {
    let out = fill_template(
      "Problem: {description}\nCode: {code}",
      &[("description", "print {code} twice"), ("code", "print(1)")],
    );
    assert_eq!(out, "Problem: print {code} twice\nCode: print(1)");
  }

  #[test]
  fn fill_template_handles_stray_braces() {
    assert_eq!(fill_template("{{a}} {", &[("a", "x")]), "{x} {");
    assert_eq!(fill_template("}{a", &[("a", "x")]), "}{a");
  }

  #[test]
  fn strips_single_line_fence() {
    assert_eq!(strip_code_fences("```json{\"aiScore\":5}```"), "{\"aiScore\":5}");
    assert_eq!(strip_code_fences("```{\"aiScore\":5}```"), "{\"aiScore\":5}");
  }

  #[test]
  fn strips_json_fence() {
    assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
    assert_eq!(strip_code_fences("  ```\n{}\n```  "), "{}");
    assert_eq!(strip_code_fences("{\"raw\":true}"), "{\"raw\":true}");
  }

  #[test]
  fn unterminated_fence_keeps_body() {
    assert_eq!(strip_code_fences("```json\n{\"a\":1}"), "{\"a\":1}");
  }

  #[test]
  fn trunc_respects_char_boundaries() {
    let s = "ééééé";
    let t = trunc_for_log(s, 3);
    assert!(t.starts_with('é'));
    assert!(t.contains("10 bytes total"));
    assert_eq!(trunc_for_log("short", 10), "short");
  }
}
