use once_cell::sync::Lazy;
use regex::Regex;

static SENSITIVE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
  // ASCII boundaries: Hangul must not count as a word character.
  [ r"(?-u:\b)[0-9]{3}-[0-9]{2}-[0-9]{4}(?-u:\b)"                   // SSN
  , r"(?-u:\b)[0-9]{13,16}(?-u:\b)"                                 // card number
  , r"(?i)(?-u:\b)[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}(?-u:\b)"  // e-mail
  , r"(?i)비밀번호|password|secret|토큰|token"
  , r"주민등록|사번|계좌"
  ]
  .iter()
  .map(|p| Regex::new(p).expect("sensitive-data pattern compiles"))
  .collect()
});

/// Cheap pattern check for personal data and secrets.
pub fn contains_sensitive_data(text: &str) -> bool
{   SENSITIVE_PATTERNS.iter().any(|re| re.is_match(text))
}
