//! Free-text command classification.
//!
//! Rules are matched on the trimmed text, ignoring ASCII case, and the first
//! one that applies wins:
//!
//! | Rule | Job type |
//! |------|----------|
//! | starts with `tweet ` | `twitter-post {content}` |
//! | contains `search` | `twitter-search {query}` |
//! | contains `follow` | `twitter-follow {username?}` |
//! | is exactly `ping` or `test` | `test-job` |
//! | anything else | `scrape {command, url?}` |

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value, json};

use socialhands_workqueue::job_types;

const TWEET_PREFIX: &str = "tweet ";

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s<>"']+"#).expect("valid url regex"))
}

/// Job produced by a command.
#[derive(Debug, Clone, PartialEq)]
pub struct Classified {
    pub job_type: &'static str,
    pub data: Value,
}

/// Classify `text`. `None` for blank input.
pub fn classify(text: &str) -> Option<Classified> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    // ASCII lowering keeps byte offsets aligned with `text`.
    let lower = text.to_ascii_lowercase();

    if lower.starts_with(TWEET_PREFIX) {
        return Some(Classified {
            job_type: job_types::TWITTER_POST,
            data: json!({ "content": text[TWEET_PREFIX.len()..].trim() }),
        });
    }

    if let Some(pos) = lower.find("search") {
        let rest = text[pos + "search".len()..].trim();
        let rest = strip_prefix_ignore_case(rest, "for ").unwrap_or(rest).trim();
        let query = if rest.is_empty() { text } else { rest };
        return Some(Classified {
            job_type: job_types::TWITTER_SEARCH,
            data: json!({ "query": query }),
        });
    }

    if let Some(pos) = lower.find("follow") {
        let mut data = Map::new();
        if let Some(username) = follow_target(text, pos) {
            data.insert("username".to_string(), Value::String(username));
        }
        return Some(Classified {
            job_type: job_types::TWITTER_FOLLOW,
            data: Value::Object(data),
        });
    }

    if lower == "ping" || lower == "test" {
        return Some(Classified {
            job_type: job_types::TEST_JOB,
            data: json!({ "command": text }),
        });
    }

    let mut data = Map::new();
    data.insert("command".to_string(), Value::String(text.to_string()));
    if let Some(url) = url_re().find(text) {
        data.insert("url".to_string(), Value::String(url.as_str().to_string()));
    }
    Some(Classified {
        job_type: job_types::SCRAPE,
        data: Value::Object(data),
    })
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &s[prefix.len()..])
}

/// An `@handle` anywhere wins; otherwise the word after `follow`.
fn follow_target(text: &str, keyword_at: usize) -> Option<String> {
    if let Some(handle) = text
        .split_whitespace()
        .find(|w| w.starts_with('@') && w.len() > 1)
    {
        return Some(handle.trim_start_matches('@').to_string());
    }
    let after = &text[keyword_at + "follow".len()..];
    // Skip the tail of the keyword itself, as in "follows".
    let after = after.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    after
        .split_whitespace()
        .next()
        .map(|w| w.trim_matches(|c: char| !(c.is_ascii_alphanumeric() || c == '_')))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
}
