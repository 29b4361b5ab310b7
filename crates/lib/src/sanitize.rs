//! Mention handling for outgoing replies and incoming text.
//!
//! Discord mention tokens look like `<@123>` or `<@!123>` (nickname form); both are matched.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<@!?(\d+)>").expect("mention pattern is valid"));

/// Strip every mention token from generated text, trim, and address the reply to the requester.
///
/// Idempotent for a fixed requester: the requester's own mention is stripped before being
/// prepended again.
pub fn sanitize_reply(raw: &str, requester_mention: &str) -> String {
    let cleaned = MENTION.replace_all(raw, "");
    format!("{} {}", requester_mention, cleaned.trim())
}

/// True when `raw` has no text left once every mention token is removed.
pub fn is_blank_reply(raw: &str) -> bool {
    MENTION.replace_all(raw, "").trim().is_empty()
}

/// Remove mentions of `user_id` (both forms) from `text` and trim the result.
pub fn strip_mentions_of(text: &str, user_id: &str) -> String {
    MENTION
        .replace_all(text, |caps: &Captures| {
            if &caps[1] == user_id {
                String::new()
            } else {
                caps[0].to_string()
            }
        })
        .trim()
        .to_string()
}

/// True when `text` contains a mention token for `user_id`.
pub fn mentions_user(text: &str, user_id: &str) -> bool {
    MENTION
        .captures_iter(text)
        .any(|caps| &caps[1] == user_id)
}

/// Flatten line breaks so user-controlled values stay on one log line.
pub fn for_log(value: &str) -> String {
    value.replace(['\n', '\r'], " ")
}
