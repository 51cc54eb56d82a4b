//! Declarative event filters (spec §4.F "Event filtering").
//!
//! A subscription's `config` doubles as its filter declaration: any of the
//! recognized fields may be present, and an event is accepted only if every
//! declared filter passes.

use loom_domain::Value;
use regex::Regex;

/// Compiled once at `setupTrigger` time (spec §4.F "`pattern` filters
/// compile their regex once ... reuse it per event") and re-applied to
/// every event the trigger emits thereafter.
#[derive(Clone, Default)]
pub struct EventFilters {
    channel: Option<String>,
    channel_id: Option<String>,
    chat_id: Option<String>,
    pattern: Option<Regex>,
    pattern_invalid: bool,
    ignore_bot: bool,
    user: Option<String>,
}

impl EventFilters {
    #[must_use]
    pub fn compile(config: &Value) -> Self {
        let pattern_source = field(config, "pattern");
        let (pattern, pattern_invalid) = match pattern_source {
            Some(src) => match Regex::new(&src) {
                Ok(re) => (Some(re), false),
                Err(_) => (None, true),
            },
            None => (None, false),
        };

        Self {
            channel: field(config, "channel"),
            channel_id: field(config, "channelId"),
            chat_id: field(config, "chatId"),
            pattern,
            pattern_invalid,
            ignore_bot: config.get("ignoreBot").is_some_and(Value::is_truthy),
            user: field(config, "user"),
        }
    }

    /// Whether `event` passes every filter this subscription declared
    /// (spec §4.F: "accepted only if all declared filters pass").
    #[must_use]
    pub fn matches(&self, event: &Value) -> bool {
        if let Some(channel) = &self.channel {
            if !channel_matches(channel, event) {
                return false;
            }
        }

        if let Some(channel_id) = &self.channel_id {
            if field(event, "channelId").as_deref() != Some(channel_id.as_str()) {
                return false;
            }
        }

        if let Some(chat_id) = &self.chat_id {
            let actual = event
                .get_path(&["chat", "id"])
                .and_then(stringify)
                .or_else(|| field(event, "chatId"));
            if actual.as_deref() != Some(chat_id.as_str()) {
                return false;
            }
        }

        if self.pattern_invalid {
            return false;
        }
        if let Some(re) = &self.pattern {
            match field(event, "text") {
                Some(text) if re.is_match(&text) => {}
                _ => return false,
            }
        }

        if self.ignore_bot {
            let is_bot = event.get("isBot").is_some_and(Value::is_truthy);
            let has_bot_id = event.get("botId").is_some();
            if is_bot || has_bot_id {
                return false;
            }
        }

        if let Some(user) = &self.user {
            let actual = field(event, "user")
                .or_else(|| field(event, "userId"))
                .or_else(|| field(event, "from"));
            if actual.as_deref() != Some(user.as_str()) {
                return false;
            }
        }

        true
    }
}

/// `channel`: matches `event.channel`/`event.channelId` directly; a
/// leading `#` additionally matches `event.channelName` against the
/// suffix (spec §4.F filter table).
fn channel_matches(filter: &str, event: &Value) -> bool {
    let direct = field(event, "channel").or_else(|| field(event, "channelId"));
    if direct.as_deref() == Some(filter) {
        return true;
    }
    if let Some(suffix) = filter.strip_prefix('#') {
        if field(event, "channelName").as_deref() == Some(suffix) {
            return true;
        }
    }
    false
}

fn field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(stringify)
}

fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        other => Some(other.stringify()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(pairs: &[(&str, Value)]) -> Value {
        Value::Map(pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect())
    }

    #[test]
    fn no_filters_accepts_everything() {
        let filters = EventFilters::compile(&Value::map());
        assert!(filters.matches(&event(&[])));
    }

    #[test]
    fn channel_hash_prefix_matches_channel_name() {
        let config = event(&[("channel", Value::from("#alerts"))]);
        let filters = EventFilters::compile(&config);
        assert!(filters.matches(&event(&[("channelName", Value::from("alerts"))])));
        assert!(!filters.matches(&event(&[("channelName", Value::from("chat"))])));
    }

    #[test]
    fn channel_without_hash_matches_literal_channel_id() {
        let config = event(&[("channel", Value::from("C123"))]);
        let filters = EventFilters::compile(&config);
        assert!(filters.matches(&event(&[("channelId", Value::from("C123"))])));
        assert!(!filters.matches(&event(&[("channelId", Value::from("C999"))])));
    }

    #[test]
    fn pattern_requires_text_field() {
        let config = event(&[("pattern", Value::from("err.*"))]);
        let filters = EventFilters::compile(&config);
        assert!(filters.matches(&event(&[("text", Value::from("error 500"))])));
        assert!(!filters.matches(&event(&[("text", Value::from("all good"))])));
        assert!(!filters.matches(&event(&[])));
    }

    #[test]
    fn invalid_pattern_rejects_every_event() {
        let config = event(&[("pattern", Value::from("(unterminated"))]);
        let filters = EventFilters::compile(&config);
        assert!(!filters.matches(&event(&[("text", Value::from("anything"))])));
    }

    #[test]
    fn ignore_bot_rejects_bot_flag_or_bot_id() {
        let config = event(&[("ignoreBot", Value::Bool(true))]);
        let filters = EventFilters::compile(&config);
        assert!(filters.matches(&event(&[("user", Value::from("alice"))])));
        assert!(!filters.matches(&event(&[("isBot", Value::Bool(true))])));
        assert!(!filters.matches(&event(&[("botId", Value::from("B1"))])));
    }

    #[test]
    fn user_matches_user_userid_or_from() {
        let config = event(&[("user", Value::from("alice"))]);
        let filters = EventFilters::compile(&config);
        assert!(filters.matches(&event(&[("userId", Value::from("alice"))])));
        assert!(filters.matches(&event(&[("from", Value::from("alice"))])));
        assert!(!filters.matches(&event(&[("user", Value::from("bob"))])));
    }

    #[test]
    fn combined_filters_are_conjunctive() {
        let config = event(&[("channel", Value::from("#alerts")), ("pattern", Value::from("error"))]);
        let filters = EventFilters::compile(&config);
        assert!(filters.matches(&event(&[
            ("channelName", Value::from("alerts")),
            ("text", Value::from("error 500")),
        ])));
        assert!(!filters.matches(&event(&[
            ("channelName", Value::from("alerts")),
            ("text", Value::from("ok")),
        ])));
        assert!(!filters.matches(&event(&[
            ("channelName", Value::from("chat")),
            ("text", Value::from("error")),
        ])));
    }
}
