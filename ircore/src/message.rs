//! Message Codec, §4.C: parsing a wire line into a `Message` and serializing a
//! `Message` back to wire bytes.
use crate::command::{self, CommandId};
use crate::error::{ErrorKind, Result};
use crate::tags::TagMap;

/// Body size cap, excluding the CR-LF terminator (spec.md §3, §4.C).
pub const MAX_BODY_BYTES: usize = 510;
/// Maximum number of params (RFC 2812).
pub const MAX_PARAMS: usize = 15;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Message {
    tags: Option<TagMap>,
    prefix: Option<String>,
    command_id: Option<CommandId>,
    command_text: String,
    params: Vec<String>,
}

impl Message {
    /// Constructs a message from fields, validating per spec.md §4.C. Truncates at
    /// `MAX_PARAMS` params and fails with `MsgLen` if the serialized body would
    /// exceed `MAX_BODY_BYTES`.
    pub fn new(
        prefix: Option<&str>,
        command: &str,
        params: &[&str],
    ) -> Result<Message> {
        if command.is_empty() || contains_crlf_or_space(command) {
            return Err(ErrorKind::Inval);
        }
        if let Some(p) = prefix {
            if contains_crlf_or_space(p) {
                return Err(ErrorKind::Inval);
            }
        }
        let mut owned_params: Vec<String> = Vec::new();
        let truncated = &params[..params.len().min(MAX_PARAMS)];
        for (i, param) in truncated.iter().enumerate() {
            if param.contains('\r') || param.contains('\n') {
                return Err(ErrorKind::Inval);
            }
            let is_last = i == truncated.len() - 1;
            if !is_last && (param.contains(' ') || param.starts_with(':')) {
                return Err(ErrorKind::Inval);
            }
            owned_params.push((*param).to_owned());
        }

        let command_id = command::lookup_by_mnemonic(command);
        let message = Message {
            tags: None,
            prefix: prefix.map(|p| p.to_owned()),
            command_id,
            command_text: command.to_owned(),
            params: owned_params,
        };

        let body_len = message.serialize_body().len();
        if body_len > MAX_BODY_BYTES {
            return Err(ErrorKind::MsgLen);
        }
        Ok(message)
    }

    /// Parses a single line. `line` may or may not end in CR-LF/LF; any trailing
    /// terminator is stripped before parsing proceeds.
    pub fn parse(line: &[u8]) -> Result<Message> {
        let line = strip_eol(line);

        let (tags, rest) = match TagMap::parse_prelude(line)? {
            Some((tags, consumed)) => (Some(tags), &line[consumed..]),
            None => (None, line),
        };

        let text = String::from_utf8_lossy(rest);
        let mut remainder: &str = text.as_ref();

        let mut prefix = None;
        if let Some(stripped) = remainder.strip_prefix(':') {
            match stripped.find(' ') {
                Some(idx) => {
                    prefix = Some(stripped[..idx].to_owned());
                    remainder = &stripped[idx + 1..];
                }
                None => return Err(ErrorKind::Inval),
            }
        }

        let (command_text, after_command) = match remainder.find(' ') {
            Some(idx) => (&remainder[..idx], &remainder[idx + 1..]),
            None => (remainder, ""),
        };
        if command_text.is_empty() {
            return Err(ErrorKind::Inval);
        }
        let command_id = command::lookup_by_mnemonic(command_text);

        let params = parse_params(after_command);

        Ok(Message {
            tags,
            prefix,
            command_id,
            command_text: command_text.to_owned(),
            params,
        })
    }

    /// Serializes the full wire form, including the tag prelude (if any) and the
    /// CR-LF terminator.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        if let Some(tags) = &self.tags {
            if let Some(prelude) = tags.to_prelude() {
                out.extend_from_slice(&prelude);
            }
        }
        out.extend_from_slice(&self.serialize_body());
        out.extend_from_slice(b"\r\n");
        out
    }

    /// Serializes everything after the optional tag prelude, up to (not
    /// including) the CR-LF terminator. Used both by `serialize` and by callers
    /// (e.g. `Connection::queue_message`) that need to measure the 510-byte body
    /// cap without counting the separately-capped tag prelude.
    pub(crate) fn serialize_body(&self) -> Vec<u8> {
        let mut out = Vec::new();
        if let Some(prefix) = &self.prefix {
            out.push(b':');
            out.extend_from_slice(prefix.as_bytes());
            out.push(b' ');
        }
        out.extend_from_slice(self.command_text.as_bytes());
        for (i, param) in self.params.iter().enumerate() {
            out.push(b' ');
            let is_last = i == self.params.len() - 1;
            let needs_colon = is_last && (param.is_empty() || param.contains(' ') || param.starts_with(':'));
            if needs_colon {
                out.push(b':');
            }
            out.extend_from_slice(param.as_bytes());
        }
        out
    }

    pub fn tags(&self) -> Option<&TagMap> {
        self.tags.as_ref()
    }

    pub fn tags_mut(&mut self) -> &mut TagMap {
        self.tags.get_or_insert_with(TagMap::new)
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn command_id(&self) -> Option<CommandId> {
        self.command_id
    }

    pub fn command_text(&self) -> &str {
        &self.command_text
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }
}

/// Fluent construction on top of `Message::new`'s validation; additive sugar, not
/// a second validation path (spec.md's expansion, `SPEC_FULL.md` §3).
#[derive(Debug, Default)]
pub struct MessageBuilder {
    prefix: Option<String>,
    command: String,
    params: Vec<String>,
    tags: Vec<(String, Option<Vec<u8>>)>,
}

impl MessageBuilder {
    pub fn new(command: &str) -> Self {
        MessageBuilder {
            prefix: None,
            command: command.to_owned(),
            params: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_owned());
        self
    }

    pub fn add_param(mut self, param: &str) -> Self {
        self.params.push(param.to_owned());
        self
    }

    pub fn with_tag(mut self, key: &str, value: Option<&[u8]>) -> Self {
        self.tags.push((key.to_owned(), value.map(|v| v.to_vec())));
        self
    }

    pub fn build(self) -> Result<Message> {
        let param_refs: Vec<&str> = self.params.iter().map(|s| s.as_str()).collect();
        let mut message = Message::new(self.prefix.as_deref(), &self.command, &param_refs)?;
        for (key, value) in &self.tags {
            message.tags_mut().set(key, value.as_deref())?;
        }
        Ok(message)
    }
}

fn parse_params(mut remainder: &str) -> Vec<String> {
    let mut params = Vec::new();
    while params.len() < MAX_PARAMS - 1 && !remainder.is_empty() {
        if remainder.starts_with(':') {
            break;
        }
        match remainder.find(' ') {
            Some(idx) => {
                params.push(remainder[..idx].to_owned());
                remainder = &remainder[idx + 1..];
            }
            None => {
                params.push(remainder.to_owned());
                remainder = "";
            }
        }
    }
    if let Some(stripped) = remainder.strip_prefix(':') {
        params.push(stripped.to_owned());
    } else if !remainder.is_empty() {
        params.push(remainder.to_owned());
    }
    params
}

fn strip_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn contains_crlf_or_space(s: &str) -> bool {
    s.contains('\r') || s.contains('\n') || s.contains(' ')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scenario_privmsg_with_prefix() {
        let msg = Message::parse(b":anne PRIVMSG #goat :hello there\r\n").unwrap();
        assert_eq!(msg.prefix(), Some("anne"));
        assert_eq!(msg.command_id(), Some(CommandId::Privmsg));
        assert_eq!(msg.params(), &["#goat".to_owned(), "hello there".to_owned()]);
        assert_eq!(msg.serialize(), b":anne PRIVMSG #goat :hello there\r\n");
    }

    #[test]
    fn parse_scenario_bare_ping() {
        let msg = Message::parse(b"PING\r\n").unwrap();
        assert_eq!(msg.prefix(), None);
        assert_eq!(msg.command_id(), Some(CommandId::Ping));
        assert!(msg.params().is_empty());
    }

    #[test]
    fn parse_scenario_with_tags() {
        let msg = Message::parse(b"@id=234AB;rose :dan!d@local.host PRIVMSG #chan :Hey\r\n").unwrap();
        let tags = msg.tags().unwrap();
        assert_eq!(tags.get("id"), crate::tags::TagLookup::Value(b"234AB".to_vec()));
        assert_eq!(tags.get("rose"), crate::tags::TagLookup::NoValue);
        assert_eq!(msg.prefix(), Some("dan!d@local.host"));
        assert_eq!(msg.command_id(), Some(CommandId::Privmsg));
        assert_eq!(msg.params(), &["#chan".to_owned(), "Hey".to_owned()]);
    }

    #[test]
    fn construct_fails_on_space_in_non_final_param() {
        let result = Message::new(None, "PRIVMSG", &["p1", "p 2", "p3"]);
        assert_eq!(result.unwrap_err(), ErrorKind::Inval);
    }

    #[test]
    fn construct_truncates_at_fifteen_params() {
        let params: Vec<&str> = (0..20).map(|_| "x").collect();
        let msg = Message::new(None, "PRIVMSG", &params).unwrap();
        assert_eq!(msg.params().len(), MAX_PARAMS);
    }

    #[test]
    fn construct_fails_when_body_exceeds_cap() {
        let long_param = "x".repeat(600);
        let result = Message::new(None, "PRIVMSG", &[long_param.as_str()]);
        assert_eq!(result.unwrap_err(), ErrorKind::MsgLen);
    }

    #[test]
    fn last_param_gets_colon_when_it_contains_space() {
        let msg = Message::new(Some("anne"), "PRIVMSG", &["#goat", "hello there"]).unwrap();
        assert_eq!(msg.serialize(), b":anne PRIVMSG #goat :hello there\r\n");
    }

    #[test]
    fn last_param_gets_colon_when_empty() {
        let msg = Message::new(None, "TOPIC", &["#chan", ""]).unwrap();
        assert_eq!(msg.serialize(), b"TOPIC #chan :\r\n");
    }

    #[test]
    fn round_trip_all_concrete_scenarios() {
        let lines: &[&[u8]] = &[
            b":anne PRIVMSG #goat :hello there\r\n",
            b"PING\r\n",
        ];
        for &line in lines {
            let msg = Message::parse(line).unwrap();
            assert_eq!(msg.serialize(), line);
        }
    }

    #[test]
    fn missing_command_fails() {
        assert_eq!(Message::parse(b"\r\n").unwrap_err(), ErrorKind::Inval);
    }

    #[test]
    fn builder_round_trips_tag_and_params() {
        let msg = MessageBuilder::new("PRIVMSG")
            .with_prefix("anne")
            .with_tag("id", Some(b"1"))
            .add_param("#goat")
            .add_param("hi")
            .build()
            .unwrap();
        assert_eq!(msg.tags().unwrap().get("id"), crate::tags::TagLookup::Value(b"1".to_vec()));
        assert_eq!(msg.serialize(), b"@id=1 :anne PRIVMSG #goat hi\r\n");
    }
}
