//! IRCv3 message-tags codec, §4.B. Tag values are arbitrary bytes; only keys are
//! assumed to be printable text (IRCv3 in practice restricts keys to a small
//! character set, and nothing in this module needs to assume more than that).
use crate::error::{ErrorKind, Result};

/// Hard cap on the tag prelude's serialized length (the `k=v;k2=v2` span, not
/// counting the leading `@` or trailing space).
pub const MAX_TAGS_BYTES: usize = 4_094;

/// Outcome of a tag lookup: distinguishes absent, present-without-value, and
/// present-with-value, per spec.md §4.B.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TagLookup {
    Absent,
    NoValue,
    Value(Vec<u8>),
}

/// Ordered set of (key, optional value) pairs, preserving insertion order except
/// that `set` on an existing key moves it to the end.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct TagMap {
    entries: Vec<(String, Option<Vec<u8>>)>,
    serialized_len: usize,
}

fn entry_wire_len(key: &str, value: Option<&[u8]>) -> usize {
    key.len() + value.map(|v| 1 + v.len()).unwrap_or(0)
}

fn total_wire_len(entries: &[(String, Option<Vec<u8>>)]) -> usize {
    if entries.is_empty() {
        return 0;
    }
    let sum: usize = entries
        .iter()
        .map(|(k, v)| entry_wire_len(k, v.as_deref()))
        .sum();
    sum + (entries.len() - 1) // ';' separators
}

impl TagMap {
    pub fn new() -> Self {
        TagMap::default()
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn has_tag(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn get(&self, key: &str) -> TagLookup {
        match self.entries.iter().find(|(k, _)| k == key) {
            None => TagLookup::Absent,
            Some((_, None)) => TagLookup::NoValue,
            Some((_, Some(raw))) => TagLookup::Value(unescape(raw)),
        }
    }

    /// Sets `key` to `value` (or to no value if `value` is `None`), moving it to
    /// the end if it already existed. Fails with `Inval` if `value` contains a NUL
    /// byte (spec.md §9b forbids such values at escape time), and with `MsgLen` if
    /// the resulting buffer would exceed `MAX_TAGS_BYTES`.
    pub fn set(&mut self, key: &str, value: Option<&[u8]>) -> Result<()> {
        if let Some(v) = value {
            if v.contains(&0) {
                return Err(ErrorKind::Inval);
            }
        }
        let escaped = value.map(escape);
        let mut candidate: Vec<(String, Option<Vec<u8>>)> = self
            .entries
            .iter()
            .filter(|(k, _)| k != key)
            .cloned()
            .collect();
        candidate.push((key.to_owned(), escaped));

        let new_len = total_wire_len(&candidate);
        if new_len > MAX_TAGS_BYTES {
            return Err(ErrorKind::MsgLen);
        }
        self.entries = candidate;
        self.serialized_len = new_len;
        Ok(())
    }

    /// Removes `key`. A no-op if `key` is not present.
    pub fn unset(&mut self, key: &str) {
        if let Some(pos) = self.entries.iter().position(|(k, _)| k == key) {
            self.entries.remove(pos);
            self.serialized_len = total_wire_len(&self.entries);
        }
    }

    /// Parses a leading `@tags ` prelude from `line`, returning the parsed map and
    /// the number of bytes consumed (including the trailing space). Returns `Ok(None)`
    /// if `line` does not start with `@` (there is no prelude, not an error).
    pub fn parse_prelude(line: &[u8]) -> Result<Option<(TagMap, usize)>> {
        if line.first() != Some(&b'@') {
            return Ok(None);
        }
        let space_idx = line[1..]
            .iter()
            .position(|&b| b == b' ')
            .map(|i| i + 1)
            .ok_or(ErrorKind::Inval)?;
        let span = &line[1..space_idx];
        if span.is_empty() || span.contains(&b'\r') || span.contains(&b'\n') {
            return Err(ErrorKind::Inval);
        }
        if span.len() > MAX_TAGS_BYTES {
            return Err(ErrorKind::MsgLen);
        }
        let mut entries = Vec::new();
        for raw_entry in span.split(|&b| b == b';') {
            let (key, value) = match raw_entry.iter().position(|&b| b == b'=') {
                Some(eq) => (&raw_entry[..eq], Some(raw_entry[eq + 1..].to_vec())),
                None => (raw_entry, None),
            };
            entries.push((String::from_utf8_lossy(key).into_owned(), value));
        }
        let serialized_len = total_wire_len(&entries);
        Ok(Some((TagMap { entries, serialized_len }, space_idx + 1)))
    }

    /// Renders the `@k=v;k2=v2 ` prelude (with trailing space) as raw wire bytes,
    /// or `None` if empty. Kept byte-oriented rather than `String` because an
    /// escaped value may legitimately contain non-UTF-8 bytes that passed through
    /// `escape` unchanged.
    pub fn to_prelude(&self) -> Option<Vec<u8>> {
        if self.entries.is_empty() {
            return None;
        }
        let mut out = Vec::with_capacity(self.serialized_len + 2);
        out.push(b'@');
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                out.push(b';');
            }
            out.extend_from_slice(key.as_bytes());
            if let Some(raw) = value {
                out.push(b'=');
                out.extend_from_slice(raw);
            }
        }
        out.push(b' ');
        Some(out)
    }
}

/// Literal value -> wire form. `;`, ` `, `\`, CR, LF get backslash-escaped; every
/// other byte passes through unchanged.
fn escape(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    for &b in raw {
        match b {
            b';' => out.extend_from_slice(b"\\:"),
            b' ' => out.extend_from_slice(b"\\s"),
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\n' => out.extend_from_slice(b"\\n"),
            other => out.push(other),
        }
    }
    out
}

/// Wire form -> literal value. `\x` for any `x` outside the escape alphabet
/// decodes to `x`; a trailing lone backslash is dropped.
fn unescape(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut iter = raw.iter().copied();
    while let Some(b) = iter.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match iter.next() {
            Some(b':') => out.push(b';'),
            Some(b's') => out.push(b' '),
            Some(b'\\') => out.push(b'\\'),
            Some(b'r') => out.push(b'\r'),
            Some(b'n') => out.push(b'\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
