//! Response decoding for the text protocol.
//!
//! Retrieval replies are decoded by a small state machine fed one line at a
//! time. The parser only looks at the first token of each line and at the
//! number of lines it has seen, so an empty reply (`END` alone) can never be
//! confused with a hit whose value happens to contain the end marker.

use bytes::Bytes;

use crate::constants::RESP_DELETED;
use crate::constants::RESP_END;
use crate::constants::RESP_NOT_FOUND;
use crate::constants::RESP_STORED;
use crate::constants::RESP_VALUE;
use crate::DefectKind;

/// Successful store confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored,
}

/// The two acceptable terminal states of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

pub(crate) fn parse_store_reply(line: &str) -> Option<StoreOutcome> {
    (line == RESP_STORED).then_some(StoreOutcome::Stored)
}

pub(crate) fn parse_delete_reply(line: &str) -> Option<DeleteOutcome> {
    match line {
        RESP_DELETED => Some(DeleteOutcome::Deleted),
        RESP_NOT_FOUND => Some(DeleteOutcome::NotFound),
        _ => None,
    }
}

/// Tagged result of a retrieval exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetReply {
    Absent,
    Hit { metadata: String, value: Bytes },
    Malformed { raw: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GetState {
    AwaitHeader,
    AwaitValue,
    AwaitEnd,
    Done,
}

#[derive(Debug)]
pub(crate) struct GetParser {
    state: GetState,
    lines: Vec<Vec<u8>>,
}

impl GetParser {
    pub(crate) fn new() -> Self {
        Self {
            state: GetState::AwaitHeader,
            lines: Vec::with_capacity(3),
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.state == GetState::Done
    }

    /// Consumes one line with its terminator already stripped. Returns
    /// `true` once the reply is complete.
    pub(crate) fn feed(
        &mut self,
        line: &[u8],
    ) -> bool {
        self.lines.push(line.to_vec());
        self.state = match self.state {
            GetState::AwaitHeader if line == RESP_END.as_bytes() => GetState::Done,
            GetState::AwaitHeader if first_token(line) == RESP_VALUE.as_bytes() => GetState::AwaitValue,
            // ERROR, CLIENT_ERROR and SERVER_ERROR are terminal on their own
            GetState::AwaitHeader => GetState::Done,
            GetState::AwaitValue => GetState::AwaitEnd,
            GetState::AwaitEnd if line == RESP_END.as_bytes() => GetState::Done,
            GetState::AwaitEnd => GetState::AwaitEnd,
            GetState::Done => GetState::Done,
        };
        self.is_done()
    }

    pub(crate) fn finish(self) -> GetReply {
        if !self.is_done() {
            return GetReply::Malformed { raw: join_lines(&self.lines) };
        }

        match self.lines.as_slice() {
            [end] if end.as_slice() == RESP_END.as_bytes() => GetReply::Absent,
            [header, value, end]
                if first_token(header) == RESP_VALUE.as_bytes() && end.as_slice() == RESP_END.as_bytes() =>
            {
                GetReply::Hit {
                    metadata: String::from_utf8_lossy(header).into_owned(),
                    value: Bytes::copy_from_slice(value),
                }
            }
            lines => GetReply::Malformed { raw: join_lines(lines) },
        }
    }
}

fn first_token(line: &[u8]) -> &[u8] {
    line.split(|b| b.is_ascii_whitespace()).next().unwrap_or_default()
}

fn join_lines(lines: &[Vec<u8>]) -> String {
    lines
        .iter()
        .map(|l| String::from_utf8_lossy(l).into_owned())
        .collect::<Vec<_>>()
        .join("\r\n")
}

/// Fields after the key on a `VALUE` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataFields {
    Split { flag: u32, length: usize },
    /// Flag and length written without a separator, e.g. `05` for flag 0,
    /// length 5. Only splittable once the expected flag is known.
    Fused(String),
}

/// Parsed `VALUE <key> <flag> <bytes>` header with its raw text preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    raw: String,
    key: String,
    fields: MetadataFields,
}

/// What a metadata line is checked against.
#[derive(Debug, Clone, Copy)]
pub struct ExpectedMetadata<'a> {
    pub key: &'a str,
    pub flag: u32,
    pub length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataMatch {
    Exact,
    Defect(Vec<DefectKind>),
    Mismatch(&'static str),
}

impl Metadata {
    pub fn parse(line: &str) -> Option<Self> {
        let mut tokens = line.split_ascii_whitespace();
        if tokens.next()? != RESP_VALUE {
            return None;
        }
        let key = tokens.next()?.to_string();
        let rest: Vec<&str> = tokens.collect();

        let fields = match rest.as_slice() {
            [flag, length] => MetadataFields::Split {
                flag: flag.parse().ok()?,
                length: length.parse().ok()?,
            },
            [fused] if !fused.is_empty() && fused.bytes().all(|b| b.is_ascii_digit()) => {
                MetadataFields::Fused(fused.to_string())
            }
            _ => return None,
        };

        Some(Self {
            raw: line.to_string(),
            key,
            fields,
        })
    }

    pub fn canonical(
        key: &str,
        flag: u32,
        length: usize,
    ) -> String {
        format!("{RESP_VALUE} {key} {flag} {length}")
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn fields(&self) -> &MetadataFields {
        &self.fields
    }

    /// Flag and declared length, splitting a fused field with `flag_hint`.
    pub fn declared(
        &self,
        flag_hint: u32,
    ) -> Option<(u32, usize)> {
        match &self.fields {
            MetadataFields::Split { flag, length } => Some((*flag, *length)),
            MetadataFields::Fused(fused) => {
                let length = fused.strip_prefix(&flag_hint.to_string())?.parse().ok()?;
                Some((flag_hint, length))
            }
        }
    }

    /// Classifies the line against the canonical rendering of `expected`.
    ///
    /// Anything parseable but not byte-identical to the canonical line is a
    /// defect, as long as key and flag agree and the declared length is
    /// within `max_length_skew` of the real one.
    pub fn classify(
        &self,
        expected: &ExpectedMetadata<'_>,
        max_length_skew: usize,
    ) -> MetadataMatch {
        if self.raw == Self::canonical(expected.key, expected.flag, expected.length) {
            return MetadataMatch::Exact;
        }
        if self.key != expected.key {
            return MetadataMatch::Mismatch("key differs");
        }

        let mut kinds = Vec::new();
        if let MetadataFields::Fused(_) = self.fields {
            kinds.push(DefectKind::FusedFlagLength);
        }
        let Some((flag, declared)) = self.declared(expected.flag) else {
            return MetadataMatch::Mismatch("flag differs");
        };
        if flag != expected.flag {
            return MetadataMatch::Mismatch("flag differs");
        }

        if declared != expected.length {
            if declared.abs_diff(expected.length) > max_length_skew {
                return MetadataMatch::Mismatch("declared length differs from value length");
            }
            kinds.push(DefectKind::LengthSkew {
                declared,
                actual: expected.length,
            });
        }

        let tokens: Vec<&str> = self.raw.split_ascii_whitespace().collect();
        if tokens.join(" ") != self.raw {
            kinds.push(DefectKind::IrregularSpacing);
        }
        if kinds.is_empty() {
            kinds.push(DefectKind::NonCanonicalField);
        }

        MetadataMatch::Defect(kinds)
    }
}

/// A retrieval hit: parsed header plus the value bytes that followed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub metadata: Metadata,
    pub value: Bytes,
}

impl Hit {
    /// Wire-level rendering used in failure reports.
    pub fn describe(&self) -> String {
        format!("{} / {}", self.metadata.raw(), String::from_utf8_lossy(&self.value))
    }
}
