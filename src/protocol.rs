//! TL1 message codec.
//!
//! Parses command lines into [`Command`] and renders [`Command`] and
//! [`Response`] back into wire format. Pure functions only: no I/O and no
//! shared state.
//!
//! ## Wire format
//!
//! ```text
//! Command:  VERB[-NOUN]:TID:AID:CTAG[:MOD1[:MOD2[:PARAMS]]];
//!
//! Response: \n
//!           \n
//!              TID yy-MM-dd HH:mm:ss\n
//!           M  CTAG COMPLD\n
//!              "text"\n
//!           ;\n
//! ```
//!
//! There is no escaping. The parameters field takes everything after the
//! sixth colon, colons included, and only a single trailing `;` is removed.

use bytes::BytesMut;
use chrono::{DateTime, Local};
use std::fmt;
use thiserror::Error;

/// Terminator character for commands and response blocks.
pub const TERMINATOR: char = ';';

/// Field separator within a command.
pub const FIELD_SEPARATOR: char = ':';

/// Separator between verb and noun in the first field.
pub const NOUN_SEPARATOR: char = '-';

/// Minimum number of colon-delimited fields in a command.
pub const MIN_FIELDS: usize = 3;

/// Timestamp layout used in response headers (`yy-MM-dd HH:mm:ss`).
pub const TIMESTAMP_FORMAT: &str = "%y-%m-%d %H:%M:%S";

/// Target id used when a line could not be parsed.
pub const UNKNOWN_TID: &str = "UNKNOWN";

/// Correlation tag used when a line could not be parsed.
pub const PARSE_FAILURE_CTAG: &str = "001";

/// Maximum number of positional fields. The last one is the parameter block.
const MAX_FIELDS: usize = 7;

/// Command parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Fewer than [`MIN_FIELDS`] colon-delimited fields
    #[error("malformed command: expected at least 3 fields, found {found}")]
    TooFewFields { found: usize },

    /// Nothing before the first `-` or `:`
    #[error("malformed command: missing verb")]
    EmptyVerb,

    /// Line longer than the reader accepts
    #[error("malformed command: line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
}

/// Completion status of a processed command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionCode {
    /// Command completed
    Compld,
    /// Command rejected
    Deny,
}

impl CompletionCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionCode::Compld => "COMPLD",
            CompletionCode::Deny => "DENY",
        }
    }
}

impl fmt::Display for CompletionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed TL1 command
///
/// Every field except `verb` may be empty. `timestamp` is taken when the
/// command is constructed.
#[derive(Debug, Clone)]
pub struct Command {
    pub verb: String,
    pub noun: String,
    pub tid: String,
    pub aid: String,
    pub ctag: String,
    pub modifier1: String,
    pub modifier2: String,
    pub parameters: String,
    pub timestamp: DateTime<Local>,
}

impl Command {
    /// Create a command with only a verb set.
    pub fn new(verb: impl Into<String>) -> Self {
        Command {
            verb: verb.into(),
            noun: String::new(),
            tid: String::new(),
            aid: String::new(),
            ctag: String::new(),
            modifier1: String::new(),
            modifier2: String::new(),
            parameters: String::new(),
            timestamp: Local::now(),
        }
    }

    /// Parse a command line.
    ///
    /// Surrounding whitespace and one trailing `;` are ignored. Fields past
    /// the ones present default to empty.
    pub fn parse(line: &str) -> Result<Command, ParseError> {
        let line = line.trim();
        let body = line.strip_suffix(TERMINATOR).unwrap_or(line);

        // Trailing empty fields do not count toward the minimum.
        let trailing_empty = body
            .rsplit(FIELD_SEPARATOR)
            .take_while(|field| field.is_empty())
            .count();
        let found = body.split(FIELD_SEPARATOR).count() - trailing_empty;
        if found < MIN_FIELDS {
            return Err(ParseError::TooFewFields { found });
        }

        let mut fields = body.splitn(MAX_FIELDS, FIELD_SEPARATOR);
        let mut next = || fields.next().unwrap_or_default().to_string();

        let head = next();
        let (verb, noun) = match head.split_once(NOUN_SEPARATOR) {
            Some((verb, noun)) => (verb.to_string(), noun.to_string()),
            None => (head, String::new()),
        };
        if verb.is_empty() {
            return Err(ParseError::EmptyVerb);
        }

        let mut command = Command::new(verb);
        command.noun = noun;
        command.tid = next();
        command.aid = next();
        command.ctag = next();
        command.modifier1 = next();
        command.modifier2 = next();
        command.parameters = next();
        Ok(command)
    }

    /// Render the command in wire format, terminator included.
    ///
    /// The AID slot is always written since fields are positional. Trailing
    /// empty modifiers and parameters are dropped; interior empty ones keep
    /// their slot. The output reads back through [`Command::parse`] with
    /// every field in the same position.
    pub fn format(&self) -> String {
        let mut out = String::with_capacity(64);
        out.push_str(&self.verb);
        if !self.noun.is_empty() {
            out.push(NOUN_SEPARATOR);
            out.push_str(&self.noun);
        }
        for field in [&self.tid, &self.aid, &self.ctag] {
            out.push(FIELD_SEPARATOR);
            out.push_str(field);
        }

        let optional = [&self.modifier1, &self.modifier2, &self.parameters];
        let present = optional
            .iter()
            .rposition(|field| !field.is_empty())
            .map_or(0, |last| last + 1);
        for field in &optional[..present] {
            out.push(FIELD_SEPARATOR);
            out.push_str(field);
        }

        out.push(TERMINATOR);
        out
    }
}

/// Response to a single command
#[derive(Debug, Clone)]
pub struct Response {
    pub tid: String,
    pub ctag: String,
    pub code: CompletionCode,
    pub text: Option<String>,
    pub timestamp: DateTime<Local>,
}

impl Response {
    pub fn new(
        tid: impl Into<String>,
        ctag: impl Into<String>,
        code: CompletionCode,
        text: Option<String>,
    ) -> Self {
        Response {
            tid: tid.into(),
            ctag: ctag.into(),
            code,
            text,
            timestamp: Local::now(),
        }
    }

    /// COMPLD response echoing the command's TID and CTAG.
    pub fn completed(command: &Command, text: impl Into<String>) -> Self {
        Response::new(
            command.tid.as_str(),
            command.ctag.as_str(),
            CompletionCode::Compld,
            Some(text.into()),
        )
    }

    /// DENY response echoing the command's TID and CTAG.
    pub fn denied(command: &Command, text: impl Into<String>) -> Self {
        Response::new(
            command.tid.as_str(),
            command.ctag.as_str(),
            CompletionCode::Deny,
            Some(text.into()),
        )
    }

    /// DENY response for a line that could not be parsed.
    pub fn parse_failure(error: &ParseError) -> Self {
        Response::new(
            UNKNOWN_TID,
            PARSE_FAILURE_CTAG,
            CompletionCode::Deny,
            Some(format!("Invalid command format: {}", error)),
        )
    }

    /// Render the response block, terminator line included.
    pub fn format(&self) -> String {
        let timestamp = self.timestamp.format(TIMESTAMP_FORMAT);
        let mut out = format!(
            "\n\n   {} {}\nM  {} {}\n",
            self.tid, timestamp, self.ctag, self.code
        );
        if let Some(text) = self.text.as_deref().filter(|t| !t.is_empty()) {
            out.push_str("   \"");
            out.push_str(text);
            out.push_str("\"\n");
        }
        out.push(TERMINATOR);
        out.push('\n');
        out
    }

    /// Render the response block into a write buffer.
    pub fn encode(&self) -> BytesMut {
        BytesMut::from(self.format().as_bytes())
    }
}

/// Whether `line` closes a response block.
pub fn is_terminator(line: &str) -> bool {
    line.trim() == ";"
}
