use serde::{Deserialize, Serialize};
use std::fmt;

/// Decoded value carried by literal tokens.
///
/// Strings carry their unescaped content, numbers their parsed value.
/// Tokens that are not literals carry no value at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Str(String),
    Number(f64),
    Bool(bool),
}

/// A single lexed token, immutable once produced.
///
/// `Token` is generic over the per-language kind set so both lexers share one
/// position-tracking discipline: `line`/`column` are 1-based and captured at
/// the token's first character, offsets are 0-based byte offsets with an
/// exclusive end.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Token<K> {
    kind: K,
    text: String,
    literal: Option<Literal>,
    line: u32,
    column: u32,
    start_offset: usize,
    end_offset: usize,
}

impl<K> Token<K> {
    pub(crate) fn new(
        kind: K,
        text: impl Into<String>,
        line: u32,
        column: u32,
        start_offset: usize,
        end_offset: usize,
    ) -> Self {
        Self {
            kind,
            text: text.into(),
            literal: None,
            line,
            column,
            start_offset,
            end_offset,
        }
    }

    pub(crate) fn with_literal(mut self, literal: Literal) -> Self {
        self.literal = Some(literal);
        self
    }

    /// The token's kind.
    pub fn kind(&self) -> &K {
        &self.kind
    }

    /// The exact source slice this token covers.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Decoded value for string, number and boolean tokens.
    pub fn literal(&self) -> Option<&Literal> {
        self.literal.as_ref()
    }

    /// 1-based line of the token's first character.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// 1-based column of the token's first character.
    pub fn column(&self) -> u32 {
        self.column
    }

    /// 0-based byte offset of the token's first character.
    pub fn start_offset(&self) -> usize {
        self.start_offset
    }

    /// 0-based byte offset one past the token's last character.
    ///
    /// Equal to `start_offset` only for the synthetic end-of-input token.
    pub fn end_offset(&self) -> usize {
        self.end_offset
    }

    /// `(start_offset, end_offset)` as a pair.
    pub fn span(&self) -> (usize, usize) {
        (self.start_offset, self.end_offset)
    }
}

impl<K: fmt::Debug> fmt::Debug for Token<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}@{}:{} {:?}",
            self.kind, self.start_offset, self.end_offset, self.text
        )
    }
}
