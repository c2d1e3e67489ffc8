use crate::token::Token;
use crate::{docql, graphql};
use serde::{Deserialize, Serialize};

/// The language-agnostic category set consumed by the canvas painter.
///
/// Both lexers map into this one set so the painter never needs to know
/// which language produced a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderCategory {
    Keyword,
    Identifier,
    Literal,
    String,
    Number,
    Operator,
    Punctuation,
    Comment,
    Whitespace,
    Newline,
    Placeholder,
    Unknown,
}

/// Per-language token kind → render category table.
pub trait RenderKind {
    fn render_category(&self) -> RenderCategory;
}

impl RenderKind for docql::TokenKind {
    fn render_category(&self) -> RenderCategory {
        use docql::Operator;
        match self {
            docql::TokenKind::Keyword(
                docql::Keyword::True | docql::Keyword::False | docql::Keyword::Null,
            ) => RenderCategory::Literal,
            docql::TokenKind::Keyword(_) => RenderCategory::Keyword,
            docql::TokenKind::Identifier => RenderCategory::Identifier,
            docql::TokenKind::String => RenderCategory::String,
            docql::TokenKind::Number => RenderCategory::Number,
            docql::TokenKind::Operator(
                Operator::LParen
                | Operator::RParen
                | Operator::LBrace
                | Operator::RBrace
                | Operator::LBracket
                | Operator::RBracket
                | Operator::Comma
                | Operator::Semicolon
                | Operator::Dot
                | Operator::Colon,
            ) => RenderCategory::Punctuation,
            docql::TokenKind::Operator(_) => RenderCategory::Operator,
            docql::TokenKind::Comment => RenderCategory::Comment,
            docql::TokenKind::Whitespace => RenderCategory::Whitespace,
            docql::TokenKind::Newline => RenderCategory::Newline,
            docql::TokenKind::Illegal => RenderCategory::Unknown,
            docql::TokenKind::Eof => RenderCategory::Whitespace,
        }
    }
}

impl RenderKind for graphql::TokenKind {
    fn render_category(&self) -> RenderCategory {
        match self {
            graphql::TokenKind::Keyword(
                graphql::Keyword::True | graphql::Keyword::False | graphql::Keyword::Null,
            ) => RenderCategory::Literal,
            graphql::TokenKind::Keyword(_) => RenderCategory::Keyword,
            graphql::TokenKind::Name => RenderCategory::Identifier,
            graphql::TokenKind::Int | graphql::TokenKind::Float => RenderCategory::Number,
            graphql::TokenKind::StringValue | graphql::TokenKind::BlockString => {
                RenderCategory::String
            }
            graphql::TokenKind::Bang
            | graphql::TokenKind::Dollar
            | graphql::TokenKind::Amp
            | graphql::TokenKind::Eq
            | graphql::TokenKind::At
            | graphql::TokenKind::Pipe
            | graphql::TokenKind::Spread => RenderCategory::Operator,
            graphql::TokenKind::LParen
            | graphql::TokenKind::RParen
            | graphql::TokenKind::LBracket
            | graphql::TokenKind::RBracket
            | graphql::TokenKind::LCurly
            | graphql::TokenKind::RCurly
            | graphql::TokenKind::Colon
            | graphql::TokenKind::Comma => RenderCategory::Punctuation,
            graphql::TokenKind::Comment => RenderCategory::Comment,
            graphql::TokenKind::Whitespace => RenderCategory::Whitespace,
            graphql::TokenKind::Newline => RenderCategory::Newline,
            graphql::TokenKind::Illegal => RenderCategory::Unknown,
            graphql::TokenKind::Eof => RenderCategory::Whitespace,
        }
    }
}

/// One per-line slice of a token, ready for the painter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSpan {
    pub category: RenderCategory,
    pub text: String,
    pub has_error_marker: bool,
}

/// A rendered line: spans sorted by column.
pub type RenderLine = Vec<RenderSpan>;

/// Produces the per-line descriptor stream for the painter.
///
/// Multi-line tokens are split into per-line slices sharing the token's
/// category. `error_spans` are `(start_offset, end_offset)` ranges; any
/// token overlapping one gets its error marker set.
pub fn render_lines<K: RenderKind>(
    tokens: &[Token<K>],
    error_spans: &[(usize, usize)],
) -> Vec<RenderLine> {
    let mut lines: Vec<RenderLine> = Vec::new();

    for token in tokens {
        if token.text().is_empty() {
            continue;
        }
        let category = token.kind().render_category();
        let has_error_marker = error_spans
            .iter()
            .any(|&(start, end)| token.start_offset() < end && token.end_offset() > start);

        let line_index = token.line() as usize - 1;
        for (piece_index, piece) in token.text().split('\n').enumerate() {
            let target = line_index + piece_index;
            while lines.len() <= target {
                lines.push(Vec::new());
            }
            if piece_index > 0 {
                // The newline itself belongs to the line it terminates.
                lines[target - 1].push(RenderSpan {
                    category: RenderCategory::Newline,
                    text: "\n".to_string(),
                    has_error_marker: false,
                });
            }
            if !piece.is_empty() {
                lines[target].push(RenderSpan {
                    category,
                    text: piece.to_string(),
                    has_error_marker,
                });
            }
        }
    }

    lines
}
