use serde::{Deserialize, Serialize};

/// GraphQL keywords. Unlike DocQL these are matched case-sensitively,
/// per the October 2021 specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Keyword {
    Query,
    Mutation,
    Subscription,
    Fragment,
    On,
    True,
    False,
    Null,
}

impl Keyword {
    pub fn from_name(name: &str) -> Option<Keyword> {
        let keyword = match name {
            "query" => Keyword::Query,
            "mutation" => Keyword::Mutation,
            "subscription" => Keyword::Subscription,
            "fragment" => Keyword::Fragment,
            "on" => Keyword::On,
            "true" => Keyword::True,
            "false" => Keyword::False,
            "null" => Keyword::Null,
            _ => return None,
        };
        Some(keyword)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Query => "query",
            Keyword::Mutation => "mutation",
            Keyword::Subscription => "subscription",
            Keyword::Fragment => "fragment",
            Keyword::On => "on",
            Keyword::True => "true",
            Keyword::False => "false",
            Keyword::Null => "null",
        }
    }
}

/// The closed GraphQL token kind set, following the October 2021 lexical
/// grammar. Whitespace, newlines and insignificant commas are emitted as
/// dedicated kinds so the renderer can skip them without re-tokenizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    Name,
    Keyword(Keyword),
    Int,
    Float,
    StringValue,
    BlockString,
    Bang,     // !
    Dollar,   // $
    Amp,      // &
    LParen,   // (
    RParen,   // )
    Spread,   // ...
    Colon,    // :
    Eq,       // =
    At,       // @
    LBracket, // [
    RBracket, // ]
    LCurly,   // {
    RCurly,   // }
    Pipe,     // |
    Comment,
    Whitespace,
    Newline,
    Comma,
    Illegal,
    Eof,
}

impl TokenKind {
    /// Tokens the validators and statement splitter operate on.
    pub fn is_significant(&self) -> bool {
        !matches!(
            self,
            TokenKind::Comment
                | TokenKind::Whitespace
                | TokenKind::Newline
                | TokenKind::Comma
                | TokenKind::Eof
        )
    }
}
