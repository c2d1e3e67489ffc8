use serde::{Deserialize, Serialize};

/// DocQL keywords, folded case-insensitively from identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Keyword {
    Create,
    Alter,
    Drop,
    Select,
    Insert,
    Update,
    Delete,
    Database,
    Bundle,
    Field,
    Document,
    User,
    Index,
    From,
    Where,
    Set,
    Values,
    Into,
    To,
    Add,
    Grant,
    Revoke,
    On,
    Migration,
    Apply,
    Validate,
    Rollback,
    Use,
    Show,
    As,
    And,
    Or,
    Not,
    Null,
    True,
    False,
    Unique,
    Nullable,
    Primary,
    Default,
    References,
    Order,
    Group,
    By,
    Limit,
    Offset,
    Asc,
    Desc,
    With,
    Type,
    Text,
    Number,
    Boolean,
    Date,
    Json,
}

impl Keyword {
    /// Case-insensitive keyword lookup, `None` for plain identifiers.
    pub fn from_ident(ident: &str) -> Option<Keyword> {
        let folded = ident.to_ascii_uppercase();
        let keyword = match folded.as_str() {
            "CREATE" => Keyword::Create,
            "ALTER" => Keyword::Alter,
            "DROP" => Keyword::Drop,
            "SELECT" => Keyword::Select,
            "INSERT" => Keyword::Insert,
            "UPDATE" => Keyword::Update,
            "DELETE" => Keyword::Delete,
            "DATABASE" => Keyword::Database,
            "BUNDLE" => Keyword::Bundle,
            "FIELD" => Keyword::Field,
            "DOCUMENT" => Keyword::Document,
            "USER" => Keyword::User,
            "INDEX" => Keyword::Index,
            "FROM" => Keyword::From,
            "WHERE" => Keyword::Where,
            "SET" => Keyword::Set,
            "VALUES" => Keyword::Values,
            "INTO" => Keyword::Into,
            "TO" => Keyword::To,
            "ADD" => Keyword::Add,
            "GRANT" => Keyword::Grant,
            "REVOKE" => Keyword::Revoke,
            "ON" => Keyword::On,
            "MIGRATION" => Keyword::Migration,
            "APPLY" => Keyword::Apply,
            "VALIDATE" => Keyword::Validate,
            "ROLLBACK" => Keyword::Rollback,
            "USE" => Keyword::Use,
            "SHOW" => Keyword::Show,
            "AS" => Keyword::As,
            "AND" => Keyword::And,
            "OR" => Keyword::Or,
            "NOT" => Keyword::Not,
            "NULL" => Keyword::Null,
            "TRUE" => Keyword::True,
            "FALSE" => Keyword::False,
            "UNIQUE" => Keyword::Unique,
            "NULLABLE" => Keyword::Nullable,
            "PRIMARY" => Keyword::Primary,
            "DEFAULT" => Keyword::Default,
            "REFERENCES" => Keyword::References,
            "ORDER" => Keyword::Order,
            "GROUP" => Keyword::Group,
            "BY" => Keyword::By,
            "LIMIT" => Keyword::Limit,
            "OFFSET" => Keyword::Offset,
            "ASC" => Keyword::Asc,
            "DESC" => Keyword::Desc,
            "WITH" => Keyword::With,
            "TYPE" => Keyword::Type,
            "TEXT" => Keyword::Text,
            "NUMBER" => Keyword::Number,
            "BOOLEAN" => Keyword::Boolean,
            "DATE" => Keyword::Date,
            "JSON" => Keyword::Json,
            _ => return None,
        };
        Some(keyword)
    }

    /// Canonical display spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Create => "CREATE",
            Keyword::Alter => "ALTER",
            Keyword::Drop => "DROP",
            Keyword::Select => "SELECT",
            Keyword::Insert => "INSERT",
            Keyword::Update => "UPDATE",
            Keyword::Delete => "DELETE",
            Keyword::Database => "DATABASE",
            Keyword::Bundle => "BUNDLE",
            Keyword::Field => "FIELD",
            Keyword::Document => "DOCUMENT",
            Keyword::User => "USER",
            Keyword::Index => "INDEX",
            Keyword::From => "FROM",
            Keyword::Where => "WHERE",
            Keyword::Set => "SET",
            Keyword::Values => "VALUES",
            Keyword::Into => "INTO",
            Keyword::To => "TO",
            Keyword::Add => "ADD",
            Keyword::Grant => "GRANT",
            Keyword::Revoke => "REVOKE",
            Keyword::On => "ON",
            Keyword::Migration => "MIGRATION",
            Keyword::Apply => "APPLY",
            Keyword::Validate => "VALIDATE",
            Keyword::Rollback => "ROLLBACK",
            Keyword::Use => "USE",
            Keyword::Show => "SHOW",
            Keyword::As => "AS",
            Keyword::And => "AND",
            Keyword::Or => "OR",
            Keyword::Not => "NOT",
            Keyword::Null => "NULL",
            Keyword::True => "TRUE",
            Keyword::False => "FALSE",
            Keyword::Unique => "UNIQUE",
            Keyword::Nullable => "NULLABLE",
            Keyword::Primary => "PRIMARY",
            Keyword::Default => "DEFAULT",
            Keyword::References => "REFERENCES",
            Keyword::Order => "ORDER",
            Keyword::Group => "GROUP",
            Keyword::By => "BY",
            Keyword::Limit => "LIMIT",
            Keyword::Offset => "OFFSET",
            Keyword::Asc => "ASC",
            Keyword::Desc => "DESC",
            Keyword::With => "WITH",
            Keyword::Type => "TYPE",
            Keyword::Text => "TEXT",
            Keyword::Number => "NUMBER",
            Keyword::Boolean => "BOOLEAN",
            Keyword::Date => "DATE",
            Keyword::Json => "JSON",
        }
    }
}

/// Single- and two-character DocQL operators and punctuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Assign,    // =
    Eq,        // ==
    Neq,       // !=
    Lt,        // <
    Gt,        // >
    Lte,       // <=
    Gte,       // >=
    Plus,      // +
    Minus,     // -
    Star,      // *
    Slash,     // /
    LParen,    // (
    RParen,    // )
    LBrace,    // {
    RBrace,    // }
    LBracket,  // [
    RBracket,  // ]
    Comma,     // ,
    Semicolon, // ;
    Dot,       // .
    Colon,     // :
}

impl Operator {
    /// The operator's character form.
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Assign => "=",
            Operator::Eq => "==",
            Operator::Neq => "!=",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Lte => "<=",
            Operator::Gte => ">=",
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Star => "*",
            Operator::Slash => "/",
            Operator::LParen => "(",
            Operator::RParen => ")",
            Operator::LBrace => "{",
            Operator::RBrace => "}",
            Operator::LBracket => "[",
            Operator::RBracket => "]",
            Operator::Comma => ",",
            Operator::Semicolon => ";",
            Operator::Dot => ".",
            Operator::Colon => ":",
        }
    }

    /// Name used by `token(...)` symbols in the grammar files.
    pub fn grammar_name(&self) -> &'static str {
        match self {
            Operator::Assign => "ASSIGN",
            Operator::Eq => "EQ",
            Operator::Neq => "NEQ",
            Operator::Lt => "LT",
            Operator::Gt => "GT",
            Operator::Lte => "LTE",
            Operator::Gte => "GTE",
            Operator::Plus => "PLUS",
            Operator::Minus => "MINUS",
            Operator::Star => "STAR",
            Operator::Slash => "SLASH",
            Operator::LParen => "LPAREN",
            Operator::RParen => "RPAREN",
            Operator::LBrace => "LBRACE",
            Operator::RBrace => "RBRACE",
            Operator::LBracket => "LBRACKET",
            Operator::RBracket => "RBRACKET",
            Operator::Comma => "COMMA",
            Operator::Semicolon => "SEMICOLON",
            Operator::Dot => "DOT",
            Operator::Colon => "COLON",
        }
    }

    /// Inverse of [`grammar_name`](Self::grammar_name).
    pub fn from_grammar_name(name: &str) -> Option<Operator> {
        let op = match name {
            "ASSIGN" => Operator::Assign,
            "EQ" => Operator::Eq,
            "NEQ" => Operator::Neq,
            "LT" => Operator::Lt,
            "GT" => Operator::Gt,
            "LTE" => Operator::Lte,
            "GTE" => Operator::Gte,
            "PLUS" => Operator::Plus,
            "MINUS" => Operator::Minus,
            "STAR" => Operator::Star,
            "SLASH" => Operator::Slash,
            "LPAREN" => Operator::LParen,
            "RPAREN" => Operator::RParen,
            "LBRACE" => Operator::LBrace,
            "RBRACE" => Operator::RBrace,
            "LBRACKET" => Operator::LBracket,
            "RBRACKET" => Operator::RBracket,
            "COMMA" => Operator::Comma,
            "SEMICOLON" => Operator::Semicolon,
            "DOT" => Operator::Dot,
            "COLON" => Operator::Colon,
            _ => return None,
        };
        Some(op)
    }

    /// Comparison operators, as they appear in `WHERE` clauses.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Operator::Assign
                | Operator::Eq
                | Operator::Neq
                | Operator::Lt
                | Operator::Gt
                | Operator::Lte
                | Operator::Gte
        )
    }
}

/// The closed DocQL token kind set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    Keyword(Keyword),
    Identifier,
    String,
    Number,
    Operator(Operator),
    Comment,
    Whitespace,
    Newline,
    Illegal,
    Eof,
}

impl TokenKind {
    /// Name used by upper-case `token(...)` symbols in the grammar files.
    pub fn grammar_name(&self) -> &'static str {
        match self {
            TokenKind::Keyword(_) => "KEYWORD",
            TokenKind::Identifier => "IDENTIFIER",
            TokenKind::String => "STRING",
            TokenKind::Number => "NUMBER",
            TokenKind::Operator(op) => op.grammar_name(),
            TokenKind::Comment => "COMMENT",
            TokenKind::Whitespace => "WHITESPACE",
            TokenKind::Newline => "NEWLINE",
            TokenKind::Illegal => "ILLEGAL",
            TokenKind::Eof => "EOF",
        }
    }

    /// Tokens the grammar engine and validators operate on.
    pub fn is_significant(&self) -> bool {
        !matches!(
            self,
            TokenKind::Comment | TokenKind::Whitespace | TokenKind::Newline | TokenKind::Eof
        )
    }
}
