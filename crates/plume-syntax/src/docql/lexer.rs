use super::token_kind::{Keyword, Operator, TokenKind};
use crate::cursor::Cursor;
use crate::token::{Literal, Token};

/// Lexes a DocQL document into a flat token sequence terminated by a
/// synthetic end-of-input token.
///
/// The lexer is total and failure-free: every character of the input is
/// covered by exactly one token, and lexical errors are reported in-band as
/// [`TokenKind::Illegal`] tokens.
pub fn lex(input: &str) -> Vec<Token<TokenKind>> {
    let mut cursor = Cursor::new(input);
    let mut tokens = Vec::new();

    while !cursor.is_eof() {
        tokens.push(next_token(&mut cursor));
    }

    tokens.push(Token::new(
        TokenKind::Eof,
        "",
        cursor.line(),
        cursor.column(),
        input.len(),
        input.len(),
    ));
    tokens
}

fn next_token(cursor: &mut Cursor<'_>) -> Token<TokenKind> {
    let start = cursor.offset();
    let line = cursor.line();
    let column = cursor.column();

    let Some(first) = cursor.bump() else {
        return Token::new(TokenKind::Eof, "", line, column, start, start);
    };

    match first {
        '\n' => token(cursor, TokenKind::Newline, start, line, column),
        c if is_inline_whitespace(c) => {
            cursor.eat_while(is_inline_whitespace);
            token(cursor, TokenKind::Whitespace, start, line, column)
        }
        '-' if cursor.first() == Some('-') => {
            cursor.eat_while(|c| c != '\n');
            token(cursor, TokenKind::Comment, start, line, column)
        }
        '/' if cursor.first() == Some('/') => {
            cursor.eat_while(|c| c != '\n');
            token(cursor, TokenKind::Comment, start, line, column)
        }
        '/' if cursor.first() == Some('*') => {
            cursor.bump();
            block_comment(cursor, start, line, column)
        }
        quote @ ('"' | '\'') => string(cursor, quote, start, line, column),
        c if c.is_ascii_digit() => number(cursor, start, line, column),
        c if is_ident_start(c) => ident(cursor, start, line, column),
        c => match operator(cursor, c) {
            Some(op) => token(cursor, TokenKind::Operator(op), start, line, column),
            None => token(cursor, TokenKind::Illegal, start, line, column),
        },
    }
}

fn token(
    cursor: &Cursor<'_>,
    kind: TokenKind,
    start: usize,
    line: u32,
    column: u32,
) -> Token<TokenKind> {
    let end = cursor.offset();
    Token::new(kind, cursor.slice(start, end), line, column, start, end)
}

/// `/* ... */`, non-nested, may span lines. An unclosed comment runs to the
/// end of input rather than erroring.
fn block_comment(cursor: &mut Cursor<'_>, start: usize, line: u32, column: u32) -> Token<TokenKind> {
    while let Some(c) = cursor.bump() {
        if c == '*' && cursor.eatc('/') {
            break;
        }
    }
    token(cursor, TokenKind::Comment, start, line, column)
}

/// `"..."` or `'...'` with backslash escapes. A newline or end-of-input
/// before the closing quote yields an illegal token covering everything
/// scanned so far.
fn string(
    cursor: &mut Cursor<'_>,
    quote: char,
    start: usize,
    line: u32,
    column: u32,
) -> Token<TokenKind> {
    let mut decoded = String::new();

    loop {
        match cursor.first() {
            None | Some('\n') => {
                return token(cursor, TokenKind::Illegal, start, line, column);
            }
            Some(c) if c == quote => {
                cursor.bump();
                return token(cursor, TokenKind::String, start, line, column)
                    .with_literal(Literal::Str(decoded));
            }
            Some('\\') => {
                cursor.bump();
                match cursor.first() {
                    Some('n') => decoded.push('\n'),
                    Some('t') => decoded.push('\t'),
                    Some('r') => decoded.push('\r'),
                    Some('\\') => decoded.push('\\'),
                    Some('"') => decoded.push('"'),
                    Some('\'') => decoded.push('\''),
                    // A backslash cannot escape the end of the line; the
                    // string is unterminated just like an unescaped newline.
                    None | Some('\n') => {
                        return token(cursor, TokenKind::Illegal, start, line, column)
                    }
                    Some(other) => {
                        // Unknown escape: keep both characters verbatim.
                        decoded.push('\\');
                        decoded.push(other);
                    }
                }
                cursor.bump();
            }
            Some(c) => {
                decoded.push(c);
                cursor.bump();
            }
        }
    }
}

/// Integer with an optional fractional part. The dot is consumed only when
/// followed by a digit; a leading minus is never part of the token.
fn number(cursor: &mut Cursor<'_>, start: usize, line: u32, column: u32) -> Token<TokenKind> {
    cursor.eat_while(|c| c.is_ascii_digit());
    if cursor.first() == Some('.') && cursor.second().is_some_and(|c| c.is_ascii_digit()) {
        cursor.bump();
        cursor.eat_while(|c| c.is_ascii_digit());
    }
    let tok = token(cursor, TokenKind::Number, start, line, column);
    match tok.text().parse::<f64>() {
        Ok(value) => tok.with_literal(Literal::Number(value)),
        Err(_) => tok,
    }
}

fn ident(cursor: &mut Cursor<'_>, start: usize, line: u32, column: u32) -> Token<TokenKind> {
    cursor.eat_while(is_ident_continue);
    let text = cursor.slice(start, cursor.offset());
    match Keyword::from_ident(text) {
        Some(keyword) => {
            let tok = token(cursor, TokenKind::Keyword(keyword), start, line, column);
            match keyword {
                Keyword::True => tok.with_literal(Literal::Bool(true)),
                Keyword::False => tok.with_literal(Literal::Bool(false)),
                _ => tok,
            }
        }
        None => token(cursor, TokenKind::Identifier, start, line, column),
    }
}

/// Single- and two-character operators with maximal munch.
fn operator(cursor: &mut Cursor<'_>, first: char) -> Option<Operator> {
    let op = match first {
        '=' => {
            if cursor.eatc('=') {
                Operator::Eq
            } else {
                Operator::Assign
            }
        }
        '!' => {
            if cursor.eatc('=') {
                Operator::Neq
            } else {
                return None;
            }
        }
        '<' => {
            if cursor.eatc('=') {
                Operator::Lte
            } else {
                Operator::Lt
            }
        }
        '>' => {
            if cursor.eatc('=') {
                Operator::Gte
            } else {
                Operator::Gt
            }
        }
        '+' => Operator::Plus,
        '-' => Operator::Minus,
        '*' => Operator::Star,
        '/' => Operator::Slash,
        '(' => Operator::LParen,
        ')' => Operator::RParen,
        '{' => Operator::LBrace,
        '}' => Operator::RBrace,
        '[' => Operator::LBracket,
        ']' => Operator::RBracket,
        ',' => Operator::Comma,
        ';' => Operator::Semicolon,
        '.' => Operator::Dot,
        ':' => Operator::Colon,
        _ => return None,
    };
    Some(op)
}

fn is_inline_whitespace(c: char) -> bool {
    c == ' ' || c == '\t' || c == '\r'
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
