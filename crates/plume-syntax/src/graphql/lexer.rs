use super::token_kind::{Keyword, TokenKind};
use crate::cursor::Cursor;
use crate::token::{Literal, Token};

/// Lexes a GraphQL document into a flat token sequence terminated by a
/// synthetic end-of-input token.
///
/// Follows the October 2021 lexical grammar. Whitespace, newlines and
/// insignificant commas are emitted as dedicated tokens; lexical errors are
/// in-band [`TokenKind::Illegal`] tokens and the lexer never aborts.
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
        ',' => token(cursor, TokenKind::Comma, start, line, column),
        '#' => {
            cursor.eat_while(|c| c != '\n');
            token(cursor, TokenKind::Comment, start, line, column)
        }
        '"' => string(cursor, start, line, column),
        '.' => spread(cursor, start, line, column),
        '-' => number(cursor, start, line, column),
        c if c.is_ascii_digit() => number(cursor, start, line, column),
        c if is_name_start(c) => name(cursor, start, line, column),
        c => match punctuator(c) {
            Some(kind) => token(cursor, kind, start, line, column),
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

fn punctuator(c: char) -> Option<TokenKind> {
    let kind = match c {
        '!' => TokenKind::Bang,
        '$' => TokenKind::Dollar,
        '&' => TokenKind::Amp,
        '(' => TokenKind::LParen,
        ')' => TokenKind::RParen,
        ':' => TokenKind::Colon,
        '=' => TokenKind::Eq,
        '@' => TokenKind::At,
        '[' => TokenKind::LBracket,
        ']' => TokenKind::RBracket,
        '{' => TokenKind::LCurly,
        '}' => TokenKind::RCurly,
        '|' => TokenKind::Pipe,
        _ => return None,
    };
    Some(kind)
}

/// `...` — anything shorter is an illegal token covering what was scanned.
fn spread(cursor: &mut Cursor<'_>, start: usize, line: u32, column: u32) -> Token<TokenKind> {
    if cursor.first() == Some('.') && cursor.second() == Some('.') {
        cursor.bump();
        cursor.bump();
        token(cursor, TokenKind::Spread, start, line, column)
    } else {
        cursor.eat_while(|c| c == '.');
        token(cursor, TokenKind::Illegal, start, line, column)
    }
}

fn name(cursor: &mut Cursor<'_>, start: usize, line: u32, column: u32) -> Token<TokenKind> {
    cursor.eat_while(is_name_continue);
    let text = cursor.slice(start, cursor.offset());
    match Keyword::from_name(text) {
        Some(keyword) => {
            let tok = token(cursor, TokenKind::Keyword(keyword), start, line, column);
            match keyword {
                Keyword::True => tok.with_literal(Literal::Bool(true)),
                Keyword::False => tok.with_literal(Literal::Bool(false)),
                _ => tok,
            }
        }
        None => token(cursor, TokenKind::Name, start, line, column),
    }
}

/// IntValue / FloatValue: optional minus, integer part with no leading
/// zeros, optional fraction, optional exponent.
fn number(cursor: &mut Cursor<'_>, start: usize, line: u32, column: u32) -> Token<TokenKind> {
    let leading_minus = cursor.slice(start, cursor.offset()) == "-";
    if leading_minus {
        if !cursor.first().is_some_and(|c| c.is_ascii_digit()) {
            return token(cursor, TokenKind::Illegal, start, line, column);
        }
        cursor.bump();
    }

    let int_start = cursor.slice(start, cursor.offset());
    let first_digit = int_start.chars().last().unwrap_or('0');
    if first_digit == '0' && cursor.first().is_some_and(|c| c.is_ascii_digit()) {
        // Leading zeros are not permitted; consume the run so the error
        // covers the whole malformed number.
        cursor.eat_while(|c| c.is_ascii_digit());
        return token(cursor, TokenKind::Illegal, start, line, column);
    }
    cursor.eat_while(|c| c.is_ascii_digit());

    let mut is_float = false;

    if cursor.first() == Some('.') {
        if !cursor.second().is_some_and(|c| c.is_ascii_digit()) {
            cursor.bump();
            return token(cursor, TokenKind::Illegal, start, line, column);
        }
        cursor.bump();
        cursor.eat_while(|c| c.is_ascii_digit());
        is_float = true;
    }

    if matches!(cursor.first(), Some('e' | 'E')) {
        cursor.bump();
        if matches!(cursor.first(), Some('+' | '-')) {
            cursor.bump();
        }
        if !cursor.first().is_some_and(|c| c.is_ascii_digit()) {
            return token(cursor, TokenKind::Illegal, start, line, column);
        }
        cursor.eat_while(|c| c.is_ascii_digit());
        is_float = true;
    }

    let kind = if is_float {
        TokenKind::Float
    } else {
        TokenKind::Int
    };
    let tok = token(cursor, kind, start, line, column);
    match tok.text().parse::<f64>() {
        Ok(value) => tok.with_literal(Literal::Number(value)),
        Err(_) => tok,
    }
}

/// `"..."` strings and `"""..."""` block strings. The opening quote has
/// already been consumed.
fn string(cursor: &mut Cursor<'_>, start: usize, line: u32, column: u32) -> Token<TokenKind> {
    if cursor.first() == Some('"') {
        if cursor.second() == Some('"') {
            cursor.bump();
            cursor.bump();
            return block_string(cursor, start, line, column);
        }
        // Empty string.
        cursor.bump();
        return token(cursor, TokenKind::StringValue, start, line, column)
            .with_literal(Literal::Str(String::new()));
    }

    let mut decoded = String::new();
    loop {
        match cursor.first() {
            None | Some('\n') => {
                return token(cursor, TokenKind::Illegal, start, line, column);
            }
            Some('"') => {
                cursor.bump();
                return token(cursor, TokenKind::StringValue, start, line, column)
                    .with_literal(Literal::Str(decoded));
            }
            Some('\\') => {
                cursor.bump();
                match cursor.first() {
                    Some('n') => {
                        decoded.push('\n');
                        cursor.bump();
                    }
                    Some('t') => {
                        decoded.push('\t');
                        cursor.bump();
                    }
                    Some('r') => {
                        decoded.push('\r');
                        cursor.bump();
                    }
                    Some('b') => {
                        decoded.push('\u{0008}');
                        cursor.bump();
                    }
                    Some('f') => {
                        decoded.push('\u{000C}');
                        cursor.bump();
                    }
                    Some('"') => {
                        decoded.push('"');
                        cursor.bump();
                    }
                    Some('\\') => {
                        decoded.push('\\');
                        cursor.bump();
                    }
                    Some('/') => {
                        decoded.push('/');
                        cursor.bump();
                    }
                    Some('u') => {
                        cursor.bump();
                        if let Some(c) = unicode_escape(cursor) {
                            decoded.push(c);
                        }
                    }
                    // A backslash cannot escape the end of the line; the
                    // string is unterminated just like an unescaped newline.
                    None | Some('\n') => {
                        return token(cursor, TokenKind::Illegal, start, line, column)
                    }
                    Some(other) => {
                        decoded.push('\\');
                        decoded.push(other);
                        cursor.bump();
                    }
                }
            }
            Some(c) => {
                decoded.push(c);
                cursor.bump();
            }
        }
    }
}

/// `"""..."""`, may span lines; `\"""` escapes a quote run. Unterminated
/// block strings are illegal tokens covering everything scanned.
fn block_string(cursor: &mut Cursor<'_>, start: usize, line: u32, column: u32) -> Token<TokenKind> {
    let mut decoded = String::new();
    loop {
        match cursor.first() {
            None => return token(cursor, TokenKind::Illegal, start, line, column),
            Some('"') if cursor.second() == Some('"') => {
                let mut probe = cursor.clone();
                probe.bump();
                probe.bump();
                if probe.first() == Some('"') {
                    cursor.bump();
                    cursor.bump();
                    cursor.bump();
                    return token(cursor, TokenKind::BlockString, start, line, column)
                        .with_literal(Literal::Str(decoded));
                }
                decoded.push('"');
                cursor.bump();
            }
            Some('\\') if is_escaped_triple_quote(cursor) => {
                cursor.bump();
                cursor.bump();
                cursor.bump();
                cursor.bump();
                decoded.push_str("\"\"\"");
            }
            Some(c) => {
                decoded.push(c);
                cursor.bump();
            }
        }
    }
}

fn is_escaped_triple_quote(cursor: &Cursor<'_>) -> bool {
    let mut probe = cursor.clone();
    probe.bump(); // the backslash
    if probe.first() != Some('"') || probe.second() != Some('"') {
        return false;
    }
    probe.bump();
    probe.bump();
    probe.first() == Some('"')
}

/// `\uXXXX` — four hex digits. Malformed escapes decode to nothing; the
/// token text still covers the raw characters.
fn unicode_escape(cursor: &mut Cursor<'_>) -> Option<char> {
    let mut value: u32 = 0;
    for _ in 0..4 {
        let digit = cursor.first()?.to_digit(16)?;
        value = value * 16 + digit;
        cursor.bump();
    }
    char::from_u32(value)
}

fn is_inline_whitespace(c: char) -> bool {
    c == ' ' || c == '\t' || c == '\r' || c == '\u{FEFF}'
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn covers_the_full_input() {
        let input = "query GetUsers($id: ID!) {\n  users(id: $id) { name }\n}\n";
        let tokens = lex(input);
        let mut offset = 0;
        for token in &tokens {
            assert_eq!(token.start_offset(), offset);
            offset = token.end_offset();
        }
        assert_eq!(offset, input.len());
        let rejoined: String = tokens.iter().map(|t| t.text()).collect();
        assert_eq!(rejoined, input);
    }

    #[test]
    fn keywords_are_case_sensitive() {
        let tokens = lex("query Query");
        assert_eq!(*tokens[0].kind(), TokenKind::Keyword(Keyword::Query));
        assert_eq!(*tokens[2].kind(), TokenKind::Name);
    }

    #[test]
    fn commas_are_dedicated_tokens() {
        let tokens = lex("a, b");
        assert_eq!(*tokens[1].kind(), TokenKind::Comma);
    }

    #[test]
    fn spread_operator() {
        let tokens = lex("...frag ..");
        assert_eq!(*tokens[0].kind(), TokenKind::Spread);
        assert_eq!(*tokens[3].kind(), TokenKind::Illegal);
        assert_eq!(tokens[3].text(), "..");
    }

    #[test]
    fn int_and_float_values() {
        let tokens = lex("0 -17 4.5 1e10 6.02e-23");
        assert_eq!(*tokens[0].kind(), TokenKind::Int);
        assert_eq!(*tokens[2].kind(), TokenKind::Int);
        assert_eq!(tokens[2].text(), "-17");
        assert_eq!(tokens[2].literal(), Some(&Literal::Number(-17.0)));
        assert_eq!(*tokens[4].kind(), TokenKind::Float);
        assert_eq!(*tokens[6].kind(), TokenKind::Float);
        assert_eq!(*tokens[8].kind(), TokenKind::Float);
        assert_eq!(tokens[8].literal(), Some(&Literal::Number(6.02e-23)));
    }

    #[test]
    fn leading_zeros_are_illegal() {
        let tokens = lex("017");
        assert_eq!(*tokens[0].kind(), TokenKind::Illegal);
        assert_eq!(tokens[0].text(), "017");
    }

    #[test]
    fn string_with_unicode_escape() {
        let tokens = lex(r#""h\u00e9llo""#);
        assert_eq!(*tokens[0].kind(), TokenKind::StringValue);
        assert_eq!(
            tokens[0].literal(),
            Some(&Literal::Str("h\u{00e9}llo".to_string()))
        );
    }

    #[test]
    fn unterminated_string_is_illegal() {
        let tokens = lex("\"abc\n{");
        assert_eq!(*tokens[0].kind(), TokenKind::Illegal);
        assert_eq!(tokens[0].text(), "\"abc");
    }

    #[test]
    fn backslash_before_newline_does_not_continue_the_string() {
        let tokens = lex("\"ab\\\n{");
        assert_eq!(*tokens[0].kind(), TokenKind::Illegal);
        assert_eq!(tokens[0].text(), "\"ab\\");
        assert_eq!(*tokens[1].kind(), TokenKind::Newline);
        assert_eq!(*tokens[2].kind(), TokenKind::LCurly);
    }

    #[test]
    fn block_string_spans_lines() {
        let input = "\"\"\"first\nsecond\"\"\" x";
        let tokens = lex(input);
        assert_eq!(*tokens[0].kind(), TokenKind::BlockString);
        assert_eq!(
            tokens[0].literal(),
            Some(&Literal::Str("first\nsecond".to_string()))
        );
        // Line counter advanced inside the block string.
        let x = tokens.iter().find(|t| t.text() == "x").unwrap();
        assert_eq!(x.line(), 2);
    }

    #[test]
    fn unterminated_block_string_is_illegal() {
        let tokens = lex("\"\"\"abc");
        assert_eq!(*tokens[0].kind(), TokenKind::Illegal);
        assert_eq!(tokens[0].text(), "\"\"\"abc");
    }

    #[test]
    fn empty_string_value() {
        let tokens = lex(r#""""#);
        assert_eq!(*tokens[0].kind(), TokenKind::StringValue);
        assert_eq!(tokens[0].literal(), Some(&Literal::Str(String::new())));
    }

    #[test]
    fn columns_are_one_based_at_first_character() {
        let tokens = lex("{\n  name\n}");
        let name = tokens.iter().find(|t| t.text() == "name").unwrap();
        assert_eq!(name.line(), 2);
        assert_eq!(name.column(), 3);
    }
}
