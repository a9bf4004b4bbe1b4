//! Hand-written lexer for the datalog grammar.
//!
//! Dates are recognized lexically: an integer of exactly four digits
//! followed by `-` switches to RFC 3339 parsing. Byte strings use the
//! `hex:` prefix, and third-party keys in `trusting` clauses lex as a
//! single `algorithm/hex` token.

use crate::crypto::{Algorithm, PublicKey};
use crate::error::ParseError;

/// One lexical token.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Token {
    Ident(String),
    Variable(String),
    Str(String),
    Integer(i64),
    Date(u64),
    Bytes(Vec<u8>),
    Key(PublicKey),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Colon,
    Arrow,        // <-
    ClosureArrow, // ->
    Lt,
    Gt,
    Le,
    Ge,
    HeterogeneousEq,  // ==
    HeterogeneousNeq, // !=
    StrictEq,         // ===
    StrictNeq,        // !==
    Plus,
    Minus,
    Star,
    Slash,
    Amp,
    Pipe,
    Caret,
    AmpAmp,
    PipePipe,
    Bang,
    Dot,
}

/// A token plus the byte offset it started at.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Spanned {
    pub token: Token,
    pub position: usize,
}

pub(super) fn lex(source: &str) -> Result<Vec<Spanned>, ParseError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let start = i;
        let c = bytes[i];
        match c {
            b' ' | b'\t' | b'\r' | b'\n' => {
                i += 1;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                loop {
                    if i + 1 >= bytes.len() {
                        return Err(ParseError::UnexpectedEndOfCode);
                    }
                    if bytes[i] == b'*' && bytes[i + 1] == b'/' {
                        i += 2;
                        break;
                    }
                    i += 1;
                }
            }
            b'(' => push(&mut tokens, Token::LParen, start, &mut i),
            b')' => push(&mut tokens, Token::RParen, start, &mut i),
            b'[' => push(&mut tokens, Token::LBracket, start, &mut i),
            b']' => push(&mut tokens, Token::RBracket, start, &mut i),
            b'{' => push(&mut tokens, Token::LBrace, start, &mut i),
            b'}' => push(&mut tokens, Token::RBrace, start, &mut i),
            b',' => push(&mut tokens, Token::Comma, start, &mut i),
            b';' => push(&mut tokens, Token::Semicolon, start, &mut i),
            b':' => push(&mut tokens, Token::Colon, start, &mut i),
            b'.' => push(&mut tokens, Token::Dot, start, &mut i),
            b'+' => push(&mut tokens, Token::Plus, start, &mut i),
            b'*' => push(&mut tokens, Token::Star, start, &mut i),
            b'/' => push(&mut tokens, Token::Slash, start, &mut i),
            b'^' => push(&mut tokens, Token::Caret, start, &mut i),
            b'-' => {
                if bytes.get(i + 1) == Some(&b'>') {
                    i += 2;
                    tokens.push(Spanned {
                        token: Token::ClosureArrow,
                        position: start,
                    });
                } else {
                    push(&mut tokens, Token::Minus, start, &mut i);
                }
            }
            b'<' => {
                if bytes.get(i + 1) == Some(&b'-') {
                    i += 2;
                    tokens.push(Spanned {
                        token: Token::Arrow,
                        position: start,
                    });
                } else if bytes.get(i + 1) == Some(&b'=') {
                    i += 2;
                    tokens.push(Spanned {
                        token: Token::Le,
                        position: start,
                    });
                } else {
                    push(&mut tokens, Token::Lt, start, &mut i);
                }
            }
            b'>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    i += 2;
                    tokens.push(Spanned {
                        token: Token::Ge,
                        position: start,
                    });
                } else {
                    push(&mut tokens, Token::Gt, start, &mut i);
                }
            }
            b'=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    if bytes.get(i + 2) == Some(&b'=') {
                        i += 3;
                        tokens.push(Spanned {
                            token: Token::StrictEq,
                            position: start,
                        });
                    } else {
                        i += 2;
                        tokens.push(Spanned {
                            token: Token::HeterogeneousEq,
                            position: start,
                        });
                    }
                } else {
                    return Err(ParseError::ErrorInLexing { position: start });
                }
            }
            b'!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    if bytes.get(i + 2) == Some(&b'=') {
                        i += 3;
                        tokens.push(Spanned {
                            token: Token::StrictNeq,
                            position: start,
                        });
                    } else {
                        i += 2;
                        tokens.push(Spanned {
                            token: Token::HeterogeneousNeq,
                            position: start,
                        });
                    }
                } else {
                    push(&mut tokens, Token::Bang, start, &mut i);
                }
            }
            b'&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    i += 2;
                    tokens.push(Spanned {
                        token: Token::AmpAmp,
                        position: start,
                    });
                } else {
                    push(&mut tokens, Token::Amp, start, &mut i);
                }
            }
            b'|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    i += 2;
                    tokens.push(Spanned {
                        token: Token::PipePipe,
                        position: start,
                    });
                } else {
                    push(&mut tokens, Token::Pipe, start, &mut i);
                }
            }
            b'$' => {
                i += 1;
                let name_start = i;
                while i < bytes.len() && is_ident_char(bytes[i]) {
                    i += 1;
                }
                if i == name_start {
                    return Err(ParseError::ErrorInLexing { position: start });
                }
                tokens.push(Spanned {
                    token: Token::Variable(source[name_start..i].to_string()),
                    position: start,
                });
            }
            b'"' => {
                let (string, consumed) = lex_string(&source[i..], start)?;
                i += consumed;
                tokens.push(Spanned {
                    token: Token::Str(string),
                    position: start,
                });
            }
            b'0'..=b'9' => {
                let digits_start = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                let digits = i - digits_start;
                if digits == 4 && bytes.get(i) == Some(&b'-') {
                    // RFC 3339 date: consume until a delimiter
                    while i < bytes.len() && !is_delimiter(bytes[i]) {
                        i += 1;
                    }
                    let date = chrono::DateTime::parse_from_rfc3339(&source[digits_start..i])
                        .map_err(|_| ParseError::ErrorInLexing { position: start })?;
                    let timestamp = date.timestamp();
                    if timestamp < 0 {
                        return Err(ParseError::ErrorInLexing { position: start });
                    }
                    tokens.push(Spanned {
                        token: Token::Date(timestamp as u64),
                        position: start,
                    });
                } else {
                    let value: i64 = source[digits_start..i]
                        .parse()
                        .map_err(|_| ParseError::ErrorInLexing { position: start })?;
                    tokens.push(Spanned {
                        token: Token::Integer(value),
                        position: start,
                    });
                }
            }
            c if is_ident_start(c) => {
                while i < bytes.len() && is_ident_char(bytes[i]) {
                    i += 1;
                }
                let ident = &source[start..i];
                match ident {
                    "hex" if bytes.get(i) == Some(&b':') => {
                        i += 1;
                        let hex_start = i;
                        while i < bytes.len() && bytes[i].is_ascii_hexdigit() {
                            i += 1;
                        }
                        let data = hex::decode(&source[hex_start..i])
                            .map_err(|_| ParseError::InvalidHexData)?;
                        tokens.push(Spanned {
                            token: Token::Bytes(data),
                            position: start,
                        });
                    }
                    "ed25519" | "secp256r1" if bytes.get(i) == Some(&b'/') => {
                        let algorithm = if ident == "ed25519" {
                            Algorithm::Ed25519
                        } else {
                            Algorithm::Secp256r1
                        };
                        i += 1;
                        let hex_start = i;
                        while i < bytes.len() && bytes[i].is_ascii_hexdigit() {
                            i += 1;
                        }
                        let data = hex::decode(&source[hex_start..i])
                            .map_err(|_| ParseError::InvalidHexData)?;
                        let key = PublicKey::from_bytes(&data, algorithm)
                            .map_err(|_| ParseError::UnknownScope(ident.to_string()))?;
                        tokens.push(Spanned {
                            token: Token::Key(key),
                            position: start,
                        });
                    }
                    _ => tokens.push(Spanned {
                        token: Token::Ident(ident.to_string()),
                        position: start,
                    }),
                }
            }
            _ => return Err(ParseError::ErrorInLexing { position: start }),
        }
    }
    Ok(tokens)
}

fn push(tokens: &mut Vec<Spanned>, token: Token, position: usize, i: &mut usize) {
    *i += 1;
    tokens.push(Spanned { token, position });
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

fn is_delimiter(c: u8) -> bool {
    matches!(
        c,
        b' ' | b'\t' | b'\r' | b'\n' | b',' | b';' | b')' | b']' | b'}'
    )
}

/// Lex a quoted string with escapes; returns the string and bytes consumed.
fn lex_string(source: &str, position: usize) -> Result<(String, usize), ParseError> {
    let bytes = source.as_bytes();
    debug_assert_eq!(bytes[0], b'"');
    let mut result = String::new();
    let mut i = 1;
    loop {
        if i >= bytes.len() {
            return Err(ParseError::UnexpectedEndOfCode);
        }
        match bytes[i] {
            b'"' => return Ok((result, i + 1)),
            b'\\' => {
                i += 1;
                match bytes.get(i) {
                    Some(b'n') => result.push('\n'),
                    Some(b'r') => result.push('\r'),
                    Some(b't') => result.push('\t'),
                    Some(b'\\') => result.push('\\'),
                    Some(b'"') => result.push('"'),
                    Some(b'0') => result.push('\0'),
                    _ => return Err(ParseError::ErrorInLexing { position }),
                }
                i += 1;
            }
            _ => {
                // take the full UTF-8 scalar, not just one byte
                let rest = &source[i..];
                let c = rest.chars().next().ok_or(ParseError::UnexpectedEndOfCode)?;
                result.push(c);
                i += c.len_utf8();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        lex(source).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn lexes_a_fact() {
        assert_eq!(
            kinds("user(1234);"),
            vec![
                Token::Ident("user".to_string()),
                Token::LParen,
                Token::Integer(1234),
                Token::RParen,
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn lexes_operators_greedily() {
        assert_eq!(
            kinds("<- -> <= == === != !== && ||"),
            vec![
                Token::Arrow,
                Token::ClosureArrow,
                Token::Le,
                Token::HeterogeneousEq,
                Token::StrictEq,
                Token::HeterogeneousNeq,
                Token::StrictNeq,
                Token::AmpAmp,
                Token::PipePipe,
            ]
        );
    }

    #[test]
    fn lexes_dates_and_bytes() {
        assert_eq!(
            kinds("2019-12-04T09:46:41Z"),
            vec![Token::Date(1575452801)]
        );
        assert_eq!(kinds("hex:ab01"), vec![Token::Bytes(vec![0xab, 0x01])]);
        assert_eq!(lex("hex:zz"), Err(ParseError::InvalidHexData));
    }

    #[test]
    fn lexes_strings_with_escapes() {
        assert_eq!(
            kinds(r#""a\"b\n""#),
            vec![Token::Str("a\"b\n".to_string())]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("// note\nuser /* inline */ (1)"),
            vec![
                Token::Ident("user".to_string()),
                Token::LParen,
                Token::Integer(1),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn stray_characters_error_with_position() {
        assert_eq!(lex("user(#)"), Err(ParseError::ErrorInLexing { position: 5 }));
    }
}
