//! Hand-rolled tokenizer for the restricted OData `$filter` subset
//! (spec.md §4.3).

use crate::error::{ApiError, FieldError};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    String(String),
    Number(f64),
    GeoLiteral(f64, f64),
    And,
    Or,
    Not,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    True,
    False,
    Null,
    LParen,
    RParen,
    Comma,
    Colon,
    Slash,
    Eof,
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, ApiError> {
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    let mut tokens = Vec::new();

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '\'' => {
                i += 1;
                let mut s = String::new();
                loop {
                    if i >= chars.len() {
                        return Err(filter_parse_error("unterminated string literal"));
                    }
                    if chars[i] == '\'' {
                        if i + 1 < chars.len() && chars[i + 1] == '\'' {
                            s.push('\'');
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    s.push(chars[i]);
                    i += 1;
                }
                tokens.push(Token::String(s));
            }
            c if c.is_ascii_digit() || (c == '-' && peek_is_digit(&chars, i + 1)) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n: f64 = text
                    .parse()
                    .map_err(|_| filter_parse_error(format!("invalid numeric literal '{text}'")))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();

                if word == "geography" && i < chars.len() && chars[i] == '\'' {
                    i += 1;
                    let lit_start = i;
                    while i < chars.len() && chars[i] != '\'' {
                        i += 1;
                    }
                    let literal: String = chars[lit_start..i].iter().collect();
                    if i < chars.len() {
                        i += 1;
                    }
                    let (lon, lat) = parse_point_literal(&literal)?;
                    tokens.push(Token::GeoLiteral(lon, lat));
                    continue;
                }

                match word.as_str() {
                    "and" => tokens.push(Token::And),
                    "or" => tokens.push(Token::Or),
                    "not" => tokens.push(Token::Not),
                    "eq" => tokens.push(Token::Eq),
                    "ne" => tokens.push(Token::Ne),
                    "gt" => tokens.push(Token::Gt),
                    "ge" => tokens.push(Token::Ge),
                    "lt" => tokens.push(Token::Lt),
                    "le" => tokens.push(Token::Le),
                    "true" => tokens.push(Token::True),
                    "false" => tokens.push(Token::False),
                    "null" => tokens.push(Token::Null),
                    _ => tokens.push(Token::Ident(word)),
                }
            }
            other => {
                return Err(filter_parse_error(format!("unexpected character '{other}'")));
            }
        }
    }
    tokens.push(Token::Eof);
    Ok(tokens)
}

fn peek_is_digit(chars: &[char], idx: usize) -> bool {
    chars.get(idx).map(|c| c.is_ascii_digit()).unwrap_or(false)
}

/// Parses `POINT(lon lat)` out of a `geography'...'` literal.
fn parse_point_literal(literal: &str) -> Result<(f64, f64), ApiError> {
    let inner = literal
        .trim()
        .strip_prefix("POINT(")
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| filter_parse_error(format!("malformed geography literal '{literal}'")))?;
    let mut parts = inner.split_whitespace();
    let lon: f64 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| filter_parse_error("malformed geography longitude"))?;
    let lat: f64 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| filter_parse_error("malformed geography latitude"))?;
    Ok((lon, lat))
}

pub fn filter_parse_error(message: impl Into<String>) -> ApiError {
    ApiError::validation(vec![FieldError::new("filter", message)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_simple_comparison() {
        let toks = tokenize("price gt 10").unwrap();
        assert_eq!(
            toks,
            vec![Token::Ident("price".into()), Token::Gt, Token::Number(10.0), Token::Eof]
        );
    }

    #[test]
    fn handles_escaped_quote_in_string() {
        let toks = tokenize("name eq 'O''Brien'").unwrap();
        assert_eq!(toks[2], Token::String("O'Brien".to_string()));
    }

    #[test]
    fn parses_geography_literal() {
        let toks = tokenize("geo.distance(location, geography'POINT(-122.1 47.6)') le 5").unwrap();
        assert!(toks.contains(&Token::GeoLiteral(-122.1, 47.6)));
    }
}
