//! Recursive-descent parser over the filter tokenizer (spec.md §4.3).

use super::ast::{CompareOp, Expr, Literal};
use super::tokenizer::{filter_parse_error, tokenize, Token};
use crate::error::ApiError;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ApiError> {
        if self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(filter_parse_error(format!(
                "expected {expected:?}, found {:?}",
                self.peek()
            )))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ApiError> {
        match self.advance() {
            Token::Ident(name) => Ok(name),
            other => Err(filter_parse_error(format!("expected identifier, found {other:?}"))),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, ApiError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ApiError> {
        let mut left = self.parse_and()?;
        while *self.peek() == Token::Or {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ApiError> {
        let mut left = self.parse_unary()?;
        while *self.peek() == Token::And {
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ApiError> {
        if *self.peek() == Token::Not {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ApiError> {
        if *self.peek() == Token::LParen {
            self.advance();
            let inner = self.parse_expr()?;
            self.expect(&Token::RParen)?;
            return Ok(inner);
        }

        let name = self.expect_ident()?;

        if name == "search.in" {
            return self.parse_search_in();
        }
        if name == "geo.distance" {
            return self.parse_geo_distance();
        }

        if *self.peek() == Token::Slash {
            self.advance();
            let func = self.expect_ident()?;
            self.expect(&Token::LParen)?;
            if func != "any" && func != "all" {
                return Err(filter_parse_error(format!("unknown collection function '{func}'")));
            }
            if *self.peek() == Token::RParen {
                self.advance();
                if func == "all" {
                    return Err(filter_parse_error("all() requires a lambda predicate"));
                }
                return Ok(Expr::CollectionNonEmpty { field: name });
            }
            let var = self.expect_ident()?;
            self.expect(&Token::Colon)?;
            let predicate = self.parse_expr()?;
            self.expect(&Token::RParen)?;
            return Ok(if func == "any" {
                Expr::CollectionAny { field: name, var, predicate: Box::new(predicate) }
            } else {
                Expr::CollectionAll { field: name, var, predicate: Box::new(predicate) }
            });
        }

        let op = self.parse_compare_op()?;
        let value = self.parse_literal()?;
        Ok(Expr::Compare { field: name, op, value })
    }

    fn parse_compare_op(&mut self) -> Result<CompareOp, ApiError> {
        match self.advance() {
            Token::Eq => Ok(CompareOp::Eq),
            Token::Ne => Ok(CompareOp::Ne),
            Token::Gt => Ok(CompareOp::Gt),
            Token::Ge => Ok(CompareOp::Ge),
            Token::Lt => Ok(CompareOp::Lt),
            Token::Le => Ok(CompareOp::Le),
            other => Err(filter_parse_error(format!("expected comparison operator, found {other:?}"))),
        }
    }

    fn parse_literal(&mut self) -> Result<Literal, ApiError> {
        match self.advance() {
            Token::String(s) => Ok(Literal::Str(s)),
            Token::Number(n) => Ok(Literal::Num(n)),
            Token::True => Ok(Literal::Bool(true)),
            Token::False => Ok(Literal::Bool(false)),
            Token::Null => Ok(Literal::Null),
            other => Err(filter_parse_error(format!("expected literal, found {other:?}"))),
        }
    }

    fn parse_search_in(&mut self) -> Result<Expr, ApiError> {
        self.expect(&Token::LParen)?;
        let field = self.expect_ident()?;
        self.expect(&Token::Comma)?;
        let values_str = match self.advance() {
            Token::String(s) => s,
            other => return Err(filter_parse_error(format!("expected string, found {other:?}"))),
        };
        let delimiter = if *self.peek() == Token::Comma {
            self.advance();
            match self.advance() {
                Token::String(s) => s,
                other => return Err(filter_parse_error(format!("expected delimiter string, found {other:?}"))),
            }
        } else {
            ",".to_string()
        };
        self.expect(&Token::RParen)?;
        let values: Vec<String> = values_str
            .split(delimiter.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Ok(Expr::SearchIn { field, values })
    }

    fn parse_geo_distance(&mut self) -> Result<Expr, ApiError> {
        self.expect(&Token::LParen)?;
        let field = self.expect_ident()?;
        self.expect(&Token::Comma)?;
        let (lon, lat) = match self.advance() {
            Token::GeoLiteral(lon, lat) => (lon, lat),
            other => return Err(filter_parse_error(format!("expected geography literal, found {other:?}"))),
        };
        self.expect(&Token::RParen)?;
        let op = self.parse_compare_op()?;
        let km = match self.advance() {
            Token::Number(n) => n,
            other => return Err(filter_parse_error(format!("expected distance literal, found {other:?}"))),
        };
        Ok(Expr::GeoDistance { field, op, lon, lat, km })
    }
}

/// Parses a `$filter` expression string into an AST. Returns a typed
/// `ApiError::ValidationFailed` on any syntax error.
pub fn parse_filter(input: &str) -> Result<Expr, ApiError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    if *parser.peek() != Token::Eof {
        return Err(filter_parse_error(format!(
            "unexpected trailing tokens starting at {:?}",
            parser.peek()
        )));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_comparison() {
        let expr = parse_filter("price gt 10").unwrap();
        assert!(matches!(expr, Expr::Compare { op: CompareOp::Gt, .. }));
    }

    #[test]
    fn parses_and_or_not_with_parens() {
        let expr = parse_filter("(price gt 10 and category eq 'a') or not (inStock eq true)").unwrap();
        assert!(matches!(expr, Expr::Or(_, _)));
    }

    #[test]
    fn parses_search_in() {
        let expr = parse_filter("search.in(category, 'a,b,c', ',')").unwrap();
        match expr {
            Expr::SearchIn { values, .. } => assert_eq!(values, vec!["a", "b", "c"]),
            _ => panic!("expected SearchIn"),
        }
    }

    #[test]
    fn parses_collection_any_with_predicate() {
        let expr = parse_filter("tags/any(t: t eq 'sale')").unwrap();
        assert!(matches!(expr, Expr::CollectionAny { .. }));
    }

    #[test]
    fn rejects_malformed_expression() {
        assert!(parse_filter("price gt").is_err());
    }
}
