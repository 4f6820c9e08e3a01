//! Query surface: match_all, simple query string (and a small superset used
//! for `queryType=full`), search-fields restriction (spec.md §4.2).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Must,
    MustNot,
    Should,
}

#[derive(Debug, Clone)]
pub enum Clause {
    Term {
        text: String,
        polarity: Polarity,
        field: Option<String>,
    },
    Phrase {
        terms: Vec<String>,
        polarity: Polarity,
        field: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct ParsedQuery {
    pub match_all: bool,
    pub clauses: Vec<Clause>,
}

/// Parses the simple/full query-string subset described in spec.md §4.2:
/// bare terms, `"phrase terms"`, `+required`/`-excluded`, and an optional
/// `field:` prefix per clause (used by `queryType=full`).
pub fn parse_query(text: &str) -> ParsedQuery {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "*" {
        return ParsedQuery {
            match_all: true,
            clauses: Vec::new(),
        };
    }

    let mut clauses = Vec::new();
    let chars: Vec<char> = trimmed.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        if i >= chars.len() {
            break;
        }

        let mut polarity = Polarity::Should;
        if chars[i] == '+' {
            polarity = Polarity::Must;
            i += 1;
        } else if chars[i] == '-' {
            polarity = Polarity::MustNot;
            i += 1;
        }
        if i >= chars.len() {
            break;
        }

        if chars[i] == '"' {
            i += 1;
            let start = i;
            while i < chars.len() && chars[i] != '"' {
                i += 1;
            }
            let phrase_text: String = chars[start..i].iter().collect();
            if i < chars.len() {
                i += 1; // consume closing quote
            }
            let terms: Vec<String> = phrase_text
                .split_whitespace()
                .map(|s| s.to_lowercase())
                .collect();
            if !terms.is_empty() {
                clauses.push(Clause::Phrase {
                    terms,
                    polarity,
                    field: None,
                });
            }
            continue;
        }

        let start = i;
        while i < chars.len() && !chars[i].is_whitespace() {
            i += 1;
        }
        let token: String = chars[start..i].iter().collect();
        if token.is_empty() {
            continue;
        }
        let (field, term) = match token.split_once(':') {
            Some((f, t)) if !f.is_empty() && !t.is_empty() => (Some(f.to_string()), t.to_string()),
            _ => (None, token),
        };
        clauses.push(Clause::Term {
            text: term.to_lowercase(),
            polarity,
            field,
        });
    }

    ParsedQuery {
        match_all: false,
        clauses,
    }
}

/// Parses a `searchFields`-style comma list with optional `^weight` suffix,
/// e.g. `"title^3,content"`.
pub fn parse_field_weights(spec: &str) -> Vec<(String, f64)> {
    spec.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|part| match part.split_once('^') {
            Some((name, weight)) => (
                name.trim().to_string(),
                weight.trim().parse::<f64>().unwrap_or(1.0),
            ),
            None => (part.trim().to_string(), 1.0),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_star_are_match_all() {
        assert!(parse_query("").match_all);
        assert!(parse_query("*").match_all);
    }

    #[test]
    fn parses_required_and_excluded_terms() {
        let q = parse_query("+search -excluded plain");
        assert_eq!(q.clauses.len(), 3);
        assert!(matches!(q.clauses[0], Clause::Term { polarity: Polarity::Must, .. }));
        assert!(matches!(q.clauses[1], Clause::Term { polarity: Polarity::MustNot, .. }));
        assert!(matches!(q.clauses[2], Clause::Term { polarity: Polarity::Should, .. }));
    }

    #[test]
    fn parses_quoted_phrase() {
        let q = parse_query("\"search search\"");
        assert_eq!(q.clauses.len(), 1);
        match &q.clauses[0] {
            Clause::Phrase { terms, .. } => assert_eq!(terms, &vec!["search".to_string(), "search".to_string()]),
            _ => panic!("expected phrase"),
        }
    }

    #[test]
    fn parses_field_weights() {
        let weights = parse_field_weights("title^3,content");
        assert_eq!(weights, vec![("title".to_string(), 3.0), ("content".to_string(), 1.0)]);
    }
}
