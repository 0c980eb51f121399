//! Error types for expression parsing and document validation

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

use crate::expr::lexer::Token;
use crate::expr::InvalidExpression;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Parse error at {span:?}: {message}")]
    Syntax {
        span: Span,
        message: String,
        expected: Vec<String>,
    },

    #[error("Unrecognized input '{found}' at {span:?}")]
    Unrecognized { span: Span, found: String },

    /// Import-like constructs are refused before parsing
    #[error("Expression contains a forbidden construct: '{construct}'")]
    Forbidden { construct: String },
}

impl ParseError {
    pub fn unrecognized(span: Span, found: impl Into<String>) -> Self {
        Self::Unrecognized {
            span,
            found: found.into(),
        }
    }

    pub fn forbidden(construct: impl Into<String>) -> Self {
        Self::Forbidden {
            construct: construct.into(),
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            ParseError::Syntax { span, .. } | ParseError::Unrecognized { span, .. } => {
                Some(span.clone())
            }
            ParseError::Forbidden { .. } => None,
        }
    }

    /// Format the error with source context using ariadne
    pub fn format(&self, source: &str, filename: &str) -> String {
        let (span, message, detail) = match self {
            ParseError::Syntax {
                span,
                message,
                expected,
            } => {
                let expected_str = if expected.is_empty() {
                    String::new()
                } else {
                    format!("\nExpected: {}", expected.join(", "))
                };
                (span.clone(), message.clone(), format!("{}{}", message, expected_str))
            }
            ParseError::Unrecognized { span, found } => (
                span.clone(),
                "Unrecognized input".to_string(),
                format!("cannot tokenize '{}'", found),
            ),
            ParseError::Forbidden { .. } => return self.to_string(),
        };

        let mut buf = Vec::new();
        let written = Report::build(ReportKind::Error, filename, span.start)
            .with_message(&message)
            .with_label(
                Label::new((filename, span))
                    .with_message(detail)
                    .with_color(Color::Red),
            )
            .finish()
            .write((filename, Source::from(source)), &mut buf);
        match written {
            Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => message,
        }
    }
}

impl<'a> From<chumsky::error::Rich<'a, Token>> for ParseError {
    fn from(err: chumsky::error::Rich<'a, Token>) -> Self {
        use chumsky::error::{RichPattern, RichReason};

        let message = match err.reason() {
            RichReason::ExpectedFound { found, .. } => {
                let found_str = match found {
                    Some(tok) => format_token(tok),
                    None => "end of input".to_string(),
                };
                // `value` and `item` are accessors, not column letters
                if matches!(found.as_deref(), Some(Token::Value) | Some(Token::Item)) {
                    format!("Unexpected {} - accessors must be followed by '['", found_str)
                } else {
                    format!("Unexpected {}", found_str)
                }
            }
            RichReason::Custom(msg) => msg.to_string(),
        };

        let expected: Vec<String> = err
            .expected()
            .filter_map(|e| match e {
                RichPattern::Token(tok) => Some(format_token(tok)),
                RichPattern::Label(label) => Some(label.to_string()),
                RichPattern::EndOfInput => Some("end of input".to_string()),
                RichPattern::Identifier(s) => Some(format!("identifier '{}'", s)),
                RichPattern::Any => Some("any token".to_string()),
                RichPattern::SomethingElse => None,
            })
            .collect();

        ParseError::Syntax {
            span: err.span().into_range(),
            message,
            expected,
        }
    }
}

/// Format a token for human-readable error messages
fn format_token(tok: &Token) -> String {
    match tok {
        Token::Ident(s) => format!("identifier '{}'", s),
        Token::Variable(s) => format!("variable '${}'", s),
        Token::String(s) => format!("string \"{}\"", s),
        Token::Number(n) => format!("number {}", n),
        Token::Value => "keyword 'value'".to_string(),
        Token::Item => "keyword 'item'".to_string(),
        Token::And => "'and'".to_string(),
        Token::Or => "'or'".to_string(),
        Token::Not => "'not'".to_string(),
        Token::True => "'True'".to_string(),
        Token::False => "'False'".to_string(),
        Token::Guard => "'->'".to_string(),
        Token::BracketOpen => "'['".to_string(),
        Token::BracketClose => "']'".to_string(),
        Token::ParenOpen => "'('".to_string(),
        Token::ParenClose => "')'".to_string(),
        Token::Comma => "','".to_string(),
        Token::Colon => "':'".to_string(),
        _ => format!("{:?}", tok),
    }
}

/// A malformed mapping, region or annotation document
///
/// Always fatal, and always raised before any cell is evaluated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeclarationError {
    #[error("unknown key '{key}' in {section}{}", format_suggestions(.suggestions))]
    UnknownKey {
        section: String,
        key: String,
        suggestions: Vec<String>,
    },

    #[error("missing required key '{key}' in {section}")]
    MissingKey { section: String, key: String },

    #[error("invalid {section}: {reason}")]
    Invalid { section: String, reason: String },

    #[error("invalid expression in {field}: {error}")]
    Expression {
        field: String,
        error: InvalidExpression,
    },

    #[error("document contains a forbidden construct: '{construct}'")]
    Forbidden { construct: String },
}

impl DeclarationError {
    pub fn invalid(section: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            section: section.into(),
            reason: reason.into(),
        }
    }

    pub fn missing(section: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MissingKey {
            section: section.into(),
            key: key.into(),
        }
    }

    pub fn expression(field: impl Into<String>, error: InvalidExpression) -> Self {
        Self::Expression {
            field: field.into(),
            error,
        }
    }

    /// Classify a serde message (`unknown field `x`, expected one of ...`)
    pub fn from_serde(section: impl Into<String>, message: &str) -> Self {
        let section = section.into();
        let quoted: Vec<&str> = message.split('`').skip(1).step_by(2).collect();
        if message.contains("unknown field") {
            if let Some((key, expected)) = quoted.split_first() {
                let suggestions = find_similar(expected.iter().copied(), key, 2);
                return Self::UnknownKey {
                    section,
                    key: key.to_string(),
                    suggestions,
                };
            }
        }
        if message.contains("missing field") {
            if let Some(key) = quoted.first() {
                return Self::missing(section, *key);
            }
        }
        Self::invalid(section, message)
    }
}

fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (did you mean '{}'?)", suggestions.join("', '"))
    }
}

/// Compute Levenshtein edit distance between two strings
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (m, n) = (a_chars.len(), b_chars.len());
    if m == 0 || n == 0 {
        return m.max(n);
    }

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];
    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a_chars[i - 1] != b_chars[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[n]
}

/// Names within `max_distance` edits of `target`, closest first
pub fn find_similar<'s>(
    names: impl IntoIterator<Item = &'s str>,
    target: &str,
    max_distance: usize,
) -> Vec<String> {
    let mut candidates: Vec<(&str, usize)> = names
        .into_iter()
        .filter_map(|name| {
            let dist = levenshtein_distance(name, target);
            (dist <= max_distance && dist > 0).then_some((name, dist))
        })
        .collect();

    candidates.sort_by_key(|(_, d)| *d);
    candidates
        .into_iter()
        .map(|(name, _)| name.to_string())
        .take(3)
        .collect()
}
