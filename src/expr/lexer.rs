//! Lexer for the cell expression language using logos

use logos::Logos;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
pub enum Token {
    // Cell accessors
    #[token("value")]
    Value,
    #[token("item")]
    Item,

    // Logical keywords
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,
    #[token("True")]
    #[token("true")]
    True,
    #[token("False")]
    #[token("false")]
    False,

    // Operators (order matters - longer patterns first)
    #[token("->")]
    Guard,
    #[token("==")]
    EqualEqual,
    #[token("!=")]
    NotEqual,
    #[token(">=")]
    GreaterOrEqual,
    #[token("<=")]
    LessOrEqual,
    #[token(">")]
    Greater,
    #[token("<")]
    Less,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,

    // Delimiters
    #[token("[")]
    BracketOpen,
    #[token("]")]
    BracketClose,
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,

    /// `$row`, `$col`, `$n`, ... (name without the sigil)
    #[regex(r"\$[a-zA-Z_]+", |lex| lex.slice()[1..].to_string())]
    Variable(String),

    // Literals - identifiers must come after keywords
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape(lex.slice()))]
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| unescape(lex.slice()))]
    String(String),

    #[regex(r"[0-9]+(\.[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),
}

/// Strip the surrounding quotes and resolve backslash escapes
fn unescape(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Lex input into tokens with spans
///
/// Unrecognized characters are surfaced as `Err(span)` so the grammar can report
/// them instead of silently skipping.
pub fn lex(input: &str) -> impl Iterator<Item = Result<(Token, Span), Span>> + '_ {
    Token::lexer(input).spanned().map(|(tok, span)| match tok {
        Ok(t) => Ok((t, span)),
        Err(()) => Err(span),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        lex(input).map(|r| r.unwrap().0).collect()
    }

    #[test]
    fn test_cell_reference() {
        assert_eq!(
            tokens("value[A, $row]"),
            vec![
                Token::Value,
                Token::BracketOpen,
                Token::Ident("A".to_string()),
                Token::Comma,
                Token::Variable("row".to_string()),
                Token::BracketClose,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            tokens("-> == != >= <= > < + - * /"),
            vec![
                Token::Guard,
                Token::EqualEqual,
                Token::NotEqual,
                Token::GreaterOrEqual,
                Token::LessOrEqual,
                Token::Greater,
                Token::Less,
                Token::Plus,
                Token::Minus,
                Token::Star,
                Token::Slash,
            ]
        );
    }

    #[test]
    fn test_strings_both_quotes() {
        assert_eq!(
            tokens(r#""a b" 'c\'d'"#),
            vec![
                Token::String("a b".to_string()),
                Token::String("c'd".to_string())
            ]
        );
    }

    #[test]
    fn test_keywords_and_booleans() {
        assert_eq!(
            tokens("and or not True false item"),
            vec![
                Token::And,
                Token::Or,
                Token::Not,
                Token::True,
                Token::False,
                Token::Item
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokens("42 3.5"),
            vec![Token::Number(42.0), Token::Number(3.5)]
        );
    }

    #[test]
    fn test_unknown_character_is_reported() {
        let results: Vec<_> = lex("value[A, 1] ; 2").collect();
        assert!(results.iter().any(|r| r.is_err()));
    }
}
