//! Parser implementation using chumsky

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::error::ParseError;
use crate::expr::ast::*;
use crate::expr::functions;
use crate::expr::lexer::{lex, Token};
use crate::sheet::column_index;

/// Parse an expression body (without the leading `=`) into an AST
pub fn parse(input: &str) -> Result<Expr, Vec<ParseError>> {
    let len = input.len();

    let mut tokens = Vec::new();
    for item in lex(input) {
        match item {
            Ok((tok, span)) => tokens.push((tok, SimpleSpan::from(span))),
            Err(span) => {
                let found = input[span.clone()].to_string();
                return Err(vec![ParseError::unrecognized(span, found)]);
            }
        }
    }

    // Turn the token list into a stream that chumsky can use
    let token_stream = Stream::from_iter(tokens.into_iter())
        .map((len..len).into(), |(t, s): (_, _)| (t, s));

    expr_parser()
        .then_ignore(end())
        .parse(token_stream)
        .into_result()
        .map_err(|errs| errs.into_iter().map(|e| e.into()).collect())
}

fn expr_parser<'a, I>() -> impl Parser<'a, I, Expr, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    recursive(|expr| {
        let number = select! { Token::Number(n) => Expr::Number(n) };
        let string = select! { Token::String(s) => Expr::String(s) };
        let boolean = choice((
            just(Token::True).to(Expr::Bool(true)),
            just(Token::False).to(Expr::Bool(false)),
        ));

        let variable = select! { Token::Variable(name) => name }.try_map(|name, span| {
            Variable::from_name(&name)
                .map(Expr::Var)
                .ok_or_else(|| Rich::custom(span, format!("unknown variable '${}'", name)))
        });

        // One index of a cell reference: `expr` or `expr:expr`
        let index = expr
            .clone()
            .then(just(Token::Colon).ignore_then(expr.clone()).or_not())
            .map(|(from, to)| match to {
                Some(to) => Index::Span(Box::new(from), Box::new(to)),
                None => Index::Single(Box::new(from)),
            });

        let accessor = choice((
            just(Token::Value).to(Accessor::Value),
            just(Token::Item).to(Accessor::Item),
        ));

        // value[col, row] / item[col, row] / item[col, row, "context"]
        let cell_ref = accessor
            .then_ignore(just(Token::BracketOpen))
            .then(index.clone())
            .then_ignore(just(Token::Comma))
            .then(index)
            .then(just(Token::Comma).ignore_then(expr.clone()).or_not())
            .then_ignore(just(Token::BracketClose))
            .try_map(|(((accessor, col), row), context), span| {
                if context.is_some() && accessor == Accessor::Value {
                    return Err(Rich::custom(
                        span,
                        "a wikification context is only allowed in item[...]",
                    ));
                }
                Ok(Expr::CellRef {
                    accessor,
                    col,
                    row,
                    context: context.map(Box::new),
                })
            });

        let call = select! { Token::Ident(name) => name }
            .then(
                expr.clone()
                    .separated_by(just(Token::Comma))
                    .collect::<Vec<_>>()
                    .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
            )
            .try_map(|(name, args), span| match functions::lookup(&name) {
                Some(spec) => spec
                    .check_arity(args.len())
                    .map(|()| Expr::Call { name, args })
                    .map_err(|msg| Rich::custom(span, msg)),
                None => Err(Rich::custom(span, format!("unknown function '{}'", name))),
            });

        // Bare identifiers are only meaningful as column letters
        let column = select! { Token::Ident(name) => name }.try_map(|name, span| {
            column_index(&name).map(Expr::Column).ok_or_else(|| {
                Rich::custom(span, format!("'{}' is not a column letter", name))
            })
        });

        let atom = choice((
            number,
            string,
            boolean,
            variable,
            cell_ref,
            call,
            column,
            expr.clone()
                .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
        ))
        .boxed();

        let unary = just(Token::Minus)
            .to(UnaryOp::Neg)
            .repeated()
            .foldr(atom, |op, rhs| Expr::Unary(op, Box::new(rhs)));

        let product = unary.clone().foldl(
            choice((
                just(Token::Star).to(BinaryOp::Mul),
                just(Token::Slash).to(BinaryOp::Div),
            ))
            .then(unary)
            .repeated(),
            |lhs, (op, rhs)| Expr::Binary(op, Box::new(lhs), Box::new(rhs)),
        );

        let sum = product.clone().foldl(
            choice((
                just(Token::Plus).to(BinaryOp::Add),
                just(Token::Minus).to(BinaryOp::Sub),
            ))
            .then(product)
            .repeated(),
            |lhs, (op, rhs)| Expr::Binary(op, Box::new(lhs), Box::new(rhs)),
        );

        let comparison_op = choice((
            just(Token::EqualEqual).to(BinaryOp::Eq),
            just(Token::NotEqual).to(BinaryOp::NotEq),
            just(Token::LessOrEqual).to(BinaryOp::LessEq),
            just(Token::GreaterOrEqual).to(BinaryOp::GreaterEq),
            just(Token::Less).to(BinaryOp::Less),
            just(Token::Greater).to(BinaryOp::Greater),
        ));

        let comparison = sum
            .clone()
            .then(comparison_op.then(sum).or_not())
            .map(|(lhs, rest)| match rest {
                Some((op, rhs)) => Expr::Binary(op, Box::new(lhs), Box::new(rhs)),
                None => lhs,
            });

        // `not` binds looser than comparisons: `not a == b` is `not (a == b)`
        let negation = just(Token::Not)
            .to(UnaryOp::Not)
            .repeated()
            .foldr(comparison, |op, rhs| Expr::Unary(op, Box::new(rhs)));

        let conjunction = negation.clone().foldl(
            just(Token::And).ignore_then(negation).repeated(),
            |lhs, rhs| Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs)),
        );

        let disjunction = conjunction.clone().foldl(
            just(Token::Or).ignore_then(conjunction).repeated(),
            |lhs, rhs| Expr::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs)),
        );

        // `a -> b -> c` groups as `a -> (b -> c)`
        disjunction
            .clone()
            .then(
                just(Token::Guard)
                    .ignore_then(disjunction)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| {
                let mut chain = rest;
                match chain.pop() {
                    None => first,
                    Some(last) => {
                        let tail = chain
                            .into_iter()
                            .rev()
                            .fold(last, |acc, cond| Expr::Guard(Box::new(cond), Box::new(acc)));
                        Expr::Guard(Box::new(first), Box::new(tail))
                    }
                }
            })
            .boxed()
    })
}
