//! S-expression reader.
//!
//! Turns program text into [`Value`] trees: integers, doubles, `#t`/`#f`,
//! strings, symbols, parenthesized lists (Pair chains ending in Empty) and the
//! `'x` shorthand for `(quote x)`. A `;` starts a comment running to the end of
//! the line.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit0, digit1, multispace1, one_of},
    combinator::{cut, opt, recognize, value},
    error::ErrorKind,
    multi::many0_count,
    sequence::{pair, preceded},
};

use crate::ast::{IntegerType, Value, list, sym};
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Characters allowed in symbols besides letters and digits
const SYMBOL_SPECIAL_CHARS: &str = "!$%&*/:<=>?~_^.+-";

type NomError<'a> = nom::error::Error<&'a str>;

fn fail<'a, T>(input: &'a str, code: ErrorKind) -> IResult<&'a str, T> {
    Err(nom::Err::Error(NomError::new(input, code)))
}

fn failure<'a, T>(input: &'a str, code: ErrorKind) -> IResult<&'a str, T> {
    Err(nom::Err::Failure(NomError::new(input, code)))
}

/// True when a token may end here
fn at_delimiter(input: &str) -> bool {
    match input.chars().next() {
        None => true,
        Some(c) => c.is_whitespace() || matches!(c, '(' | ')' | '"' | ';'),
    }
}

/// Check that a candidate token is a symbol and not a malformed number
fn is_valid_symbol(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    match (chars.next(), chars.next()) {
        (None, _) => false,
        (Some(first), _) if first.is_ascii_digit() => false,
        (Some('+' | '-' | '.'), Some(second)) if second.is_ascii_digit() => false,
        (Some('.'), None) => false,
        _ => true,
    }
}

/// Skip whitespace and `;` comments
fn skip_trivia(input: &str) -> IResult<&str, ()> {
    value(
        (),
        many0_count(alt((
            multispace1,
            recognize(pair(char(';'), take_while(|c: char| c != '\n'))),
        ))),
    )
    .parse(input)
}

/// Parse a number: a double if a decimal point is present, else an integer
fn parse_number(input: &str) -> IResult<&str, Value> {
    alt((parse_double, parse_integer)).parse(input)
}

fn parse_double(input: &str) -> IResult<&str, Value> {
    let (rest, text) = recognize(pair(
        opt(one_of("+-")),
        alt((
            recognize((digit1, char('.'), digit0)),
            recognize(pair(char('.'), digit1)),
        )),
    ))
    .parse(input)?;

    if !at_delimiter(rest) {
        return fail(input, ErrorKind::Float);
    }
    match text.parse::<f64>() {
        Ok(d) => Ok((rest, Value::Double(d))),
        Err(_) => fail(input, ErrorKind::Float),
    }
}

fn parse_integer(input: &str) -> IResult<&str, Value> {
    let (rest, text) = recognize(pair(opt(one_of("+-")), digit1)).parse(input)?;

    if !at_delimiter(rest) {
        return fail(input, ErrorKind::Verify);
    }
    match text.parse::<IntegerType>() {
        Ok(n) => Ok((rest, Value::Integer(n))),
        // Well-formed but out of range: no other reading applies
        Err(_) => failure(input, ErrorKind::Digit),
    }
}

/// Parse a boolean (#t or #f)
fn parse_bool(input: &str) -> IResult<&str, Value> {
    let (rest, parsed) = alt((
        value(Value::Bool(true), tag("#t")),
        value(Value::Bool(false), tag("#f")),
    ))
    .parse(input)?;

    if at_delimiter(rest) {
        Ok((rest, parsed))
    } else {
        fail(input, ErrorKind::Tag)
    }
}

/// Parse a symbol (identifier)
fn parse_symbol(input: &str) -> IResult<&str, Value> {
    let (remaining, candidate) =
        take_while1(|c: char| c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c))
            .parse(input)?;

    if is_valid_symbol(candidate) && at_delimiter(remaining) {
        Ok((remaining, sym(candidate)))
    } else {
        fail(input, ErrorKind::Alpha)
    }
}

/// Parse a string literal
fn parse_string(input: &str) -> IResult<&str, Value> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut text = String::new();

    loop {
        let mut char_iter = remaining.chars();
        match char_iter.next() {
            Some('"') => return Ok((char_iter.as_str(), Value::String(text))),
            Some('\\') => {
                match char_iter.next() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('\\') => text.push('\\'),
                    Some('"') => text.push('"'),
                    Some(_) => return failure(remaining, ErrorKind::Escaped),
                    // Backslash at end of input
                    None => return failure(char_iter.as_str(), ErrorKind::Eof),
                }
                remaining = char_iter.as_str();
            }
            Some(ch) => {
                text.push(ch);
                remaining = char_iter.as_str();
            }
            // No closing quote
            None => return failure(remaining, ErrorKind::Eof),
        }
    }
}

/// Parse a parenthesized list into a Pair chain
fn parse_list(input: &str, depth: usize) -> IResult<&str, Value> {
    let (mut input, _) = char('(').parse(input)?;
    let mut elements = Vec::new();

    loop {
        let (rest, _) = skip_trivia(input)?;
        if let Some(after) = rest.strip_prefix(')') {
            return Ok((after, list(elements)));
        }
        if rest.is_empty() {
            return failure(rest, ErrorKind::Eof);
        }
        let (rest, element) = cut(|input| parse_sexpr(input, depth + 1)).parse(rest)?;
        elements.push(element);
        input = rest;
    }
}

/// Parse quoted expression ('expr -> (quote expr))
fn parse_quote(input: &str, depth: usize) -> IResult<&str, Value> {
    let (input, _) = char('\'').parse(input)?;
    let (input, expr) = cut(|input| parse_sexpr(input, depth + 1)).parse(input)?;
    Ok((input, list(vec![sym("quote"), expr])))
}

/// Parse one S-expression, skipping leading whitespace and comments
fn parse_sexpr(input: &str, depth: usize) -> IResult<&str, Value> {
    if depth >= MAX_PARSE_DEPTH {
        return failure(input, ErrorKind::TooLarge);
    }
    preceded(
        skip_trivia,
        alt((
            |input| parse_quote(input, depth),
            |input| parse_list(input, depth),
            parse_number,
            parse_bool,
            parse_string,
            parse_symbol,
        )),
    )
    .parse(input)
}

/// The token starting at `input`, for error reports
fn offending_token(input: &str) -> Option<String> {
    let token: String = input
        .chars()
        .take_while(|c| !c.is_whitespace() && !matches!(c, '(' | ')'))
        .collect();
    if token.is_empty() {
        input.chars().next().map(String::from)
    } else {
        Some(token)
    }
}

/// Convert nom parsing errors to structured parse errors
fn parse_error_from_nom(input: &str, error: nom::Err<NomError<'_>>) -> Error {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let offset = input.len().saturating_sub(e.input.len());
            let found = offending_token(e.input);
            let (kind, message) = match e.code {
                ErrorKind::TooLarge => (
                    ParseErrorKind::TooDeeplyNested,
                    format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
                ),
                ErrorKind::Digit => (
                    ParseErrorKind::ImplementationLimit,
                    format!("Integer literal out of range at position {offset}"),
                ),
                ErrorKind::Escaped => (
                    ParseErrorKind::InvalidSyntax,
                    format!("Unknown escape sequence in string at position {offset}"),
                ),
                _ if e.input.is_empty() => (
                    ParseErrorKind::Incomplete,
                    "Unexpected end of input".to_owned(),
                ),
                _ => (
                    ParseErrorKind::InvalidSyntax,
                    format!("Invalid syntax at position {offset}"),
                ),
            };
            ParseError::with_context_and_found(kind, message, input, offset, found).into()
        }
        nom::Err::Incomplete(_) => {
            ParseError::from_message(ParseErrorKind::Incomplete, "Incomplete input").into()
        }
    }
}

fn stray_close_paren(input: &str, rest: &str) -> Error {
    ParseError::with_context_and_found(
        ParseErrorKind::InvalidSyntax,
        "Unexpected ')' without matching '('",
        input,
        input.len() - rest.len(),
        Some(")".to_owned()),
    )
    .into()
}

/// Parse every top-level form in `input`.
///
/// The whole text is read before anything is returned, so a syntax error
/// anywhere means no form is produced.
pub fn parse_program(input: &str) -> Result<Vec<Value>, Error> {
    let mut forms = Vec::new();
    let mut remaining = input;

    loop {
        let (rest, _) = skip_trivia(remaining).map_err(|e| parse_error_from_nom(input, e))?;
        if rest.is_empty() {
            return Ok(forms);
        }
        if rest.starts_with(')') {
            return Err(stray_close_paren(input, rest));
        }
        let (rest, form) = parse_sexpr(rest, 0).map_err(|e| parse_error_from_nom(input, e))?;
        forms.push(form);
        remaining = rest;
    }
}

/// Parse exactly one S-expression from input.
pub fn parse_scheme(input: &str) -> Result<Value, Error> {
    let (rest, _) = skip_trivia(input).map_err(|e| parse_error_from_nom(input, e))?;
    if rest.starts_with(')') {
        return Err(stray_close_paren(input, rest));
    }

    let (rest, form) = parse_sexpr(rest, 0).map_err(|e| parse_error_from_nom(input, e))?;
    let (rest, _) = skip_trivia(rest).map_err(|e| parse_error_from_nom(input, e))?;

    if rest.is_empty() {
        Ok(form)
    } else {
        Err(ParseError::with_context_and_found(
            ParseErrorKind::TrailingContent,
            "Unexpected remaining input after expression",
            input,
            input.len() - rest.len(),
            offending_token(rest),
        )
        .into())
    }
}
