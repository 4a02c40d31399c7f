//! Reader for the subset of Erlang term syntax used by release descriptors.
//!
//! Both reltool configs and `.rel` manifests are files of dot-terminated terms
//! (the format `file:consult/1` reads). Only the shapes those files use are
//! supported: atoms, strings, binaries, integers, floats, tuples and proper lists.

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_while},
    character::complete::{anychar, char, digit1, multispace1, not_line_ending, satisfy},
    combinator::{all_consuming, cut, map, map_res, opt, recognize, value},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Atom(String),
    Str(String),
    Binary(String),
    Integer(i64),
    Float(f64),
    Tuple(Vec<Term>),
    List(Vec<Term>),
}

impl Term {
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Self::Atom(atom) => Some(atom),
            _ => None,
        }
    }

    /// Strings and binaries both carry text; an empty list is the empty string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Str(text) | Self::Binary(text) => Some(text),
            Self::List(items) if items.is_empty() => Some(""),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Term]> {
        match self {
            Self::Tuple(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Term]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Elements of a tuple whose first element is the atom `tag`.
    pub fn tagged(&self, tag: &str) -> Option<&[Term]> {
        let items = self.as_tuple()?;
        let (first, rest) = items.split_first()?;
        (first.as_atom() == Some(tag)).then_some(rest)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermSyntaxError {
    pub line: usize,
}

/// Parses a whole document of dot-terminated terms.
pub fn parse_terms(input: &str) -> Result<Vec<Term>, TermSyntaxError> {
    match all_consuming(terminated(many0(terminated(term, lexeme(char('.')))), ws))(input) {
        Ok((_, terms)) => Ok(terms),
        Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => Err(TermSyntaxError {
            line: line_of(input, err.input),
        }),
        Err(nom::Err::Incomplete(_)) => Err(TermSyntaxError {
            line: input.lines().count().max(1),
        }),
    }
}

fn line_of(input: &str, remaining: &str) -> usize {
    let offset = input.len().saturating_sub(remaining.len());
    let consumed = &input[..offset];
    let rest = remaining.trim_start();
    let skipped = remaining.len() - rest.len();
    consumed.matches('\n').count() + remaining[..skipped].matches('\n').count() + 1
}

fn ws(input: &str) -> IResult<&str, ()> {
    value(
        (),
        many0(alt((
            value((), multispace1),
            value((), pair(char('%'), not_line_ending)),
        ))),
    )(input)
}

fn lexeme<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    preceded(ws, inner)
}

fn term(input: &str) -> IResult<&str, Term> {
    lexeme(alt((
        map(tuple_body, Term::Tuple),
        map(list_body, Term::List),
        map(binary_literal, Term::Binary),
        map(string_literal, Term::Str),
        number,
        map(atom, Term::Atom),
    )))(input)
}

// Past an opening delimiter the term is committed, so failures point at the bad token.
fn tuple_body(input: &str) -> IResult<&str, Vec<Term>> {
    preceded(
        char('{'),
        cut(terminated(
            separated_list0(lexeme(char(',')), term),
            lexeme(char('}')),
        )),
    )(input)
}

fn list_body(input: &str) -> IResult<&str, Vec<Term>> {
    preceded(
        char('['),
        cut(terminated(
            separated_list0(lexeme(char(',')), term),
            lexeme(char(']')),
        )),
    )(input)
}

fn binary_literal(input: &str) -> IResult<&str, String> {
    map(
        preceded(
            tag("<<"),
            cut(terminated(opt(lexeme(string_literal)), lexeme(tag(">>")))),
        ),
        Option::unwrap_or_default,
    )(input)
}

fn string_literal(input: &str) -> IResult<&str, String> {
    delimited(char('"'), escaped_text("\\\""), char('"'))(input)
}

fn atom(input: &str) -> IResult<&str, String> {
    alt((
        map(
            recognize(pair(
                satisfy(|ch| ch.is_ascii_lowercase()),
                take_while(|ch: char| ch.is_ascii_alphanumeric() || ch == '_' || ch == '@'),
            )),
            str::to_string,
        ),
        delimited(char('\''), escaped_text("\\'"), char('\'')),
    ))(input)
}

fn escaped_text<'a>(stop: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, String> {
    map(
        many0(alt((
            map(is_not(stop), str::to_string),
            map(preceded(char('\\'), escape), String::from),
        ))),
        |chunks: Vec<String>| chunks.concat(),
    )
}

fn escape(input: &str) -> IResult<&str, char> {
    alt((
        value('\n', char('n')),
        value('\t', char('t')),
        value('\r', char('r')),
        value(' ', char('s')),
        anychar,
    ))(input)
}

fn number(input: &str) -> IResult<&str, Term> {
    map_res(
        recognize(tuple((
            opt(char('-')),
            digit1,
            opt(pair(char('.'), digit1)),
        ))),
        |raw: &str| {
            if raw.contains('.') {
                raw.parse::<f64>().map(Term::Float).map_err(|_| ())
            } else {
                raw.parse::<i64>().map(Term::Integer).map_err(|_| ())
            }
        },
    )(input)
}
