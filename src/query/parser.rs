//! Filter Parser
//!
//! Parses filter expressions into a [`Query`].
//!
//! # Supported Syntax
//!
//! ```text
//! status = 200
//! timestamp > 1700000000 AND response_time <= 50.5
//! error = 'tea pot' and success = false
//! ```
//!
//! Integers without a decimal point stay integers, so `status = 200` compares
//! against an `int` column exactly. Keywords are case-insensitive.

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::{char, digit1, multispace0, multispace1, one_of},
    combinator::{map, map_res, opt, recognize, value},
    multi::separated_list1,
    sequence::{delimited, pair, tuple},
    IResult,
};

use crate::query::error::{QueryError, QueryResult};
use crate::storage::{Operator, Predicate, Query, Value};

/// Parse a filter expression into a Query
pub fn parse_query(input: &str) -> QueryResult<Query> {
    let input = input.trim();

    let conditions = match parse_conditions(input) {
        Ok((remaining, conditions)) => {
            if !remaining.trim().is_empty() {
                return Err(QueryError::Parse(format!(
                    "Unexpected input after filter: '{}'",
                    remaining.trim()
                )));
            }
            conditions
        }
        Err(e) => return Err(QueryError::Parse(format!("Invalid filter '{}': {:?}", input, e))),
    };

    let mut query = Query::new();
    for (field, predicate) in conditions {
        if query.insert(field.clone(), predicate).is_some() {
            return Err(QueryError::DuplicateField(field));
        }
    }
    Ok(query)
}

/// Interpret a bare command line value.
///
/// Anything that is not exactly one literal is taken as text, so
/// `tea pot` and `200ms` both stay strings.
pub fn parse_value(input: &str) -> Value {
    match parse_literal(input.trim()) {
        Ok((remaining, literal)) if remaining.is_empty() => literal,
        _ => Value::Text(input.to_string()),
    }
}

/// Parse conditions joined by AND
fn parse_conditions(input: &str) -> IResult<&str, Vec<(String, Predicate)>> {
    separated_list1(
        delimited(multispace1, tag_no_case("AND"), multispace1),
        parse_condition,
    )(input)
}

/// Parse a single condition like "status >= 200"
fn parse_condition(input: &str) -> IResult<&str, (String, Predicate)> {
    let (input, field) = parse_field(input)?;
    let (input, _) = multispace0(input)?;
    let (input, op) = parse_operator(input)?;
    let (input, _) = multispace0(input)?;
    let (input, operand) = parse_literal(input)?;

    Ok((input, (field.to_string(), Predicate::new(op, operand))))
}

/// Parse a field name
fn parse_field(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')(input)
}

/// Parse comparison operator
fn parse_operator(input: &str) -> IResult<&str, Operator> {
    alt((
        value(Operator::Gte, tag(">=")),
        value(Operator::Lte, tag("<=")),
        value(Operator::Gt, tag(">")),
        value(Operator::Lt, tag("<")),
        value(Operator::Eq, alt((tag("=="), tag("=")))),
    ))(input)
}

/// Parse a literal of any kind
fn parse_literal(input: &str) -> IResult<&str, Value> {
    alt((
        map(parse_quoted_string, Value::Text),
        map(parse_boolean, Value::Boolean),
        map(parse_float, Value::Float),
        map(parse_integer, Value::Integer),
    ))(input)
}

/// Parse quoted string, single or double quotes
fn parse_quoted_string(input: &str) -> IResult<&str, String> {
    let (input, quote) = one_of("'\"")(input)?;
    let (input, content) = take_while(|c| c != quote)(input)?;
    let (input, _) = char(quote)(input)?;
    Ok((input, content.to_string()))
}

fn parse_boolean(input: &str) -> IResult<&str, bool> {
    alt((
        value(true, tag_no_case("true")),
        value(false, tag_no_case("false")),
    ))(input)
}

/// Parse a number with a fractional part
fn parse_float(input: &str) -> IResult<&str, f64> {
    map_res(
        recognize(tuple((
            opt(char('-')),
            digit1,
            char('.'),
            digit1,
            opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
        ))),
        |s: &str| s.parse::<f64>(),
    )(input)
}

fn parse_integer(input: &str) -> IResult<&str, i64> {
    map_res(recognize(pair(opt(char('-')), digit1)), |s: &str| {
        s.parse::<i64>()
    })(input)
}
