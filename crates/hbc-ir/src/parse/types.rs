//! Type grammar parser.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::char,
    combinator::{map, map_res, opt},
    multi::separated_list0,
    sequence::{delimited, preceded, terminated, tuple},
    IResult,
};

use super::primitives::blank;
use crate::typ::{Basic, Type};

fn type_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

fn basic_type(input: &str) -> IResult<&str, Type> {
    let (rest, name) = type_name(input)?;
    if name == "untyped" {
        // "untyped int" / "untyped bool" carry a space
        let (rest, kind) = preceded(char(' '), type_name)(rest)?;
        let basic = match kind {
            "int" => Basic::UntypedInt,
            "bool" => Basic::UntypedBool,
            _ => {
                return Err(nom::Err::Error(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Tag,
                )))
            }
        };
        return Ok((rest, Type::Basic(basic)));
    }
    match Basic::from_name(name) {
        Some(basic) => Ok((rest, Type::Basic(basic))),
        None => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        ))),
    }
}

fn array_or_slice(input: &str) -> IResult<&str, Type> {
    let (rest, _) = char('[')(input)?;
    if let Ok((rest, _)) = char::<_, nom::error::Error<&str>>(']')(rest) {
        let (rest, elem) = parse_type(rest)?;
        return Ok((rest, Type::slice_of(elem)));
    }
    let (rest, len) = map_res(take_while1(|c: char| c.is_ascii_digit()), |s: &str| {
        s.parse::<u64>()
    })(rest)?;
    let (rest, _) = char(']')(rest)?;
    let (rest, elem) = parse_type(rest)?;
    Ok((rest, Type::array_of(len, elem)))
}

fn map_type(input: &str) -> IResult<&str, Type> {
    let (rest, key) = preceded(tag("map["), parse_type)(input)?;
    let (rest, _) = char(']')(rest)?;
    let (rest, val) = parse_type(rest)?;
    Ok((rest, Type::Map(Box::new(key), Box::new(val))))
}

fn struct_type(input: &str) -> IResult<&str, Type> {
    map(
        delimited(
            tag("struct{"),
            separated_list0(terminated(char(','), blank), parse_type),
            char('}'),
        ),
        Type::Struct,
    )(input)
}

fn func_type(input: &str) -> IResult<&str, Type> {
    let (rest, params) = preceded(
        tag("func("),
        terminated(
            separated_list0(terminated(char(','), blank), parse_type),
            char(')'),
        ),
    )(input)?;
    let (rest, results) = opt(preceded(char(' '), result_types))(rest)?;
    Ok((rest, Type::Func(params, results.unwrap_or_default())))
}

/// Result-type suffix: a single type or a parenthesized list.
pub(crate) fn result_types(input: &str) -> IResult<&str, Vec<Type>> {
    alt((
        delimited(
            char('('),
            separated_list0(terminated(char(','), blank), preceded(blank, parse_type)),
            char(')'),
        ),
        map(parse_type, |t| vec![t]),
    ))(input)
}

/// Parse a type per the IR grammar.
pub fn parse_type(input: &str) -> IResult<&str, Type> {
    alt((
        map(preceded(char('*'), parse_type), Type::pointer_to),
        map_type,
        array_or_slice,
        map(
            preceded(tuple((tag("chan"), char(' '))), parse_type),
            |t| Type::Chan(Box::new(t)),
        ),
        map(tag("interface{}"), |_| Type::Interface),
        struct_type,
        func_type,
        basic_type,
    ))(input)
}
