//! Token-level parsers shared by the line grammar.

use nom::{
    bytes::complete::{tag, take_while, take_while1},
    character::complete::char,
    combinator::{map_res, opt, recognize},
    sequence::{pair, preceded},
    IResult,
};

/// Horizontal whitespace, possibly empty.
pub(crate) fn blank(input: &str) -> IResult<&str, &str> {
    take_while(|c: char| c == ' ' || c == '\t')(input)
}

/// An identifier: letters, digits and underscores, not starting with a
/// digit. Full names like `main__print` are single identifiers.
pub(crate) fn ident(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

pub(crate) fn integer(input: &str) -> IResult<&str, i64> {
    map_res(
        recognize(pair(
            opt(char('-')),
            take_while1(|c: char| c.is_ascii_digit()),
        )),
        |s: &str| s.parse::<i64>(),
    )(input)
}

/// A `v<id>` reference with optional `_r<reg>` suffix.
pub(crate) fn value_token(input: &str) -> IResult<&str, (u32, Option<u16>)> {
    let (rest, id) = map_res(
        preceded(char('v'), take_while1(|c: char| c.is_ascii_digit())),
        |s: &str| s.parse::<u32>(),
    )(input)?;
    let (rest, reg) = opt(map_res(
        preceded(tag("_r"), take_while1(|c: char| c.is_ascii_digit())),
        |s: &str| s.parse::<u16>(),
    ))(rest)?;
    Ok((rest, (id, reg)))
}

/// A `.b<id>` block label reference.
pub(crate) fn block_token(input: &str) -> IResult<&str, u32> {
    map_res(
        preceded(tag(".b"), take_while1(|c: char| c.is_ascii_digit())),
        |s: &str| s.parse::<u32>(),
    )(input)
}

/// A Rust-debug-style quoted string, unescaped.
pub(crate) fn string_literal(input: &str) -> IResult<&str, String> {
    let mut chars = input.char_indices();
    match chars.next() {
        Some((_, '"')) => {}
        _ => {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Char,
            )))
        }
    }
    let mut out = String::new();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((&input[i + 1..], out)),
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, '0')) => out.push('\0'),
                Some((_, '\\')) => out.push('\\'),
                Some((_, '"')) => out.push('"'),
                Some((_, 'u')) => {
                    // \u{XXXX}
                    let mut code = 0u32;
                    let mut closed = false;
                    if let Some((_, '{')) = chars.next() {
                        for (_, h) in chars.by_ref() {
                            if h == '}' {
                                closed = true;
                                break;
                            }
                            code = code * 16 + h.to_digit(16).unwrap_or(0);
                        }
                    }
                    if !closed {
                        break;
                    }
                    if let Some(c) = char::from_u32(code) {
                        out.push(c);
                    }
                }
                _ => break,
            },
            c => out.push(c),
        }
    }
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idents_and_ints() {
        assert_eq!(ident("main__print rest"), Ok((" rest", "main__print")));
        assert!(ident("1abc").is_err());
        assert_eq!(integer("-42,"), Ok((",", -42)));
    }

    #[test]
    fn value_tokens() {
        assert_eq!(value_token("v3"), Ok(("", (3, None))));
        assert_eq!(value_token("v3_r5:"), Ok((":", (3, Some(5)))));
        assert!(value_token("x3").is_err());
    }

    #[test]
    fn block_tokens() {
        assert_eq!(block_token(".b12("), Ok(("(", 12)));
        assert!(block_token("b12").is_err());
    }

    #[test]
    fn strings() {
        assert_eq!(string_literal("\"hi\" x"), Ok((" x", "hi".to_string())));
        assert_eq!(
            string_literal("\"a\\nb\\\"c\\\\\""),
            Ok(("", "a\nb\"c\\".to_string()))
        );
        assert!(string_literal("\"unterminated").is_err());
    }
}
