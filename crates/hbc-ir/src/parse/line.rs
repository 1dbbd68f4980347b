//! Per-line grammar.
//!
//! The textual IR is line-oriented: one declaration, block header or
//! instruction per line. Each parser here consumes a whole trimmed
//! line.

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::char,
    combinator::{map, opt},
    multi::separated_list0,
    sequence::{delimited, preceded, terminated, tuple},
    IResult,
};

use super::primitives::{blank, block_token, ident, integer, string_literal, value_token};
use super::types::{parse_type, result_types};
use super::{Line, PDef, PInstr, POperand};
use crate::con::Const;

fn comma(input: &str) -> IResult<&str, ()> {
    map(tuple((blank, char(','), blank)), |_| ())(input)
}

fn pdef(input: &str) -> IResult<&str, PDef> {
    let (rest, (id, reg)) = value_token(input)?;
    let (rest, typ) = preceded(char(':'), parse_type)(rest)?;
    Ok((rest, PDef { id, reg, typ }))
}

fn operand(input: &str) -> IResult<&str, POperand> {
    alt((
        block_ref,
        map(preceded(char('^'), ident), |name| {
            POperand::Global(name.to_string())
        }),
        map(string_literal, POperand::Str),
        value_operand,
        ident_operand,
        map(integer, POperand::Int),
    ))(input)
}

fn value_operand(input: &str) -> IResult<&str, POperand> {
    let (rest, (id, reg)) = value_token(input)?;
    if rest
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        )));
    }
    Ok((rest, POperand::Value { id, reg }))
}

fn ident_operand(input: &str) -> IResult<&str, POperand> {
    let (rest, name) = ident(input)?;
    let op = match name {
        "true" => POperand::Bool(true),
        "false" => POperand::Bool(false),
        "nil" => POperand::Nil,
        _ => POperand::Ident(name.to_string()),
    };
    Ok((rest, op))
}

fn block_ref(input: &str) -> IResult<&str, POperand> {
    let (rest, label) = block_token(input)?;
    let (rest, args) = opt(delimited(
        char('('),
        separated_list0(comma, operand),
        char(')'),
    ))(rest)?;
    Ok((
        rest,
        POperand::BlockRef {
            label,
            args: args.unwrap_or_default(),
        },
    ))
}

fn package_line(input: &str) -> IResult<&str, Line> {
    let (rest, name) = preceded(tuple((tag("package"), blank)), ident)(input)?;
    let (rest, path) = preceded(blank, string_literal)(rest)?;
    Ok((
        rest,
        Line::Package {
            name: name.to_string(),
            path,
        },
    ))
}

fn typedef_line(input: &str) -> IResult<&str, Line> {
    let (rest, name) = preceded(tuple((tag("type"), blank)), ident)(input)?;
    let (rest, typ) = preceded(char(':'), parse_type)(rest)?;
    Ok((
        rest,
        Line::TypeDef {
            name: name.to_string(),
            typ,
        },
    ))
}

fn global_literal(input: &str) -> IResult<&str, Const> {
    alt((
        map(string_literal, Const::Str),
        map(tag("true"), |_| Const::Bool(true)),
        map(tag("false"), |_| Const::Bool(false)),
        map(tag("nil"), |_| Const::Nil),
        map(integer, Const::Int),
    ))(input)
}

fn global_line(input: &str) -> IResult<&str, Line> {
    let (rest, full_name) = preceded(tuple((tag("var"), blank)), ident)(input)?;
    let (rest, typ) = preceded(char(':'), parse_type)(rest)?;
    let (rest, value) = opt(preceded(
        tuple((blank, char('='), blank)),
        global_literal,
    ))(rest)?;
    Ok((
        rest,
        Line::Global {
            full_name: full_name.to_string(),
            typ,
            value,
        },
    ))
}

fn func_header(input: &str) -> IResult<&str, Line> {
    let (rest, full_name) = preceded(tuple((tag("func"), blank)), ident)(input)?;
    let (rest, params) = delimited(
        char('('),
        separated_list0(comma, parse_type),
        char(')'),
    )(rest)?;
    let (rest, results) = opt(preceded(char(' '), result_types))(rest)?;
    let (rest, _) = char(':')(rest)?;
    Ok((
        rest,
        Line::FuncHeader {
            full_name: full_name.to_string(),
            params,
            results: results.unwrap_or_default(),
        },
    ))
}

fn block_header(input: &str) -> IResult<&str, Line> {
    let (rest, label) = block_token(input)?;
    let (rest, params) = opt(delimited(
        char('('),
        separated_list0(comma, pdef),
        char(')'),
    ))(rest)?;
    let (rest, _) = char(':')(rest)?;
    Ok((
        rest,
        Line::BlockHeader {
            label,
            params: params.unwrap_or_default(),
        },
    ))
}

fn instr_line(input: &str) -> IResult<&str, Line> {
    let (rest, defs) = opt(terminated(
        separated_list0(comma, pdef),
        tuple((blank, char('='), blank)),
    ))(input)?;
    let (rest, op) = ident(rest)?;
    let (rest, operands) = opt(preceded(char(' '), separated_list0(comma, operand)))(rest)?;
    Ok((
        rest,
        Line::Instr(PInstr {
            defs: defs.unwrap_or_default(),
            op: op.to_string(),
            operands: operands.unwrap_or_default(),
        }),
    ))
}

/// Parse one trimmed, non-empty line.
pub(crate) fn parse_line(input: &str) -> IResult<&str, Line> {
    alt((
        package_line,
        typedef_line,
        global_line,
        func_header,
        block_header,
        instr_line,
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full(input: &str) -> Line {
        let (rest, line) = parse_line(input).unwrap();
        assert_eq!(rest, "", "leftover for {:?}", input);
        line
    }

    #[test]
    fn headers() {
        assert!(matches!(
            full("package main \"main\""),
            Line::Package { .. }
        ));
        match full("func main__fib(int) int:") {
            Line::FuncHeader {
                full_name,
                params,
                results,
            } => {
                assert_eq!(full_name, "main__fib");
                assert_eq!(params.len(), 1);
                assert_eq!(results.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
        match full(".b2(v1:int, v2_r3:bool):") {
            Line::BlockHeader { label, params } => {
                assert_eq!(label, 2);
                assert_eq!(params.len(), 2);
                assert_eq!(params[1].reg, Some(3));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn instrs() {
        match full("v2:int = add v0, 5") {
            Line::Instr(i) => {
                assert_eq!(i.op, "add");
                assert_eq!(i.defs.len(), 1);
                assert_eq!(i.operands.len(), 2);
                assert!(matches!(i.operands[1], POperand::Int(5)));
            }
            other => panic!("unexpected {:?}", other),
        }
        match full("if v0, .b1, .b2(v3)") {
            Line::Instr(i) => {
                assert_eq!(i.op, "if");
                assert_eq!(i.operands.len(), 3);
                assert!(matches!(
                    &i.operands[2],
                    POperand::BlockRef { label: 2, args } if args.len() == 1
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
        match full("call main__print, v2") {
            Line::Instr(i) => {
                assert!(matches!(&i.operands[0], POperand::Ident(n) if n == "main__print"));
            }
            other => panic!("unexpected {:?}", other),
        }
        match full("store ^main__counter, v1") {
            Line::Instr(i) => {
                assert!(matches!(&i.operands[0], POperand::Global(n) if n == "main__counter"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn globals() {
        match full("var main__msg:string = \"Hello\"") {
            Line::Global {
                full_name, value, ..
            } => {
                assert_eq!(full_name, "main__msg");
                assert_eq!(value, Some(Const::Str("Hello".into())));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            full("var main__buf:[10]int"),
            Line::Global { value: None, .. }
        ));
    }
}
