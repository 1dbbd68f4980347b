//! Parser for the textual IR format.
//!
//! The input is scanned line by line into a small AST, then a build
//! step creates the program, resolving forward references through
//! placeholder values. Errors carry line numbers and accumulate; the
//! parser reports everything it can before giving up.

mod build;
mod line;
mod primitives;
mod types;

pub use types::parse_type;

use thiserror::Error;

use crate::con::Const;
use crate::func::Func;
use crate::program::Program;
use crate::typ::Type;

/// A location-bearing parse error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl ParseError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        ParseError {
            line,
            message: message.into(),
        }
    }
}

#[derive(Debug)]
pub(crate) enum Line {
    Package {
        name: String,
        path: String,
    },
    TypeDef {
        name: String,
        typ: Type,
    },
    Global {
        full_name: String,
        typ: Type,
        value: Option<Const>,
    },
    FuncHeader {
        full_name: String,
        params: Vec<Type>,
        results: Vec<Type>,
    },
    BlockHeader {
        label: u32,
        params: Vec<PDef>,
    },
    Instr(PInstr),
}

#[derive(Debug)]
pub(crate) struct PDef {
    pub id: u32,
    pub reg: Option<u16>,
    pub typ: Type,
}

#[derive(Debug)]
pub(crate) struct PInstr {
    pub defs: Vec<PDef>,
    pub op: String,
    pub operands: Vec<POperand>,
}

#[derive(Debug)]
pub(crate) enum POperand {
    Value { id: u32, reg: Option<u16> },
    Int(i64),
    Bool(bool),
    Nil,
    Str(String),
    Global(String),
    Ident(String),
    BlockRef { label: u32, args: Vec<POperand> },
}

/// Byte offset of the `;` starting a comment, ignoring semicolons
/// inside string literals.
fn comment_start(line: &str) -> Option<usize> {
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            ';' if !in_string => return Some(i),
            _ => {}
        }
    }
    None
}

/// Scan the input into (line number, parsed line) pairs. Blank lines
/// and `;` comments are skipped.
fn scan(input: &str) -> Result<Vec<(usize, Line)>, Vec<ParseError>> {
    let mut lines = Vec::new();
    let mut errors = Vec::new();
    for (i, raw) in input.lines().enumerate() {
        let lineno = i + 1;
        let text = match comment_start(raw) {
            Some(at) => &raw[..at],
            None => raw,
        };
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        match line::parse_line(text) {
            Ok(("", parsed)) => lines.push((lineno, parsed)),
            Ok((rest, _)) => errors.push(ParseError::new(
                lineno,
                format!("trailing input: {rest:?}"),
            )),
            Err(err) => errors.push(ParseError::new(lineno, format!("syntax error: {err}"))),
        }
    }
    if errors.is_empty() {
        Ok(lines)
    } else {
        Err(errors)
    }
}

/// Parse a whole program.
pub fn parse_program(input: &str) -> Result<Program, Vec<ParseError>> {
    let lines = scan(input)?;
    build::build_program(lines)
}

/// Parse a single function given as `func ...:` followed by blocks.
pub fn parse_func(input: &str) -> Result<Func, Vec<ParseError>> {
    let lines = scan(input)?;
    build::build_single_func(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::print;

    const SUM: &str = "\
package main \"main\"

func main__main():
.b0:
    v0:int = add 1, 2
    call main__print, v0
    return

func main__print(int):
.b0(v0:int):
    return
";

    #[test]
    fn parse_and_reemit_program() {
        let prog = parse_program(SUM).unwrap();
        let text = print::emit_program(&prog);
        let prog2 = parse_program(&text).unwrap();
        let text2 = print::emit_program(&prog2);
        assert_eq!(text, text2);
        assert!(prog.func_by_full_name("main__print").is_some());
    }

    #[test]
    fn forward_value_refs_resolve() {
        let text = "\
func t__loop(int) int:
.b0(v0:int):
    jump .b1(v0)
.b1(v1:int):
    v2:bool = less v1, v3
    v3:int = const 10
    if v2, .b2, .b3
.b2:
    jump .b1(v1)
.b3:
    return v1
";
        let func = parse_func(text).unwrap();
        assert!(!func.has_placeholders());
        func.check_invariants().unwrap();
    }

    #[test]
    fn unresolved_placeholder_reported() {
        let text = "\
func t__f() int:
.b0:
    return v9
";
        let errs = parse_func(text).unwrap_err();
        assert!(errs.iter().any(|e| e.message.contains("v9")));
    }

    #[test]
    fn syntax_errors_accumulate() {
        let text = "func t__f(:\n???\n";
        let errs = parse_func(text).unwrap_err();
        assert_eq!(errs.len(), 2);
        assert_eq!(errs[0].line, 1);
        assert_eq!(errs[1].line, 2);
    }
}
