//! The source-level type grammar carried on values.
//!
//! Types are structural and compared by value; the constant dedup map
//! and the textual IR round-trip both rely on the rendering here being
//! canonical.

use core::fmt;

/// Basic (non-composite) types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Basic {
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uintptr,
    Str,
    UntypedBool,
    UntypedInt,
}

impl Basic {
    pub fn name(self) -> &'static str {
        match self {
            Basic::Bool => "bool",
            Basic::Int => "int",
            Basic::Int8 => "int8",
            Basic::Int16 => "int16",
            Basic::Int32 => "int32",
            Basic::Int64 => "int64",
            Basic::Uint => "uint",
            Basic::Uint8 => "uint8",
            Basic::Uint16 => "uint16",
            Basic::Uint32 => "uint32",
            Basic::Uint64 => "uint64",
            Basic::Uintptr => "uintptr",
            Basic::Str => "string",
            Basic::UntypedBool => "untyped bool",
            Basic::UntypedInt => "untyped int",
        }
    }

    pub fn from_name(name: &str) -> Option<Basic> {
        Some(match name {
            "bool" => Basic::Bool,
            "int" => Basic::Int,
            "int8" => Basic::Int8,
            "int16" => Basic::Int16,
            "int32" => Basic::Int32,
            "int64" => Basic::Int64,
            "uint" => Basic::Uint,
            "uint8" => Basic::Uint8,
            "uint16" => Basic::Uint16,
            "uint32" => Basic::Uint32,
            "uint64" => Basic::Uint64,
            "uintptr" => Basic::Uintptr,
            "string" => Basic::Str,
            _ => return None,
        })
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, Basic::Bool | Basic::Str | Basic::UntypedBool)
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Basic::Int
                | Basic::Int8
                | Basic::Int16
                | Basic::Int32
                | Basic::Int64
                | Basic::UntypedInt
        )
    }

    pub fn is_bool(self) -> bool {
        matches!(self, Basic::Bool | Basic::UntypedBool)
    }
}

/// A type in the IR.
///
/// `Tuple` only appears as the result shape of multi-def instructions
/// and is flattened into per-def types at instruction creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Basic(Basic),
    Pointer(Box<Type>),
    Slice(Box<Type>),
    Array(u64, Box<Type>),
    Map(Box<Type>, Box<Type>),
    Chan(Box<Type>),
    Struct(Vec<Type>),
    Interface,
    Func(Vec<Type>, Vec<Type>),
    Tuple(Vec<Type>),
}

impl Type {
    pub const BOOL: Type = Type::Basic(Basic::Bool);
    pub const INT: Type = Type::Basic(Basic::Int);
    pub const STR: Type = Type::Basic(Basic::Str);
    pub const UNTYPED_INT: Type = Type::Basic(Basic::UntypedInt);
    pub const UNTYPED_BOOL: Type = Type::Basic(Basic::UntypedBool);

    pub fn pointer_to(elem: Type) -> Type {
        Type::Pointer(Box::new(elem))
    }

    pub fn slice_of(elem: Type) -> Type {
        Type::Slice(Box::new(elem))
    }

    pub fn array_of(len: u64, elem: Type) -> Type {
        Type::Array(len, Box::new(elem))
    }

    pub fn as_basic(&self) -> Option<Basic> {
        match self {
            Type::Basic(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Type::Basic(b) if b.is_bool())
    }

    /// Signedness of the underlying integer, defaulting unsigned for
    /// non-basic types (addresses).
    pub fn is_signed(&self) -> bool {
        matches!(self, Type::Basic(b) if b.is_signed())
    }

    /// Element type for pointer/slice/array/chan composites.
    pub fn elem(&self) -> Option<&Type> {
        match self {
            Type::Pointer(e) | Type::Slice(e) | Type::Array(_, e) | Type::Chan(e) => Some(e),
            _ => None,
        }
    }

    /// Flatten into the list of per-def types for instruction creation.
    pub fn flatten(self) -> Vec<Type> {
        match self {
            Type::Tuple(parts) => parts,
            other => vec![other],
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Basic(b) => f.write_str(b.name()),
            Type::Pointer(e) => write!(f, "*{}", e),
            Type::Slice(e) => write!(f, "[]{}", e),
            Type::Array(n, e) => write!(f, "[{}]{}", n, e),
            Type::Map(k, v) => write!(f, "map[{}]{}", k, v),
            Type::Chan(e) => write!(f, "chan {}", e),
            Type::Struct(fields) => {
                f.write_str("struct{")?;
                for (i, t) in fields.iter().enumerate() {
                    if i != 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                f.write_str("}")
            }
            Type::Interface => f.write_str("interface{}"),
            Type::Func(params, results) => {
                f.write_str("func(")?;
                for (i, t) in params.iter().enumerate() {
                    if i != 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                f.write_str(")")?;
                match results.len() {
                    0 => Ok(()),
                    1 => write!(f, " {}", results[0]),
                    _ => {
                        f.write_str(" (")?;
                        for (i, t) in results.iter().enumerate() {
                            if i != 0 {
                                f.write_str(", ")?;
                            }
                            write!(f, "{}", t)?;
                        }
                        f.write_str(")")
                    }
                }
            }
            Type::Tuple(parts) => {
                f.write_str("(")?;
                for (i, t) in parts.iter().enumerate() {
                    if i != 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_composites() {
        assert_eq!(Type::pointer_to(Type::INT).to_string(), "*int");
        assert_eq!(Type::slice_of(Type::Basic(Basic::Uint8)).to_string(), "[]uint8");
        assert_eq!(Type::array_of(4, Type::INT).to_string(), "[4]int");
        assert_eq!(
            Type::Map(Box::new(Type::STR), Box::new(Type::INT)).to_string(),
            "map[string]int"
        );
        assert_eq!(
            Type::Func(vec![Type::INT, Type::INT], vec![Type::INT]).to_string(),
            "func(int, int) int"
        );
        assert_eq!(
            Type::Func(vec![], vec![Type::INT, Type::BOOL]).to_string(),
            "func() (int, bool)"
        );
    }

    #[test]
    fn signedness() {
        assert!(Type::INT.is_signed());
        assert!(!Type::Basic(Basic::Uint16).is_signed());
        assert!(!Type::pointer_to(Type::INT).is_signed());
    }

    #[test]
    fn tuple_flattening() {
        let t = Type::Tuple(vec![Type::INT, Type::BOOL]);
        assert_eq!(t.flatten(), vec![Type::INT, Type::BOOL]);
        assert_eq!(Type::INT.flatten(), vec![Type::INT]);
    }
}
