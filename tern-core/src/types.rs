//! Structural type system for Tern.
//!
//! Primitive and composite types compare structurally; struct, union
//! and enum types compare by declaration identity. The original
//! implementation interned canonical primitive instances so pointer
//! comparison was cheap; that is an optimization only, so this
//! representation relies on plain structural equality throughout.

use crate::scope::DeclId;

/// Fixed-width integer kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntKind {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
}

impl IntKind {
    pub fn is_signed(&self) -> bool {
        matches!(self, IntKind::I8 | IntKind::I16 | IntKind::I32 | IntKind::I64)
    }

    pub fn bits(&self) -> u32 {
        match self {
            IntKind::I8 | IntKind::U8 => 8,
            IntKind::I16 | IntKind::U16 => 16,
            IntKind::I32 | IntKind::U32 => 32,
            IntKind::I64 | IntKind::U64 => 64,
        }
    }

    /// Truncate or sign/zero-extend a 64-bit value to this kind,
    /// returning it re-widened to i64 (the compiler's constant
    /// representation).
    pub fn truncate(&self, value: i64) -> i64 {
        let bits = self.bits();
        if bits == 64 {
            return value;
        }
        let shift = 64 - bits;
        if self.is_signed() {
            (value << shift) >> shift
        } else {
            ((value as u64) << shift >> shift) as i64
        }
    }

    pub fn c_name(&self) -> &'static str {
        match self {
            IntKind::I8 => "int8_t",
            IntKind::I16 => "int16_t",
            IntKind::I32 => "int32_t",
            IntKind::I64 => "int64_t",
            IntKind::U8 => "uint8_t",
            IntKind::U16 => "uint16_t",
            IntKind::U32 => "uint32_t",
            IntKind::U64 => "uint64_t",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            IntKind::I8 => "int8",
            IntKind::I16 => "int16",
            IntKind::I32 => "int32",
            IntKind::I64 => "int",
            IntKind::U8 => "uint8",
            IntKind::U16 => "uint16",
            IntKind::U32 => "uint32",
            IntKind::U64 => "uint",
        }
    }
}

/// A Tern type.
///
/// Array lengths use `Option<u32>`: `None` is the unknown/dynamic
/// length (the original's -1 sentinel). Dynamic arrays only ever
/// appear behind `Ptr`, where they lower to a count + items record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Int(IntKind),
    Bool,
    Str,
    CStr,
    Ptr(Box<Type>),
    Array {
        item: Box<Type>,
        len: Option<u32>,
    },
    Fn {
        params: Vec<Type>,
        ret: Option<Box<Type>>,
    },
    Struct(DeclId),
    Union(DeclId),
    Enum(DeclId),
}

impl Type {
    pub const INT: Type = Type::Int(IntKind::I64);

    pub fn ptr(inner: Type) -> Type {
        Type::Ptr(Box::new(inner))
    }

    pub fn array(item: Type, len: Option<u32>) -> Type {
        Type::Array {
            item: Box::new(item),
            len,
        }
    }

    /// Integral types participate in implicit numeric casts: all
    /// fixed-width integers, bool, and enums (64-bit signed values).
    pub fn is_integral(&self) -> bool {
        matches!(self, Type::Int(_) | Type::Bool | Type::Enum(_))
    }

    /// The integer kind a constant of this type truncates to.
    pub fn int_kind(&self) -> Option<IntKind> {
        match self {
            Type::Int(kind) => Some(*kind),
            Type::Enum(_) => Some(IntKind::I64),
            _ => None,
        }
    }

    pub fn is_dyn_array_ptr(&self) -> bool {
        matches!(self, Type::Ptr(inner) if matches!(**inner, Type::Array { len: None, .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_follows_width_and_signedness() {
        // (value, kind, expected)
        let table: &[(i64, IntKind, i64)] = &[
            (300, IntKind::I8, 44),
            (300, IntKind::U8, 44),
            (-1, IntKind::U8, 255),
            (-1, IntKind::U16, 65535),
            (-1, IntKind::U32, 4294967295),
            (-1, IntKind::I8, -1),
            (128, IntKind::I8, -128),
            (65536, IntKind::I16, 0),
            (65535, IntKind::I16, -1),
            (65535, IntKind::U16, 65535),
            (i64::MIN, IntKind::I64, i64::MIN),
            (i64::MIN, IntKind::I32, 0),
            (-9, IntKind::U64, -9), // bit pattern preserved at 64 bits
        ];
        for &(value, kind, expected) in table {
            assert_eq!(kind.truncate(value), expected, "{value} as {kind:?}");
        }
    }

    #[test]
    fn structural_equality_recurses() {
        let a = Type::ptr(Type::array(Type::INT, Some(3)));
        let b = Type::ptr(Type::array(Type::INT, Some(3)));
        let c = Type::ptr(Type::array(Type::INT, None));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn dynamic_array_pointers_are_recognized() {
        assert!(Type::ptr(Type::array(Type::Str, None)).is_dyn_array_ptr());
        assert!(!Type::ptr(Type::array(Type::Str, Some(2))).is_dyn_array_ptr());
        assert!(!Type::ptr(Type::Str).is_dyn_array_ptr());
    }
}
