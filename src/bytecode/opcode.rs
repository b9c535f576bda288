//! Opcode byte values of the bytecode wire format.
//!
//! These values are shared with the VM and with ahead-of-time cached code,
//! so they are part of the wire format and must not be renumbered on their
//! own. The `*_MULTI` families reserve contiguous blocks of opcode space and
//! fold a small operand into the opcode byte itself, saving one byte per
//! occurrence.

macro_rules! opcodes {
  ($($(#[$meta:meta])* $name:ident = $value:literal,)*) => {
    $($(#[$meta])* pub const $name: u8 = $value;)*

    /// Const name of a plain (non-family) opcode byte.
    pub fn name(opcode: u8) -> Option<&'static str> {
      match opcode {
        $($value => Some(stringify!($name)),)*
        _ => None,
      }
    }
  };
}

opcodes! {
  LOAD_CONST_FALSE = 0x10,
  LOAD_CONST_NONE = 0x11,
  LOAD_CONST_TRUE = 0x12,
  LOAD_CONST_SMALL_INT = 0x14,
  LOAD_CONST_STRING = 0x16,
  LOAD_CONST_OBJ = 0x17,
  LOAD_NULL = 0x18,
  LOAD_FAST_N = 0x19,
  LOAD_DEREF = 0x1a,
  LOAD_NAME = 0x1b,
  LOAD_GLOBAL = 0x1c,
  LOAD_ATTR = 0x1d,
  LOAD_METHOD = 0x1e,
  LOAD_BUILD_CLASS = 0x20,
  LOAD_SUBSCR = 0x21,
  STORE_FAST_N = 0x22,
  STORE_DEREF = 0x23,
  STORE_NAME = 0x24,
  STORE_GLOBAL = 0x25,
  STORE_ATTR = 0x26,
  STORE_SUBSCR = 0x27,
  DELETE_FAST = 0x28,
  DELETE_DEREF = 0x29,
  DELETE_NAME = 0x2a,
  DELETE_GLOBAL = 0x2b,
  DUP_TOP = 0x30,
  DUP_TOP_TWO = 0x31,
  POP_TOP = 0x32,
  ROT_TWO = 0x33,
  ROT_THREE = 0x34,
  JUMP = 0x35,
  POP_JUMP_IF_TRUE = 0x36,
  POP_JUMP_IF_FALSE = 0x37,
  JUMP_IF_TRUE_OR_POP = 0x38,
  JUMP_IF_FALSE_OR_POP = 0x39,
  UNWIND_JUMP = 0x3a,
  SETUP_WITH = 0x3d,
  WITH_CLEANUP = 0x3e,
  SETUP_EXCEPT = 0x3f,
  SETUP_FINALLY = 0x40,
  END_FINALLY = 0x41,
  GET_ITER = 0x42,
  FOR_ITER = 0x43,
  POP_BLOCK = 0x44,
  POP_EXCEPT = 0x45,
  NOT = 0x48,
  BUILD_TUPLE = 0x50,
  BUILD_LIST = 0x51,
  LIST_APPEND = 0x52,
  BUILD_MAP = 0x53,
  STORE_MAP = 0x54,
  MAP_ADD = 0x55,
  BUILD_SET = 0x56,
  SET_ADD = 0x57,
  BUILD_SLICE = 0x58,
  UNPACK_SEQUENCE = 0x59,
  UNPACK_EX = 0x5a,
  RETURN_VALUE = 0x5b,
  RAISE_VARARGS = 0x5c,
  YIELD_VALUE = 0x5d,
  YIELD_FROM = 0x5e,
  MAKE_FUNCTION = 0x60,
  MAKE_FUNCTION_DEFARGS = 0x61,
  MAKE_CLOSURE = 0x62,
  MAKE_CLOSURE_DEFARGS = 0x63,
  CALL_FUNCTION = 0x64,
  CALL_FUNCTION_VAR_KW = 0x65,
  CALL_METHOD = 0x66,
  CALL_METHOD_VAR_KW = 0x67,
  IMPORT_NAME = 0x68,
  IMPORT_FROM = 0x69,
  IMPORT_STAR = 0x6a,
  /// 64 opcodes, small ints -16..=47 folded into the opcode byte.
  LOAD_CONST_SMALL_INT_MULTI = 0x70,
  /// 16 opcodes, local slots 0..=15.
  LOAD_FAST_MULTI = 0xb0,
  /// 16 opcodes, local slots 0..=15.
  STORE_FAST_MULTI = 0xc0,
  /// 7 opcodes, one per [`UnaryOp`].
  UNARY_OP_MULTI = 0xd0,
  /// 35 opcodes, one per [`BinaryOp`].
  BINARY_OP_MULTI = 0xd7,
}

/// Keyword literal tokens forwarded by the front end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstTok {
  False,
  None,
  True,
  Ellipsis,
}

/// Unary operators, in opcode-family order.
///
/// `Not` never encodes directly: the emitter expands it to bool coercion
/// followed by the dedicated NOT opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum UnaryOp {
  Bool = 0,
  Len,
  Hash,
  Positive,
  Negative,
  Invert,
  Not,
}

/// Binary operators, in opcode-family order.
///
/// `NotIn` and `IsNot` reserve family slots but never encode directly: the
/// emitter expands them to the positive comparison followed by NOT.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BinaryOp {
  Less = 0,
  More,
  Equal,
  LessEqual,
  MoreEqual,
  NotEqual,
  In,
  Is,
  ExceptionMatch,
  InplaceOr,
  InplaceXor,
  InplaceAnd,
  InplaceLshift,
  InplaceRshift,
  InplaceAdd,
  InplaceSubtract,
  InplaceMultiply,
  InplaceFloorDivide,
  InplaceTrueDivide,
  InplaceModulo,
  InplacePower,
  Or,
  Xor,
  And,
  Lshift,
  Rshift,
  Add,
  Subtract,
  Multiply,
  FloorDivide,
  TrueDivide,
  Modulo,
  Power,
  NotIn,
  IsNot,
}
