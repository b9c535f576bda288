//! Bytecode emission.
//!
//! The code generator walks the parse tree up to three times, replaying the
//! same sequence of emit calls over an evolving state:
//!
//! - `Scope`: no measurement, the walker is only collecting scope info;
//! - `CodeSize`: every write advances an offset counter, label offsets are
//!   recorded, and the final buffer is sized and allocated;
//! - `Emit`: the same writes land in the allocated buffer, with jump
//!   displacements resolved from the recorded label offsets.
//!
//! Replaying an identical sequence is the caller's contract; the emitter
//! asserts it where it can (label offsets must not drift between passes).

#[cfg(feature = "native-emitter")]
mod backend;
mod emitter;

#[cfg(feature = "native-emitter")]
pub use backend::Backend;
pub use emitter::BytecodeEmitter;

use crate::qstr::Qstr;

/// Compilation pass kind, in driving order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Pass {
  Scope,
  CodeSize,
  Emit,
}

/// Symbolic jump target, an index into the emitter's label table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Label(pub u32);

/// Star-argument flags for the call operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StarFlags(pub u8);

impl StarFlags {
  /// `*args` present.
  pub const SINGLE: StarFlags = StarFlags(0x01);
  /// `**kwargs` present.
  pub const DOUBLE: StarFlags = StarFlags(0x02);

  pub fn is_empty(self) -> bool {
    self.0 == 0
  }

  pub fn contains(self, other: StarFlags) -> bool {
    self.0 & other.0 != 0
  }
}

impl std::ops::BitOr for StarFlags {
  type Output = StarFlags;

  fn bitor(self, rhs: StarFlags) -> StarFlags {
    StarFlags(self.0 | rhs.0)
  }
}

/// One group of identifier operations, with a variant per identifier kind:
/// local slot, closure cell, locals-dict name, globals-dict name.
///
/// The compiler driver picks the variant from the analyzed identifier kind
/// with one code path for loads, stores and deletes each.
pub struct IdOpTable {
  pub fast: fn(&mut BytecodeEmitter<'_>, Qstr, usize),
  pub deref: fn(&mut BytecodeEmitter<'_>, Qstr, usize),
  pub name: fn(&mut BytecodeEmitter<'_>, Qstr),
  pub global: fn(&mut BytecodeEmitter<'_>, Qstr),
}

pub static LOAD_ID_OPS: IdOpTable = IdOpTable {
  fast: id_ops::load_fast,
  deref: id_ops::load_deref,
  name: id_ops::load_name,
  global: id_ops::load_global,
};

pub static STORE_ID_OPS: IdOpTable = IdOpTable {
  fast: id_ops::store_fast,
  deref: id_ops::store_deref,
  name: id_ops::store_name,
  global: id_ops::store_global,
};

pub static DELETE_ID_OPS: IdOpTable = IdOpTable {
  fast: id_ops::delete_fast,
  deref: id_ops::delete_deref,
  name: id_ops::delete_name,
  global: id_ops::delete_global,
};

mod id_ops {
  use super::BytecodeEmitter;
  use crate::qstr::Qstr;

  macro_rules! id_op {
    ($($name:ident($($arg:ident: $ty:ty),*);)*) => {
      $(pub fn $name(emit: &mut BytecodeEmitter<'_>, $($arg: $ty),*) {
        emit.$name($($arg),*)
      })*
    };
  }

  id_op! {
    load_fast(qst: Qstr, local_num: usize);
    load_deref(qst: Qstr, local_num: usize);
    load_name(qst: Qstr);
    load_global(qst: Qstr);
    store_fast(qst: Qstr, local_num: usize);
    store_deref(qst: Qstr, local_num: usize);
    store_name(qst: Qstr);
    store_global(qst: Qstr);
    delete_fast(qst: Qstr, local_num: usize);
    delete_deref(qst: Qstr, local_num: usize);
    delete_name(qst: Qstr);
    delete_global(qst: Qstr);
  }
}
