//! The analyzed shape of one function, as consumed by the emitter.

use indexmap::IndexMap;

use crate::glue::{CodeObject, RawCode};
use crate::qstr::Qstr;

/// Identifier kinds assigned by the scope analyzer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdKind {
  GlobalImplicit,
  GlobalExplicit,
  Local,
  /// Local shared with inner functions through a heap cell.
  Cell,
  /// Variable closed over from an enclosing function.
  Free,
}

/// Per-identifier flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IdFlags(pub u8);

impl IdFlags {
  pub const IS_PARAM: IdFlags = IdFlags(0x01);

  pub fn contains(self, other: IdFlags) -> bool {
    self.0 & other.0 != 0
  }
}

impl std::ops::BitOr for IdFlags {
  type Output = IdFlags;

  fn bitor(self, rhs: IdFlags) -> IdFlags {
    IdFlags(self.0 | rhs.0)
  }
}

/// One declared identifier.
#[derive(Clone, Copy, Debug)]
pub struct IdInfo {
  pub kind: IdKind,
  pub flags: IdFlags,
  pub local_num: usize,
}

/// Scope-level flags. The analyzer seeds them; the emitter sets
/// [`ScopeFlags::GENERATOR`] when it sees a yield.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScopeFlags(pub u32);

impl ScopeFlags {
  pub const GENERATOR: ScopeFlags = ScopeFlags(0x01);

  pub fn insert(&mut self, other: ScopeFlags) {
    self.0 |= other.0;
  }

  pub fn contains(self, other: ScopeFlags) -> bool {
    self.0 & other.0 != 0
  }
}

/// Result of semantic analysis for one function.
///
/// Everything except `stack_size`, `scope_flags` and `code` is read-only
/// during emission.
pub struct Scope {
  pub simple_name: Qstr,
  pub source_file: Qstr,
  pub num_pos_args: usize,
  pub num_kwonly_args: usize,
  pub num_locals: usize,
  pub exc_stack_size: usize,
  /// Operand stack high-water mark, written back by the emitter.
  pub stack_size: usize,
  pub scope_flags: ScopeFlags,
  /// Declared identifiers keyed by name, in declaration order.
  pub id_info: IndexMap<Qstr, IdInfo>,
  /// Handle under which the finished code is registered; parents embed it in
  /// their bytecode when they make a function out of this scope.
  pub raw_code: RawCode,
  /// Finished code object, filled in by the glue at the end of the final
  /// pass.
  pub code: Option<CodeObject>,
}

impl Scope {
  pub fn new(simple_name: Qstr, source_file: Qstr, raw_code: RawCode) -> Scope {
    Scope {
      simple_name,
      source_file,
      num_pos_args: 0,
      num_kwonly_args: 0,
      num_locals: 0,
      exc_stack_size: 0,
      stack_size: 0,
      scope_flags: ScopeFlags::default(),
      id_info: IndexMap::new(),
      raw_code,
      code: None,
    }
  }
}
