//! Hand-off of finished code objects.
//!
//! The surrounding runtime owns code registration and execution; the emitter
//! only calls [`assign_bytecode`] once, at the end of the final pass, to
//! transfer ownership of the buffer it produced.

use crate::bytecode::varint;
use crate::scope::{Scope, ScopeFlags};

/// Opaque handle to registered code, embedded in parent bytecode as one
/// machine word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawCode(pub usize);

/// A finalized unit of executable code.
///
/// Layout: `[code info | padding to word | bytecode]`. The code-info block
/// starts with its own size as a varint, so the two regions can be split
/// without any out-of-band information.
pub struct CodeObject {
  buf: Box<[u8]>,
  pub n_pos_args: usize,
  pub n_kwonly_args: usize,
  pub scope_flags: ScopeFlags,
}

impl CodeObject {
  /// The whole buffer, code info included.
  pub fn as_bytes(&self) -> &[u8] {
    &self.buf
  }

  /// Size of the code-info region; the bytecode region starts here.
  pub fn code_info_size(&self) -> usize {
    let (size, _) = varint::decode_uint(&self.buf);
    size
  }

  pub fn code_info(&self) -> &[u8] {
    &self.buf[..self.code_info_size()]
  }

  pub fn bytecode(&self) -> &[u8] {
    &self.buf[self.code_info_size()..]
  }
}

/// Transfer ownership of the emitted buffer into the scope's code slot.
pub fn assign_bytecode(scope: &mut Scope, buf: Box<[u8]>) {
  scope.code = Some(CodeObject {
    buf,
    n_pos_args: scope.num_pos_args,
    n_kwonly_args: scope.num_kwonly_args,
    scope_flags: scope.scope_flags,
  });
}
