//! Interned-string and object handles.
//!
//! Identifiers and literal strings reach the emitter as opaque integer ids
//! assigned by an external intern pool; runtime objects reach it as opaque
//! word-sized handles. The emitter never constructs or compares strings.

/// Interned string id, compared by integer equality only.
///
/// The low ids of the pool are fixed, which gives the compiler a handful of
/// well-known names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Qstr(pub u32);

impl Qstr {
  /// The `*` placeholder, used as the name of argument slots that have no
  /// corresponding parameter. No real argument can ever be named `*`, which
  /// also makes it easy to spot in dumps.
  pub const STAR: Qstr = Qstr(1);
}

/// Opaque reference to a runtime object, stored in bytecode as one machine
/// word.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Obj(pub usize);

impl Obj {
  /// The ellipsis singleton.
  pub const ELLIPSIS: Obj = Obj(2);
}

impl From<Qstr> for Obj {
  /// The runtime represents interned strings as tagged words; the emitter
  /// only forwards the handle value.
  fn from(qst: Qstr) -> Obj {
    Obj(qst.0 as usize)
  }
}
