pub mod bytecode;
pub mod emit;
pub mod glue;
pub mod qstr;
pub mod scope;

#[cfg(feature = "native-emitter")]
pub use emit::Backend;
pub use emit::{BytecodeEmitter, Label, Pass, StarFlags};
pub use glue::{CodeObject, RawCode};
pub use qstr::{Obj, Qstr};
pub use scope::Scope;
