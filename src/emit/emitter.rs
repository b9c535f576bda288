use super::{Label, Pass, StarFlags};
use crate::bytecode::opcode as op;
use crate::bytecode::opcode::{BinaryOp, ConstTok, UnaryOp};
use crate::bytecode::{varint, WORD};
use crate::glue::{self, RawCode};
use crate::qstr::{Obj, Qstr};
use crate::scope::{IdFlags, IdKind, Scope, ScopeFlags};

const UNRESOLVED: usize = usize::MAX;

/// Destination stream of a shared writer call.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Dest {
  CodeInfo,
  Bytecode,
}

/// Emits the code object for one function scope.
///
/// Create one per function, then drive it through the passes:
///
/// ```
/// use habu::emit::{BytecodeEmitter, Pass};
/// use habu::glue::RawCode;
/// use habu::qstr::Qstr;
/// use habu::scope::Scope;
///
/// let mut scope = Scope::new(Qstr(10), Qstr(11), RawCode(0));
/// let mut emit = BytecodeEmitter::new(&mut scope, 0, 0);
/// for pass in [Pass::Scope, Pass::CodeSize, Pass::Emit] {
///   emit.start_pass(pass);
///   emit.load_const_small_int(42);
///   emit.return_value();
///   emit.end_pass();
/// }
/// drop(emit);
/// assert!(scope.code.is_some());
/// ```
///
/// Errors detected here are programming errors in the caller or internal
/// inconsistencies, and panic. There is no partial-recovery path; a failed
/// compilation discards the emitter and its buffer.
pub struct BytecodeEmitter<'s> {
  pass: Pass,
  scope: &'s mut Scope,
  /// Current operand stack depth; the high-water mark is written through to
  /// the scope.
  stack_size: isize,
  last_emit_was_return_value: bool,
  bytecode_offset: usize,
  code_info_offset: usize,
  /// Sizes measured at the end of the `CodeSize` pass.
  bytecode_size: usize,
  code_info_size: usize,
  /// The final buffer, allocated at the end of the `CodeSize` pass and
  /// handed to the glue at the end of the `Emit` pass.
  code_base: Option<Box<[u8]>>,
  /// Offset of each label within the bytecode stream, recorded in the
  /// `CodeSize` pass and consumed in the `Emit` pass.
  label_offsets: Box<[usize]>,
  last_source_line: usize,
  last_source_line_offset: usize,
  opt_level: u8,
  /// Scratch handed out by the writers in measuring passes, so callers can
  /// write through the returned slice unconditionally.
  dummy: [u8; varint::MAX_LEN],
}

impl<'s> BytecodeEmitter<'s> {
  /// Create an emitter for one function. `max_num_labels` is the number of
  /// labels the front end will assign over the whole emit sequence.
  pub fn new(scope: &'s mut Scope, max_num_labels: usize, opt_level: u8) -> BytecodeEmitter<'s> {
    BytecodeEmitter {
      pass: Pass::Scope,
      scope,
      stack_size: 0,
      last_emit_was_return_value: false,
      bytecode_offset: 0,
      code_info_offset: 0,
      bytecode_size: 0,
      code_info_size: 0,
      code_base: None,
      label_offsets: vec![UNRESOLVED; max_num_labels].into_boxed_slice(),
      last_source_line: 1,
      last_source_line_offset: 0,
      opt_level,
      dummy: [0; varint::MAX_LEN],
    }
  }

  // Every code-info write goes through here. In measuring passes only the
  // offset advances and the scratch buffer is handed back.
  fn cur_to_write_code_info(&mut self, num_bytes: usize) -> &mut [u8] {
    if self.pass < Pass::Emit {
      self.code_info_offset += num_bytes;
      &mut self.dummy[..num_bytes]
    } else {
      assert!(self.code_info_offset + num_bytes <= self.code_info_size);
      let start = self.code_info_offset;
      self.code_info_offset += num_bytes;
      let buf = self.code_base.as_mut().expect("no buffer in final pass");
      &mut buf[start..start + num_bytes]
    }
  }

  // Every bytecode write goes through here; same deal as the code-info
  // writer. The bytecode region sits behind the code info in the buffer.
  fn cur_to_write_bytecode(&mut self, num_bytes: usize) -> &mut [u8] {
    if self.pass < Pass::Emit {
      self.bytecode_offset += num_bytes;
      &mut self.dummy[..num_bytes]
    } else {
      assert!(self.bytecode_offset + num_bytes <= self.bytecode_size);
      let start = self.code_info_size + self.bytecode_offset;
      self.bytecode_offset += num_bytes;
      let buf = self.code_base.as_mut().expect("no buffer in final pass");
      &mut buf[start..start + num_bytes]
    }
  }

  fn cur_to_write(&mut self, dest: Dest, num_bytes: usize) -> &mut [u8] {
    match dest {
      Dest::CodeInfo => self.cur_to_write_code_info(num_bytes),
      Dest::Bytecode => self.cur_to_write_bytecode(num_bytes),
    }
  }

  fn align_code_info(&mut self) {
    self.code_info_offset = (self.code_info_offset + WORD - 1) & !(WORD - 1);
  }

  fn align_bytecode(&mut self) {
    self.bytecode_offset = (self.bytecode_offset + WORD - 1) & !(WORD - 1);
  }

  fn write_uint(&mut self, dest: Dest, val: usize) {
    let mut buf = [0; varint::MAX_LEN];
    let encoded = varint::encode_uint(&mut buf, val);
    self.cur_to_write(dest, encoded.len()).copy_from_slice(encoded);
  }

  fn write_code_info_uint(&mut self, val: usize) {
    self.write_uint(Dest::CodeInfo, val);
  }

  fn write_code_info_qstr(&mut self, qst: Qstr) {
    self.write_uint(Dest::CodeInfo, qst.0 as usize);
  }

  #[cfg(feature = "source-line")]
  fn write_code_info_bytes_lines(&mut self, mut bytes_to_skip: usize, mut lines_to_skip: usize) {
    assert!(bytes_to_skip > 0 || lines_to_skip > 0);
    while bytes_to_skip > 0 || lines_to_skip > 0 {
      if lines_to_skip <= 6 {
        // 0b0LLBBBBB encoding
        let b = bytes_to_skip.min(0x1f);
        let l = lines_to_skip.min(0x3);
        self.cur_to_write_code_info(1)[0] = (b | (l << 5)) as u8;
        bytes_to_skip -= b;
        lines_to_skip -= l;
      } else {
        // 0b1LLLBBBB 0bLLLLLLLL encoding, low bits of L in the second byte
        let b = bytes_to_skip.min(0xf);
        let l = lines_to_skip.min(0x7ff);
        let ci = self.cur_to_write_code_info(2);
        ci[0] = (0x80 | b | ((l >> 4) & 0x70)) as u8;
        ci[1] = l as u8;
        bytes_to_skip -= b;
        lines_to_skip -= l;
      }
    }
  }

  fn write_bytecode_byte(&mut self, b1: u8) {
    self.cur_to_write_bytecode(1)[0] = b1;
  }

  fn write_bytecode_uint(&mut self, val: usize) {
    self.write_uint(Dest::Bytecode, val);
  }

  fn write_bytecode_byte_byte(&mut self, b1: u8, b2: u8) {
    let c = self.cur_to_write_bytecode(2);
    c[0] = b1;
    c[1] = b2;
  }

  // Same 7-bit groups as write_uint, with extra handling to encode the sign.
  fn write_bytecode_byte_int(&mut self, b1: u8, num: isize) {
    self.write_bytecode_byte(b1);
    let mut buf = [0; varint::MAX_LEN];
    let encoded = varint::encode_int(&mut buf, num);
    self
      .cur_to_write_bytecode(encoded.len())
      .copy_from_slice(encoded);
  }

  fn write_bytecode_byte_uint(&mut self, b1: u8, val: usize) {
    self.write_bytecode_byte(b1);
    self.write_uint(Dest::Bytecode, val);
  }

  fn write_bytecode_byte_qstr(&mut self, b1: u8, qst: Qstr) {
    self.write_bytecode_byte_uint(b1, qst.0 as usize);
  }

  // Word-sized handle at an offset that is already word-aligned (only the
  // argument-name table at the very start of the bytecode stream qualifies).
  fn write_bytecode_prealigned_ptr(&mut self, ptr: usize) {
    debug_assert_eq!(self.bytecode_offset % WORD, 0);
    self
      .cur_to_write_bytecode(WORD)
      .copy_from_slice(&ptr.to_ne_bytes());
  }

  // Pads up to a word boundary first, so a scanning allocator can identify
  // the embedded handle.
  fn write_bytecode_byte_ptr(&mut self, b1: u8, ptr: usize) {
    self.write_bytecode_byte(b1);
    self.align_bytecode();
    self
      .cur_to_write_bytecode(WORD)
      .copy_from_slice(&ptr.to_ne_bytes());
  }

  // Unsigned jumps are forward only. The displacement is relative to the
  // byte after the 3-byte instruction and stored as 16 bits little-endian.
  fn write_bytecode_byte_unsigned_label(&mut self, b1: u8, label: Label) {
    let bytecode_offset = if self.pass < Pass::Emit {
      // forward label offsets are not known yet; only the byte count matters
      0
    } else {
      let target = self.label_offsets[label.0 as usize] as isize;
      let disp = target - self.bytecode_offset as isize - 3;
      assert!(
        (0..=0xffff).contains(&disp),
        "unsigned jump displacement out of range"
      );
      disp as usize
    };
    let c = self.cur_to_write_bytecode(3);
    c[0] = b1;
    c[1] = bytecode_offset as u8;
    c[2] = (bytecode_offset >> 8) as u8;
  }

  // Signed jumps may go either way; the 16-bit displacement is stored with a
  // 0x8000 bias.
  fn write_bytecode_byte_signed_label(&mut self, b1: u8, label: Label) {
    let bytecode_offset = if self.pass < Pass::Emit {
      0
    } else {
      let target = self.label_offsets[label.0 as usize] as isize;
      let disp = target - self.bytecode_offset as isize - 3 + 0x8000;
      assert!(
        (0..=0xffff).contains(&disp),
        "signed jump displacement out of range"
      );
      disp as usize
    };
    let c = self.cur_to_write_bytecode(3);
    c[0] = b1;
    c[1] = bytecode_offset as u8;
    c[2] = (bytecode_offset >> 8) as u8;
  }

  pub fn start_pass(&mut self, pass: Pass) {
    self.pass = pass;
    self.stack_size = 0;
    self.last_emit_was_return_value = false;
    self.last_source_line_offset = 0;
    self.last_source_line = 1;
    if pass < Pass::Emit {
      for offset in self.label_offsets.iter_mut() {
        *offset = UNRESOLVED;
      }
    }
    self.bytecode_offset = 0;
    self.code_info_offset = 0;

    // Code-info size as a varint. In the measuring pass the room for it is
    // reserved in end_pass instead, since the value is only known there.
    if pass == Pass::Emit {
      self.write_code_info_uint(self.code_info_size);
    }

    // name and source file of this function
    self.write_code_info_qstr(self.scope.simple_name);
    self.write_code_info_qstr(self.scope.source_file);

    // Argument-name table. For argument position i, find the identifier that
    // is a parameter with local slot i; closed-over arguments mean this is
    // not a straight 1-1 walk. Slots with no matching parameter get the `*`
    // placeholder. Stored as full words so the VM can index the table
    // directly when matching keyword arguments; this is the start of the
    // bytecode stream and is word-aligned.
    for i in 0..self.scope.num_pos_args + self.scope.num_kwonly_args {
      let mut qst = Qstr::STAR;
      for (name, id) in self.scope.id_info.iter() {
        if id.flags.contains(IdFlags::IS_PARAM) && id.local_num == i {
          qst = *name;
          break;
        }
      }
      self.write_bytecode_prealigned_ptr(Obj::from(qst).0);
    }

    // Local state size and exception stack size. At least one state slot is
    // always needed: an exception propagated through this function is
    // returned in the highest slot of the state.
    let mut n_state = self.scope.num_locals + self.scope.stack_size;
    if n_state == 0 {
      n_state = 1;
    }
    self.write_bytecode_uint(n_state);
    self.write_bytecode_uint(self.scope.exc_stack_size);

    // Locals promoted to heap cells on entry, terminated by the sentinel.
    let cells: Vec<usize> = self
      .scope
      .id_info
      .values()
      .filter(|id| id.kind == IdKind::Cell)
      .map(|id| id.local_num)
      .collect();
    for local_num in cells {
      assert!(local_num < 255);
      self.write_bytecode_byte(local_num as u8);
    }
    self.write_bytecode_byte(255);
  }

  pub fn end_pass(&mut self) {
    if self.pass == Pass::Scope {
      return;
    }

    // check the stack is back to zero size
    if self.stack_size != 0 {
      log::warn!("stack size not back to zero; got {}", self.stack_size);
    }

    // end of line number info
    self.cur_to_write_code_info(1)[0] = 0;

    if self.pass == Pass::CodeSize {
      // The code-info size is written as a varint whose own length is not
      // known until the value is known. Reserve room for the largest value
      // it could possibly be; whatever is left over is absorbed by the
      // alignment gap between the code-info block and the bytecode.
      let max_code_info_size = self.code_info_offset + varint::MAX_LEN + WORD - 1;
      self.write_code_info_uint(max_code_info_size);

      // Dead space, so the bytecode that follows starts on a machine word.
      self.align_code_info();

      self.code_info_size = self.code_info_offset;
      self.bytecode_size = self.bytecode_offset;
      self.code_base =
        Some(vec![0u8; self.code_info_size + self.bytecode_size].into_boxed_slice());
    } else if self.pass == Pass::Emit {
      debug_assert_eq!(self.bytecode_offset, self.bytecode_size);
      let buf = self.code_base.take().expect("no buffer in final pass");
      glue::assign_bytecode(self.scope, buf);
    }
  }

  pub fn last_emit_was_return_value(&self) -> bool {
    self.last_emit_was_return_value
  }

  /// Raw stack-depth adjustment. Unlike the tracked operations this touches
  /// neither the high-water mark nor the return-value flag.
  pub fn adjust_stack_size(&mut self, delta: isize) {
    self.stack_size += delta;
  }

  #[cfg_attr(not(feature = "source-line"), allow(unused_variables))]
  pub fn set_source_line(&mut self, source_line: usize) {
    #[cfg(feature = "source-line")]
    {
      if self.opt_level >= 3 {
        // at high optimization levels line numbers are not stored at all
        return;
      }
      if source_line > self.last_source_line {
        let bytes_to_skip = self.bytecode_offset - self.last_source_line_offset;
        let lines_to_skip = source_line - self.last_source_line;
        self.write_code_info_bytes_lines(bytes_to_skip, lines_to_skip);
        self.last_source_line_offset = self.bytecode_offset;
        self.last_source_line = source_line;
      }
    }
  }

  // Stack-effect bookkeeping shared by (almost) every operation.
  fn pre(&mut self, stack_size_delta: isize) {
    if self.pass == Pass::Scope {
      return;
    }
    assert!(self.stack_size + stack_size_delta >= 0);
    self.stack_size += stack_size_delta;
    if self.stack_size as usize > self.scope.stack_size {
      self.scope.stack_size = self.stack_size as usize;
    }
    self.last_emit_was_return_value = false;
  }

  pub fn label_assign(&mut self, label: Label) {
    self.pre(0);
    if self.pass == Pass::Scope {
      return;
    }
    let l = label.0 as usize;
    assert!(l < self.label_offsets.len());
    if self.pass < Pass::Emit {
      // assign label offset
      assert!(
        self.label_offsets[l] == UNRESOLVED,
        "label {l} assigned twice"
      );
      self.label_offsets[l] = self.bytecode_offset;
    } else {
      // ensure the label offset has not drifted since the measuring pass
      assert!(
        self.label_offsets[l] == self.bytecode_offset,
        "label {l} offset drifted between passes"
      );
    }
  }

  pub fn import_name(&mut self, qst: Qstr) {
    self.pre(-1);
    self.write_bytecode_byte_qstr(op::IMPORT_NAME, qst);
  }

  pub fn import_from(&mut self, qst: Qstr) {
    self.pre(1);
    self.write_bytecode_byte_qstr(op::IMPORT_FROM, qst);
  }

  pub fn import_star(&mut self) {
    self.pre(-1);
    self.write_bytecode_byte(op::IMPORT_STAR);
  }

  pub fn load_const_tok(&mut self, tok: ConstTok) {
    self.pre(1);
    match tok {
      ConstTok::False => self.write_bytecode_byte(op::LOAD_CONST_FALSE),
      ConstTok::None => self.write_bytecode_byte(op::LOAD_CONST_NONE),
      ConstTok::True => self.write_bytecode_byte(op::LOAD_CONST_TRUE),
      ConstTok::Ellipsis => self.write_bytecode_byte_ptr(op::LOAD_CONST_OBJ, Obj::ELLIPSIS.0),
    }
  }

  pub fn load_const_small_int(&mut self, arg: isize) {
    self.pre(1);
    if (-16..=47).contains(&arg) {
      self.write_bytecode_byte(op::LOAD_CONST_SMALL_INT_MULTI + (arg + 16) as u8);
    } else {
      self.write_bytecode_byte_int(op::LOAD_CONST_SMALL_INT, arg);
    }
  }

  pub fn load_const_str(&mut self, qst: Qstr) {
    self.pre(1);
    self.write_bytecode_byte_qstr(op::LOAD_CONST_STRING, qst);
  }

  pub fn load_const_obj(&mut self, obj: Obj) {
    self.pre(1);
    self.write_bytecode_byte_ptr(op::LOAD_CONST_OBJ, obj.0);
  }

  pub fn load_null(&mut self) {
    self.pre(1);
    self.write_bytecode_byte(op::LOAD_NULL);
  }

  pub fn load_fast(&mut self, _qst: Qstr, local_num: usize) {
    self.pre(1);
    if local_num <= 15 {
      self.write_bytecode_byte(op::LOAD_FAST_MULTI + local_num as u8);
    } else {
      self.write_bytecode_byte_uint(op::LOAD_FAST_N, local_num);
    }
  }

  pub fn load_deref(&mut self, _qst: Qstr, local_num: usize) {
    self.pre(1);
    self.write_bytecode_byte_uint(op::LOAD_DEREF, local_num);
  }

  pub fn load_name(&mut self, qst: Qstr) {
    self.pre(1);
    self.write_bytecode_byte_qstr(op::LOAD_NAME, qst);
    if cfg!(feature = "cache-lookup") {
      self.write_bytecode_byte(0);
    }
  }

  pub fn load_global(&mut self, qst: Qstr) {
    self.pre(1);
    self.write_bytecode_byte_qstr(op::LOAD_GLOBAL, qst);
    if cfg!(feature = "cache-lookup") {
      self.write_bytecode_byte(0);
    }
  }

  pub fn load_attr(&mut self, qst: Qstr) {
    self.pre(0);
    self.write_bytecode_byte_qstr(op::LOAD_ATTR, qst);
    if cfg!(feature = "cache-lookup") {
      self.write_bytecode_byte(0);
    }
  }

  pub fn load_method(&mut self, qst: Qstr) {
    self.pre(1);
    self.write_bytecode_byte_qstr(op::LOAD_METHOD, qst);
  }

  pub fn load_build_class(&mut self) {
    self.pre(1);
    self.write_bytecode_byte(op::LOAD_BUILD_CLASS);
  }

  pub fn load_subscr(&mut self) {
    self.pre(-1);
    self.write_bytecode_byte(op::LOAD_SUBSCR);
  }

  pub fn store_fast(&mut self, _qst: Qstr, local_num: usize) {
    self.pre(-1);
    if local_num <= 15 {
      self.write_bytecode_byte(op::STORE_FAST_MULTI + local_num as u8);
    } else {
      self.write_bytecode_byte_uint(op::STORE_FAST_N, local_num);
    }
  }

  pub fn store_deref(&mut self, _qst: Qstr, local_num: usize) {
    self.pre(-1);
    self.write_bytecode_byte_uint(op::STORE_DEREF, local_num);
  }

  pub fn store_name(&mut self, qst: Qstr) {
    self.pre(-1);
    self.write_bytecode_byte_qstr(op::STORE_NAME, qst);
  }

  pub fn store_global(&mut self, qst: Qstr) {
    self.pre(-1);
    self.write_bytecode_byte_qstr(op::STORE_GLOBAL, qst);
  }

  pub fn store_attr(&mut self, qst: Qstr) {
    self.pre(-2);
    self.write_bytecode_byte_qstr(op::STORE_ATTR, qst);
    if cfg!(feature = "cache-lookup") {
      self.write_bytecode_byte(0);
    }
  }

  pub fn store_subscr(&mut self) {
    self.pre(-3);
    self.write_bytecode_byte(op::STORE_SUBSCR);
  }

  pub fn delete_fast(&mut self, _qst: Qstr, local_num: usize) {
    self.write_bytecode_byte_uint(op::DELETE_FAST, local_num);
  }

  pub fn delete_deref(&mut self, _qst: Qstr, local_num: usize) {
    self.write_bytecode_byte_uint(op::DELETE_DEREF, local_num);
  }

  pub fn delete_name(&mut self, qst: Qstr) {
    self.pre(0);
    self.write_bytecode_byte_qstr(op::DELETE_NAME, qst);
  }

  pub fn delete_global(&mut self, qst: Qstr) {
    self.pre(0);
    self.write_bytecode_byte_qstr(op::DELETE_GLOBAL, qst);
  }

  pub fn delete_attr(&mut self, qst: Qstr) {
    self.load_null();
    self.rot_two();
    self.store_attr(qst);
  }

  pub fn delete_subscr(&mut self) {
    self.load_null();
    self.rot_three();
    self.store_subscr();
  }

  pub fn dup_top(&mut self) {
    self.pre(1);
    self.write_bytecode_byte(op::DUP_TOP);
  }

  pub fn dup_top_two(&mut self) {
    self.pre(2);
    self.write_bytecode_byte(op::DUP_TOP_TWO);
  }

  pub fn pop_top(&mut self) {
    self.pre(-1);
    self.write_bytecode_byte(op::POP_TOP);
  }

  pub fn rot_two(&mut self) {
    self.pre(0);
    self.write_bytecode_byte(op::ROT_TWO);
  }

  pub fn rot_three(&mut self) {
    self.pre(0);
    self.write_bytecode_byte(op::ROT_THREE);
  }

  pub fn jump(&mut self, label: Label) {
    self.pre(0);
    self.write_bytecode_byte_signed_label(op::JUMP, label);
  }

  pub fn pop_jump_if(&mut self, cond: bool, label: Label) {
    self.pre(-1);
    if cond {
      self.write_bytecode_byte_signed_label(op::POP_JUMP_IF_TRUE, label);
    } else {
      self.write_bytecode_byte_signed_label(op::POP_JUMP_IF_FALSE, label);
    }
  }

  pub fn jump_if_or_pop(&mut self, cond: bool, label: Label) {
    self.pre(-1);
    if cond {
      self.write_bytecode_byte_signed_label(op::JUMP_IF_TRUE_OR_POP, label);
    } else {
      self.write_bytecode_byte_signed_label(op::JUMP_IF_FALSE_OR_POP, label);
    }
  }

  pub fn unwind_jump(&mut self, label: Label, except_depth: usize, break_from_for: bool) {
    if except_depth == 0 {
      self.pre(0);
      if break_from_for {
        // pop the iterator when breaking out of a for loop
        self.write_bytecode_byte(op::POP_TOP);
      }
      self.write_bytecode_byte_signed_label(op::JUMP, label);
    } else {
      assert!(except_depth <= 0x7f);
      self.write_bytecode_byte_signed_label(op::UNWIND_JUMP, label);
      self.write_bytecode_byte(if break_from_for { 0x80 } else { 0 } | except_depth as u8);
    }
  }

  pub fn setup_with(&mut self, label: Label) {
    // 4 slots for the duration of the with block: bound method, context
    // manager, and room for the cleanup handler state
    self.pre(4);
    self.write_bytecode_byte_unsigned_label(op::SETUP_WITH, label);
  }

  pub fn with_cleanup(&mut self) {
    self.pre(-4);
    self.write_bytecode_byte(op::WITH_CLEANUP);
  }

  pub fn setup_except(&mut self, label: Label) {
    self.pre(0);
    self.write_bytecode_byte_unsigned_label(op::SETUP_EXCEPT, label);
  }

  pub fn setup_finally(&mut self, label: Label) {
    self.pre(0);
    self.write_bytecode_byte_unsigned_label(op::SETUP_FINALLY, label);
  }

  pub fn end_finally(&mut self) {
    self.pre(-1);
    self.write_bytecode_byte(op::END_FINALLY);
  }

  pub fn get_iter(&mut self) {
    self.pre(0);
    self.write_bytecode_byte(op::GET_ITER);
  }

  pub fn for_iter(&mut self, label: Label) {
    self.pre(1);
    self.write_bytecode_byte_unsigned_label(op::FOR_ITER, label);
  }

  pub fn for_iter_end(&mut self) {
    self.pre(-1);
  }

  pub fn pop_block(&mut self) {
    self.pre(0);
    self.write_bytecode_byte(op::POP_BLOCK);
  }

  pub fn pop_except(&mut self) {
    self.pre(0);
    self.write_bytecode_byte(op::POP_EXCEPT);
  }

  pub fn unary_op(&mut self, unary_op: UnaryOp) {
    if unary_op == UnaryOp::Not {
      // `not x` is bool coercion followed by the dedicated NOT
      self.pre(0);
      self.write_bytecode_byte(op::UNARY_OP_MULTI + UnaryOp::Bool as u8);
      self.pre(0);
      self.write_bytecode_byte(op::NOT);
    } else {
      self.pre(0);
      self.write_bytecode_byte(op::UNARY_OP_MULTI + unary_op as u8);
    }
  }

  pub fn binary_op(&mut self, binary_op: BinaryOp) {
    let (binary_op, invert) = match binary_op {
      BinaryOp::NotIn => (BinaryOp::In, true),
      BinaryOp::IsNot => (BinaryOp::Is, true),
      other => (other, false),
    };
    self.pre(-1);
    self.write_bytecode_byte(op::BINARY_OP_MULTI + binary_op as u8);
    if invert {
      self.pre(0);
      self.write_bytecode_byte(op::NOT);
    }
  }

  pub fn build_tuple(&mut self, n_args: usize) {
    self.pre(1 - n_args as isize);
    self.write_bytecode_byte_uint(op::BUILD_TUPLE, n_args);
  }

  pub fn build_list(&mut self, n_args: usize) {
    self.pre(1 - n_args as isize);
    self.write_bytecode_byte_uint(op::BUILD_LIST, n_args);
  }

  pub fn list_append(&mut self, list_stack_index: usize) {
    self.pre(-1);
    self.write_bytecode_byte_uint(op::LIST_APPEND, list_stack_index);
  }

  pub fn build_map(&mut self, n_args: usize) {
    // a map starts empty; entries are stored into it one by one
    self.pre(1);
    self.write_bytecode_byte_uint(op::BUILD_MAP, n_args);
  }

  pub fn store_map(&mut self) {
    self.pre(-2);
    self.write_bytecode_byte(op::STORE_MAP);
  }

  pub fn map_add(&mut self, map_stack_index: usize) {
    self.pre(-2);
    self.write_bytecode_byte_uint(op::MAP_ADD, map_stack_index);
  }

  #[cfg(feature = "builtin-set")]
  pub fn build_set(&mut self, n_args: usize) {
    self.pre(1 - n_args as isize);
    self.write_bytecode_byte_uint(op::BUILD_SET, n_args);
  }

  #[cfg(feature = "builtin-set")]
  pub fn set_add(&mut self, set_stack_index: usize) {
    self.pre(-1);
    self.write_bytecode_byte_uint(op::SET_ADD, set_stack_index);
  }

  #[cfg(feature = "builtin-slice")]
  pub fn build_slice(&mut self, n_args: usize) {
    self.pre(1 - n_args as isize);
    self.write_bytecode_byte_uint(op::BUILD_SLICE, n_args);
  }

  pub fn unpack_sequence(&mut self, n_args: usize) {
    self.pre(-1 + n_args as isize);
    self.write_bytecode_byte_uint(op::UNPACK_SEQUENCE, n_args);
  }

  pub fn unpack_ex(&mut self, n_left: usize, n_right: usize) {
    // consumes the sequence, produces left items, the extras list, and right
    // items
    self.pre(-1 + n_left as isize + n_right as isize + 1);
    self.write_bytecode_byte_uint(op::UNPACK_EX, n_left | (n_right << 8));
  }

  pub fn make_function(&mut self, raw_code: RawCode, n_pos_defaults: usize, n_kw_defaults: usize) {
    if n_pos_defaults == 0 && n_kw_defaults == 0 {
      self.pre(1);
      self.write_bytecode_byte_ptr(op::MAKE_FUNCTION, raw_code.0);
    } else {
      // the defaults tuple and dict are consumed from the stack
      self.pre(-1);
      self.write_bytecode_byte_ptr(op::MAKE_FUNCTION_DEFARGS, raw_code.0);
    }
  }

  pub fn make_closure(
    &mut self,
    raw_code: RawCode,
    n_closed_over: usize,
    n_pos_defaults: usize,
    n_kw_defaults: usize,
  ) {
    assert!(n_closed_over <= 255);
    if n_pos_defaults == 0 && n_kw_defaults == 0 {
      self.pre(-(n_closed_over as isize) + 1);
      self.write_bytecode_byte_ptr(op::MAKE_CLOSURE, raw_code.0);
      self.write_bytecode_byte(n_closed_over as u8);
    } else {
      self.pre(-2 - n_closed_over as isize + 1);
      self.write_bytecode_byte_ptr(op::MAKE_CLOSURE_DEFARGS, raw_code.0);
      self.write_bytecode_byte(n_closed_over as u8);
    }
  }

  fn call_function_method_helper(
    &mut self,
    stack_adj: isize,
    bytecode_base: u8,
    n_positional: usize,
    n_keyword: usize,
    star_flags: StarFlags,
  ) {
    if !star_flags.is_empty() {
      if !star_flags.contains(StarFlags::SINGLE) {
        // dummy entry for the missing pos_seq
        self.load_null();
        self.rot_two();
      } else if !star_flags.contains(StarFlags::DOUBLE) {
        // dummy entry for the missing kw_dict
        self.load_null();
      }
      self.pre(stack_adj - n_positional as isize - 2 * n_keyword as isize - 2);
      self.write_bytecode_byte_uint(bytecode_base + 1, (n_keyword << 8) | n_positional);
    } else {
      self.pre(stack_adj - n_positional as isize - 2 * n_keyword as isize);
      self.write_bytecode_byte_uint(bytecode_base, (n_keyword << 8) | n_positional);
    }
  }

  pub fn call_function(&mut self, n_positional: usize, n_keyword: usize, star_flags: StarFlags) {
    self.call_function_method_helper(0, op::CALL_FUNCTION, n_positional, n_keyword, star_flags);
  }

  pub fn call_method(&mut self, n_positional: usize, n_keyword: usize, star_flags: StarFlags) {
    self.call_function_method_helper(-1, op::CALL_METHOD, n_positional, n_keyword, star_flags);
  }

  pub fn return_value(&mut self) {
    self.pre(-1);
    self.last_emit_was_return_value = true;
    self.write_bytecode_byte(op::RETURN_VALUE);
  }

  pub fn raise_varargs(&mut self, n_args: usize) {
    assert!(n_args <= 2);
    self.pre(-(n_args as isize));
    self.write_bytecode_byte_byte(op::RAISE_VARARGS, n_args as u8);
  }

  pub fn yield_value(&mut self) {
    self.pre(0);
    self.scope.scope_flags.insert(ScopeFlags::GENERATOR);
    self.write_bytecode_byte(op::YIELD_VALUE);
  }

  pub fn yield_from(&mut self) {
    self.pre(-1);
    self.scope.scope_flags.insert(ScopeFlags::GENERATOR);
    self.write_bytecode_byte(op::YIELD_FROM);
  }

  pub fn start_except_handler(&mut self) {
    // 3 slots for the exception items, 3 more for possible UNWIND_JUMP state
    self.adjust_stack_size(6);
  }

  pub fn end_except_handler(&mut self) {
    self.adjust_stack_size(-5);
  }

  #[cfg(feature = "native-emitter")]
  pub fn set_native_type(&mut self, _op: usize, _arg1: usize, _arg2: Qstr) {}
}

#[cfg(test)]
mod tests;
