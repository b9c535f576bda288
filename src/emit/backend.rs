//! The full back-end operation table.
//!
//! The tree walker drives a code generator exclusively through this table,
//! so a native-code emitter can be swapped in behind the same calls. The
//! bytecode emitter implements it by plain delegation.

use super::{BytecodeEmitter, Label, Pass, StarFlags};
use crate::bytecode::opcode::{BinaryOp, ConstTok, UnaryOp};
use crate::glue::RawCode;
use crate::qstr::{Obj, Qstr};

pub trait Backend {
  /// Hint for native back ends; the bytecode emitter ignores it.
  fn set_native_type(&mut self, op: usize, arg1: usize, arg2: Qstr);
  fn start_pass(&mut self, pass: Pass);
  fn end_pass(&mut self);
  fn last_emit_was_return_value(&self) -> bool;
  fn adjust_stack_size(&mut self, delta: isize);
  fn set_source_line(&mut self, source_line: usize);

  fn load_fast(&mut self, qst: Qstr, local_num: usize);
  fn load_deref(&mut self, qst: Qstr, local_num: usize);
  fn load_name(&mut self, qst: Qstr);
  fn load_global(&mut self, qst: Qstr);
  fn store_fast(&mut self, qst: Qstr, local_num: usize);
  fn store_deref(&mut self, qst: Qstr, local_num: usize);
  fn store_name(&mut self, qst: Qstr);
  fn store_global(&mut self, qst: Qstr);
  fn delete_fast(&mut self, qst: Qstr, local_num: usize);
  fn delete_deref(&mut self, qst: Qstr, local_num: usize);
  fn delete_name(&mut self, qst: Qstr);
  fn delete_global(&mut self, qst: Qstr);

  fn label_assign(&mut self, label: Label);
  fn import_name(&mut self, qst: Qstr);
  fn import_from(&mut self, qst: Qstr);
  fn import_star(&mut self);
  fn load_const_tok(&mut self, tok: ConstTok);
  fn load_const_small_int(&mut self, arg: isize);
  fn load_const_str(&mut self, qst: Qstr);
  fn load_const_obj(&mut self, obj: Obj);
  fn load_null(&mut self);
  fn load_attr(&mut self, qst: Qstr);
  fn load_method(&mut self, qst: Qstr);
  fn load_build_class(&mut self);
  fn load_subscr(&mut self);
  fn store_attr(&mut self, qst: Qstr);
  fn store_subscr(&mut self);
  fn delete_attr(&mut self, qst: Qstr);
  fn delete_subscr(&mut self);
  fn dup_top(&mut self);
  fn dup_top_two(&mut self);
  fn pop_top(&mut self);
  fn rot_two(&mut self);
  fn rot_three(&mut self);
  fn jump(&mut self, label: Label);
  fn pop_jump_if(&mut self, cond: bool, label: Label);
  fn jump_if_or_pop(&mut self, cond: bool, label: Label);
  fn unwind_jump(&mut self, label: Label, except_depth: usize, break_from_for: bool);
  fn setup_with(&mut self, label: Label);
  fn with_cleanup(&mut self);
  fn setup_except(&mut self, label: Label);
  fn setup_finally(&mut self, label: Label);
  fn end_finally(&mut self);
  fn get_iter(&mut self);
  fn for_iter(&mut self, label: Label);
  fn for_iter_end(&mut self);
  fn pop_block(&mut self);
  fn pop_except(&mut self);
  fn unary_op(&mut self, unary_op: UnaryOp);
  fn binary_op(&mut self, binary_op: BinaryOp);
  fn build_tuple(&mut self, n_args: usize);
  fn build_list(&mut self, n_args: usize);
  fn list_append(&mut self, list_stack_index: usize);
  fn build_map(&mut self, n_args: usize);
  fn store_map(&mut self);
  fn map_add(&mut self, map_stack_index: usize);
  #[cfg(feature = "builtin-set")]
  fn build_set(&mut self, n_args: usize);
  #[cfg(feature = "builtin-set")]
  fn set_add(&mut self, set_stack_index: usize);
  #[cfg(feature = "builtin-slice")]
  fn build_slice(&mut self, n_args: usize);
  fn unpack_sequence(&mut self, n_args: usize);
  fn unpack_ex(&mut self, n_left: usize, n_right: usize);
  fn make_function(&mut self, raw_code: RawCode, n_pos_defaults: usize, n_kw_defaults: usize);
  fn make_closure(
    &mut self,
    raw_code: RawCode,
    n_closed_over: usize,
    n_pos_defaults: usize,
    n_kw_defaults: usize,
  );
  fn call_function(&mut self, n_positional: usize, n_keyword: usize, star_flags: StarFlags);
  fn call_method(&mut self, n_positional: usize, n_keyword: usize, star_flags: StarFlags);
  fn return_value(&mut self);
  fn raise_varargs(&mut self, n_args: usize);
  fn yield_value(&mut self);
  fn yield_from(&mut self);

  fn start_except_handler(&mut self);
  fn end_except_handler(&mut self);
}

macro_rules! delegate {
  ($($name:ident($($arg:ident: $ty:ty),*) $(-> $ret:ty)?;)*) => {
    $(fn $name(&mut self, $($arg: $ty),*) $(-> $ret)? {
      BytecodeEmitter::$name(self, $($arg),*)
    })*
  };
}

impl Backend for BytecodeEmitter<'_> {
  fn last_emit_was_return_value(&self) -> bool {
    BytecodeEmitter::last_emit_was_return_value(self)
  }

  delegate! {
    set_native_type(op: usize, arg1: usize, arg2: Qstr);
    start_pass(pass: Pass);
    end_pass();
    adjust_stack_size(delta: isize);
    set_source_line(source_line: usize);
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
    label_assign(label: Label);
    import_name(qst: Qstr);
    import_from(qst: Qstr);
    import_star();
    load_const_tok(tok: ConstTok);
    load_const_small_int(arg: isize);
    load_const_str(qst: Qstr);
    load_const_obj(obj: Obj);
    load_null();
    load_attr(qst: Qstr);
    load_method(qst: Qstr);
    load_build_class();
    load_subscr();
    store_attr(qst: Qstr);
    store_subscr();
    delete_attr(qst: Qstr);
    delete_subscr();
    dup_top();
    dup_top_two();
    pop_top();
    rot_two();
    rot_three();
    jump(label: Label);
    pop_jump_if(cond: bool, label: Label);
    jump_if_or_pop(cond: bool, label: Label);
    unwind_jump(label: Label, except_depth: usize, break_from_for: bool);
    setup_with(label: Label);
    with_cleanup();
    setup_except(label: Label);
    setup_finally(label: Label);
    end_finally();
    get_iter();
    for_iter(label: Label);
    for_iter_end();
    pop_block();
    pop_except();
    unary_op(unary_op: UnaryOp);
    binary_op(binary_op: BinaryOp);
    build_tuple(n_args: usize);
    build_list(n_args: usize);
    list_append(list_stack_index: usize);
    build_map(n_args: usize);
    store_map();
    map_add(map_stack_index: usize);
    unpack_sequence(n_args: usize);
    unpack_ex(n_left: usize, n_right: usize);
    make_function(raw_code: RawCode, n_pos_defaults: usize, n_kw_defaults: usize);
    make_closure(raw_code: RawCode, n_closed_over: usize, n_pos_defaults: usize, n_kw_defaults: usize);
    call_function(n_positional: usize, n_keyword: usize, star_flags: StarFlags);
    call_method(n_positional: usize, n_keyword: usize, star_flags: StarFlags);
    return_value();
    raise_varargs(n_args: usize);
    yield_value();
    yield_from();
    start_except_handler();
    end_except_handler();
  }

  #[cfg(feature = "builtin-set")]
  delegate! {
    build_set(n_args: usize);
    set_add(set_stack_index: usize);
  }

  #[cfg(feature = "builtin-slice")]
  delegate! {
    build_slice(n_args: usize);
  }
}
