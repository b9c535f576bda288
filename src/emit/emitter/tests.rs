use super::*;
use crate::bytecode::disasm::LineInfo;
use crate::scope::IdInfo;

fn test_scope() -> Scope {
  Scope::new(Qstr(100), Qstr(101), RawCode(0x1000))
}

/// Drive `sequence` through the full three-pass protocol and hand back the
/// finished scope.
fn compile(mut scope: Scope, max_num_labels: usize, sequence: impl Fn(&mut BytecodeEmitter<'_>)) -> Scope {
  {
    let mut emit = BytecodeEmitter::new(&mut scope, max_num_labels, 0);
    for pass in [Pass::Scope, Pass::CodeSize, Pass::Emit] {
      emit.start_pass(pass);
      sequence(&mut emit);
      emit.end_pass();
    }
  }
  scope
}

fn bytecode(scope: &Scope) -> &[u8] {
  scope.code.as_ref().unwrap().bytecode()
}

/// Assert the bytecode region of a zero-arg, zero-cell function: the state
/// prelude followed by the opcode stream.
fn expect_bytecode(scope: &Scope, n_state: u8, ops: &[u8]) {
  let mut expected = vec![n_state, 0, 255];
  expected.extend_from_slice(ops);
  assert_eq!(bytecode(scope), &expected[..]);
}

#[test]
fn empty_function() {
  let scope = compile(test_scope(), 0, |_| {});
  let code = scope.code.as_ref().unwrap();
  // state prelude only: one propagation slot, no exception stack, no cells
  assert_eq!(code.bytecode(), &[1u8, 0, 255][..]);
  let info = code.code_info();
  assert_eq!(info[0] as usize, code.code_info_size());
  // name, file, line-table terminator
  assert_eq!(&info[1..4], &[100u8, 101, 0][..]);
  assert_eq!(code.code_info_size() % WORD, 0);
  assert_eq!(scope.stack_size, 0);
}

#[test]
fn return_constant() {
  let scope = compile(test_scope(), 0, |emit| {
    emit.load_const_small_int(42);
    emit.return_value();
  });
  expect_bytecode(&scope, 1, &[0xaa, 0x5b]);
  assert_eq!(scope.stack_size, 1);
}

#[test]
fn small_int_opcode_folding() {
  let scope = compile(test_scope(), 0, |emit| {
    for arg in [-16, 47, -17, 48] {
      emit.load_const_small_int(arg);
      emit.pop_top();
    }
  });
  // -16..=47 fold into the opcode byte, the rest go through the signed varint
  expect_bytecode(
    &scope,
    1,
    &[0x70, 0x32, 0xaf, 0x32, 0x14, 0x6f, 0x32, 0x14, 0x30, 0x32],
  );
}

#[test]
fn fast_slot_opcode_folding() {
  let scope = compile(test_scope(), 0, |emit| {
    emit.load_fast(Qstr(5), 15);
    emit.load_fast(Qstr(5), 16);
    emit.store_fast(Qstr(5), 16);
    emit.store_fast(Qstr(5), 15);
  });
  expect_bytecode(&scope, 2, &[0xbf, 0x19, 16, 0x22, 16, 0xcf]);
}

#[test]
fn deref_and_delete_ops() {
  let scope = compile(test_scope(), 0, |emit| {
    emit.load_deref(Qstr(5), 3);
    emit.store_deref(Qstr(5), 3);
    emit.delete_deref(Qstr(5), 3);
    emit.delete_fast(Qstr(5), 4);
  });
  expect_bytecode(&scope, 1, &[0x1a, 0x03, 0x23, 0x03, 0x29, 0x03, 0x28, 0x04]);
}

#[test]
fn name_lookups_reserve_cache_bytes() {
  let scope = compile(test_scope(), 0, |emit| {
    emit.load_name(Qstr(5));
    emit.load_attr(Qstr(6));
    emit.load_null();
    emit.store_attr(Qstr(7));
  });
  expect_bytecode(
    &scope,
    2,
    &[0x1b, 5, 0, 0x1d, 6, 0, 0x18, 0x26, 7, 0],
  );
}

#[test]
fn backward_jump() {
  let scope = compile(test_scope(), 1, |emit| {
    emit.label_assign(Label(0));
    for _ in 0..5 {
      emit.load_const_tok(ConstTok::None);
    }
    emit.jump(Label(0));
    for _ in 0..5 {
      emit.pop_top();
    }
  });
  // disp = -8 + 0x8000 = 0x7ff8
  expect_bytecode(
    &scope,
    5,
    &[
      0x11, 0x11, 0x11, 0x11, 0x11, 0x35, 0xf8, 0x7f, 0x32, 0x32, 0x32, 0x32, 0x32,
    ],
  );
}

#[test]
fn forward_conditional_jump() {
  let scope = compile(test_scope(), 1, |emit| {
    emit.load_null();
    emit.pop_jump_if(true, Label(0));
    emit.label_assign(Label(0));
  });
  expect_bytecode(&scope, 1, &[0x18, 0x36, 0x00, 0x80]);
}

#[test]
fn unsigned_forward_jump() {
  let scope = compile(test_scope(), 1, |emit| {
    emit.setup_except(Label(0));
    emit.pop_block();
    emit.label_assign(Label(0));
  });
  expect_bytecode(&scope, 1, &[0x3f, 0x01, 0x00, 0x44]);
}

#[test]
fn for_loop_shape() {
  let scope = compile(test_scope(), 2, |emit| {
    emit.load_null();
    emit.get_iter();
    emit.label_assign(Label(0));
    emit.for_iter(Label(1));
    emit.pop_top();
    emit.jump(Label(0));
    emit.label_assign(Label(1));
    emit.for_iter_end();
  });
  expect_bytecode(
    &scope,
    2,
    &[0x18, 0x42, 0x43, 0x04, 0x00, 0x32, 0x35, 0xf9, 0x7f],
  );
}

#[test]
fn unwind_jump_encodes_depth() {
  let scope = compile(test_scope(), 1, |emit| {
    emit.label_assign(Label(0));
    emit.unwind_jump(Label(0), 2, true);
  });
  // trailer byte carries the break-from-for bit and the unwind depth
  expect_bytecode(&scope, 1, &[0x3a, 0xfd, 0x7f, 0x82]);
}

#[test]
fn unwind_jump_at_depth_zero_is_plain_jump() {
  let scope = compile(test_scope(), 1, |emit| {
    emit.load_null();
    emit.label_assign(Label(0));
    emit.unwind_jump(Label(0), 0, true);
  });
  // the iterator is popped on the way out
  expect_bytecode(&scope, 1, &[0x18, 0x32, 0x35, 0xfc, 0x7f]);
}

#[test]
fn line_number_table() {
  let scope = compile(test_scope(), 0, |emit| {
    emit.set_source_line(2);
    emit.load_null();
    emit.load_null();
    emit.load_null();
    emit.set_source_line(11);
    emit.pop_top();
    emit.pop_top();
    emit.pop_top();
  });
  let code = scope.code.as_ref().unwrap();
  let info = code.code_info();
  // (3 bytes, 1 line) fits one byte; (3 bytes, 9 lines) needs the two-byte
  // form
  assert_eq!(&info[3..6], &[0x23, 0x83, 0x09][..]);
  assert_eq!(info[6], 0);
  let records: Vec<_> = LineInfo::new(&info[3..]).collect();
  assert_eq!(records, [(3, 1), (3, 9)]);
}

#[test]
fn line_record_splitting() {
  // a byte gap too large for one record is split greedily
  let scope = compile(test_scope(), 0, |emit| {
    for _ in 0..40 {
      emit.load_null();
    }
    emit.set_source_line(3);
    for _ in 0..40 {
      emit.pop_top();
    }
  });
  let info = scope.code.as_ref().unwrap().code_info();
  let records: Vec<_> = LineInfo::new(&info[3..]).collect();
  assert_eq!(records, [(31, 2), (12, 0)]);
}

#[test]
fn opt_level_suppresses_line_info() {
  let mut scope = test_scope();
  {
    let mut emit = BytecodeEmitter::new(&mut scope, 0, 3);
    for pass in [Pass::Scope, Pass::CodeSize, Pass::Emit] {
      emit.start_pass(pass);
      emit.load_null();
      emit.set_source_line(5);
      emit.pop_top();
      emit.end_pass();
    }
  }
  let info = scope.code.as_ref().unwrap().code_info();
  // name, file, then immediately the line-table terminator
  assert_eq!(&info[1..4], &[100u8, 101, 0][..]);
}

#[test]
fn prelude_argument_names_and_cells() {
  let mut scope = test_scope();
  scope.num_pos_args = 2;
  scope.num_kwonly_args = 1;
  scope.num_locals = 3;
  scope.exc_stack_size = 1;
  scope.id_info.insert(
    Qstr(10),
    IdInfo {
      kind: IdKind::Local,
      flags: IdFlags::IS_PARAM,
      local_num: 0,
    },
  );
  scope.id_info.insert(
    Qstr(11),
    IdInfo {
      kind: IdKind::Cell,
      flags: IdFlags::default(),
      local_num: 1,
    },
  );
  scope.id_info.insert(
    Qstr(12),
    IdInfo {
      kind: IdKind::Local,
      flags: IdFlags::IS_PARAM,
      local_num: 2,
    },
  );
  let scope = compile(scope, 0, |_| {});
  let bc = bytecode(&scope);
  // three word-aligned argument names; the slot with no parameter gets `*`
  let words: Vec<usize> = bc[..3 * WORD]
    .chunks(WORD)
    .map(|chunk| usize::from_ne_bytes(chunk.try_into().unwrap()))
    .collect();
  assert_eq!(words, [10, 1, 12]);
  // n_state, exc_stack_size, cell list, sentinel
  assert_eq!(&bc[3 * WORD..], &[3u8, 1, 1, 255][..]);
}

#[test]
fn call_with_star_args() {
  let scope = compile(test_scope(), 0, |emit| {
    for _ in 0..6 {
      emit.load_null();
    }
    emit.call_function(2, 1, StarFlags::SINGLE);
    emit.pop_top();
  });
  // a null kw_dict is injected to keep the operand layout uniform;
  // operand varint is (n_kw << 8) | n_pos
  let mut ops = vec![0x18u8; 7];
  ops.extend([0x65, 0x82, 0x02, 0x32]);
  expect_bytecode(&scope, 7, &ops);
}

#[test]
fn call_with_star_kwargs_only() {
  let scope = compile(test_scope(), 0, |emit| {
    emit.load_null();
    emit.load_null();
    emit.call_function(0, 0, StarFlags::DOUBLE);
    emit.pop_top();
  });
  // the missing pos_seq is injected under the kw_dict
  expect_bytecode(&scope, 3, &[0x18, 0x18, 0x18, 0x33, 0x65, 0x00, 0x32]);
}

#[test]
fn call_method_consumes_receiver() {
  let scope = compile(test_scope(), 0, |emit| {
    emit.load_null();
    emit.load_method(Qstr(7));
    emit.load_null();
    emit.call_method(1, 0, StarFlags::default());
    emit.pop_top();
  });
  expect_bytecode(&scope, 3, &[0x18, 0x1e, 0x07, 0x18, 0x66, 0x01, 0x32]);
}

#[test]
fn unpack_ex_operand_packing() {
  let scope = compile(test_scope(), 0, |emit| {
    emit.load_null();
    emit.unpack_ex(2, 3);
    for _ in 0..6 {
      emit.pop_top();
    }
  });
  let mut ops = vec![0x18u8, 0x5a, 0x86, 0x02];
  ops.extend([0x32; 6]);
  expect_bytecode(&scope, 6, &ops);
}

#[test]
fn aligned_code_handles() {
  let scope = compile(test_scope(), 0, |emit| {
    emit.make_function(RawCode(0x2000), 0, 0);
    emit.pop_top();
  });
  let mut expected = vec![1u8, 0, 255, 0x60];
  while expected.len() % WORD != 0 {
    expected.push(0);
  }
  expected.extend(0x2000usize.to_ne_bytes());
  expected.push(0x32);
  assert_eq!(bytecode(&scope), &expected[..]);
}

#[test]
fn closure_with_defaults() {
  let scope = compile(test_scope(), 0, |emit| {
    // defaults tuple and dict, then two closed-over cells
    emit.load_null();
    emit.load_null();
    emit.load_null();
    emit.load_null();
    emit.make_closure(RawCode(0x2000), 2, 1, 1);
    emit.pop_top();
  });
  let mut expected = vec![4u8, 0, 255, 0x18, 0x18, 0x18, 0x18, 0x63];
  while expected.len() % WORD != 0 {
    expected.push(0);
  }
  expected.extend(0x2000usize.to_ne_bytes());
  expected.push(2);
  expected.push(0x32);
  assert_eq!(bytecode(&scope), &expected[..]);
}

#[test]
fn ellipsis_constant() {
  let scope = compile(test_scope(), 0, |emit| {
    emit.load_const_tok(ConstTok::Ellipsis);
    emit.pop_top();
  });
  let mut expected = vec![1u8, 0, 255, 0x17];
  while expected.len() % WORD != 0 {
    expected.push(0);
  }
  expected.extend(Obj::ELLIPSIS.0.to_ne_bytes());
  expected.push(0x32);
  assert_eq!(bytecode(&scope), &expected[..]);
}

#[test]
fn delete_attr_desugars_to_store() {
  let scope = compile(test_scope(), 0, |emit| {
    emit.load_null();
    emit.delete_attr(Qstr(5));
  });
  // load_null, rot_two, store_attr (with its cache byte)
  expect_bytecode(&scope, 2, &[0x18, 0x18, 0x33, 0x26, 0x05, 0x00]);
}

#[test]
fn delete_subscr_desugars_to_store() {
  let scope = compile(test_scope(), 0, |emit| {
    emit.load_null();
    emit.load_null();
    emit.delete_subscr();
  });
  expect_bytecode(&scope, 3, &[0x18, 0x18, 0x18, 0x34, 0x27]);
}

#[test]
fn not_expands_to_bool_coercion() {
  let scope = compile(test_scope(), 0, |emit| {
    emit.load_null();
    emit.unary_op(UnaryOp::Not);
    emit.pop_top();
  });
  expect_bytecode(&scope, 1, &[0x18, 0xd0, 0x48, 0x32]);
}

#[test]
fn not_in_expands_to_in_then_not() {
  let scope = compile(test_scope(), 0, |emit| {
    emit.load_null();
    emit.load_null();
    emit.binary_op(BinaryOp::NotIn);
    emit.pop_top();
  });
  expect_bytecode(&scope, 2, &[0x18, 0x18, 0xdd, 0x48, 0x32]);
}

#[test]
fn binary_op_family() {
  let scope = compile(test_scope(), 0, |emit| {
    emit.load_null();
    emit.load_null();
    emit.binary_op(BinaryOp::Add);
    emit.pop_top();
  });
  expect_bytecode(&scope, 2, &[0x18, 0x18, 0xf1, 0x32]);
}

#[cfg(all(feature = "builtin-set", feature = "builtin-slice"))]
#[test]
fn builders() {
  let scope = compile(test_scope(), 0, |emit| {
    emit.load_null();
    emit.load_null();
    emit.build_tuple(2);
    emit.pop_top();
    emit.build_map(0);
    emit.load_null();
    emit.load_null();
    emit.store_map();
    emit.pop_top();
    emit.load_null();
    emit.build_set(1);
    emit.pop_top();
    emit.load_null();
    emit.load_null();
    emit.build_slice(2);
    emit.pop_top();
  });
  expect_bytecode(
    &scope,
    3,
    &[
      0x18, 0x18, 0x50, 0x02, 0x32, 0x53, 0x00, 0x18, 0x18, 0x54, 0x32, 0x18, 0x56, 0x01, 0x32,
      0x18, 0x18, 0x58, 0x02, 0x32,
    ],
  );
}

#[test]
fn stack_shuffles_and_raise() {
  let scope = compile(test_scope(), 0, |emit| {
    emit.load_null();
    emit.dup_top();
    emit.dup_top_two();
    emit.rot_three();
    emit.raise_varargs(2);
    emit.pop_top();
    emit.pop_top();
  });
  expect_bytecode(&scope, 4, &[0x18, 0x30, 0x31, 0x34, 0x5c, 0x02, 0x32, 0x32]);
}

#[test]
fn import_ops() {
  let scope = compile(test_scope(), 0, |emit| {
    emit.load_const_small_int(0);
    emit.load_const_tok(ConstTok::None);
    emit.import_name(Qstr(20));
    emit.import_from(Qstr(21));
    emit.store_name(Qstr(22));
    emit.import_star();
  });
  expect_bytecode(&scope, 2, &[0x80, 0x11, 0x68, 20, 0x69, 21, 0x24, 22, 0x6a]);
}

#[test]
fn yield_sets_generator_flag() {
  let scope = compile(test_scope(), 0, |emit| {
    emit.load_null();
    emit.yield_value();
    emit.pop_top();
  });
  assert!(scope.scope_flags.contains(ScopeFlags::GENERATOR));
  let code = scope.code.as_ref().unwrap();
  assert!(code.scope_flags.contains(ScopeFlags::GENERATOR));
  expect_bytecode(&scope, 1, &[0x18, 0x5d, 0x32]);
}

#[test]
fn return_value_flag_is_sticky_until_next_op() {
  let mut scope = test_scope();
  let mut emit = BytecodeEmitter::new(&mut scope, 0, 0);
  emit.start_pass(Pass::CodeSize);
  emit.load_const_tok(ConstTok::None);
  assert!(!emit.last_emit_was_return_value());
  emit.return_value();
  assert!(emit.last_emit_was_return_value());
  emit.load_const_tok(ConstTok::None);
  assert!(!emit.last_emit_was_return_value());
  emit.pop_top();
  emit.end_pass();
}

#[test]
fn except_handler_adjusts_raw_depth() {
  let mut scope = test_scope();
  {
    let mut emit = BytecodeEmitter::new(&mut scope, 0, 0);
    emit.start_pass(Pass::CodeSize);
    emit.start_except_handler();
    emit.pop_top();
    emit.end_except_handler();
    emit.end_pass();
  }
  // the raw adjustment bypasses the high-water mark; only the tracked op
  // after it is seen
  assert_eq!(scope.stack_size, 5);
}

#[test]
fn identical_sequences_produce_identical_buffers() {
  fn sequence(emit: &mut BytecodeEmitter<'_>) {
    emit.set_source_line(2);
    emit.load_null();
    emit.load_method(Qstr(9));
    emit.load_const_small_int(1000);
    emit.call_method(1, 0, StarFlags::default());
    emit.set_source_line(3);
    emit.pop_jump_if(false, Label(0));
    emit.load_global(Qstr(4));
    emit.pop_top();
    emit.label_assign(Label(0));
    emit.load_const_tok(ConstTok::None);
    emit.return_value();
  }
  let a = compile(test_scope(), 1, sequence);
  let b = compile(test_scope(), 1, sequence);
  assert_eq!(
    a.code.as_ref().unwrap().as_bytes(),
    b.code.as_ref().unwrap().as_bytes()
  );
}

#[test]
fn code_regions_cover_buffer() {
  let scope = compile(test_scope(), 0, |emit| {
    emit.load_name(Qstr(3));
    emit.pop_top();
  });
  let code = scope.code.as_ref().unwrap();
  assert_eq!(
    code.code_info().len() + code.bytecode().len(),
    code.as_bytes().len()
  );
  assert_eq!(code.code_info_size() % WORD, 0);
}

#[test]
fn id_op_tables_dispatch() {
  let scope = compile(test_scope(), 0, |emit| {
    (crate::emit::LOAD_ID_OPS.fast)(emit, Qstr(5), 0);
    (crate::emit::STORE_ID_OPS.global)(emit, Qstr(6));
  });
  expect_bytecode(&scope, 1, &[0xb0, 0x25, 0x06]);
}

#[cfg(feature = "native-emitter")]
#[test]
fn backend_trait_objects() {
  let mut scope = test_scope();
  {
    let mut emit = BytecodeEmitter::new(&mut scope, 0, 0);
    let backend: &mut dyn crate::emit::Backend = &mut emit;
    backend.start_pass(Pass::CodeSize);
    backend.load_null();
    backend.pop_top();
    backend.end_pass();
  }
  assert_eq!(scope.stack_size, 1);
}

#[test]
#[should_panic]
fn stack_underflow_panics() {
  let mut scope = test_scope();
  let mut emit = BytecodeEmitter::new(&mut scope, 0, 0);
  emit.start_pass(Pass::CodeSize);
  emit.pop_top();
}

#[test]
#[should_panic]
fn duplicate_label_panics() {
  let mut scope = test_scope();
  let mut emit = BytecodeEmitter::new(&mut scope, 1, 0);
  emit.start_pass(Pass::CodeSize);
  emit.label_assign(Label(0));
  emit.label_assign(Label(0));
}

#[test]
fn disassembly_listing() {
  let scope = compile(test_scope(), 0, |emit| {
    emit.load_const_small_int(42);
    emit.return_value();
  });
  let listing = scope.code.as_ref().unwrap().disassemble().to_string();
  assert_eq!(
    listing,
    indoc::indoc! {"
      fn q100 file q101
      args = []
      n_state = 1
      exc_stack_size = 0
      cells = []
      lines = []
      bytecode (length = 5):
        3 | aa                load_const_small_int 42
        4 | 5b                return_value
    "}
  );
}

#[test]
fn disassembly_snapshot() {
  let mut scope = test_scope();
  scope.num_pos_args = 1;
  scope.num_locals = 1;
  scope.id_info.insert(
    Qstr(7),
    IdInfo {
      kind: IdKind::Local,
      flags: IdFlags::IS_PARAM,
      local_num: 0,
    },
  );
  let scope = compile(scope, 1, |emit| {
    emit.set_source_line(2);
    emit.load_fast(Qstr(7), 0);
    emit.pop_jump_if(false, Label(0));
    emit.load_const_str(Qstr(8));
    emit.return_value();
    emit.label_assign(Label(0));
    emit.load_const_tok(ConstTok::None);
    emit.return_value();
  });
  let listing = scope.code.as_ref().unwrap().disassemble().to_string();
  insta::assert_snapshot!(listing, @r"
  fn q100 file q101
  args = [q7]
  n_state = 2
  exc_stack_size = 0
  cells = []
  lines = [(11, 1)]
  bytecode (length = 20):
    11 | b0                load_fast 0
    12 | 37 03 80          pop_jump_if_false @18
    15 | 16 08             load_const_string q8
    17 | 5b                return_value
    18 | 11                load_const_none
    19 | 5b                return_value
  ");
}
