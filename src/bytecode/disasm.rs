//! Disassembly of finished code objects.
//!
//! This is the read side of the wire format: it walks the code-info block
//! (sizes, names, line table) and the bytecode stream and renders an
//! `offset | bytes | mnemonic` listing. Instruction offsets match the
//! offsets the emitter records for labels, so jump targets in the listing
//! line up with the listed instructions.

use std::fmt::{self, Display};

use super::WORD;
use crate::bytecode::opcode as op;
use crate::bytecode::varint;
use crate::glue::CodeObject;
use crate::qstr::Qstr;

impl CodeObject {
  pub fn disassemble(&self) -> Disassembly<'_> {
    Disassembly { code: self }
  }
}

pub struct Disassembly<'a> {
  code: &'a CodeObject,
}

impl Display for Disassembly<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let info = self.code.code_info();
    let (_, mut p) = varint::decode_uint(info);
    let (name, n) = varint::decode_uint(&info[p..]);
    p += n;
    let (file, n) = varint::decode_uint(&info[p..]);
    p += n;
    let lines: Vec<(usize, usize)> = LineInfo::new(&info[p..]).collect();

    let bc = self.code.bytecode();
    let n_args = self.code.n_pos_args + self.code.n_kwonly_args;
    let mut pc = n_args * WORD;

    writeln!(f, "fn q{name} file q{file}")?;
    let args: Vec<String> = bc[..pc]
      .chunks(WORD)
      .map(|chunk| {
        let word = usize::from_ne_bytes(chunk.try_into().unwrap());
        if word == Qstr::STAR.0 as usize {
          "*".to_string()
        } else {
          format!("q{word}")
        }
      })
      .collect();
    writeln!(f, "args = [{}]", args.join(", "))?;

    let (n_state, n) = varint::decode_uint(&bc[pc..]);
    pc += n;
    let (exc_stack_size, n) = varint::decode_uint(&bc[pc..]);
    pc += n;
    writeln!(f, "n_state = {n_state}")?;
    writeln!(f, "exc_stack_size = {exc_stack_size}")?;

    let mut cells = Vec::new();
    while bc[pc] != 255 {
      cells.push(bc[pc] as usize);
      pc += 1;
    }
    pc += 1;
    writeln!(f, "cells = {cells:?}")?;
    writeln!(f, "lines = {lines:?}")?;

    writeln!(f, "bytecode (length = {}):", bc.len())?;
    let offset_width = bc.len().to_string().len();
    while pc < bc.len() {
      let (instruction, size) = decode_instruction(bc, pc);
      let bytes: String = bc[pc..pc + size].iter().map(|b| format!("{b:02x} ")).collect();
      writeln!(f, "  {pc:>offset_width$} | {bytes:<18}{instruction}")?;
      pc += size;
    }
    Ok(())
  }
}

/// Iterator over the (bytes to skip, lines to skip) records of a line table.
pub struct LineInfo<'a> {
  table: &'a [u8],
}

impl<'a> LineInfo<'a> {
  pub fn new(table: &'a [u8]) -> LineInfo<'a> {
    LineInfo { table }
  }
}

impl Iterator for LineInfo<'_> {
  type Item = (usize, usize);

  fn next(&mut self) -> Option<(usize, usize)> {
    let (&b0, rest) = self.table.split_first()?;
    if b0 == 0 {
      // end of table
      return None;
    }
    if b0 & 0x80 == 0 {
      self.table = rest;
      Some(((b0 & 0x1f) as usize, ((b0 >> 5) & 0x3) as usize))
    } else {
      let (&b1, rest) = rest.split_first()?;
      self.table = rest;
      Some((
        (b0 & 0xf) as usize,
        ((b0 as usize & 0x70) << 4) | b1 as usize,
      ))
    }
  }
}

/// Decode one instruction, returning its rendering and its size in bytes.
fn decode_instruction(bc: &[u8], pc: usize) -> (String, usize) {
  let opcode = bc[pc];

  // multi-opcode families fold their operand into the opcode byte
  if (op::LOAD_CONST_SMALL_INT_MULTI..op::LOAD_CONST_SMALL_INT_MULTI + 64).contains(&opcode) {
    let arg = opcode as isize - (op::LOAD_CONST_SMALL_INT_MULTI as isize + 16);
    return (format!("load_const_small_int {arg}"), 1);
  }
  if (op::LOAD_FAST_MULTI..op::LOAD_FAST_MULTI + 16).contains(&opcode) {
    return (format!("load_fast {}", opcode - op::LOAD_FAST_MULTI), 1);
  }
  if (op::STORE_FAST_MULTI..op::STORE_FAST_MULTI + 16).contains(&opcode) {
    return (format!("store_fast {}", opcode - op::STORE_FAST_MULTI), 1);
  }
  if (op::UNARY_OP_MULTI..op::UNARY_OP_MULTI + 7).contains(&opcode) {
    return (format!("unary_op {}", opcode - op::UNARY_OP_MULTI), 1);
  }
  if (op::BINARY_OP_MULTI..op::BINARY_OP_MULTI + 35).contains(&opcode) {
    return (format!("binary_op {}", opcode - op::BINARY_OP_MULTI), 1);
  }

  let mnemonic = |o: u8| op::name(o).expect("unknown opcode").to_ascii_lowercase();

  match opcode {
    // interned-name operand, possibly followed by an inline-cache byte
    op::LOAD_NAME | op::LOAD_GLOBAL | op::LOAD_ATTR | op::STORE_ATTR => {
      let (qst, n) = varint::decode_uint(&bc[pc + 1..]);
      let cache = cfg!(feature = "cache-lookup") as usize;
      (format!("{} q{qst}", mnemonic(opcode)), 1 + n + cache)
    }
    op::LOAD_CONST_STRING
    | op::LOAD_METHOD
    | op::STORE_NAME
    | op::STORE_GLOBAL
    | op::DELETE_NAME
    | op::DELETE_GLOBAL
    | op::IMPORT_NAME
    | op::IMPORT_FROM => {
      let (qst, n) = varint::decode_uint(&bc[pc + 1..]);
      (format!("{} q{qst}", mnemonic(opcode)), 1 + n)
    }
    op::LOAD_FAST_N
    | op::LOAD_DEREF
    | op::STORE_FAST_N
    | op::STORE_DEREF
    | op::DELETE_FAST
    | op::DELETE_DEREF
    | op::BUILD_TUPLE
    | op::BUILD_LIST
    | op::LIST_APPEND
    | op::BUILD_MAP
    | op::MAP_ADD
    | op::BUILD_SET
    | op::SET_ADD
    | op::BUILD_SLICE
    | op::UNPACK_SEQUENCE => {
      let (val, n) = varint::decode_uint(&bc[pc + 1..]);
      (format!("{} {val}", mnemonic(opcode)), 1 + n)
    }
    op::UNPACK_EX => {
      let (val, n) = varint::decode_uint(&bc[pc + 1..]);
      (
        format!("unpack_ex left={} right={}", val & 0xff, val >> 8),
        1 + n,
      )
    }
    op::CALL_FUNCTION | op::CALL_FUNCTION_VAR_KW | op::CALL_METHOD | op::CALL_METHOD_VAR_KW => {
      let (val, n) = varint::decode_uint(&bc[pc + 1..]);
      (
        format!("{} n_pos={} n_kw={}", mnemonic(opcode), val & 0xff, val >> 8),
        1 + n,
      )
    }
    op::LOAD_CONST_SMALL_INT => {
      let (val, n) = varint::decode_int(&bc[pc + 1..]);
      (format!("load_const_small_int {val}"), 1 + n)
    }
    op::JUMP
    | op::POP_JUMP_IF_TRUE
    | op::POP_JUMP_IF_FALSE
    | op::JUMP_IF_TRUE_OR_POP
    | op::JUMP_IF_FALSE_OR_POP => {
      let raw = bc[pc + 1] as usize | ((bc[pc + 2] as usize) << 8);
      let target = (pc + 3) as isize + raw as isize - 0x8000;
      (format!("{} @{target}", mnemonic(opcode)), 3)
    }
    op::UNWIND_JUMP => {
      let raw = bc[pc + 1] as usize | ((bc[pc + 2] as usize) << 8);
      let target = (pc + 3) as isize + raw as isize - 0x8000;
      let trailer = bc[pc + 3];
      let mut text = format!("unwind_jump @{target} depth={}", trailer & 0x7f);
      if trailer & 0x80 != 0 {
        text.push_str(" break");
      }
      (text, 4)
    }
    op::SETUP_WITH | op::SETUP_EXCEPT | op::SETUP_FINALLY | op::FOR_ITER => {
      let raw = bc[pc + 1] as usize | ((bc[pc + 2] as usize) << 8);
      (format!("{} @{}", mnemonic(opcode), pc + 3 + raw), 3)
    }
    op::LOAD_CONST_OBJ => {
      let (word, end) = read_word(bc, pc + 1);
      (format!("load_const_obj obj({word:#x})"), end - pc)
    }
    op::MAKE_FUNCTION | op::MAKE_FUNCTION_DEFARGS => {
      let (word, end) = read_word(bc, pc + 1);
      (format!("{} code({word:#x})", mnemonic(opcode)), end - pc)
    }
    op::MAKE_CLOSURE | op::MAKE_CLOSURE_DEFARGS => {
      let (word, end) = read_word(bc, pc + 1);
      (
        format!(
          "{} code({word:#x}) n_closed_over={}",
          mnemonic(opcode),
          bc[end]
        ),
        end + 1 - pc,
      )
    }
    op::RAISE_VARARGS => (format!("raise_varargs {}", bc[pc + 1]), 2),
    _ => (mnemonic(opcode), 1),
  }
}

// Word-aligned embedded handle; returns the word and the offset just past it.
fn read_word(bc: &[u8], offset: usize) -> (usize, usize) {
  let aligned = (offset + WORD - 1) & !(WORD - 1);
  let word = usize::from_ne_bytes(bc[aligned..aligned + WORD].try_into().unwrap());
  (word, aligned + WORD)
}
