//! Variable-length integer codec.
//!
//! Values are stored 7 bits per byte, most significant group first. Every
//! byte except the last has the high bit set. The signed form additionally
//! guarantees that bit `0x40` of the first byte matches the sign of the
//! value, prepending one extra byte when it would not; the decoder
//! sign-extends from that bit.

/// Worst-case encoded length of one machine word.
pub const MAX_LEN: usize = (usize::BITS as usize + 6) / 7;

/// Encode `val` into `buf`, returning the encoded bytes.
pub fn encode_uint(buf: &mut [u8; MAX_LEN], mut val: usize) -> &[u8] {
  // build the 7-bit groups back to front
  let mut p = MAX_LEN;
  loop {
    p -= 1;
    buf[p] = (val & 0x7f) as u8;
    val >>= 7;
    if val == 0 {
      break;
    }
  }
  for b in &mut buf[p..MAX_LEN - 1] {
    *b |= 0x80;
  }
  &buf[p..]
}

/// Encode `val`, preserving its sign for the decoder.
pub fn encode_int(buf: &mut [u8; MAX_LEN], mut val: isize) -> &[u8] {
  let mut p = MAX_LEN;
  loop {
    p -= 1;
    buf[p] = (val & 0x7f) as u8;
    val >>= 7;
    if val == 0 || val == -1 {
      break;
    }
  }
  // the decoder sign-extends from bit 0x40 of the first byte, so that bit
  // must agree with the sign of the value
  if val == -1 && buf[p] & 0x40 == 0 {
    p -= 1;
    buf[p] = 0x7f;
  } else if val == 0 && buf[p] & 0x40 != 0 {
    p -= 1;
    buf[p] = 0;
  }
  for b in &mut buf[p..MAX_LEN - 1] {
    *b |= 0x80;
  }
  &buf[p..]
}

/// Decode an unsigned value, returning it and the number of bytes consumed.
pub fn decode_uint(bytes: &[u8]) -> (usize, usize) {
  let mut val = 0usize;
  let mut n = 0;
  loop {
    let b = bytes[n];
    n += 1;
    val = (val << 7) | (b & 0x7f) as usize;
    if b & 0x80 == 0 {
      break;
    }
  }
  (val, n)
}

/// Decode a signed value, returning it and the number of bytes consumed.
pub fn decode_int(bytes: &[u8]) -> (isize, usize) {
  let mut val: isize = if bytes[0] & 0x40 != 0 { -1 } else { 0 };
  let mut n = 0;
  loop {
    let b = bytes[n];
    n += 1;
    val = (val << 7) | (b & 0x7f) as isize;
    if b & 0x80 == 0 {
      break;
    }
  }
  (val, n)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn uint_bytes(val: usize) -> Vec<u8> {
    let mut buf = [0; MAX_LEN];
    encode_uint(&mut buf, val).to_vec()
  }

  fn int_bytes(val: isize) -> Vec<u8> {
    let mut buf = [0; MAX_LEN];
    encode_int(&mut buf, val).to_vec()
  }

  #[test]
  fn uint_exact_bytes() {
    assert_eq!(uint_bytes(0), [0x00]);
    assert_eq!(uint_bytes(1), [0x01]);
    assert_eq!(uint_bytes(127), [0x7f]);
    assert_eq!(uint_bytes(128), [0x81, 0x00]);
    assert_eq!(uint_bytes(0x102), [0x82, 0x02]);
    assert_eq!(uint_bytes(16384), [0x81, 0x80, 0x00]);
  }

  #[test]
  fn int_exact_bytes() {
    assert_eq!(int_bytes(0), [0x00]);
    assert_eq!(int_bytes(-1), [0x7f]);
    assert_eq!(int_bytes(63), [0x3f]);
    // 64 has bit 0x40 set, so a sign byte is prepended
    assert_eq!(int_bytes(64), [0x80, 0x40]);
    assert_eq!(int_bytes(-64), [0x40]);
    assert_eq!(int_bytes(-65), [0xff, 0x3f]);
    assert_eq!(int_bytes(-17), [0x6f]);
    assert_eq!(int_bytes(48), [0x30]);
  }

  #[test]
  fn uint_round_trip() {
    let values = [
      0,
      1,
      6,
      127,
      128,
      129,
      255,
      300,
      16383,
      16384,
      usize::MAX >> 33,
      usize::MAX >> 1,
      usize::MAX,
    ];
    for val in values {
      let mut buf = [0; MAX_LEN];
      let encoded = encode_uint(&mut buf, val);
      let (decoded, n) = decode_uint(encoded);
      assert_eq!(decoded, val);
      assert_eq!(n, encoded.len());
    }
  }

  #[test]
  fn int_round_trip() {
    let values = [
      0,
      1,
      -1,
      42,
      -42,
      63,
      64,
      -64,
      -65,
      8191,
      8192,
      -8192,
      -8193,
      isize::MAX,
      isize::MIN,
    ];
    for val in values {
      let mut buf = [0; MAX_LEN];
      let encoded = encode_int(&mut buf, val);
      let (decoded, n) = decode_int(encoded);
      assert_eq!(decoded, val);
      assert_eq!(n, encoded.len());
    }
  }

  #[test]
  fn encoded_length_is_bounded() {
    let mut buf = [0; MAX_LEN];
    assert_eq!(encode_uint(&mut buf, usize::MAX).len(), MAX_LEN);
    assert_eq!(encode_int(&mut buf, isize::MIN).len(), MAX_LEN);
    assert_eq!(encode_int(&mut buf, isize::MAX).len(), MAX_LEN);
  }
}
