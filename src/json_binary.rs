//! MySQL's self-describing binary JSON container format: the same type-byte
//! constants, small/large container layouts, binary-search-by-(length,bytes)
//! key lookup, and escaping/double-rendering rules that `mysqlbinlog` itself
//! uses when printing a `JSON` column's binary value.

use bytes::{Buf, Bytes};
use std::io;

const SMALL_OBJECT: u8 = 0x00;
const SMALL_ARRAY: u8 = 0x01;
const LARGE_OBJECT: u8 = 0x02;
const LARGE_ARRAY: u8 = 0x03;
const LITERAL: u8 = 0x04;
const INT16: u8 = 0x05;
const UINT16: u8 = 0x06;
const INT32: u8 = 0x07;
const UINT32: u8 = 0x08;
const INT64: u8 = 0x09;
const UINT64: u8 = 0x0a;
const DOUBLE: u8 = 0x0b;
const STRING: u8 = 0x0c;
const OPAQUE: u8 = 0x0f;

const LITERAL_NULL: u8 = 0x00;
const LITERAL_TRUE: u8 = 0x01;
const LITERAL_FALSE: u8 = 0x02;

const SMALL_OFFSET_SIZE: usize = 2;
const LARGE_OFFSET_SIZE: usize = 4;
const KEY_ENTRY_SIZE_SMALL: usize = 2 + SMALL_OFFSET_SIZE;
const KEY_ENTRY_SIZE_LARGE: usize = 2 + LARGE_OFFSET_SIZE;
const VALUE_ENTRY_SIZE_SMALL: usize = 1 + SMALL_OFFSET_SIZE;
const VALUE_ENTRY_SIZE_LARGE: usize = 1 + LARGE_OFFSET_SIZE;

#[derive(Debug, Clone, PartialEq)]
pub enum JsonValue {
  Null,
  Bool(bool),
  Int(i64),
  UInt(u64),
  Double(f64),
  String(String),
  /// Raw opaque scalar, tagged with its MySQL column-type code (e.g. for
  /// DECIMAL or DATETIME values embedded in JSON).
  Opaque { mysql_type: u8, data: Vec<u8> },
  Array(Vec<JsonValue>),
  Object(Vec<(String, JsonValue)>),
}

impl JsonValue {
  pub fn to_json_text(&self) -> String {
    let mut out = String::new();
    self.write_json_text(&mut out);
    out
  }

  fn write_json_text(&self, out: &mut String) {
    match self {
      JsonValue::Null => out.push_str("null"),
      JsonValue::Bool(true) => out.push_str("true"),
      JsonValue::Bool(false) => out.push_str("false"),
      JsonValue::Int(v) => out.push_str(&v.to_string()),
      JsonValue::UInt(v) => out.push_str(&v.to_string()),
      JsonValue::Double(v) => out.push_str(&render_double(*v)),
      JsonValue::String(s) => double_quote(s, out),
      JsonValue::Opaque { data, .. } => double_quote(&String::from_utf8_lossy(data), out),
      JsonValue::Array(items) => {
        out.push('[');
        for (i, item) in items.iter().enumerate() {
          if i > 0 {
            out.push_str(", ");
          }
          item.write_json_text(out);
        }
        out.push(']');
      }
      JsonValue::Object(fields) => {
        out.push('{');
        for (i, (k, v)) in fields.iter().enumerate() {
          if i > 0 {
            out.push_str(", ");
          }
          double_quote(k, out);
          out.push_str(": ");
          v.write_json_text(out);
        }
        out.push('}');
      }
    }
  }

  /// Object keys are stored sorted by `(length, bytes)`, so lookup is a
  /// binary search rather than a linear scan.
  pub fn lookup(&self, key: &str) -> Option<&JsonValue> {
    match self {
      JsonValue::Object(fields) => {
        fields.binary_search_by(|(k, _)| cmp_key(k.as_bytes(), key.as_bytes())).ok().map(|i| &fields[i].1)
      }
      _ => None,
    }
  }
}

fn cmp_key(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
  a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn render_double(v: f64) -> String {
  if v == v.trunc() && v.abs() < 1e15 {
    return format!("{v}");
  }
  // digits10 + 1 == 16 for f64, avoiding `1.3300000000000001`-style noise.
  let s = format!("{v:.16e}");
  let parsed: f64 = s.parse().unwrap_or(v);
  let mut out = format!("{parsed}");
  if !out.contains('.') && !out.contains('e') {
    out.push_str(".0");
  }
  out
}

fn double_quote(s: &str, out: &mut String) {
  out.push('"');
  for c in s.chars() {
    match c {
      '"' => out.push_str("\\\""),
      '\\' => out.push_str("\\\\"),
      '\x08' => out.push_str("\\b"),
      '\x0c' => out.push_str("\\f"),
      '\n' => out.push_str("\\n"),
      '\r' => out.push_str("\\r"),
      '\t' => out.push_str("\\t"),
      c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
      c => out.push(c),
    }
  }
  out.push('"');
}

/// Parses a complete JSON binary value: `type-byte(1) || body`.
pub fn parse_binary(mut b: Bytes) -> io::Result<JsonValue> {
  let ty = b.get_u8();
  parse_value(ty, b)
}

fn parse_value(ty: u8, b: Bytes) -> io::Result<JsonValue> {
  match ty {
    SMALL_OBJECT => parse_container(b, false, true),
    LARGE_OBJECT => parse_container(b, true, true),
    SMALL_ARRAY => parse_container(b, false, false),
    LARGE_ARRAY => parse_container(b, true, false),
    LITERAL => parse_literal(&mut b.clone()),
    INT16 => Ok(JsonValue::Int(b.clone().get_i16_le() as i64)),
    UINT16 => Ok(JsonValue::UInt(b.clone().get_u16_le() as u64)),
    INT32 => Ok(JsonValue::Int(b.clone().get_i32_le() as i64)),
    UINT32 => Ok(JsonValue::UInt(b.clone().get_u32_le() as u64)),
    INT64 => Ok(JsonValue::Int(b.clone().get_i64_le())),
    UINT64 => Ok(JsonValue::UInt(b.clone().get_u64_le())),
    DOUBLE => Ok(JsonValue::Double(b.clone().get_f64_le())),
    STRING => parse_string(b),
    OPAQUE => parse_opaque(b),
    unknown => Err(invalid(format!("unsupported json binary type byte {unknown:#x}"))),
  }
}

fn parse_literal(b: &mut Bytes) -> io::Result<JsonValue> {
  match b.get_u8() {
    LITERAL_NULL => Ok(JsonValue::Null),
    LITERAL_TRUE => Ok(JsonValue::Bool(true)),
    LITERAL_FALSE => Ok(JsonValue::Bool(false)),
    unknown => Err(invalid(format!("unsupported json literal {unknown:#x}"))),
  }
}

/// Reads a 7-bit-per-byte varint length prefix, up to 5 bytes.
fn read_variable_length(b: &mut Bytes) -> io::Result<usize> {
  let mut len: usize = 0;
  for i in 0..5 {
    if !b.has_remaining() {
      return Err(invalid("truncated json binary length"));
    }
    let byte = b.get_u8();
    len |= ((byte & 0x7f) as usize) << (7 * i);
    if byte & 0x80 == 0 {
      return Ok(len);
    }
  }
  Err(invalid("json binary length prefix too long"))
}

fn parse_string(mut b: Bytes) -> io::Result<JsonValue> {
  let len = read_variable_length(&mut b)?;
  if b.remaining() < len {
    return Err(invalid("truncated json binary string"));
  }
  let bytes = b.copy_to_bytes(len);
  String::from_utf8(bytes.to_vec()).map(JsonValue::String).map_err(|_| invalid("invalid utf-8 in json binary string"))
}

fn parse_opaque(mut b: Bytes) -> io::Result<JsonValue> {
  let mysql_type = b.get_u8();
  let len = read_variable_length(&mut b)?;
  if b.remaining() < len {
    return Err(invalid("truncated json binary opaque value"));
  }
  let data = b.copy_to_bytes(len).to_vec();
  Ok(JsonValue::Opaque { mysql_type, data })
}

fn parse_container(b: Bytes, large: bool, is_object: bool) -> io::Result<JsonValue> {
  let offset_size = if large { LARGE_OFFSET_SIZE } else { SMALL_OFFSET_SIZE };
  let mut header = b.clone();
  let count = read_size(&mut header, offset_size)?;
  let total_bytes = read_size(&mut header, offset_size)?;

  if total_bytes > b.len() {
    return Err(invalid("json binary container total-bytes exceeds buffer"));
  }
  let body = b.slice(0..total_bytes);

  let key_entry_size = if is_object {
    if large {
      KEY_ENTRY_SIZE_LARGE
    } else {
      KEY_ENTRY_SIZE_SMALL
    }
  } else {
    0
  };
  let value_entry_size = if large { VALUE_ENTRY_SIZE_LARGE } else { VALUE_ENTRY_SIZE_SMALL };

  let header_size = 2 * offset_size + count * (key_entry_size + value_entry_size);
  if header_size > total_bytes {
    return Err(invalid("json binary container header exceeds total-bytes"));
  }

  let mut keys = Vec::with_capacity(if is_object { count } else { 0 });
  if is_object {
    let mut key_cursor = body.slice(2 * offset_size..);
    for _ in 0..count {
      let key_offset = read_size(&mut key_cursor.clone(), offset_size)?;
      let mut entry = key_cursor.clone();
      let key_offset_val = read_size(&mut entry, offset_size)?;
      let key_len = entry.get_u16_le() as usize;
      let _ = key_offset;
      if key_offset_val < header_size || key_offset_val + key_len > total_bytes {
        return Err(invalid("json binary key pointer out of bounds"));
      }
      let key_bytes = body.slice(key_offset_val..key_offset_val + key_len);
      keys.push(String::from_utf8(key_bytes.to_vec()).map_err(|_| invalid("invalid utf-8 in json binary key"))?);
      key_cursor.advance(key_entry_size);
    }
  }

  let mut values = Vec::with_capacity(count);
  let values_start = 2 * offset_size + count * key_entry_size;
  let mut value_cursor = body.slice(values_start..);
  for _ in 0..count {
    let mut entry = value_cursor.clone();
    let entry_type = entry.get_u8();
    let inlined = matches!(entry_type, LITERAL | INT16 | UINT16) || (large && matches!(entry_type, INT32 | UINT32));

    let value = if inlined {
      parse_value(entry_type, entry.slice(0..offset_size - 1))?
    } else {
      let value_offset = read_size(&mut entry, offset_size)?;
      if value_offset < header_size || value_offset > total_bytes {
        return Err(invalid("json binary value pointer out of bounds"));
      }
      parse_value(entry_type, body.slice(value_offset..))?
    };

    values.push(value);
    value_cursor.advance(value_entry_size);
  }

  if is_object {
    let fields: Vec<(String, JsonValue)> = keys.into_iter().zip(values).collect();
    for w in fields.windows(2) {
      if cmp_key(w[0].0.as_bytes(), w[1].0.as_bytes()) != std::cmp::Ordering::Less {
        return Err(invalid("json binary object keys are not strictly ascending"));
      }
    }
    Ok(JsonValue::Object(fields))
  } else {
    Ok(JsonValue::Array(values))
  }
}

fn read_size(b: &mut Bytes, size: usize) -> io::Result<usize> {
  if b.remaining() < size {
    return Err(invalid("truncated json binary size field"));
  }
  Ok(b.get_uint_le(size) as usize)
}

fn invalid(msg: impl Into<String>) -> io::Error {
  io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn decodes_small_object_with_scalar_and_array() {
    // {"a":1,"b":[true,null]}
    // key entries: "a"@offset(after header), "b"@offset
    // build manually per the small-object layout.
    let mut buf = Vec::new();
    buf.push(SMALL_OBJECT);
    let count: u16 = 2;
    buf.extend_from_slice(&count.to_le_bytes());
    // placeholder for total_bytes, patched below
    let total_bytes_pos = buf.len();
    buf.extend_from_slice(&[0, 0]);

    // key entries: (offset:2, len:2) x2
    let key_entries_pos = buf.len();
    buf.extend_from_slice(&[0u8; KEY_ENTRY_SIZE_SMALL * 2]);
    // value entries: (type:1, offset/inline:2) x2
    let value_entries_pos = buf.len();
    buf.extend_from_slice(&[0u8; VALUE_ENTRY_SIZE_SMALL * 2]);

    let header_len = buf.len();

    // key data
    let key_a_offset = buf.len() - 1; // relative to body start (byte 1, i.e. after type byte)
    buf.extend_from_slice(b"a");
    let key_b_offset = buf.len() - 1;
    buf.extend_from_slice(b"b");

    // array value for "b": [true, null] small array
    let array_offset = buf.len() - 1;
    let mut array_buf = Vec::new();
    array_buf.push(SMALL_ARRAY);
    array_buf.extend_from_slice(&2u16.to_le_bytes());
    let arr_total_pos = array_buf.len();
    array_buf.extend_from_slice(&[0, 0]);
    array_buf.push(LITERAL);
    array_buf.push(LITERAL_TRUE);
    array_buf.push(0); // pad offset field to 2 bytes
    array_buf.push(LITERAL);
    array_buf.push(LITERAL_NULL);
    array_buf.push(0);
    let arr_total = (array_buf.len() - 1) as u16;
    array_buf[arr_total_pos..arr_total_pos + 2].copy_from_slice(&arr_total.to_le_bytes());
    buf.extend_from_slice(&array_buf[1..]); // body only, type byte handled by value entry

    // patch key entries
    buf[key_entries_pos..key_entries_pos + 2].copy_from_slice(&(key_a_offset as u16).to_le_bytes());
    buf[key_entries_pos + 2..key_entries_pos + 4].copy_from_slice(&1u16.to_le_bytes());
    buf[key_entries_pos + 4..key_entries_pos + 6].copy_from_slice(&(key_b_offset as u16).to_le_bytes());
    buf[key_entries_pos + 6..key_entries_pos + 8].copy_from_slice(&1u16.to_le_bytes());

    // patch value entries: "a" -> INT16 inline value 1; "b" -> array at array_offset
    buf[value_entries_pos] = INT16;
    buf[value_entries_pos + 1..value_entries_pos + 3].copy_from_slice(&1u16.to_le_bytes());
    buf[value_entries_pos + 3] = SMALL_ARRAY;
    buf[value_entries_pos + 4..value_entries_pos + 6].copy_from_slice(&(array_offset as u16).to_le_bytes());

    let total_bytes = (buf.len() - 1) as u16;
    buf[total_bytes_pos..total_bytes_pos + 2].copy_from_slice(&total_bytes.to_le_bytes());
    let _ = header_len;

    let value = parse_binary(Bytes::from(buf)).unwrap();
    assert_eq!(value.to_json_text(), "{\"a\": 1, \"b\": [true, null]}");
  }

  #[test]
  fn rejects_out_of_order_keys() {
    // two single-char keys "b" then "a" — not ascending.
    let mut buf = Vec::new();
    buf.push(SMALL_OBJECT);
    buf.extend_from_slice(&2u16.to_le_bytes());
    let total_pos = buf.len();
    buf.extend_from_slice(&[0, 0]);
    let key_entries_pos = buf.len();
    buf.extend_from_slice(&[0u8; KEY_ENTRY_SIZE_SMALL * 2]);
    let value_entries_pos = buf.len();
    buf.extend_from_slice(&[0u8; VALUE_ENTRY_SIZE_SMALL * 2]);
    let b_off = buf.len() - 1;
    buf.extend_from_slice(b"b");
    let a_off = buf.len() - 1;
    buf.extend_from_slice(b"a");

    buf[key_entries_pos..key_entries_pos + 2].copy_from_slice(&(b_off as u16).to_le_bytes());
    buf[key_entries_pos + 2..key_entries_pos + 4].copy_from_slice(&1u16.to_le_bytes());
    buf[key_entries_pos + 4..key_entries_pos + 6].copy_from_slice(&(a_off as u16).to_le_bytes());
    buf[key_entries_pos + 6..key_entries_pos + 8].copy_from_slice(&1u16.to_le_bytes());

    buf[value_entries_pos] = LITERAL;
    buf[value_entries_pos + 1] = LITERAL_NULL;
    buf[value_entries_pos + 3] = LITERAL;
    buf[value_entries_pos + 4] = LITERAL_NULL;

    let total = (buf.len() - 1) as u16;
    buf[total_pos..total_pos + 2].copy_from_slice(&total.to_le_bytes());

    assert!(parse_binary(Bytes::from(buf)).is_err());
  }
}
