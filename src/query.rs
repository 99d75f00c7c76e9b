use std::{
  io,
  slice::{ChunksExact, ChunksExactMut},
};

use bytes::{Buf, Bytes};

use super::{
  buf_ext::BufExt,
  constants::{ColumnFlags, ColumnType},
};

/// Owned results for 0..N rows. Used only for the handful of administrative
/// text-protocol queries the session issues (`SHOW MASTER STATUS`, `SHOW
/// BINARY LOGS`, checksum negotiation) — no binary protocol support.
#[derive(Debug, Default)]
pub struct QueryResults {
  pub columns: Vec<Column>,
  pub values: Vec<RowValue>,
}

impl QueryResults {
  pub fn columns_len(&self) -> usize {
    self.columns.len()
  }

  pub fn row(&self, i: usize) -> &[RowValue] {
    let len = self.columns.len();
    let start = i * len;
    let end = start + len;
    &self.values[start..end]
  }

  pub fn row_mut(&mut self, i: usize) -> &mut [RowValue] {
    let len = self.columns.len();
    let start = i * len;
    let end = start + len;
    &mut self.values[start..end]
  }

  pub fn rows_len(&self) -> usize {
    if !self.columns.is_empty() {
      self.values.len() / self.columns.len()
    } else {
      0
    }
  }

  pub fn rows(&self) -> Option<ChunksExact<'_, RowValue>> {
    if !self.columns.is_empty() {
      Some(self.values.chunks_exact(self.columns.len()))
    } else {
      None
    }
  }

  pub fn rows_mut(&mut self) -> Option<ChunksExactMut<'_, RowValue>> {
    if !self.columns.is_empty() {
      Some(self.values.chunks_exact_mut(self.columns.len()))
    } else {
      None
    }
  }

  pub fn column_index(&self, name: &str) -> Option<usize> {
    self.columns.iter().position(|c| c.name == name)
  }
}

/// A LENENC string, with `0xfb` decoding to SQL NULL rather than `None`
/// empty string.
pub type RowValue = Option<String>;

#[derive(Debug)]
pub struct Column {
  pub catalog: String,
  pub schema: String,
  pub table: String,
  pub name: String,
  pub org_table: String,
  pub character_set: u16,
  pub column_length: u32,
  pub column_type: ColumnType,
  pub flags: ColumnFlags,
  pub decimals: u8,
}

impl Column {
  pub(crate) fn parse(mut b: Bytes) -> io::Result<Self> {
    let catalog = b.mysql_get_lenc_string();
    let schema = b.mysql_get_lenc_string();
    let table = b.mysql_get_lenc_string();
    let org_table = b.mysql_get_lenc_string();
    let name = b.mysql_get_lenc_string();
    let _org_name = b.mysql_get_lenc_string();
    let fixed_len = b.mysql_get_lenc_uint();
    if fixed_len != 0x0c {
      return Err(io::Error::new(io::ErrorKind::InvalidData, "unexpected column definition fixed-length field"));
    }
    let character_set = b.get_u16_le();
    let column_length = b.get_u32_le();
    let column_type = b
      .get_u8()
      .try_into()
      .map_err(|ty| io::Error::new(io::ErrorKind::InvalidData, format!("unknown column type {ty}")))?;
    let flags = ColumnFlags::from_bits_truncate(b.get_u16_le());
    let decimals = b.get_u8();

    Ok(Self {
      catalog,
      schema,
      table,
      name,
      org_table,
      character_set,
      column_length,
      column_type,
      flags,
      decimals,
    })
  }
}

/// Reads one text-protocol row: `columns_len` LENENC strings, `0xfb` meaning
/// SQL NULL.
pub(crate) fn parse_row_values(mut b: Bytes, columns_len: usize) -> Vec<RowValue> {
  (0..columns_len).map(|_| b.mysql_get_lenc_string_opt()).collect()
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn parse_row_values_handles_null_sentinel() {
    let mut buf = Vec::new();
    buf.push(0x03);
    buf.extend_from_slice(b"foo");
    buf.push(0xfb);
    let values = parse_row_values(Bytes::from(buf), 2);
    assert_eq!(values, vec![Some("foo".to_string()), None]);
  }
}
