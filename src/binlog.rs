use super::value::{self, Value};
use super::{
  buf_ext::BufExt,
  constants::{BinlogChecksumAlg, BinlogEventType, ColumnMetadataType, ColumnType},
};
use crate::json_binary;
use bytes::{Buf, Bytes};
use std::io;

#[derive(Debug)]
pub struct BinlogEventHeader {
  pub timestamp: u32,
  pub server_id: u32,
  pub log_position: u32,
  pub flags: u16,
}

impl BinlogEventHeader {
  /// Parses one framed binlog event: the leading `0x00` OK marker, the
  /// 19-byte header, and a type-specific body. `checksum_alg` must reflect
  /// whatever a prior `FORMAT_DESCRIPTION_EVENT` negotiated; every event
  /// after that one carries (or omits) a trailing CRC32 accordingly. The
  /// negotiated algorithm is echoed back since `FORMAT_DESCRIPTION_EVENT`
  /// is the one event that determines it from its own body rather than
  /// being told.
  pub fn parse(mut b: Bytes, checksum_alg: BinlogChecksumAlg) -> io::Result<(BinlogEventHeader, BinlogEvent, BinlogChecksumAlg)> {
    let marker = b.get_u8();
    if marker != 0x00 {
      return Err(io::Error::new(io::ErrorKind::InvalidData, "expected OK marker byte before binlog event"));
    }

    let timestamp = b.get_u32_le();
    let event_type_code = b.get_u8();
    let event_type: Result<BinlogEventType, u8> = event_type_code.try_into();
    let server_id = b.get_u32_le();
    b.advance(4); // event_length, redundant with the packet framer's own length
    let log_position = b.get_u32_le();
    let flags = b.get_u16_le();

    let header = BinlogEventHeader { timestamp, server_id, log_position, flags };

    // FORMAT_DESCRIPTION_EVENT determines checksumming for the rest of the
    // stream from its own server-version field, so its body is handed over
    // whole and it decides for itself whether to strip a trailing CRC32.
    if event_type == Ok(BinlogEventType::FORMAT_DESCRIPTION_EVENT) {
      let (event, negotiated) = FormatDescriptionEvent::parse(b)?;
      return Ok((header, BinlogEvent::FormatDescription(event), negotiated));
    }

    let payload = strip_checksum(b, checksum_alg)?;

    let event = match event_type {
      Ok(BinlogEventType::TABLE_MAP_EVENT) => TableMapEvent::parse(payload).map(BinlogEvent::TableMap)?,
      Ok(BinlogEventType::ROTATE_EVENT) => RotateEvent::parse(payload).map(BinlogEvent::Rotate)?,
      Ok(BinlogEventType::WRITE_ROWS_EVENTV1) => InsertRowEvent::parse(payload, false).map(BinlogEvent::Insert)?,
      Ok(BinlogEventType::WRITE_ROWS_EVENTV2) => InsertRowEvent::parse(payload, true).map(BinlogEvent::Insert)?,
      Ok(BinlogEventType::UPDATE_ROWS_EVENTV1) => UpdateRowEvent::parse(payload, false).map(BinlogEvent::Update)?,
      Ok(BinlogEventType::UPDATE_ROWS_EVENTV2) => UpdateRowEvent::parse(payload, true).map(BinlogEvent::Update)?,
      Ok(BinlogEventType::DELETE_ROWS_EVENTV1) => DeleteRowEvent::parse(payload, false).map(BinlogEvent::Delete)?,
      Ok(BinlogEventType::DELETE_ROWS_EVENTV2) => DeleteRowEvent::parse(payload, true).map(BinlogEvent::Delete)?,
      Ok(BinlogEventType::XID_EVENT) => XidEvent::parse(payload).map(BinlogEvent::Xid)?,
      Ok(BinlogEventType::INCIDENT_EVENT) => IncidentEvent::parse(payload).map(BinlogEvent::Incident)?,
      Ok(BinlogEventType::QUERY_EVENT) => QueryEvent::parse(payload).map(BinlogEvent::Query)?,
      Ok(BinlogEventType::INTVAR_EVENT) => IntVarEvent::parse(payload).map(BinlogEvent::IntVar)?,
      Ok(BinlogEventType::USER_VAR_EVENT) => UserVarEvent::parse(payload).map(BinlogEvent::UserVar)?,
      Ok(other) => BinlogEvent::NotSupported(other),
      Err(code) => BinlogEvent::Unknown(code),
    };

    Ok((header, event, checksum_alg))
  }
}

fn strip_checksum(mut b: Bytes, checksum_alg: BinlogChecksumAlg) -> io::Result<Bytes> {
  if checksum_alg == BinlogChecksumAlg::Crc32 {
    if b.remaining() < 4 {
      return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "event body shorter than its checksum suffix"));
    }
    let len = b.remaining() - 4;
    Ok(b.split_to(len))
  } else {
    Ok(b)
  }
}

#[derive(Debug)]
pub enum BinlogEvent {
  TableMap(TableMapEvent),
  Rotate(RotateEvent),
  FormatDescription(FormatDescriptionEvent),
  Insert(InsertRowEvent),
  Update(UpdateRowEvent),
  Delete(DeleteRowEvent),
  Xid(XidEvent),
  Incident(IncidentEvent),
  Query(QueryEvent),
  IntVar(IntVarEvent),
  UserVar(UserVarEvent),
  /// A synthetic event assembled by the transaction-parser content handler
  /// from a `BEGIN` query through to the matching `XID`/`COMMIT`; never
  /// sent on the wire by the server itself.
  Transaction(TransactionEvent),
  /// A recognized event type this crate doesn't decode the body of
  /// (GTID bookkeeping, heartbeats, and the like).
  NotSupported(BinlogEventType),
  /// An event type code the server sent that isn't in our known set.
  Unknown(u8),
}

#[derive(Debug)]
pub struct RotateEvent {
  pub next_log_position: u64,
  pub next_log_file: String,
}

impl RotateEvent {
  fn parse(mut b: Bytes) -> io::Result<Self> {
    let next_log_position = b.get_u64_le();
    let next_log_file = String::from_utf8(b.to_vec())
      .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "rotate event filename is not valid utf-8"))?;

    Ok(Self { next_log_position, next_log_file })
  }
}

/// A replication-stopping error the primary injected deliberately, e.g.
/// because an earlier event in this transaction was dropped. Carries no
/// row data of its own; a session surfaces this as a terminal error for
/// the stream rather than routing it through the content-handler chain.
#[derive(Debug)]
pub struct IncidentEvent {
  pub incident_type: u16,
  pub message: String,
}

impl IncidentEvent {
  fn parse(mut b: Bytes) -> io::Result<Self> {
    let incident_type = b.get_u16_le();
    let message_len = b.get_u8() as usize;
    let message_bytes = b.split_to(message_len.min(b.remaining()));
    let message = String::from_utf8_lossy(&message_bytes).into_owned();
    Ok(Self { incident_type, message })
  }
}

/// A statement executed outside the row-based path: DDL, and — on a
/// transactional storage engine — the `BEGIN`/`COMMIT`/`ROLLBACK`
/// bracketing every row-based transaction. The transaction-parser handler
/// watches `query` for `BEGIN` to know where to start aggregating.
#[derive(Debug)]
pub struct QueryEvent {
  pub thread_id: u32,
  pub exec_time: u32,
  pub error_code: u16,
  pub schema: String,
  pub query: String,
}

impl QueryEvent {
  fn parse(mut b: Bytes) -> io::Result<Self> {
    let thread_id = b.get_u32_le();
    let exec_time = b.get_u32_le();
    let schema_len = b.get_u8() as usize;
    let error_code = b.get_u16_le();
    let status_vars_len = b.get_u16_le() as usize;
    if b.remaining() < status_vars_len {
      return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "query event status-vars block runs past the event body"));
    }
    b.advance(status_vars_len); // status vars (timezone, charset, ...) aren't surfaced
    if b.remaining() < schema_len + 1 {
      return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "query event schema name runs past the event body"));
    }
    let schema = b.split_to(schema_len);
    let schema = String::from_utf8_lossy(&schema).into_owned();
    b.advance(1); // trailing 0x00
    let query = String::from_utf8_lossy(&b).into_owned();
    Ok(Self { thread_id, exec_time, error_code, schema, query })
  }
}

/// `LAST_INSERT_ID`/`INSERT_ID` pseudo-variables, logged ahead of a
/// `QUERY_EVENT` so a replay can reproduce auto-increment/`LAST_INSERT_ID()`
/// values deterministically.
#[derive(Debug)]
pub struct IntVarEvent {
  pub var_type: u8,
  pub value: u64,
}

impl IntVarEvent {
  fn parse(mut b: Bytes) -> io::Result<Self> {
    let var_type = b.get_u8();
    let value = b.get_u64_le();
    Ok(Self { var_type, value })
  }
}

/// A `SET @var := ...` user variable, logged ahead of the `QUERY_EVENT`
/// that references it.
#[derive(Debug)]
pub struct UserVarEvent {
  pub name: String,
  pub value: Option<Bytes>,
  pub value_type: Option<u8>,
  pub charset: Option<u32>,
}

impl UserVarEvent {
  fn parse(mut b: Bytes) -> io::Result<Self> {
    let name_len = b.get_u32_le() as usize;
    let name = b.split_to(name_len);
    let name = String::from_utf8_lossy(&name).into_owned();
    let is_null = b.get_u8() != 0;
    if is_null {
      return Ok(Self { name, value: None, value_type: None, charset: None });
    }
    let value_type = b.get_u8();
    let charset = b.get_u32_le();
    let value_len = b.get_u32_le() as usize;
    let value = b.copy_to_bytes(value_len.min(b.remaining()));
    Ok(Self { name, value: Some(value), value_type: Some(value_type), charset: Some(charset) })
  }
}

/// One row-based transaction, aggregated from its `TABLE_MAP`/row events by
/// the transaction-parser content handler and emitted once, at commit.
#[derive(Debug)]
pub struct TransactionEvent {
  pub statements: Vec<RowStatement>,
}

/// A single table-map-scoped batch of row changes within a transaction,
/// with column metadata already resolved so callers never need the
/// originating `TABLE_MAP_EVENT` in hand.
#[derive(Debug)]
pub enum RowStatement {
  Insert { table: TableMapEvent, rows: Vec<Vec<Value>> },
  Update { table: TableMapEvent, rows: Vec<(Vec<Value>, Vec<Value>)> },
  Delete { table: TableMapEvent, rows: Vec<Vec<Value>> },
}

#[derive(Debug, Clone)]
pub struct TableMapEvent {
  pub table_id: u64,
  pub flags: u16,
  pub schema: String,
  pub table: String,
  pub column_count: usize,
  pub column_types: Vec<ColumnType>,
  pub column_metas: Vec<u32>,
  pub null_bitmap: Bytes,
  pub metadata: TableMapEventMetadata,
}

#[derive(Debug, Default, Clone)]
pub struct TableMapEventMetadata {
  pub is_unsigned_integer_bitmap: Option<Bytes>,
  pub default_charset: Option<(u32, Vec<(usize, u32)>)>,
  pub enum_and_set_default_charsets: Option<(u32, Vec<(usize, u32)>)>,
  pub column_charsets: Option<Vec<u32>>,
  pub enum_and_set_column_charsets: Option<Vec<u32>>,
  pub column_names: Option<Vec<String>>,
  pub set_str_values: Option<Vec<Vec<String>>>,
  pub enum_str_values: Option<Vec<Vec<String>>>,
  pub geometry_types: Option<Vec<u64>>,
  pub simple_primary_keys: Option<Vec<u64>>,
  pub primary_keys_with_prefixes: Option<Vec<(u64, u64)>>,
}

impl TableMapEventMetadata {
  fn parse(mut b: Bytes) -> io::Result<Self> {
    fn parse_default_charset(mut b: Bytes) -> io::Result<(u32, Vec<(usize, u32)>)> {
      let default_charset = b.mysql_get_lenc_uint() as u32;
      let mut pairs = Vec::new();
      while b.remaining() > 0 {
        let index = b.mysql_get_lenc_uint() as usize;
        let charset = b.mysql_get_lenc_uint() as u32;
        pairs.push((index, charset))
      }
      Ok((default_charset, pairs))
    }

    fn parse_column_charsets(mut b: Bytes) -> io::Result<Vec<u32>> {
      let mut column_charsets = Vec::new();
      while b.remaining() > 0 {
        column_charsets.push(b.mysql_get_lenc_uint() as u32);
      }
      Ok(column_charsets)
    }

    /// Each enum/set column carries its own list of value strings; the
    /// metadata blob concatenates one such list per column.
    fn parse_value_lists(mut b: Bytes) -> io::Result<Vec<Vec<String>>> {
      let mut lists = Vec::new();
      while b.remaining() > 0 {
        let count = b.mysql_get_lenc_uint() as usize;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
          values.push(b.mysql_get_lenc_string());
        }
        lists.push(values);
      }
      Ok(lists)
    }

    fn parse_ints(mut b: Bytes) -> io::Result<Vec<u64>> {
      let mut ints = Vec::new();
      while b.remaining() > 0 {
        ints.push(b.mysql_get_lenc_uint());
      }
      Ok(ints)
    }

    fn parse_column_names(mut b: Bytes) -> io::Result<Vec<String>> {
      let mut column_names = Vec::new();
      while b.remaining() > 0 {
        column_names.push(b.mysql_get_lenc_string());
      }
      Ok(column_names)
    }

    fn parse_keys_with_prefixes(mut b: Bytes) -> io::Result<Vec<(u64, u64)>> {
      let mut primary_keys_with_prefixes = Vec::new();
      while b.remaining() > 0 {
        let index = b.mysql_get_lenc_uint();
        let prefix = b.mysql_get_lenc_uint();
        primary_keys_with_prefixes.push((index, prefix));
      }
      Ok(primary_keys_with_prefixes)
    }

    let mut metadata = Self::default();

    while b.remaining() > 0 {
      let metadata_type: ColumnMetadataType = b
        .get_u8()
        .try_into()
        .map_err(|ty| io::Error::new(io::ErrorKind::InvalidData, format!("unknown column metadata type {ty}")))?;
      let metadata_len = b.mysql_get_lenc_uint() as usize;
      let metadata_value = b.split_to(metadata_len);

      // https://github.com/mysql/mysql-server/blob/8.0/libbinlogevents/src/rows_event.cpp#L141
      match metadata_type {
        ColumnMetadataType::SIGNEDNESS => metadata.is_unsigned_integer_bitmap = Some(metadata_value),
        ColumnMetadataType::DEFAULT_CHARSET => metadata.default_charset = Some(parse_default_charset(metadata_value)?),
        ColumnMetadataType::COLUMN_CHARSET => metadata.column_charsets = Some(parse_column_charsets(metadata_value)?),
        ColumnMetadataType::COLUMN_NAME => metadata.column_names = Some(parse_column_names(metadata_value)?),
        ColumnMetadataType::SET_STR_VALUE => metadata.set_str_values = Some(parse_value_lists(metadata_value)?),
        ColumnMetadataType::ENUM_STR_VALUE => metadata.enum_str_values = Some(parse_value_lists(metadata_value)?),
        ColumnMetadataType::GEOMETRY_TYPE => metadata.geometry_types = Some(parse_ints(metadata_value)?),
        ColumnMetadataType::SIMPLE_PRIMARY_KEY => metadata.simple_primary_keys = Some(parse_ints(metadata_value)?),
        ColumnMetadataType::PRIMARY_KEY_WITH_PREFIX => {
          metadata.primary_keys_with_prefixes = Some(parse_keys_with_prefixes(metadata_value)?)
        }
        ColumnMetadataType::ENUM_AND_SET_DEFAULT_CHARSET => {
          metadata.enum_and_set_default_charsets = Some(parse_default_charset(metadata_value)?)
        }
        ColumnMetadataType::ENUM_AND_SET_COLUMN_CHARSET => {
          metadata.enum_and_set_column_charsets = Some(parse_column_charsets(metadata_value)?)
        }
        ColumnMetadataType::COLUMN_VISIBILITY => {}
      }
    }

    Ok(metadata)
  }
}

impl TableMapEvent {
  fn parse(mut b: Bytes) -> io::Result<Self> {
    let table_id = b.get_uint_le(6);
    let flags = b.get_u16_le();

    let schema_len = b.get_u8() as usize;
    let schema = b.split_to(schema_len);
    let schema = std::str::from_utf8(schema.chunk())
      .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "table map schema name is not valid utf-8"))?
      .to_string();
    b.advance(1); // trailing 0x00

    let table_len = b.mysql_get_lenc_uint() as usize;
    let table = b.split_to(table_len);
    let table = std::str::from_utf8(table.chunk())
      .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "table map table name is not valid utf-8"))?
      .to_string();
    b.advance(1); // trailing 0x00

    let column_count = b.mysql_get_lenc_uint() as usize;
    let mut column_types = Vec::with_capacity(column_count);
    for _ in 0..column_count {
      let ty = b.get_u8();
      column_types.push(ty.try_into().map_err(|ty| {
        io::Error::new(io::ErrorKind::InvalidData, format!("unknown column type {ty} in table map"))
      })?);
    }

    let column_metas_buffer_len = b.mysql_get_lenc_uint() as usize;
    let mut column_metas_buffer = b.split_to(column_metas_buffer_len);
    let mut column_metas = vec![0; column_count];

    // https://dev.mysql.com/doc/dev/mysql-server/latest/classbinary__log_1_1Table__map__event.html#a1b84e5b226c76eaf9c0df8ed03ba1393
    for (i, t) in column_types.iter().enumerate() {
      match t {
        ColumnType::MYSQL_TYPE_FLOAT
        | ColumnType::MYSQL_TYPE_DOUBLE
        | ColumnType::MYSQL_TYPE_BLOB
        | ColumnType::MYSQL_TYPE_GEOMETRY
        | ColumnType::MYSQL_TYPE_JSON => {
          column_metas[i] = column_metas_buffer.get_u8().into();
        }

        ColumnType::MYSQL_TYPE_VARCHAR
        | ColumnType::MYSQL_TYPE_BIT
        | ColumnType::MYSQL_TYPE_VAR_STRING
        | ColumnType::MYSQL_TYPE_STRING
        | ColumnType::MYSQL_TYPE_NEWDECIMAL
        | ColumnType::MYSQL_TYPE_TIMESTAMP2
        | ColumnType::MYSQL_TYPE_DATETIME2
        | ColumnType::MYSQL_TYPE_TIME2
        | ColumnType::MYSQL_TYPE_ENUM
        | ColumnType::MYSQL_TYPE_SET => {
          column_metas[i] = column_metas_buffer.get_u16_le().into();
        }

        ColumnType::MYSQL_TYPE_DECIMAL
        | ColumnType::MYSQL_TYPE_TINY
        | ColumnType::MYSQL_TYPE_SHORT
        | ColumnType::MYSQL_TYPE_LONG
        | ColumnType::MYSQL_TYPE_NULL
        | ColumnType::MYSQL_TYPE_TIMESTAMP
        | ColumnType::MYSQL_TYPE_LONGLONG
        | ColumnType::MYSQL_TYPE_INT24
        | ColumnType::MYSQL_TYPE_DATE
        | ColumnType::MYSQL_TYPE_NEWDATE
        | ColumnType::MYSQL_TYPE_TIME
        | ColumnType::MYSQL_TYPE_DATETIME
        | ColumnType::MYSQL_TYPE_YEAR => {
          column_metas[i] = 0;
        }

        ColumnType::MYSQL_TYPE_TINY_BLOB | ColumnType::MYSQL_TYPE_MEDIUM_BLOB | ColumnType::MYSQL_TYPE_LONG_BLOB => {
          return Err(io::Error::new(io::ErrorKind::InvalidData, "blob sub-types never appear on the wire"));
        }
      }
    }

    if column_metas_buffer.remaining() != 0 {
      return Err(io::Error::new(io::ErrorKind::InvalidData, "trailing bytes in table map column metadata"));
    }
    let bitmap_len = column_count.div_ceil(8);
    let null_bitmap = b.split_to(bitmap_len);

    let metadata = TableMapEventMetadata::parse(b)?;

    Ok(Self { table_id, flags, schema, table, column_count, column_types, column_metas, null_bitmap, metadata })
  }

  /// Builds the column descriptors that `rows()` needs to decode row
  /// images. Columns with no `COLUMN_NAME` metadata (servers below 8.0.1
  /// never send it) are named positionally.
  pub fn columns(&self) -> Vec<Column> {
    (0..self.column_count)
      .scan(0usize, |signedness_bit, i| {
        let column_name = self
          .metadata
          .column_names
          .as_ref()
          .and_then(|names| names.get(i).cloned())
          .unwrap_or_else(|| format!("@{i}"));
        let column_type = self.column_types[i];
        let column_meta = self.column_metas[i];

        let is_nullable = self.null_bitmap[i / 8] & (1 << (i % 8)) != 0;

        let column_type_definition = match column_type {
          ColumnType::MYSQL_TYPE_TINY
          | ColumnType::MYSQL_TYPE_SHORT
          | ColumnType::MYSQL_TYPE_INT24
          | ColumnType::MYSQL_TYPE_LONG
          | ColumnType::MYSQL_TYPE_LONGLONG => {
            let is_unsigned = self
              .metadata
              .is_unsigned_integer_bitmap
              .as_ref()
              .map(|bitmap| bitmap[*signedness_bit / 8] & (0x80 >> (*signedness_bit % 8)) != 0)
              .unwrap_or(false);

            let pack_length = match column_type {
              ColumnType::MYSQL_TYPE_TINY => 1,
              ColumnType::MYSQL_TYPE_SHORT => 2,
              ColumnType::MYSQL_TYPE_INT24 => 3,
              ColumnType::MYSQL_TYPE_LONG => 4,
              ColumnType::MYSQL_TYPE_LONGLONG => 8,
              _ => unreachable!(),
            };

            *signedness_bit += 1;

            if is_unsigned {
              ColumnTypeDefinition::U64 { pack_length }
            } else {
              ColumnTypeDefinition::I64 { pack_length }
            }
          }

          ColumnType::MYSQL_TYPE_NEWDECIMAL => {
            let bytes = column_meta.to_le_bytes();
            ColumnTypeDefinition::Decimal { precision: bytes[0], scale: bytes[1] }
          }

          ColumnType::MYSQL_TYPE_FLOAT => ColumnTypeDefinition::F64 { pack_length: 4 },
          ColumnType::MYSQL_TYPE_DOUBLE => ColumnTypeDefinition::F64 { pack_length: 8 },

          ColumnType::MYSQL_TYPE_BLOB => ColumnTypeDefinition::Blob { pack_length: column_meta as usize },
          ColumnType::MYSQL_TYPE_JSON => ColumnTypeDefinition::Json { pack_length: column_meta as usize },
          ColumnType::MYSQL_TYPE_GEOMETRY => ColumnTypeDefinition::Geometry { pack_length: column_meta as usize },

          ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE => {
            ColumnTypeDefinition::Date(ColumnTypeDefinitionDate::U24)
          }
          ColumnType::MYSQL_TYPE_DATETIME => ColumnTypeDefinition::Date(ColumnTypeDefinitionDate::U64),
          ColumnType::MYSQL_TYPE_DATETIME2 => {
            ColumnTypeDefinition::Date(ColumnTypeDefinitionDate::Arbitrary(column_meta as u8))
          }
          ColumnType::MYSQL_TYPE_TIME => ColumnTypeDefinition::Time(ColumnTypeDefinitionTime::U24),
          ColumnType::MYSQL_TYPE_TIME2 => {
            ColumnTypeDefinition::Time(ColumnTypeDefinitionTime::Arbitrary(column_meta as u8))
          }
          ColumnType::MYSQL_TYPE_YEAR => ColumnTypeDefinition::Year,
          ColumnType::MYSQL_TYPE_TIMESTAMP => ColumnTypeDefinition::Timestamp { legacy: true },
          ColumnType::MYSQL_TYPE_TIMESTAMP2 => ColumnTypeDefinition::Timestamp2 { dec: column_meta as u8 },

          ColumnType::MYSQL_TYPE_ENUM => {
            let values = self
              .metadata
              .enum_str_values
              .as_ref()
              .and_then(|lists| lists.first())
              .cloned()
              .unwrap_or_default();
            ColumnTypeDefinition::Enum { pack_length: if values.len() > 255 { 2 } else { 1 }, values }
          }
          ColumnType::MYSQL_TYPE_SET => {
            let values = self
              .metadata
              .set_str_values
              .as_ref()
              .and_then(|lists| lists.first())
              .cloned()
              .unwrap_or_default();
            ColumnTypeDefinition::Set { pack_length: (values.len().div_ceil(8)).max(1), values }
          }
          ColumnType::MYSQL_TYPE_NULL => ColumnTypeDefinition::U64 { pack_length: 0 },
          ColumnType::MYSQL_TYPE_TINY_BLOB | ColumnType::MYSQL_TYPE_MEDIUM_BLOB | ColumnType::MYSQL_TYPE_LONG_BLOB => {
            ColumnTypeDefinition::Blob { pack_length: 3 }
          }
          ColumnType::MYSQL_TYPE_BIT => {
            let bytes = column_meta.to_le_bytes();
            let bits_in_last_byte = bytes[0] as u32;
            let whole_bytes = bytes[1] as u32;
            ColumnTypeDefinition::Bit { bits: whole_bytes * 8 + bits_in_last_byte }
          }
          ColumnType::MYSQL_TYPE_VARCHAR => {
            ColumnTypeDefinition::String { pack_length: if column_meta > 255 { 2 } else { 1 } }
          }
          ColumnType::MYSQL_TYPE_VAR_STRING | ColumnType::MYSQL_TYPE_STRING => {
            // https://dev.mysql.com/doc/dev/mysql-server/latest/classbinary__log_1_1Table__map__event.html
            // Real type is re-tagged in the high byte; only the length-prefix
            // width actually matters for decoding row images.
            if column_meta > 255 {
              let bytes = column_meta.to_le_bytes();
              let pack_length =
                if bytes[1] as u16 | (((bytes[0] as u16 & 0x30) ^ 0x30) << 4) > 255 { 2 } else { 1 };
              ColumnTypeDefinition::String { pack_length }
            } else {
              ColumnTypeDefinition::String { pack_length: 1 }
            }
          }
          ColumnType::MYSQL_TYPE_DECIMAL => ColumnTypeDefinition::Decimal { precision: 10, scale: 0 },
        };

        Some(Column { column_name, is_nullable, column_type_definition })
      })
      .collect()
  }
}

#[derive(Debug)]
pub struct FormatDescriptionEvent {
  pub version: u16,
  pub server_version: String,
  pub create_timestamp: u32,
  pub event_header_length: u8,
  pub event_type_header_lengths: Bytes,
  pub checksum_alg: BinlogChecksumAlg,
}

impl FormatDescriptionEvent {
  fn parse(mut b: Bytes) -> io::Result<(Self, BinlogChecksumAlg)> {
    let version = b.get_u16_le();
    let server_version_fixed = b.split_to(50);
    let server_version = std::str::from_utf8(
      &server_version_fixed[..server_version_fixed.iter().position(|&c| c == 0).unwrap_or(server_version_fixed.len())],
    )
    .unwrap_or("")
    .to_string();
    let create_timestamp = b.get_u32_le();
    let event_header_length = b.get_u8();
    let mut rest = b;

    // Checksumming was introduced in 5.6.1: when the reporting server is at
    // least that version, the final byte of the body is the algorithm id and
    // a 4-byte CRC32 trails it; older servers send neither.
    let checksum_alg = match parse_server_version(&server_version) {
      Some(v) if version_product(v) >= version_product((5, 6, 1)) => {
        if rest.remaining() < 5 {
          BinlogChecksumAlg::Off
        } else {
          let alg_byte = rest[rest.len() - 5];
          rest.truncate(rest.len() - 5);
          match alg_byte {
            0 => BinlogChecksumAlg::Off,
            1 => BinlogChecksumAlg::Crc32,
            _ => BinlogChecksumAlg::Undef,
          }
        }
      }
      _ => BinlogChecksumAlg::Off,
    };

    let event_type_header_lengths = rest;

    Ok((
      Self { version, server_version, create_timestamp, event_header_length, event_type_header_lengths, checksum_alg },
      checksum_alg,
    ))
  }
}

/// `(major, minor, patch)`, rejecting anything that doesn't fit the
/// `X.Y.Zabc` or `X.Ya` shapes MySQL uses for its version string, mirroring
/// `do_server_version_split`.
fn parse_server_version(s: &str) -> Option<(u8, u8, u8)> {
  let mut parts = s.splitn(3, '.');
  let major: u8 = parts.next()?.parse().ok()?;
  let minor_field = parts.next()?;
  let minor_digits: String = minor_field.chars().take_while(|c| c.is_ascii_digit()).collect();
  let minor: u8 = minor_digits.parse().ok()?;

  let patch = match parts.next() {
    Some(patch_field) => {
      let patch_digits: String = patch_field.chars().take_while(|c| c.is_ascii_digit()).collect();
      patch_digits.parse().unwrap_or(0)
    }
    None => 0,
  };

  Some((major, minor, patch))
}

fn version_product((major, minor, patch): (u8, u8, u8)) -> u32 {
  ((major as u32 * 256) + minor as u32) * 256 + patch as u32
}

#[derive(Debug)]
pub struct InsertRowEvent {
  pub table_id: u64,
  pub flags: u16,
  extras: Option<Bytes>,
  column_count: usize,
  columns_after_image: Bytes,
  rows: Bytes,
}

impl InsertRowEvent {
  fn parse(mut b: Bytes, use_extras: bool) -> io::Result<Self> {
    let RowEventHeader { table_id, flags, extras, column_count } = RowEventHeader::parse(&mut b, use_extras)?;
    let bitmap_len = column_count.div_ceil(8);
    let columns_after_image = b.split_to(bitmap_len);
    let rows = b;
    Ok(Self { table_id, flags, extras, column_count, columns_after_image, rows })
  }

  pub fn rows(&self, columns: &[Column]) -> Vec<Vec<Value>> {
    parse_rows(&mut self.rows.clone(), columns, &self.columns_after_image)
  }
}

struct RowEventHeader {
  table_id: u64,
  flags: u16,
  extras: Option<Bytes>,
  column_count: usize,
}

impl RowEventHeader {
  fn parse(b: &mut Bytes, use_extras: bool) -> io::Result<Self> {
    let table_id = b.get_uint_le(6);
    let flags = b.get_u16_le();
    let mut extras = None;
    if use_extras {
      let extras_len = b.get_u16_le().checked_sub(2).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "row event extra-data length field underflows")
      })? as usize;
      extras = Some(b.split_to(extras_len));
    }
    let column_count = b.mysql_get_lenc_uint() as usize;
    Ok(RowEventHeader { table_id, flags, extras, column_count })
  }
}

fn parse_rows(b: &mut Bytes, columns: &[Column], column_present: &Bytes) -> Vec<Vec<Value>> {
  let mut rows = vec![];
  while b.remaining() > 0 {
    rows.push(parse_row(b, columns, column_present));
  }
  rows
}

fn parse_row(b: &mut Bytes, columns: &[Column], column_present: &Bytes) -> Vec<Value> {
  let null_bitmap = b.split_to(column_present.len());

  columns
    .iter()
    .enumerate()
    .map(|(i, c)| {
      let Column { is_nullable, column_type_definition, .. } = c;

      let column_present = column_present[i / 8] & (1 << (i % 8)) != 0;
      if !column_present {
        return Value::Null;
      }

      let is_null = null_bitmap[i / 8] & (1 << (i % 8)) != 0;
      if *is_nullable && is_null {
        return Value::Null;
      }

      decode_column_value(b, column_type_definition)
    })
    .collect()
}

fn decode_column_value(b: &mut Bytes, def: &ColumnTypeDefinition) -> Value {
  match def {
    ColumnTypeDefinition::U64 { pack_length: 0 } => Value::Null,
    ColumnTypeDefinition::U64 { pack_length } => Value::Unsigned(b.get_uint_le(*pack_length)),
    ColumnTypeDefinition::I64 { pack_length } => Value::Signed(b.get_int_le(*pack_length)),
    ColumnTypeDefinition::F64 { pack_length } => match *pack_length {
      4 => Value::Float(b.get_f32_le()),
      8 => Value::Double(b.get_f64_le()),
      _ => unreachable!("table map only ever reports 4 or 8 byte floats"),
    },
    ColumnTypeDefinition::Decimal { precision, scale } => {
      let int_digits = (*precision as usize) - (*scale as usize);
      let len = decimal_storage_len(int_digits, *scale as usize);
      let buffer = b.copy_to_bytes(len);
      Value::Decimal(value::decode_newdecimal(buffer, *precision, *scale))
    }
    ColumnTypeDefinition::String { pack_length } => {
      let len = b.get_uint_le(*pack_length) as usize;
      let buffer = b.copy_to_bytes(len);
      Value::String(String::from_utf8_lossy(&buffer).into_owned())
    }
    ColumnTypeDefinition::Blob { pack_length } => {
      let len = b.get_uint_le(*pack_length) as usize;
      Value::Blob(b.copy_to_bytes(len))
    }
    ColumnTypeDefinition::Geometry { pack_length } => {
      let len = b.get_uint_le(*pack_length) as usize;
      Value::Geometry(b.copy_to_bytes(len))
    }
    ColumnTypeDefinition::Json { pack_length } => {
      let len = b.get_uint_le(*pack_length) as usize;
      let buffer = b.copy_to_bytes(len);
      match json_binary::parse_binary(buffer) {
        Ok(value) => Value::Json(value),
        Err(_) => Value::Null,
      }
    }
    ColumnTypeDefinition::Year => Value::Year(1900 + b.get_u8() as u16),
    ColumnTypeDefinition::Timestamp { .. } => {
      let seconds = b.get_u32_le();
      Value::Timestamp { seconds, micro_second: 0, dec: 0 }
    }
    ColumnTypeDefinition::Timestamp2 { dec } => {
      let (seconds, micro_second) = value::decode_timestamp2(b.copy_to_bytes(4 + dec.div_ceil(2) as usize), *dec);
      Value::Timestamp { seconds, micro_second, dec: *dec }
    }
    ColumnTypeDefinition::Date(ColumnTypeDefinitionDate::U24) => {
      let (year, month, day) = value::decode_date(b.get_uint_le(3) as u32);
      Value::Date { year, month, day }
    }
    ColumnTypeDefinition::Date(ColumnTypeDefinitionDate::U64) => {
      let packed = b.get_u64_le();
      let date = packed / 1_000_000;
      let time = packed % 1_000_000;
      Value::DateTime {
        year: (date / 10000) as u16,
        month: ((date % 10000) / 100) as u8,
        day: (date % 100) as u8,
        hour: (time / 10000) as u8,
        minute: ((time % 10000) / 100) as u8,
        second: (time % 100) as u8,
        micro_second: 0,
        dec: 0,
      }
    }
    ColumnTypeDefinition::Date(ColumnTypeDefinitionDate::Arbitrary(dec)) => {
      let len = 5 + dec.div_ceil(2) as usize;
      let (year, month, day, hour, minute, second, micro_second) = value::decode_datetime2(b.copy_to_bytes(len), *dec);
      Value::DateTime { year, month, day, hour, minute, second, micro_second, dec: *dec }
    }
    ColumnTypeDefinition::Time(ColumnTypeDefinitionTime::U24) => {
      let packed = b.get_uint_le(3);
      Value::Time {
        negative: false,
        hours: (packed / 10000) as u32,
        minutes: ((packed % 10000) / 100) as u8,
        seconds: (packed % 100) as u8,
        micro_seconds: 0,
        dec: 0,
      }
    }
    ColumnTypeDefinition::Time(ColumnTypeDefinitionTime::Arbitrary(dec)) => {
      let len = 3 + dec.div_ceil(2) as usize;
      let (negative, hours, minutes, seconds, micro_seconds) = value::decode_time2(b.copy_to_bytes(len), *dec);
      Value::Time { negative, hours, minutes, seconds, micro_seconds, dec: *dec }
    }
    ColumnTypeDefinition::Set { pack_length, .. } => Value::Set(b.get_uint_le(*pack_length)),
    ColumnTypeDefinition::Enum { pack_length, .. } => Value::Enum(b.get_uint_le(*pack_length)),
    ColumnTypeDefinition::Bit { bits } => {
      let pack_length = (*bits as usize).div_ceil(8);
      Value::Bit(b.mysql_get_uint_be(pack_length) as u64)
    }
  }
}

/// Storage length, in bytes, of a packed `NEWDECIMAL` with `int_digits`
/// whole-part digits and `scale` fractional digits.
fn decimal_storage_len(int_digits: usize, scale: usize) -> usize {
  const DIG2BYTES: [usize; 10] = [0, 1, 1, 2, 2, 3, 3, 4, 4, 4];
  (int_digits / 9) * 4 + DIG2BYTES[int_digits % 9] + (scale / 9) * 4 + DIG2BYTES[scale % 9]
}

#[derive(Debug)]
pub struct UpdateRowEvent {
  pub table_id: u64,
  pub flags: u16,
  extras: Option<Bytes>,
  column_count: usize,
  columns_before_image: Bytes,
  columns_after_image: Bytes,
  rows: Bytes,
}

impl UpdateRowEvent {
  fn parse(mut b: Bytes, use_extras: bool) -> io::Result<Self> {
    let RowEventHeader { table_id, flags, extras, column_count } = RowEventHeader::parse(&mut b, use_extras)?;
    let bitmap_len = column_count.div_ceil(8);
    let columns_before_image = b.split_to(bitmap_len);
    let columns_after_image = b.split_to(bitmap_len);
    let rows = b;
    Ok(Self { table_id, flags, extras, column_count, columns_after_image, columns_before_image, rows })
  }

  pub fn rows(&self, columns: &[Column]) -> Vec<(Vec<Value>, Vec<Value>)> {
    let mut pairs = vec![];
    let mut b = self.rows.clone();
    while b.remaining() > 0 {
      let before = parse_row(&mut b, columns, &self.columns_before_image);
      let after = parse_row(&mut b, columns, &self.columns_after_image);
      pairs.push((before, after));
    }
    pairs
  }
}

#[derive(Debug)]
pub struct DeleteRowEvent {
  pub table_id: u64,
  pub flags: u16,
  extras: Option<Bytes>,
  column_count: usize,
  columns_before_image: Bytes,
  rows: Bytes,
}

impl DeleteRowEvent {
  fn parse(mut b: Bytes, use_extras: bool) -> io::Result<Self> {
    let RowEventHeader { table_id, flags, extras, column_count } = RowEventHeader::parse(&mut b, use_extras)?;
    let bitmap_len = column_count.div_ceil(8);
    let columns_before_image = b.split_to(bitmap_len);
    let rows = b;
    Ok(Self { table_id, flags, extras, column_count, columns_before_image, rows })
  }

  pub fn rows(&self, columns: &[Column]) -> Vec<Vec<Value>> {
    parse_rows(&mut self.rows.clone(), columns, &self.columns_before_image)
  }
}

#[derive(Debug)]
pub struct XidEvent {
  pub xid: u64,
}

impl XidEvent {
  fn parse(mut b: Bytes) -> io::Result<Self> {
    Ok(Self { xid: b.get_u64_le() })
  }
}

#[derive(Debug)]
pub struct Column {
  pub column_name: String,
  pub is_nullable: bool,
  pub column_type_definition: ColumnTypeDefinition,
}

#[derive(Debug)]
pub enum ColumnTypeDefinitionDate {
  U24,
  U64,
  Arbitrary(u8),
}

#[derive(Debug)]
pub enum ColumnTypeDefinitionTime {
  U24,
  Arbitrary(u8),
}

#[derive(Debug)]
pub enum ColumnTypeDefinition {
  U64 { pack_length: usize },
  I64 { pack_length: usize },
  F64 { pack_length: usize },
  Decimal { precision: u8, scale: u8 },
  Json { pack_length: usize },
  String { pack_length: usize },
  Blob { pack_length: usize },
  Geometry { pack_length: usize },
  Date(ColumnTypeDefinitionDate),
  Year,
  Time(ColumnTypeDefinitionTime),
  Timestamp { legacy: bool },
  Timestamp2 { dec: u8 },
  Set { pack_length: usize, values: Vec<String> },
  Enum { pack_length: usize, values: Vec<String> },
  Bit { bits: u32 },
}

#[cfg(test)]
mod test {
  use super::{BinlogChecksumAlg, BinlogEvent, BinlogEventHeader, BinlogEventType};

  #[test]
  fn parses_rotate() {
    const ROTATE_EVENT: &[u8] = b"\x00\x00\x00\x00\x00\x04\x01\x00\x00\x00\x2d\x00\x00\x00\x00\x00\x00\
                                       \x00\x20\x00\x96\x00\x00\x00\x00\x00\x00\x00\x73\x68\x6f\x70\x69\x66\
                                       \x79\x2d\x62\x69\x6e\x2e\x30\x30\x30\x30\x30\x35";

    let (_header, event, _alg) = BinlogEventHeader::parse(ROTATE_EVENT.into(), BinlogChecksumAlg::Off).unwrap();
    match event {
      BinlogEvent::Rotate(packet) => {
        assert_eq!(150, packet.next_log_position);
        assert_eq!("shopify-bin.000005", packet.next_log_file);
      }
      unexpected => panic!("unexpected {:?}", unexpected),
    }
  }

  #[test]
  fn parses_format_description() {
    const FORMAT_DESCRIPTION_EVENT: &[u8] = b"\x00\xf2\x43\x5d\x5d\x0f\x01\x00\x00\x00\x77\x00\x00\x00\x00\x00\x00\
                                                   \x00\x00\x00\x04\x00\x35\x2e\x37\x2e\x31\x38\x2d\x31\x36\x2d\x6c\x6f\
                                                   \x67\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\
                                                   \x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\
                                                   \x00\x00\x00\x00\x00\x00\x00\x00\x13\x38\x0d\x00\x08\x00\x12\x00\x04\
                                                   \x04\x04\x04\x12\x00\x00\x5f\x00\x04\x1a\x08\x00\x00\x00\x08\x08\x08\
                                                   \x02\x00\x00\x00\x0a\x0a\x0a\x2a\x2a\x00\x12\x34\x00\x00\xc2\x36\x0c\
                                                   \xdf";

    let (_header, event, alg) =
      BinlogEventHeader::parse(FORMAT_DESCRIPTION_EVENT.into(), BinlogChecksumAlg::Undef).unwrap();
    match event {
      BinlogEvent::FormatDescription(packet) => {
        assert_eq!(4, packet.version);
        assert_eq!("5.7.18-16-log", packet.server_version);
        assert_eq!(0, packet.create_timestamp);
        assert_eq!(packet.checksum_alg, alg);
        assert!(matches!(alg, BinlogChecksumAlg::Off | BinlogChecksumAlg::Crc32));
      }
      unexpected => panic!("unexpected {:?}", unexpected),
    }
  }

  #[test]
  fn parses_anonymous_gtid_as_not_supported() {
    const ANONYMOUS_GTID_EVENT: &[u8] = b"\x00\xfc\x5a\x5d\x5d\x22\x01\x00\x00\x00\x3d\x00\x00\x00\xd3\x00\x00\
                                               \x00\x00\x00\x01\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\
                                               \x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x02\x00\x00\x00\x00\x00\
                                               \x00\x00\x00\x01\x00\x00\x00\x00\x00\x00\x00";

    let (_header, event, _alg) =
      BinlogEventHeader::parse(ANONYMOUS_GTID_EVENT.into(), BinlogChecksumAlg::Off).unwrap();
    match event {
      BinlogEvent::NotSupported(BinlogEventType::ANONYMOUS_GTID_EVENT) => {}
      _ => panic!(),
    }
  }

  #[test]
  fn parses_query_event() {
    const QUERY_EVENT: &[u8] = b"\x00\xfc\x5a\x5d\x5d\x02\x01\x00\x00\x00\x44\x00\x00\x00\x17\x01\x00\
                                      \x00\x08\x00\x3b\x18\x00\x00\x00\x00\x00\x00\x04\x00\x00\x1a\x00\x00\
                                      \x00\x00\x00\x00\x01\x00\x00\x00\x40\x00\x00\x00\x00\x06\x03\x73\x74\
                                      \x64\x04\x21\x00\x21\x00\x2d\x00\x70\x65\x74\x73\x00\x42\x45\x47\x49\
                                      \x4e";

    let (_header, event, _alg) = BinlogEventHeader::parse(QUERY_EVENT.into(), BinlogChecksumAlg::Off).unwrap();
    match event {
      BinlogEvent::Query(packet) => {
        assert_eq!(0, packet.error_code);
        assert_eq!("pets", packet.schema);
        assert_eq!("BEGIN", packet.query);
      }
      unexpected => panic!("unexpected {:?}", unexpected),
    }
  }

  #[test]
  fn parses_table_map() {
    const TABLE_MAP_EVENT: &[u8] = b"\x00\xfc\x5a\x5d\x5d\x13\x01\x00\x00\x00\x32\x00\x00\x00\x49\x01\x00\
                                          \x00\x00\x00\x2d\x0a\x00\x00\x00\x00\x01\x00\x04\x70\x65\x74\x73\x00\
                                          \x04\x63\x61\x74\x73\x00\x04\x03\x0f\x0f\x0a\x04\x58\x02\x58\x02\x00";

    let (_header, event, _alg) = BinlogEventHeader::parse(TABLE_MAP_EVENT.into(), BinlogChecksumAlg::Off).unwrap();
    match event {
      BinlogEvent::TableMap(packet) => {
        assert_eq!(2605, packet.table_id);
        assert_eq!(1, packet.flags);
        assert_eq!(4, packet.column_count);
        assert_eq!("pets", packet.schema);
        assert_eq!("cats", packet.table);
      }
      unexpected => panic!("unexpected {:?}", unexpected),
    }
  }

  #[test]
  fn parses_insert_row() {
    const INSERT_ROW_EVENT: &[u8] = b"\x00\xfc\x5a\x5d\x5d\x1e\x01\x00\x00\x00\x37\x00\x00\x00\x80\x01\x00\
                                           \x00\x00\x00\x2d\x0a\x00\x00\x00\x00\x01\x00\x02\x00\x04\xff\xf0\x04\
                                           \x00\x00\x00\x07\x00\x43\x68\x61\x72\x6c\x69\x65\x05\x00\x52\x69\x76\
                                           \x65\x72\xb5\xc0\x0f";

    let (_header, event, _alg) = BinlogEventHeader::parse(INSERT_ROW_EVENT.into(), BinlogChecksumAlg::Off).unwrap();
    match event {
      BinlogEvent::Insert(packet) => {
        assert_eq!(2605, packet.table_id);
        assert_eq!(1, packet.flags);
      }
      unexpected => panic!("unexpected {:?}", unexpected),
    }
  }

  #[test]
  fn parses_xid_event() {
    const XID_EVENT: &[u8] = b"\x00\xfc\x5a\x5d\x5d\x10\x01\x00\x00\x00\x1b\x00\x00\x00\x9b\x01\x00\
                                    \x00\x00\x00\x72\x0e\x00\x00\x00\x00\x00\x00";

    let (_header, event, _alg) = BinlogEventHeader::parse(XID_EVENT.into(), BinlogChecksumAlg::Off).unwrap();
    match event {
      BinlogEvent::Xid(packet) => assert_eq!(0xe72, packet.xid),
      unexpected => panic!("unexpected {:?}", unexpected),
    }
  }

  #[test]
  fn server_version_parsing_follows_the_x_y_z_shape() {
    assert_eq!(super::parse_server_version("5.7.18-16-log"), Some((5, 7, 18)));
    assert_eq!(super::parse_server_version("8.0"), Some((8, 0, 0)));
    assert_eq!(super::version_product((5, 6, 1)) < super::version_product((5, 7, 18)), true);
  }
}
