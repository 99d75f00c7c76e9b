use bitflags::bitflags;

pub const MYSQL_NATIVE_PASSWORD_PLUGIN_NAME: &str = "mysql_native_password";
pub const MAX_PAYLOAD_LEN: usize = 16_777_215;

/// Fixed 19-byte event header size, not counting the leading 0x00 marker
/// byte that precedes it on the wire.
pub const LOG_EVENT_HEADER_SIZE: usize = 19;

/// Length of the trailing CRC32 checksum appended to every event body when
/// `BinlogChecksumAlg::Crc32` is negotiated.
pub const BINLOG_CHECKSUM_LEN: usize = 4;

bitflags! {
  // https://dev.mysql.com/doc/dev/mysql-server/latest/group__group__cs__capabilities__flags.html
  #[derive(Debug, Clone, Copy)]
  pub struct CapabilityFlags: u32 {
    const CLIENT_LONG_PASSWORD = 0x00000001;
    const CLIENT_FOUND_ROWS = 0x00000002;
    const CLIENT_LONG_FLAG = 0x00000004;
    const CLIENT_CONNECT_WITH_DB = 0x00000008;
    const CLIENT_NO_SCHEMA = 0x00000010;
    const CLIENT_COMPRESS = 0x00000020;
    const CLIENT_ODBC = 0x00000040;
    const CLIENT_LOCAL_FILES = 0x00000080;
    const CLIENT_IGNORE_SPACE = 0x00000100;
    const CLIENT_PROTOCOL_41 = 0x00000200;
    const CLIENT_INTERACTIVE = 0x00000400;
    const CLIENT_SSL = 0x00000800;
    const CLIENT_IGNORE_SIGPIPE = 0x00001000;
    const CLIENT_TRANSACTIONS = 0x00002000;
    const CLIENT_RESERVED = 0x00004000;
    const CLIENT_RESERVED2 = 0x00008000;
    const CLIENT_MULTI_STATEMENTS = 0x00010000;
    const CLIENT_MULTI_RESULTS = 0x00020000;
    const CLIENT_PS_MULTI_RESULTS = 0x00040000;
    const CLIENT_PLUGIN_AUTH = 0x00080000;
    const CLIENT_CONNECT_ATTRS = 0x00100000;
    const CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA = 0x00200000;
    const CLIENT_CAN_HANDLE_EXPIRED_PASSWORDS = 0x00400000;
    const CLIENT_SESSION_TRACK = 0x00800000;
    const CLIENT_DEPRECATE_EOF = 0x01000000;
    const CLIENT_SSL_VERIFY_SERVER_CERT = 0x40000000;
    const CLIENT_REMEMBER_OPTIONS = 0x80000000;
  }
}

bitflags! {
  #[derive(Debug, Clone, Copy)]
  pub struct StatusFlags: u16 {
    const SERVER_STATUS_IN_TRANS = 0x0001;
    const SERVER_STATUS_AUTOCOMMIT = 0x0002;
    const SERVER_MORE_RESULTS_EXISTS = 0x0008;
    const SERVER_STATUS_NO_GOOD_INDEX_USED = 0x0010;
    const SERVER_STATUS_NO_INDEX_USED = 0x0020;
    const SERVER_STATUS_CURSOR_EXISTS = 0x0040;
    const SERVER_STATUS_LAST_ROW_SENT = 0x0080;
    const SERVER_STATUS_DB_DROPPED = 0x0100;
    const SERVER_STATUS_NO_BACKSLASH_ESCAPES = 0x0200;
    const SERVER_STATUS_METADATA_CHANGED = 0x0400;
    const SERVER_QUERY_WAS_SLOW = 0x0800;
    const SERVER_PS_OUT_PARAMS = 0x1000;
    const SERVER_STATUS_IN_TRANS_READONLY = 0x2000;
    const SERVER_SESSION_STATE_CHANGED = 0x4000;
  }
}

bitflags! {
  // https://dev.mysql.com/doc/dev/mysql-server/latest/group__group__cs__column__definition__flags.html
  #[derive(Debug, Clone, Copy)]
  pub struct ColumnFlags: u16 {
    const NOT_NULL = 0x0001;
    const PRIMARY_KEY = 0x0002;
    const UNIQUE_KEY = 0x0004;
    const MULTIPLE_KEY = 0x0008;
    const BLOB = 0x0010;
    const UNSIGNED = 0x0020;
    const ZEROFILL = 0x0040;
    const BINARY = 0x0080;
    const ENUM = 0x0100;
    const AUTO_INCREMENT = 0x0200;
    const TIMESTAMP = 0x0400;
    const SET = 0x0800;
    const NO_DEFAULT_VALUE = 0x1000;
    const ON_UPDATE_NOW = 0x2000;
  }
}

bitflags! {
  /// Per-column nullability/unsigned/pk bitmap carried by `TABLE_MAP` row
  /// metadata is decoded with these rather than with `ColumnFlags`, which
  /// describes result-set field definitions instead.
  #[derive(Debug, Clone, Copy)]
  pub struct RowsEventFlags: u16 {
    const END_OF_STATEMENT = 0x0001;
    const NO_FOREIGN_KEY_CHECKS = 0x0002;
    const NO_UNIQUE_KEY_CHECKS = 0x0004;
    const ROW_HAS_A_COLUMNS = 0x0008;
  }
}

#[allow(non_camel_case_types)]
#[derive(Clone, Eq, PartialEq, Copy, Debug)]
#[repr(u8)]
pub enum Command {
  COM_QUIT = 0x01,
  COM_QUERY = 0x03,
  COM_PING = 0x0e,
  COM_BINLOG_DUMP = 0x12,
  COM_REGISTER_SLAVE = 0x15,
}

/// Type of a MySQL column field, as carried in result-set field definitions
/// and in `TABLE_MAP` column arrays.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum ColumnType {
  MYSQL_TYPE_DECIMAL = 0x00,
  MYSQL_TYPE_TINY = 0x01,
  MYSQL_TYPE_SHORT = 0x02,
  MYSQL_TYPE_LONG = 0x03,
  MYSQL_TYPE_FLOAT = 0x04,
  MYSQL_TYPE_DOUBLE = 0x05,
  MYSQL_TYPE_NULL = 0x06,
  MYSQL_TYPE_TIMESTAMP = 0x07,
  MYSQL_TYPE_LONGLONG = 0x08,
  MYSQL_TYPE_INT24 = 0x09,
  MYSQL_TYPE_DATE = 0x0a,
  MYSQL_TYPE_TIME = 0x0b,
  MYSQL_TYPE_DATETIME = 0x0c,
  MYSQL_TYPE_YEAR = 0x0d,
  MYSQL_TYPE_NEWDATE = 0x0e,
  MYSQL_TYPE_VARCHAR = 0x0f,
  MYSQL_TYPE_BIT = 0x10,
  MYSQL_TYPE_TIMESTAMP2 = 0x11,
  MYSQL_TYPE_DATETIME2 = 0x12,
  MYSQL_TYPE_TIME2 = 0x13,
  MYSQL_TYPE_JSON = 0xf5,
  MYSQL_TYPE_NEWDECIMAL = 0xf6,
  MYSQL_TYPE_ENUM = 0xf7,
  MYSQL_TYPE_SET = 0xf8,
  MYSQL_TYPE_TINY_BLOB = 0xf9,
  MYSQL_TYPE_MEDIUM_BLOB = 0xfa,
  MYSQL_TYPE_LONG_BLOB = 0xfb,
  MYSQL_TYPE_BLOB = 0xfc,
  MYSQL_TYPE_VAR_STRING = 0xfd,
  MYSQL_TYPE_STRING = 0xfe,
  MYSQL_TYPE_GEOMETRY = 0xff,
}

impl TryFrom<u8> for ColumnType {
  type Error = u8;

  fn try_from(v: u8) -> Result<Self, Self::Error> {
    use ColumnType::*;
    match v {
      0x00 => Ok(MYSQL_TYPE_DECIMAL),
      0x01 => Ok(MYSQL_TYPE_TINY),
      0x02 => Ok(MYSQL_TYPE_SHORT),
      0x03 => Ok(MYSQL_TYPE_LONG),
      0x04 => Ok(MYSQL_TYPE_FLOAT),
      0x05 => Ok(MYSQL_TYPE_DOUBLE),
      0x06 => Ok(MYSQL_TYPE_NULL),
      0x07 => Ok(MYSQL_TYPE_TIMESTAMP),
      0x08 => Ok(MYSQL_TYPE_LONGLONG),
      0x09 => Ok(MYSQL_TYPE_INT24),
      0x0a => Ok(MYSQL_TYPE_DATE),
      0x0b => Ok(MYSQL_TYPE_TIME),
      0x0c => Ok(MYSQL_TYPE_DATETIME),
      0x0d => Ok(MYSQL_TYPE_YEAR),
      0x0e => Ok(MYSQL_TYPE_NEWDATE),
      0x0f => Ok(MYSQL_TYPE_VARCHAR),
      0x10 => Ok(MYSQL_TYPE_BIT),
      0x11 => Ok(MYSQL_TYPE_TIMESTAMP2),
      0x12 => Ok(MYSQL_TYPE_DATETIME2),
      0x13 => Ok(MYSQL_TYPE_TIME2),
      0xf5 => Ok(MYSQL_TYPE_JSON),
      0xf6 => Ok(MYSQL_TYPE_NEWDECIMAL),
      0xf7 => Ok(MYSQL_TYPE_ENUM),
      0xf8 => Ok(MYSQL_TYPE_SET),
      0xf9 => Ok(MYSQL_TYPE_TINY_BLOB),
      0xfa => Ok(MYSQL_TYPE_MEDIUM_BLOB),
      0xfb => Ok(MYSQL_TYPE_LONG_BLOB),
      0xfc => Ok(MYSQL_TYPE_BLOB),
      0xfd => Ok(MYSQL_TYPE_VAR_STRING),
      0xfe => Ok(MYSQL_TYPE_STRING),
      0xff => Ok(MYSQL_TYPE_GEOMETRY),
      unsupported => Err(unsupported),
    }
  }
}

/// Sub-field tags inside a `TABLE_MAP` event's metadata blob. One TLV-style
/// entry per tag, `u8` length prefix, applying to the subset of columns the
/// tag's own bitmap or list selects.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum ColumnMetadataType {
  SIGNEDNESS = 1,
  DEFAULT_CHARSET = 2,
  COLUMN_CHARSET = 3,
  COLUMN_NAME = 4,
  SET_STR_VALUE = 5,
  ENUM_STR_VALUE = 6,
  GEOMETRY_TYPE = 7,
  SIMPLE_PRIMARY_KEY = 8,
  PRIMARY_KEY_WITH_PREFIX = 9,
  ENUM_AND_SET_DEFAULT_CHARSET = 10,
  ENUM_AND_SET_COLUMN_CHARSET = 11,
  COLUMN_VISIBILITY = 12,
}

impl TryFrom<u8> for ColumnMetadataType {
  type Error = u8;

  fn try_from(v: u8) -> Result<Self, Self::Error> {
    use ColumnMetadataType::*;
    match v {
      1 => Ok(SIGNEDNESS),
      2 => Ok(DEFAULT_CHARSET),
      3 => Ok(COLUMN_CHARSET),
      4 => Ok(COLUMN_NAME),
      5 => Ok(SET_STR_VALUE),
      6 => Ok(ENUM_STR_VALUE),
      7 => Ok(GEOMETRY_TYPE),
      8 => Ok(SIMPLE_PRIMARY_KEY),
      9 => Ok(PRIMARY_KEY_WITH_PREFIX),
      10 => Ok(ENUM_AND_SET_DEFAULT_CHARSET),
      11 => Ok(ENUM_AND_SET_COLUMN_CHARSET),
      12 => Ok(COLUMN_VISIBILITY),
      unsupported => Err(unsupported),
    }
  }
}

/// Event type codes as carried in the event header's `type_code` byte.
/// Unrecognized codes decode to an opaque record rather than failing, so no
/// `TryFrom` is provided here — callers match on the raw `u8` with a
/// catch-all arm.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum BinlogEventType {
  UNKNOWN_EVENT = 0x00,
  START_EVENT_V3 = 0x01,
  QUERY_EVENT = 0x02,
  STOP_EVENT = 0x03,
  ROTATE_EVENT = 0x04,
  INTVAR_EVENT = 0x05,
  USER_VAR_EVENT = 0x0e,
  FORMAT_DESCRIPTION_EVENT = 0x0f,
  XID_EVENT = 0x10,
  TABLE_MAP_EVENT = 0x13,
  WRITE_ROWS_EVENTV1 = 0x17,
  UPDATE_ROWS_EVENTV1 = 0x18,
  DELETE_ROWS_EVENTV1 = 0x19,
  INCIDENT_EVENT = 0x1a,
  HEARTBEAT_EVENT = 0x1b,
  ROWS_QUERY_EVENT = 0x1d,
  WRITE_ROWS_EVENTV2 = 0x1e,
  UPDATE_ROWS_EVENTV2 = 0x1f,
  DELETE_ROWS_EVENTV2 = 0x20,
  GTID_EVENT = 0x21,
  ANONYMOUS_GTID_EVENT = 0x22,
  PREVIOUS_GTIDS_EVENT = 0x23,
}

impl TryFrom<u8> for BinlogEventType {
  type Error = u8;

  fn try_from(v: u8) -> Result<Self, Self::Error> {
    use BinlogEventType::*;
    match v {
      0x00 => Ok(UNKNOWN_EVENT),
      0x01 => Ok(START_EVENT_V3),
      0x02 => Ok(QUERY_EVENT),
      0x03 => Ok(STOP_EVENT),
      0x04 => Ok(ROTATE_EVENT),
      0x05 => Ok(INTVAR_EVENT),
      0x0e => Ok(USER_VAR_EVENT),
      0x0f => Ok(FORMAT_DESCRIPTION_EVENT),
      0x10 => Ok(XID_EVENT),
      0x13 => Ok(TABLE_MAP_EVENT),
      0x17 => Ok(WRITE_ROWS_EVENTV1),
      0x18 => Ok(UPDATE_ROWS_EVENTV1),
      0x19 => Ok(DELETE_ROWS_EVENTV1),
      0x1a => Ok(INCIDENT_EVENT),
      0x1b => Ok(HEARTBEAT_EVENT),
      0x1d => Ok(ROWS_QUERY_EVENT),
      0x1e => Ok(WRITE_ROWS_EVENTV2),
      0x1f => Ok(UPDATE_ROWS_EVENTV2),
      0x20 => Ok(DELETE_ROWS_EVENTV2),
      0x21 => Ok(GTID_EVENT),
      0x22 => Ok(ANONYMOUS_GTID_EVENT),
      0x23 => Ok(PREVIOUS_GTIDS_EVENT),
      unsupported => Err(unsupported),
    }
  }
}

/// Per-stream checksum selection, negotiated once from the first
/// `FORMAT_DESCRIPTION` event and fixed for the life of the session.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default)]
pub enum BinlogChecksumAlg {
  Off,
  Crc32,
  #[default]
  Undef,
}
