use super::binlog::{BinlogEvent, BinlogEventHeader};
use super::buf_ext::BufExt;
use super::buf_ext::BufMutExt;
use super::constants::{
  BinlogChecksumAlg, CapabilityFlags, Command, StatusFlags, MAX_PAYLOAD_LEN, MYSQL_NATIVE_PASSWORD_PLUGIN_NAME,
};
use super::debug::DebugBytesRef;
use super::query::{Column, QueryResults, RowValue};
use super::scramble;
use super::stream::Stream;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::cmp::max;
use std::collections::BTreeMap;
use std::net::{SocketAddr, SocketAddrV4, SocketAddrV6};
use std::str::FromStr;
use std::time::Duration;
use std::{fmt, io};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net;
use url::Url;

#[cfg(feature = "ssl")]
use openssl::ssl::SslConnector;

#[derive(Debug, Clone)]
pub struct ConnectionOptions {
  pub user: String,
  pub password: Option<String>,
  pub database: Option<String>,
  pub connect_timeout: Option<Duration>,
  pub read_timeout: Option<Duration>,
  pub write_timeout: Option<Duration>,
}

impl Default for ConnectionOptions {
  fn default() -> Self {
    Self {
      user: "mysql".to_string(),
      password: None,
      database: None,
      connect_timeout: None,
      read_timeout: None,
      write_timeout: None,
    }
  }
}

impl TryFrom<&Url> for ConnectionOptions {
  type Error = io::Error;

  fn try_from(url: &Url) -> Result<Self, Self::Error> {
    let user = match url.username() {
      "" => "mysql".to_string(),
      user => user.to_string(),
    };
    let password = url.password().map(ToString::to_string);

    let query_pairs = url.query_pairs().collect::<BTreeMap<_, _>>();
    let database = query_pairs.get("database").map(|v| v.to_string());

    let connect_timeout =
      query_pairs.get("connect_timeout_ms").and_then(|v| v.parse().ok()).map(Duration::from_millis);

    let read_timeout = query_pairs.get("read_timeout_ms").and_then(|v| v.parse().ok()).map(Duration::from_millis);

    let write_timeout = query_pairs.get("write_timeout_ms").and_then(|v| v.parse().ok()).map(Duration::from_millis);

    Ok(Self { user, password, database, connect_timeout, read_timeout, write_timeout })
  }
}

/// Replication client identity and socket tuning, read once at connect time
/// from `LIBREPLICATION_*` environment variables so operators can configure
/// a deployment without threading new constructor parameters through.
#[derive(Debug, Clone, Copy)]
struct ReplicationEnv {
  server_id: u32,
  tcp_keepalive: bool,
  tcp_keepidle: Option<Duration>,
  tcp_keepintvl: Option<Duration>,
  tcp_keepcnt: Option<u32>,
}

impl ReplicationEnv {
  fn from_process_env() -> Self {
    fn env_u64(name: &str) -> Option<u64> {
      std::env::var(name).ok().and_then(|v| v.parse().ok())
    }

    Self {
      server_id: env_u64("LIBREPLICATION_SERVER_ID").unwrap_or(1) as u32,
      tcp_keepalive: std::env::var("LIBREPLICATION_TCP_KEEPALIVE").map(|v| v != "0").unwrap_or(false),
      tcp_keepidle: env_u64("LIBREPLICATION_TCP_KEEPIDLE").map(Duration::from_secs),
      tcp_keepintvl: env_u64("LIBREPLICATION_TCP_KEEPINTVL").map(Duration::from_secs),
      tcp_keepcnt: env_u64("LIBREPLICATION_TCP_KEEPCNT").map(|v| v as u32),
    }
  }

  fn apply_to(&self, stream: &net::TcpStream) -> io::Result<()> {
    if !self.tcp_keepalive {
      return Ok(());
    }

    let sock = socket2::SockRef::from(stream);
    let mut keepalive = socket2::TcpKeepalive::new();
    if let Some(idle) = self.tcp_keepidle {
      keepalive = keepalive.with_time(idle);
    }
    if let Some(intvl) = self.tcp_keepintvl {
      keepalive = keepalive.with_interval(intvl);
    }
    #[cfg(not(target_os = "windows"))]
    if let Some(cnt) = self.tcp_keepcnt {
      keepalive = keepalive.with_retries(cnt);
    }
    sock.set_tcp_keepalive(&keepalive)
  }
}

#[derive(Debug)]
pub struct Connection {
  stream: Stream,
  capabilities: CapabilityFlags,
  status_flags: StatusFlags,
  sequence_id: u8,
  last_command_id: u8,
  options: ConnectionOptions,
  max_packet_size: u32,
  warnings: u16,
  affected_rows: u64,
  last_inserted_id: u64,
  replication_env: ReplicationEnv,
}

impl Connection {
  pub async fn connect_from_url(url: &Url) -> io::Result<Self> {
    match url.scheme() {
      "tcp" | "mysql" => {
        let port = url.port().unwrap_or(3306);
        let addrs = match url.host() {
          Some(url::Host::Domain(domain)) => {
            net::lookup_host(format!("{}:{}", domain, port)).await.map(|v| v.collect::<Vec<_>>())?
          }
          Some(url::Host::Ipv4(ip)) => vec![SocketAddrV4::new(ip, port).into()],
          Some(url::Host::Ipv6(ip)) => vec![SocketAddrV6::new(ip, port, 0, 0).into()],
          None => return Err(io::Error::new(io::ErrorKind::InvalidInput, "url has no host")),
        };
        let options = url.try_into()?;
        Self::connect_tcp(addrs, options).await
      }
      scheme => Err(io::Error::new(io::ErrorKind::InvalidInput, format!("{} is not supported", scheme))),
    }
  }

  #[cfg(feature = "ssl")]
  pub async fn connect_ssl_from_url(url: &Url, ssl_connector: SslConnector) -> io::Result<Self> {
    match url.scheme() {
      "tcp" | "mysql" => {
        let port = url.port().unwrap_or(3306);
        let (domain, addrs) = match url.host() {
          Some(url::Host::Domain(domain)) => {
            net::lookup_host(format!("{}:{}", domain, port)).await.map(|v| (domain.to_string(), v.collect::<Vec<_>>()))?
          }
          Some(url::Host::Ipv4(ip)) => (ip.to_string(), vec![SocketAddrV4::new(ip, port).into()]),
          Some(url::Host::Ipv6(ip)) => (ip.to_string(), vec![SocketAddrV6::new(ip, port, 0, 0).into()]),
          None => return Err(io::Error::new(io::ErrorKind::InvalidInput, "url has no host")),
        };
        let options = url.try_into()?;
        Self::connect_ssl(addrs, domain, options, ssl_connector).await
      }
      scheme => Err(io::Error::new(io::ErrorKind::InvalidInput, format!("{} is not supported", scheme))),
    }
  }

  pub async fn connect_tcp(addrs: impl Into<Vec<SocketAddr>>, options: ConnectionOptions) -> io::Result<Self> {
    let stream = Stream::connect_tcp(addrs).await?;
    Self::connect(stream, options).await
  }

  #[cfg(feature = "ssl")]
  pub async fn connect_ssl(
    addrs: impl Into<Vec<SocketAddr>>,
    domain: impl Into<String>,
    options: ConnectionOptions,
    ssl_connector: SslConnector,
  ) -> io::Result<Self> {
    let stream = Stream::connect_tcp(addrs).await?;
    let stream = stream.into_ssl(domain, ssl_connector).await?;
    Self::connect(stream, options).await
  }

  async fn connect(stream: Stream, options: ConnectionOptions) -> io::Result<Self> {
    let mut connection = Self {
      stream,
      capabilities: CapabilityFlags::empty(),
      sequence_id: 0,
      last_command_id: 0,
      last_inserted_id: 0,
      warnings: 0,
      affected_rows: 0,
      max_packet_size: 16_777_216,
      options,
      status_flags: StatusFlags::empty(),
      replication_env: ReplicationEnv::from_process_env(),
    };

    connection.replication_env.apply_to(connection.stream.tcp_ref())?;
    connection.handshake().await?;

    Ok(connection)
  }

  pub async fn duplicate(&self) -> io::Result<Self> {
    let stream = self.stream.duplicate().await?;
    Self::connect(stream, self.options.clone()).await
  }

  pub async fn close(mut self) -> io::Result<()> {
    self.write_command(Command::COM_QUIT, &[]).await?;
    let payload = self.read_payload().await;

    match payload {
      Ok(payload) => Err(self.parse_and_handle_server_error(payload)),
      Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(()),
      Err(err) => Err(err),
    }
  }

  async fn handshake(&mut self) -> io::Result<()> {
    // https://dev.mysql.com/doc/internals/en/connection-phase-packets.html
    let payload = self.read_payload().await?;

    match payload.first() {
      Some(0xFF) => Err(self.parse_and_handle_server_error(payload)),
      Some(_) => {
        let handshake = Handshake::parse(payload)?;
        self.handle_handshake(handshake).await
      }
      None => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "Unexpected EOF while parsing handshake response")),
    }
  }

  fn handle_server_error(&mut self, err: ServerError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("Server error {}: {}", err.error_code, err.error_message))
  }

  async fn handle_handshake(&mut self, p: Handshake) -> io::Result<()> {
    // https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_connection_phase.html
    if p.protocol_version != 10u8 {
      return Err(io::Error::new(io::ErrorKind::Unsupported, "only protocol version 10 is supported"));
    }

    if !p.capabilities.contains(CapabilityFlags::CLIENT_PROTOCOL_41) {
      return Err(io::Error::new(io::ErrorKind::Unsupported, "server does not support the 4.1 protocol"));
    }

    self.capabilities = p.capabilities & default_client_capabilities(&self.options);
    self.status_flags = p.status_flags;

    self.write_handshake_response(p.auth_plugin.as_str(), p.nonce().chunk()).await?;
    self.read_auth_switch_request().await?;

    Ok(())
  }

  pub async fn read_auth_switch_request(&mut self) -> io::Result<()> {
    loop {
      let mut payload = self.read_payload().await?;

      match payload.first() {
        Some(0x00) => return self.parse_and_handle_server_ok(payload),
        Some(0x01) if payload.chunk() == [0x01, 0x04] => {
          return Err(io::Error::new(io::ErrorKind::ConnectionReset, "SSL required"));
        }
        Some(0xFE) => {
          payload.advance(1);
          let auth_plugin = payload.mysql_get_null_terminated_string();
          let nonce = payload.mysql_get_null_terminated_string();
          self.write_auth_switch_response(auth_plugin.as_str(), nonce.as_bytes()).await?;
        }
        Some(0xFF) => return Err(self.parse_and_handle_server_error(payload)),
        Some(other) => {
          return Err(io::Error::new(io::ErrorKind::InvalidData, format!("unexpected auth packet marker {other:#x}")))
        }
        None => {
          return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "Unexpected EOF while parsing login response"))
        }
      }
    }
  }

  /// Sends a text query and collects the full result set.
  pub async fn query(&mut self, query: impl AsRef<str>) -> io::Result<QueryResults> {
    self.write_command(Command::COM_QUERY, query.as_ref().as_bytes()).await?;
    self.read_results().await
  }

  pub async fn ping(&mut self) -> io::Result<()> {
    self.write_command(Command::COM_PING, &[]).await?;

    let payload = self.read_payload().await?;
    match payload.first() {
      Some(0x00) => self.parse_and_handle_server_ok(payload),
      _ => Err(io::Error::new(io::ErrorKind::Other, "Unexpected response from mysql")),
    }
  }

  async fn write_command(&mut self, cmd: Command, payload: &[u8]) -> io::Result<()> {
    self.sequence_id = 0;
    self.last_command_id = cmd as u8;

    let mut b = BytesMut::with_capacity(1 + payload.len());
    b.put_u8(cmd as u8);
    b.put(payload);

    self.write_payload(b.into()).await
  }

  async fn write_payload(&mut self, payload: Bytes) -> io::Result<()> {
    for chunk in payload.chunks(MAX_PAYLOAD_LEN) {
      let mut b = BytesMut::with_capacity(4 + chunk.len());
      b.put_uint_le(chunk.len() as u64, 3);
      b.put_u8(self.sequence_id);
      b.put(chunk);

      tracing::trace!(bytes = ?DebugBytesRef(chunk), "sent packet");

      self.sequence_id = self.sequence_id.wrapping_add(1);
      self.stream.write_all(&b[..]).await?;
      self.stream.flush().await?;
    }

    Ok(())
  }

  async fn read_generic_response(&mut self) -> io::Result<()> {
    let payload = self.read_payload().await?;

    match payload.first() {
      Some(0x00) => self.parse_and_handle_server_ok(payload),
      Some(0xFF) => Err(self.parse_and_handle_server_error(payload)),
      Some(_) => Err(io::Error::new(io::ErrorKind::InvalidData, "Invalid data while parsing generic response")),
      None => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "Unexpected EOF while parsing generic response")),
    }
  }

  async fn read_results(&mut self) -> io::Result<QueryResults> {
    // https://dev.mysql.com/doc/internals/en/com-query-response.html
    let mut payload = self.read_payload().await?;

    match payload.first() {
      Some(0x00) => {
        self.parse_and_handle_server_ok(payload)?;
        Ok(QueryResults::default())
      }
      Some(0xFF) => Err(self.parse_and_handle_server_error(payload)),
      Some(0xFB) => Err(io::Error::new(io::ErrorKind::Unsupported, "LOCAL INFILE is not supported")),
      Some(_) => {
        let column_count = payload.mysql_get_lenc_uint() as usize;
        let columns = self.read_columns(column_count).await?;
        let values = self.read_row_values(&columns).await?;
        Ok(QueryResults { columns, values })
      }
      None => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "Unexpected EOF while parsing query result response")),
    }
  }

  async fn read_columns(&mut self, column_count: usize) -> io::Result<Vec<Column>> {
    // https://dev.mysql.com/doc/internals/en/com-query-response.html#packet-ProtocolText::Resultset
    let mut columns = Vec::with_capacity(column_count);
    for _ in 0..column_count {
      let payload = self.read_payload().await?;
      match payload.first() {
        Some(0x00) => {
          self.parse_and_handle_server_ok(payload)?;
          break;
        }
        Some(_) => columns.push(Column::parse(payload)?),
        None => {
          return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "Unexpected EOF while parsing query column response"))
        }
      }
    }
    Ok(columns)
  }

  async fn read_row_values(&mut self, columns: &[Column]) -> io::Result<Vec<RowValue>> {
    // https://dev.mysql.com/doc/internals/en/com-query-response.html#packet-ProtocolText::ResultsetRow
    let mut row_values = Vec::new();
    loop {
      let payload = self.read_payload().await?;

      match payload.first() {
        Some(0x00) | Some(0xFE) => {
          self.parse_and_handle_server_ok(payload)?;
          break;
        }
        Some(_) => row_values.extend(super::query::parse_row_values(payload, columns.len())),
        None => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "Unexpected EOF while parsing query row")),
      }
    }
    Ok(row_values)
  }

  fn handle_server_ok(&mut self, ok: ServerOk) {
    self.affected_rows = ok.affected_rows;
    self.last_inserted_id = ok.last_inserted_id;
    self.status_flags = ok.status_flags.unwrap_or(StatusFlags::empty());
    self.warnings = ok.warnings.unwrap_or(0);
  }

  async fn read_payload(&mut self) -> io::Result<Bytes> {
    let (sequence_id, payload) = self.read_packet().await?;
    if self.sequence_id != sequence_id {
      tracing::warn!(expected = self.sequence_id, got = sequence_id, "inbound packet sequence id mismatch");
    }
    self.sequence_id = sequence_id.wrapping_add(1);
    tracing::trace!(bytes = ?DebugBytesRef(payload.chunk()), "received packet");
    Ok(payload)
  }

  fn scramble_password(&self, auth_plugin: &str, nonce: &[u8]) -> io::Result<Vec<u8>> {
    let password = self.options.password.as_deref().unwrap_or("");

    if password.is_empty() {
      return Ok(Vec::new());
    }

    match auth_plugin {
      MYSQL_NATIVE_PASSWORD_PLUGIN_NAME => Ok(scramble::scramble_native_password(nonce, password)),
      custom_auth_plugin => {
        Err(io::Error::new(io::ErrorKind::Other, format!("{} is not supported", custom_auth_plugin)))
      }
    }
  }

  async fn write_auth_switch_response(&mut self, auth_plugin: &str, nonce: &[u8]) -> io::Result<()> {
    let scrambled_data = self.scramble_password(auth_plugin, nonce)?;
    self.write_payload(scrambled_data.into()).await
  }

  async fn write_handshake_response(&mut self, auth_plugin: &str, nonce: &[u8]) -> io::Result<()> {
    const UTF8_GENERAL_CI: u8 = 33;

    let mut b = BytesMut::new();
    b.put_u32_le(self.capabilities.bits());
    b.put_u32_le(self.max_packet_size);
    b.put_u8(UTF8_GENERAL_CI);
    b.put(&[0; 23][..]);
    b.put(self.options.user.as_bytes());
    b.put_u8(0);

    let scrambled_data = self.scramble_password(auth_plugin, nonce)?;

    b.mysql_put_lenc_uint(scrambled_data.len() as u64);
    b.put(scrambled_data.as_slice());

    if let Some(db_name) = self.options.database.as_ref() {
      b.put(db_name.as_bytes());
      b.put_u8(0);
    }

    b.put(auth_plugin.as_bytes());
    b.put_u8(0);

    self.write_payload(b.into()).await
  }

  async fn read_packet(&mut self) -> io::Result<(u8, Bytes)> {
    let mut header = [0u8; 4];
    self.stream.read_exact(&mut header).await?;

    let mut header = &header[..];
    let payload_len = header.get_uint_le(3) as usize;
    let sequence_id = header.get_u8();

    let mut payload = vec![0; payload_len];
    self.stream.read_exact(&mut payload).await?;

    Ok((sequence_id, payload.into()))
  }

  pub async fn binlog_cursor(&mut self) -> io::Result<BinlogCursor> {
    let results = self.query("SHOW MASTER STATUS").await?;
    if results.rows_len() == 0 {
      return Err(io::Error::new(io::ErrorKind::InvalidData, "SHOW MASTER STATUS returned no rows — is binary logging enabled?"));
    }
    let row = results.row(0);
    let log_file = row[0].clone().ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing File column"))?;
    let log_position: u32 = row[1]
      .as_deref()
      .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing Position column"))?
      .parse()
      .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "Position column is not a number"))?;
    Ok(BinlogCursor { log_file, log_position })
  }

  /// Begins binlog dumping from `binlog_cursor`, returning a stream of
  /// decoded events. Passing `None` fetches the current master status
  /// (`SHOW MASTER STATUS`) and starts from there instead. The server id
  /// used to register as a replica comes from `LIBREPLICATION_SERVER_ID`
  /// (default `1`).
  pub async fn binlog_stream(mut self, binlog_cursor: impl Into<Option<BinlogCursor>>) -> io::Result<BinlogStream> {
    let binlog_cursor = match binlog_cursor.into() {
      Some(binlog_cursor) => binlog_cursor,
      None => self.binlog_cursor().await?,
    };
    let server_id = self.replication_env.server_id;
    self.source_configuration_check().await?;
    self.register_as_replica(server_id).await?;
    self.dump_binlog(server_id, &binlog_cursor).await?;
    Ok(BinlogStream { conn: self, checksum_alg: BinlogChecksumAlg::Undef })
  }

  async fn read_binlog_event_packet(
    &mut self,
    checksum_alg: BinlogChecksumAlg,
  ) -> io::Result<(BinlogEventHeader, BinlogEvent, BinlogChecksumAlg)> {
    let payload = self.read_payload().await?;

    match payload.first() {
      Some(0x00) => BinlogEventHeader::parse(payload, checksum_alg),
      Some(0xFF) => Err(self.parse_and_handle_server_error(payload)),
      Some(_) => Err(io::Error::new(io::ErrorKind::InvalidData, "Invalid data while parsing binlog event response")),
      None => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "Unexpected EOF while parsing binlog event response")),
    }
  }

  fn parse_and_handle_server_ok(&mut self, payload: Bytes) -> io::Result<()> {
    ServerOk::parse(payload, self.capabilities).map(|ok| self.handle_server_ok(ok))
  }

  fn parse_and_handle_server_error(&mut self, payload: Bytes) -> io::Error {
    match ServerError::parse(payload, self.capabilities) {
      Ok(err) => self.handle_server_error(err),
      Err(err) => err,
    }
  }

  async fn source_configuration_check(&mut self) -> io::Result<()> {
    // Mirror the server's global checksum setting into the session rather
    // than forcing it off, so a FORMAT_DESCRIPTION_EVENT negotiated for
    // CRC32 (the default since 5.6.6) actually matches what dump_binlog
    // goes on to receive.
    self.query("SET @master_binlog_checksum=@@global.binlog_checksum").await?;
    let results = self.query("SELECT @master_binlog_checksum").await?;
    if results.rows_len() == 0 {
      return Err(io::Error::new(io::ErrorKind::InvalidData, "checksum readback returned no rows"));
    }
    let negotiated = results.row(0).first().and_then(|v| v.as_deref()).unwrap_or("NONE");
    tracing::debug!(negotiated, "negotiated binlog checksum algorithm with the source");
    Ok(())
  }

  async fn register_as_replica(&mut self, server_id: u32) -> io::Result<()> {
    // Wire layout per the `COM_REGISTER_SLAVE` command: the replica's
    // reported hostname/user/password aren't validated by the server, so
    // we send fixed placeholders rather than threading real credentials.
    let hostname = &b""[..];
    let user = &b"mrl_user"[..];
    let password = &b"pw"[..];
    let port: u16 = 0;

    let payload_len = 4 + 1 + hostname.len() + 1 + user.len() + 1 + password.len() + 2 + 4 + 4;
    let mut b = BytesMut::with_capacity(payload_len);

    b.put_u32_le(server_id);
    b.put_u8(hostname.len() as u8);
    b.put(hostname);
    b.put_u8(user.len() as u8);
    b.put(user);
    b.put_u8(password.len() as u8);
    b.put(password);
    b.put_u16_le(port);
    b.put_u32_le(0); // replication rank, ignored by the server
    b.put_u32_le(0); // master server id, 0 for a direct replica

    self.write_command(Command::COM_REGISTER_SLAVE, &b[..]).await?;
    self.read_generic_response().await
  }

  async fn dump_binlog(&mut self, server_id: u32, binlog_cursor: &BinlogCursor) -> io::Result<()> {
    let file = binlog_cursor.log_file.as_bytes();

    let payload_len = 4 + 2 + 4 + file.len();
    let mut b = BytesMut::with_capacity(payload_len);
    b.put_u32_le(binlog_cursor.log_position);
    b.put_u16_le(0); // BINLOG_DUMP_NON_BLOCK and friends, unused
    b.put_u32_le(server_id);
    b.put(file);

    self.write_command(Command::COM_BINLOG_DUMP, &b[..]).await
  }
}

fn default_client_capabilities(opts: &ConnectionOptions) -> CapabilityFlags {
  let mut capabilities = CapabilityFlags::CLIENT_PROTOCOL_41
    | CapabilityFlags::CLIENT_LONG_PASSWORD
    | CapabilityFlags::CLIENT_PLUGIN_AUTH
    | CapabilityFlags::CLIENT_LONG_FLAG
    | CapabilityFlags::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA
    | CapabilityFlags::CLIENT_RESERVED2
    | CapabilityFlags::CLIENT_DEPRECATE_EOF;

  if opts.database.as_ref().filter(|v| !v.is_empty()).is_some() {
    capabilities.insert(CapabilityFlags::CLIENT_CONNECT_WITH_DB);
  }

  capabilities
}

#[derive(Debug)]
pub struct Handshake {
  capabilities: CapabilityFlags,
  protocol_version: u8,
  scramble_1: Bytes,
  scramble_2: Option<Bytes>,
  auth_plugin: String,
  status_flags: StatusFlags,
}

impl Handshake {
  fn parse(mut b: Bytes) -> io::Result<Self> {
    // https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_connection_phase_packets_protocol_handshake_response.html
    let protocol_version = b.get_u8();
    let _server_version = b.mysql_get_null_terminated_string();
    let _connection_id = b.get_u32_le();
    let scramble_1 = b.split_to(8);
    b.advance(1);
    let capabilities_1 = b.get_u16_le();
    let _character_set = b.get_u8();
    let status_flags = StatusFlags::from_bits_truncate(b.get_u16_le());
    let capabilities_2 = b.get_u16_le();

    let capabilities = CapabilityFlags::from_bits_truncate(capabilities_1 as u32 | ((capabilities_2 as u32) << 16));

    if !capabilities.contains(CapabilityFlags::CLIENT_PLUGIN_AUTH) {
      return Err(io::Error::new(io::ErrorKind::Other, "CLIENT_PLUGIN_AUTH flag is not set"));
    }

    let scramble_len: i16 = b.get_u8().into();
    b.advance(10);

    let scramble_2_len = max(12, scramble_len - 9) as usize;
    let scramble_2 = Some(b.split_to(scramble_2_len));
    b.advance(1);

    let auth_plugin = b.mysql_get_null_terminated_string();

    Ok(Self { capabilities, protocol_version, scramble_1, scramble_2, auth_plugin, status_flags })
  }

  fn nonce(&self) -> Bytes {
    let mut out = BytesMut::new();
    out.extend_from_slice(self.scramble_1.chunk());

    if let Some(scramble_2) = self.scramble_2.as_ref().map(Bytes::chunk) {
      out.extend_from_slice(scramble_2);
    }

    out.freeze()
  }
}

// https://dev.mysql.com/doc/internals/en/packet-OK_Packet.html
#[derive(Debug)]
struct ServerOk {
  affected_rows: u64,
  last_inserted_id: u64,
  status_flags: Option<StatusFlags>,
  warnings: Option<u16>,
}

impl ServerOk {
  fn parse(mut b: Bytes, capability_flags: CapabilityFlags) -> io::Result<Self> {
    let _header = b.get_u8();
    let affected_rows = b.mysql_get_lenc_uint();
    let last_inserted_id = b.mysql_get_lenc_uint();

    let mut status_flags = None;
    let mut warnings = None;
    if capability_flags.contains(CapabilityFlags::CLIENT_PROTOCOL_41) {
      status_flags = Some(StatusFlags::from_bits_truncate(b.get_u16_le()));
      warnings = Some(b.get_u16_le());
    } else if capability_flags.contains(CapabilityFlags::CLIENT_TRANSACTIONS) {
      status_flags = Some(StatusFlags::from_bits_truncate(b.get_u16_le()));
    }

    Ok(Self { affected_rows, last_inserted_id, status_flags, warnings })
  }
}

// https://dev.mysql.com/doc/internals/en/packet-ERR_Packet.html
#[derive(Debug)]
pub struct ServerError {
  error_code: u16,
  error_message: String,
}

impl ServerError {
  fn parse(mut b: Bytes, capability_flags: CapabilityFlags) -> io::Result<Self> {
    let _header = b.get_u8();
    let error_code = b.get_u16_le();

    if capability_flags.contains(CapabilityFlags::CLIENT_PROTOCOL_41) {
      let _state_marker = b.mysql_get_fixed_length_string(1);
      let _state = b.mysql_get_fixed_length_string(5);
    }

    let error_message = b.mysql_get_eof_string();
    Ok(Self { error_code, error_message })
  }
}

#[derive(Debug, PartialEq, PartialOrd, Clone)]
pub struct BinlogCursor {
  pub log_file: String,
  pub log_position: u32,
}

impl fmt::Display for BinlogCursor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.log_file, self.log_position)
  }
}

impl FromStr for BinlogCursor {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (log_file, log_position) = s
      .split_once('/')
      .ok_or_else(|| "Failed to parse binlog cursor. Expected format is <prefix>.<file>/<position>".to_string())?;
    let log_file = log_file.to_string();
    let log_position =
      log_position.parse().map_err(|_| "Failed to parse binlog cursor position. Expected format is u32.".to_string())?;
    Ok(Self { log_file, log_position })
  }
}

#[derive(Debug)]
pub struct BinlogStream {
  conn: Connection,
  checksum_alg: BinlogChecksumAlg,
}

impl BinlogStream {
  pub async fn close(mut self) -> io::Result<()> {
    self.conn.stream.shutdown().await
  }

  pub async fn recv(&mut self) -> Option<io::Result<(BinlogEventHeader, BinlogEvent)>> {
    match self.conn.read_binlog_event_packet(self.checksum_alg).await {
      Ok((header, event, negotiated)) => {
        self.checksum_alg = negotiated;
        Some(Ok((header, event)))
      }
      Err(err) => Some(Err(err)),
    }
  }
}
