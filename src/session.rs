//! The façade most applications actually drive: connect once, pull
//! decoded events off a queue fed by a background reader task, and track
//! how far the stream has progressed so a restart can resume from the
//! same spot.
//!
//! The reader task and the caller are decoupled by a bounded channel so a
//! slow consumer applies backpressure to the network read loop instead of
//! buffering an unbounded backlog in memory.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::binlog::{BinlogEvent, BinlogEventHeader};
use crate::conn::{BinlogCursor, BinlogStream, Connection, ConnectionOptions};
use crate::error::{ReplicationError, Result};
use crate::handler::{ContentHandler, Envelope, HandlerPipeline, TableMapCache};

/// Events buffered between the reader task and `wait_for_next_event`.
/// Past this, the reader stalls on `send` until the caller catches up.
const EVENT_QUEUE_CAPACITY: usize = 50;

pub struct Session {
  reader: JoinHandle<()>,
  events: mpsc::Receiver<io::Result<Envelope>>,
  pipeline: HandlerPipeline,
  pending: VecDeque<Envelope>,
  position: BinlogCursor,
  addrs: Vec<SocketAddr>,
  options: ConnectionOptions,
}

impl Session {
  /// Connects, registers as a replica, and starts streaming from `start`.
  /// With `start: None`, fetches the current master status and starts from
  /// there. The reader task begins pulling events immediately; none are
  /// lost before the first `wait_for_next_event` call because they queue
  /// up in the channel.
  pub async fn connect(
    addrs: impl Into<Vec<SocketAddr>>,
    options: ConnectionOptions,
    start: Option<BinlogCursor>,
  ) -> io::Result<Self> {
    let addrs = addrs.into();
    let mut conn = Connection::connect_tcp(addrs.clone(), options.clone()).await?;
    let start = match start {
      Some(start) => start,
      None => conn.binlog_cursor().await?,
    };
    let stream = conn.binlog_stream(start.clone()).await?;
    Ok(Self::from_stream(stream, start, addrs, options))
  }

  fn from_stream(mut stream: BinlogStream, start: BinlogCursor, addrs: Vec<SocketAddr>, options: ConnectionOptions) -> Self {
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

    let reader = tokio::spawn(async move {
      while let Some(result) = stream.recv().await {
        if tx.send(result).await.is_err() {
          break;
        }
      }
    });

    let mut pipeline = HandlerPipeline::new();
    pipeline.push_handler(Box::new(TableMapCache::new()));

    Self { reader, events: rx, pipeline, pending: VecDeque::new(), position: start, addrs, options }
  }

  pub fn position(&self) -> &BinlogCursor {
    &self.position
  }

  /// Disconnects, validates `file` against `SHOW BINARY LOGS` and `offset`
  /// against that file's reported size, then reconnects and resumes
  /// streaming from the requested position. The old stream is drained (the
  /// reader task stopped) before the new one is opened, per the
  /// shared-resource policy: writes only happen while the reader isn't
  /// running.
  pub async fn set_position(&mut self, file: impl Into<String>, offset: u32) -> Result<()> {
    let file = file.into();
    self.reader.abort();

    let mut conn = Connection::connect_tcp(self.addrs.clone(), self.options.clone()).await?;
    let logs = conn.query("SHOW BINARY LOGS").await?;
    let log_name_idx = logs
      .column_index("Log_name")
      .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "SHOW BINARY LOGS has no Log_name column"))?;
    let file_size_idx = logs
      .column_index("File_size")
      .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "SHOW BINARY LOGS has no File_size column"))?;

    let mut found_size = None;
    for row in logs.rows().into_iter().flatten() {
      if row[log_name_idx].as_deref() == Some(file.as_str()) {
        found_size = row[file_size_idx].as_deref().map(ToString::to_string);
        break;
      }
    }
    let size: u64 = found_size
      .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{file} is not a known binary log")))?
      .parse()
      .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "File_size column is not a number"))?;

    if offset as u64 > size {
      return Err(
        io::Error::new(io::ErrorKind::InvalidInput, format!("offset {offset} exceeds {file}'s size of {size} bytes"))
          .into(),
      );
    }

    let cursor = BinlogCursor { log_file: file, log_position: offset };
    let stream = conn.binlog_stream(cursor.clone()).await?;
    *self = Self::from_stream(stream, cursor, self.addrs.clone(), self.options.clone());
    Ok(())
  }

  /// Same as `set_position`, keeping the currently tracked file.
  pub async fn set_offset(&mut self, offset: u32) -> Result<()> {
    let file = self.position.log_file.clone();
    self.set_position(file, offset).await
  }

  /// Returns the next event that survives the content-handler chain,
  /// pulling fresh events off the network as needed. Returns `Ok(None)`
  /// once the stream ends cleanly. An `INCIDENT_EVENT` ends the session
  /// with `Err(ReplicationError::Incident { .. })`; any transport or
  /// decode failure ends it with `Err(ReplicationError::Fatal(..))`.
  pub async fn wait_for_next_event(&mut self) -> Result<Option<Envelope>> {
    loop {
      if let Some(envelope) = self.pending.pop_front() {
        return Ok(Some(envelope));
      }

      let Some(result) = self.events.recv().await else {
        return Ok(None);
      };
      let (header, event) = result?;

      self.position.log_position = header.log_position;
      if let BinlogEvent::Rotate(ref rotate) = event {
        self.position.log_file = rotate.next_log_file.clone();
        self.position.log_position = rotate.next_log_position as u32;
      }

      if let BinlogEvent::Incident(incident) = event {
        return Err(ReplicationError::Incident { incident_type: incident.incident_type, message: incident.message });
      }

      self.pending.extend(self.pipeline.push(header, event));
    }
  }

  /// Stops the reader task and drops the connection. Any events already
  /// queued but not yet delivered via `wait_for_next_event` are lost.
  pub async fn disconnect(self) {
    self.reader.abort();
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn event_queue_capacity_is_bounded() {
    assert_eq!(EVENT_QUEUE_CAPACITY, 50);
  }
}
