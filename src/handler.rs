//! A chain of content handlers, each able to pass an event through,
//! swallow it, or queue up synthetic events of its own to be delivered
//! ahead of whatever comes next off the wire.
//!
//! A handler drains its own queue before it is ever given a new event to
//! process, and whatever it returns is the only thing later handlers in
//! the chain see — there is no way to look back upstream.

use std::collections::{HashMap, VecDeque};

use crate::binlog::{BinlogEvent, BinlogEventHeader, RowStatement, TableMapEvent, TransactionEvent};

pub type Envelope = (BinlogEventHeader, BinlogEvent);

pub trait ContentHandler: Send {
  /// Consumes one event, optionally producing one to pass downstream.
  /// Returning `None` drops the event from the pipeline.
  fn process(&mut self, header: BinlogEventHeader, event: BinlogEvent) -> Option<Envelope>;

  /// Events queued here are delivered, in order, before the next call to
  /// `process` for this handler.
  fn injection_queue(&mut self) -> &mut VecDeque<Envelope>;
}

#[derive(Default)]
pub struct HandlerPipeline {
  handlers: Vec<Box<dyn ContentHandler>>,
}

impl HandlerPipeline {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push_handler(&mut self, handler: Box<dyn ContentHandler>) {
    self.handlers.push(handler);
  }

  /// Runs one upstream event through every handler in order, returning
  /// whatever survives downstream of the last one. A handler's injected
  /// events are drained ahead of the event actually being processed, so an
  /// earlier injection is observed by later handlers before its trigger is.
  pub fn push(&mut self, header: BinlogEventHeader, event: BinlogEvent) -> Vec<Envelope> {
    let mut batch = vec![(header, event)];

    for handler in self.handlers.iter_mut() {
      let mut next_batch = Vec::with_capacity(batch.len());
      for (h, e) in batch {
        while let Some(injected) = handler.injection_queue().pop_front() {
          next_batch.push(injected);
        }
        if let Some(out) = handler.process(h, e) {
          next_batch.push(out);
        }
      }
      batch = next_batch;
    }

    batch
  }
}

/// Remembers the most recent `TABLE_MAP_EVENT` per table id so row events
/// (which carry only the id) can be resolved to column definitions without
/// every consumer re-implementing the cache themselves.
///
/// A row event for a table id this handler has never seen a table map for
/// is dropped with a warning rather than treated as fatal — a prior
/// replay tool in this codebase's lineage used to synthesize a blank
/// header for the missing id instead, which produced silently wrong
/// decodes; dropping is the safer default.
#[derive(Default)]
pub struct TableMapCache {
  tables: HashMap<u64, TableMapEvent>,
  queue: VecDeque<Envelope>,
}

impl TableMapCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn table(&self, table_id: u64) -> Option<&TableMapEvent> {
    self.tables.get(&table_id)
  }
}

impl ContentHandler for TableMapCache {
  fn process(&mut self, header: BinlogEventHeader, event: BinlogEvent) -> Option<Envelope> {
    let table_id = match &event {
      BinlogEvent::Insert(e) => Some(e.table_id),
      BinlogEvent::Update(e) => Some(e.table_id),
      BinlogEvent::Delete(e) => Some(e.table_id),
      _ => None,
    };

    if let Some(table_id) = table_id {
      if !self.tables.contains_key(&table_id) {
        tracing::warn!(table_id, "row event references a table id with no prior table map; skipping");
        return None;
      }
    }

    if let BinlogEvent::TableMap(ref table_map) = event {
      self.tables.insert(table_map.table_id, table_map.clone());
    }

    Some((header, event))
  }

  fn injection_queue(&mut self) -> &mut VecDeque<Envelope> {
    &mut self.queue
  }
}

/// Aggregates a row-based transaction into a single synthetic
/// `BinlogEvent::Transaction`, emitted once the transaction commits.
///
/// Watches `QUERY_EVENT` text for `BEGIN`/`COMMIT`/`ROLLBACK` (statement
/// replication brackets every row-based transaction this way even when the
/// storage engine also reports an `XID_EVENT`) and buffers every
/// `TABLE_MAP`/`WRITE`/`UPDATE`/`DELETE_ROWS` event seen in between, row
/// data already resolved against the table map so the synthetic event
/// carries owned data rather than borrowed wire buffers. Outside of a
/// transaction, events pass through untouched — this lets non-transactional
/// engines (no `BEGIN`, no `XID`) keep working unaggregated.
///
/// Owns its own `table_id -> TableMapEvent` map rather than sharing
/// `TableMapCache`'s: the two handlers can sit at different points in the
/// pipeline and there's no guarantee both see every table map (a consumer
/// might only install one of them).
#[derive(Default)]
pub struct TransactionParser {
  tables: HashMap<u64, TableMapEvent>,
  in_transaction: bool,
  begin_header: Option<BinlogEventHeader>,
  statements: Vec<RowStatement>,
  queue: VecDeque<Envelope>,
}

impl TransactionParser {
  pub fn new() -> Self {
    Self::default()
  }

  fn abort(&mut self) {
    self.in_transaction = false;
    self.begin_header = None;
    self.statements.clear();
  }

  fn commit(&mut self) {
    let header = match self.begin_header.take() {
      Some(header) => header,
      None => return,
    };
    let statements = std::mem::take(&mut self.statements);
    self.in_transaction = false;
    self.queue.push_back((header, BinlogEvent::Transaction(TransactionEvent { statements })));
  }
}

impl ContentHandler for TransactionParser {
  fn process(&mut self, header: BinlogEventHeader, event: BinlogEvent) -> Option<Envelope> {
    match &event {
      BinlogEvent::Rotate(_) => {
        self.tables.clear();
        self.abort();
        Some((header, event))
      }

      BinlogEvent::Query(q) if q.query.trim().eq_ignore_ascii_case("BEGIN") => {
        self.abort();
        self.in_transaction = true;
        self.begin_header = Some(header);
        None
      }

      BinlogEvent::Query(q) if self.in_transaction && q.query.trim().eq_ignore_ascii_case("COMMIT") => {
        self.commit();
        None
      }

      BinlogEvent::Query(q) if self.in_transaction && q.query.trim().eq_ignore_ascii_case("ROLLBACK") => {
        self.abort();
        None
      }

      BinlogEvent::TableMap(table_map) => {
        self.tables.insert(table_map.table_id, table_map.clone());
        Some((header, event))
      }

      BinlogEvent::Insert(e) if self.in_transaction => {
        match self.tables.get(&e.table_id) {
          Some(table) => {
            let rows = e.rows(&table.columns());
            self.statements.push(RowStatement::Insert { table: table.clone(), rows });
          }
          None => tracing::warn!(table_id = e.table_id, "insert row event references a table id with no prior table map; skipping"),
        }
        None
      }

      BinlogEvent::Update(e) if self.in_transaction => {
        match self.tables.get(&e.table_id) {
          Some(table) => {
            let rows = e.rows(&table.columns());
            self.statements.push(RowStatement::Update { table: table.clone(), rows });
          }
          None => tracing::warn!(table_id = e.table_id, "update row event references a table id with no prior table map; skipping"),
        }
        None
      }

      BinlogEvent::Delete(e) if self.in_transaction => {
        match self.tables.get(&e.table_id) {
          Some(table) => {
            let rows = e.rows(&table.columns());
            self.statements.push(RowStatement::Delete { table: table.clone(), rows });
          }
          None => tracing::warn!(table_id = e.table_id, "delete row event references a table id with no prior table map; skipping"),
        }
        None
      }

      BinlogEvent::Xid(_) if self.in_transaction => {
        self.commit();
        None
      }

      _ => Some((header, event)),
    }
  }

  fn injection_queue(&mut self) -> &mut VecDeque<Envelope> {
    &mut self.queue
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::constants::BinlogChecksumAlg;

  fn sample_header() -> BinlogEventHeader {
    BinlogEventHeader {
      timestamp: 0,
      server_id: 1,
      log_position: 0,
      flags: 0,
    }
  }

  struct Passthrough {
    queue: VecDeque<Envelope>,
  }

  impl ContentHandler for Passthrough {
    fn process(&mut self, header: BinlogEventHeader, event: BinlogEvent) -> Option<Envelope> {
      Some((header, event))
    }

    fn injection_queue(&mut self) -> &mut VecDeque<Envelope> {
      &mut self.queue
    }
  }

  #[test]
  fn drops_row_event_for_unknown_table_id() {
    let mut cache = TableMapCache::new();
    const INSERT_ROW_EVENT: &[u8] = b"\x00\xfc\x5a\x5d\x5d\x1e\x01\x00\x00\x00\x37\x00\x00\x00\x80\x01\x00\
                                           \x00\x00\x00\x2d\x0a\x00\x00\x00\x00\x01\x00\x02\x00\x04\xff\xf0\x04\
                                           \x00\x00\x00\x07\x00\x43\x68\x61\x72\x6c\x69\x65\x05\x00\x52\x69\x76\
                                           \x65\x72\xb5\xc0\x0f";
    let (header, event, _alg) = BinlogEventHeader::parse(INSERT_ROW_EVENT.into(), BinlogChecksumAlg::Off).unwrap();
    assert!(matches!(event, BinlogEvent::Insert(_)));
    assert!(cache.process(header, event).is_none());
  }

  #[test]
  fn injected_events_are_observed_before_the_triggering_event() {
    let mut pipeline = HandlerPipeline::new();
    let mut injector = Passthrough { queue: VecDeque::new() };
    injector
      .queue
      .push_back((sample_header(), BinlogEvent::Xid(crate::binlog::XidEvent { xid: 1 })));
    pipeline.push_handler(Box::new(injector));

    let out = pipeline.push(sample_header(), BinlogEvent::Xid(crate::binlog::XidEvent { xid: 2 }));
    assert_eq!(out.len(), 2);
    assert!(matches!(out[0].1, BinlogEvent::Xid(crate::binlog::XidEvent { xid: 1 })));
    assert!(matches!(out[1].1, BinlogEvent::Xid(crate::binlog::XidEvent { xid: 2 })));
  }

  const TABLE_MAP_EVENT: &[u8] = b"\x00\xfc\x5a\x5d\x5d\x13\x01\x00\x00\x00\x32\x00\x00\x00\x49\x01\x00\
                                        \x00\x00\x00\x2d\x0a\x00\x00\x00\x00\x01\x00\x04\x70\x65\x74\x73\x00\
                                        \x04\x63\x61\x74\x73\x00\x04\x03\x0f\x0f\x0a\x04\x58\x02\x58\x02\x00";
  const INSERT_ROW_EVENT: &[u8] = b"\x00\xfc\x5a\x5d\x5d\x1e\x01\x00\x00\x00\x37\x00\x00\x00\x80\x01\x00\
                                         \x00\x00\x00\x2d\x0a\x00\x00\x00\x00\x01\x00\x02\x00\x04\xff\xf0\x04\
                                         \x00\x00\x00\x07\x00\x43\x68\x61\x72\x6c\x69\x65\x05\x00\x52\x69\x76\
                                         \x65\x72\xb5\xc0\x0f";

  #[test]
  fn aggregates_a_transaction_into_one_synthetic_event() {
    let mut parser = TransactionParser::new();

    let begin = crate::binlog::QueryEvent {
      thread_id: 0,
      exec_time: 0,
      error_code: 0,
      schema: "pets".to_string(),
      query: "BEGIN".to_string(),
    };
    assert!(parser.process(sample_header(), BinlogEvent::Query(begin)).is_none());

    let (header, table_map, _) = BinlogEventHeader::parse(TABLE_MAP_EVENT.into(), BinlogChecksumAlg::Off).unwrap();
    assert!(parser.process(header, table_map).is_some());

    let (header, insert, _) = BinlogEventHeader::parse(INSERT_ROW_EVENT.into(), BinlogChecksumAlg::Off).unwrap();
    assert!(parser.process(header, insert).is_none());

    assert!(parser.process(sample_header(), BinlogEvent::Xid(crate::binlog::XidEvent { xid: 1 })).is_none());

    let (_, injected) = parser.injection_queue().pop_front().expect("transaction event queued at commit");
    match injected {
      BinlogEvent::Transaction(txn) => {
        assert_eq!(txn.statements.len(), 1);
        match &txn.statements[0] {
          RowStatement::Insert { table, rows } => {
            assert_eq!(table.table, "cats");
            assert_eq!(rows.len(), 1);
          }
          other => panic!("unexpected statement {:?}", other),
        }
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn passes_row_events_through_untouched_outside_a_transaction() {
    let mut parser = TransactionParser::new();
    let (header, event, _) = BinlogEventHeader::parse(INSERT_ROW_EVENT.into(), BinlogChecksumAlg::Off).unwrap();
    assert!(matches!(event, BinlogEvent::Insert(_)));
    assert!(parser.process(header, event).is_some());
  }

  #[test]
  fn rollback_discards_buffered_statements() {
    let mut parser = TransactionParser::new();
    let begin = crate::binlog::QueryEvent {
      thread_id: 0,
      exec_time: 0,
      error_code: 0,
      schema: "pets".to_string(),
      query: "BEGIN".to_string(),
    };
    parser.process(sample_header(), BinlogEvent::Query(begin));

    let (header, table_map, _) = BinlogEventHeader::parse(TABLE_MAP_EVENT.into(), BinlogChecksumAlg::Off).unwrap();
    parser.process(header, table_map);
    let (header, insert, _) = BinlogEventHeader::parse(INSERT_ROW_EVENT.into(), BinlogChecksumAlg::Off).unwrap();
    parser.process(header, insert);

    let rollback = crate::binlog::QueryEvent {
      thread_id: 0,
      exec_time: 0,
      error_code: 0,
      schema: "pets".to_string(),
      query: "ROLLBACK".to_string(),
    };
    assert!(parser.process(sample_header(), BinlogEvent::Query(rollback)).is_none());
    assert!(parser.injection_queue().pop_front().is_none());
  }
}
