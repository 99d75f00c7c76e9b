use std::{fmt, io};

/// A binlog stream can fail two distinct ways: a transport/protocol problem
/// that ends the connection outright, or an `INCIDENT_EVENT` the primary
/// injected deliberately because it could no longer guarantee the stream was
/// complete. Callers generally want to treat the first as fatal and the
/// second as "this session is over, but nothing is broken" — keeping them
/// as separate variants lets `wait_for_next_event` convey which happened
/// instead of flattening both into an opaque `io::Error`.
#[derive(Debug)]
pub enum ReplicationError {
  /// A read, write, or decode failure. The connection should be considered
  /// dead.
  Fatal(io::Error),
  /// The primary reported a replication incident (lost events, an
  /// unsupported statement, etc). The stream ends here by design, not by
  /// accident.
  Incident { incident_type: u16, message: String },
}

impl fmt::Display for ReplicationError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ReplicationError::Fatal(err) => write!(f, "{err}"),
      ReplicationError::Incident { incident_type, message } => {
        write!(f, "replication incident {incident_type}: {message}")
      }
    }
  }
}

impl std::error::Error for ReplicationError {}

impl From<io::Error> for ReplicationError {
  fn from(err: io::Error) -> Self {
    ReplicationError::Fatal(err)
  }
}

pub type Result<T> = std::result::Result<T, ReplicationError>;
