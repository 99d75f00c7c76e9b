use std::fmt::{self, Debug};

/// Renders a packet payload as a Rust byte-string literal in trace logs,
/// instead of the multi-line `[0, 1, 2, ...]` `Vec<u8>` default.
pub struct DebugBytesRef<'a>(pub &'a [u8]);

impl Debug for DebugBytesRef<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "b\"")?;
    for &b in self.0 {
      // https://doc.rust-lang.org/reference/tokens.html#byte-escapes
      match b {
        b'\n' => write!(f, "\\n")?,
        b'\r' => write!(f, "\\r")?,
        b'\t' => write!(f, "\\t")?,
        b'\\' | b'"' => write!(f, "\\{}", b as char)?,
        b'\0' => write!(f, "\\0")?,
        0x20..=0x7e => write!(f, "{}", b as char)?,
        _ => write!(f, "\\x{:02x}", b)?,
      }
    }
    write!(f, "\"")?;
    Ok(())
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn escapes_control_and_non_ascii_bytes() {
    let rendered = format!("{:?}", DebugBytesRef(b"ok\n\x00\xff"));
    assert_eq!(rendered, "b\"ok\\n\\0\\xff\"");
  }

  #[test]
  fn leaves_printable_ascii_untouched() {
    let rendered = format!("{:?}", DebugBytesRef(b"hello world"));
    assert_eq!(rendered, "b\"hello world\"");
  }
}
