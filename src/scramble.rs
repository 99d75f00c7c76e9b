use sha1::{Digest, Sha1};

/// Computes the `mysql_native_password` auth response: `SHA1(password) XOR
/// SHA1(nonce || SHA1(SHA1(password)))`. An empty password yields an empty
/// reply, per protocol.
pub fn scramble_native_password(nonce: &[u8], password: &str) -> Vec<u8> {
  if password.is_empty() {
    return Vec::new();
  }

  let s1 = Sha1::digest(password.as_bytes());
  let s2 = Sha1::digest(s1);

  let mut hasher = Sha1::new();
  hasher.update(nonce);
  hasher.update(s2);
  let s3 = hasher.finalize();

  s1.iter().zip(s3.iter()).map(|(a, b)| a ^ b).collect()
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn empty_password_yields_empty_reply() {
    assert!(scramble_native_password(b"some-20-byte-nonce!!", "").is_empty());
  }

  #[test]
  fn matches_manual_xor() {
    let nonce = b"01234567890123456789";
    let reply = scramble_native_password(nonce, "p");

    let s1 = Sha1::digest(b"p");
    let s2 = Sha1::digest(s1);
    let mut hasher = Sha1::new();
    hasher.update(nonce);
    hasher.update(s2);
    let s3 = hasher.finalize();
    let expected: Vec<u8> = s1.iter().zip(s3.iter()).map(|(a, b)| a ^ b).collect();

    assert_eq!(reply, expected);
  }
}
