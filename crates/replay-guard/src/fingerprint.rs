/// Fold a key ID and salt into a 32-bit fingerprint.
///
/// Every byte of both inputs is XORed into a 4-byte accumulator at position
/// `i % 4`, and the accumulator is read as a big-endian `u32`. Salts sharing a
/// prefix or suffix still reduce differently, and mixing in the key ID keeps
/// the same salt used under two keys apart.
///
/// This is not a secure hash. Only authenticated handshakes reach the cache,
/// so a client can only collide with its own traffic, and the sets holding
/// fingerprints use a per-process random hasher.
pub fn fingerprint(id: &str, salt: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    for (i, b) in id.bytes().enumerate() {
        buf[i & 0x3] ^= b;
    }
    for (i, b) in salt.iter().enumerate() {
        buf[i & 0x3] ^= b;
    }
    u32::from_be_bytes(buf)
}
