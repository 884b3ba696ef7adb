//! Content hashing for cache keys.
//!
//! Uses blake3 for fast cryptographic hashing; keys are truncated to 32 hex
//! chars. Collisions are not detected, only assumed impossible at this
//! width — the content-addressed cache relies on it.

/// Hex length of a cache key.
pub const KEY_LEN: usize = 32;

/// Compute a cache key over several byte slices hashed in order.
pub fn content_key(parts: &[&[u8]]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().to_hex()[..KEY_LEN].to_string()
}

/// Compute a cache key for a single value.
#[inline]
pub fn fingerprint<T: AsRef<[u8]> + ?Sized>(value: &T) -> String {
    content_key(&[value.as_ref()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_stable() {
        assert_eq!(fingerprint("body{}"), fingerprint("body{}"));
        assert_eq!(fingerprint("body{}").len(), KEY_LEN);
    }

    #[test]
    fn test_key_depends_on_every_part() {
        let a = content_key(&[b"body{}", b"1"]);
        let b = content_key(&[b"body{}", b"0"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_parts_are_order_sensitive() {
        assert_ne!(content_key(&[b"a", b"b"]), content_key(&[b"b", b"a"]));
    }
}
