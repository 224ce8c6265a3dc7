/// Hash a sequence of fields into a short hex token.
///
/// Fields are length-prefixed so `["ab", "c"]` and `["a", "bc"]` differ.
/// The result is the first `len` hex characters of the BLAKE3 digest.
#[must_use]
pub fn short_token(fields: &[&[u8]], len: usize) -> String {
    let mut hasher = blake3::Hasher::new();
    for field in fields {
        hasher.update(&(field.len() as u64).to_le_bytes());
        hasher.update(field);
    }
    let hex = hasher.finalize().to_hex();
    hex[..len.min(hex.len())].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_token_is_field_delimited() {
        let split_late: [&[u8]; 2] = [b"ab", b"c"];
        let split_early: [&[u8]; 2] = [b"a", b"bc"];
        let a = short_token(&split_late, 16);
        assert_eq!(a.len(), 16);
        assert_ne!(a, short_token(&split_early, 16));
        assert_eq!(a, short_token(&split_late, 16));
    }
}
