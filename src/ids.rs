//! Opaque identities for offers and quotations.
//!
//! Every identity is a SHA-256 over caller content salted with the current
//! unix time and a random nonce, so asking for the same terms twice yields
//! two different ids even within one second.

use sha2::{Digest, Sha256};
use uuid::Uuid;

const MAX_VARINT_LEN: usize = 10;

/// Zig-zag varint of `value`, zero padded to the maximum varint width.
pub fn varint_padded(value: i64) -> [u8; MAX_VARINT_LEN] {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let mut ux = (value as u64) << 1;
    if value < 0 {
        ux = !ux;
    }
    let mut i = 0;
    while ux >= 0x80 {
        buf[i] = (ux as u8) | 0x80;
        ux >>= 7;
        i += 1;
    }
    buf[i] = ux as u8;
    buf
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

fn nonce() -> [u8; 16] {
    *Uuid::new_v4().as_bytes()
}

/// `sha256(key ++ varint(now) ++ nonce)` as lowercase hex.
pub fn generate_id(key: &[u8]) -> String {
    generate_id_at(key, now_unix(), &nonce())
}

pub fn generate_id_at(key: &[u8], unix: i64, nonce: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key);
    hasher.update(varint_padded(unix));
    hasher.update(nonce);
    hex::encode(hasher.finalize())
}

/// Id of a non-binding rate quote.
pub fn rate_offer_id(fee: i64, asset_label: &str, cost: i64) -> String {
    generate_id(format!("{}:{}:{}", fee, asset_label, cost).as_bytes())
}

/// `sha256(varint(now) ++ concat(non-empty offer ids) ++ nonce)` as
/// lowercase hex.
pub fn quotation_id<'a>(offer_ids: impl IntoIterator<Item = &'a str>) -> String {
    quotation_id_at(offer_ids, now_unix(), &nonce())
}

pub fn quotation_id_at<'a>(
    offer_ids: impl IntoIterator<Item = &'a str>,
    unix: i64,
    nonce: &[u8],
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(varint_padded(unix));
    for id in offer_ids.into_iter().filter(|id| !id.is_empty()) {
        hasher.update(id.as_bytes());
    }
    hasher.update(nonce);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_zigzag_encoding() {
        assert_eq!(varint_padded(0)[..2], [0x00, 0x00]);
        assert_eq!(varint_padded(1)[..2], [0x02, 0x00]);
        assert_eq!(varint_padded(-1)[..2], [0x01, 0x00]);
        assert_eq!(varint_padded(64)[..3], [0x80, 0x01, 0x00]);
    }

    #[test]
    fn test_ids_depend_on_time_and_content() {
        let a = generate_id_at(b"15:AKISKY:2000", 1_500_000_000, b"n");
        let b = generate_id_at(b"15:AKISKY:2000", 1_500_000_001, b"n");
        let c = generate_id_at(b"15:AKISKY:2001", 1_500_000_000, b"n");
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, generate_id_at(b"15:AKISKY:2000", 1_500_000_000, b"n"));
    }

    #[test]
    fn test_same_terms_in_same_second_get_distinct_ids() {
        assert_ne!(rate_offer_id(15, "AKISKY", 2000), rate_offer_id(15, "AKISKY", 2000));
        assert_ne!(quotation_id(["aa"]), quotation_id(["aa"]));
    }

    #[test]
    fn test_quotation_id_skips_empty_offer_ids() {
        let with_empty = quotation_id_at(["aa", "", "bb"], 42, b"n");
        let without = quotation_id_at(["aa", "bb"], 42, b"n");
        assert_eq!(with_empty, without);
    }
}
