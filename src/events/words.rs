//! Raw log decoding helpers
//!
//! Manager trade events are not decoded through the ABI: the body is split
//! into 32-byte words and read by position, because the layout differs
//! between manager generations.

use alloy::primitives::{Address, B256, U256};

pub const WORD: usize = 32;

/// Split event data into whole 32-byte words; a trailing partial word is dropped
pub fn split_words(data: &[u8]) -> Vec<U256> {
    data.chunks_exact(WORD).map(U256::from_be_slice).collect()
}

/// Right-most 20 bytes of a word
pub fn word_to_address(word: &U256) -> Address {
    let bytes: [u8; WORD] = word.to_be_bytes();
    Address::from_slice(&bytes[12..])
}

/// Right-most 20 bytes of an indexed topic
pub fn topic_to_address(topic: &B256) -> Address {
    Address::from_slice(&topic[12..])
}

/// Single-word value (Transfer amount); `None` for anything but exactly one word
pub fn single_word(data: &[u8]) -> Option<U256> {
    if data.len() != WORD {
        return None;
    }
    Some(U256::from_be_slice(data))
}

#[cfg(test)]
pub(crate) fn address_word(addr: Address) -> [u8; WORD] {
    let mut out = [0u8; WORD];
    out[12..].copy_from_slice(addr.as_slice());
    out
}

#[cfg(test)]
pub(crate) fn encode_words(words: &[U256]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_be_bytes::<WORD>()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_drops_partial_word() {
        let mut data = encode_words(&[U256::from(1), U256::from(2)]);
        data.extend_from_slice(&[0xff; 7]);
        let words = split_words(&data);
        assert_eq!(words, vec![U256::from(1), U256::from(2)]);
    }

    #[test]
    fn test_address_round_trip() {
        let addr = Address::repeat_byte(0xab);
        let word = U256::from_be_bytes(address_word(addr));
        assert_eq!(word_to_address(&word), addr);
        assert_eq!(topic_to_address(&B256::from(address_word(addr))), addr);
    }

    #[test]
    fn test_single_word() {
        assert_eq!(single_word(&encode_words(&[U256::from(42)])), Some(U256::from(42)));
        assert_eq!(single_word(&[]), None);
        assert_eq!(single_word(&encode_words(&[U256::from(1), U256::from(2)])), None);
    }
}
