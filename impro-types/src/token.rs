//! Chord token codec: pitch sets <-> the text tokens fed to the pitch chain.
//!
//! A token is each decimal pitch followed by `-`, e.g. `60-64-67-`.
//! The empty chord is the sentinel `"0"`, which is also what an empty
//! chain hands back when sampled.

use std::fmt::Write;

use crate::music::MAX_PITCH;

/// Token standing for "no pitches".
pub const EMPTY_CHORD_TOKEN: &str = "0";

const SEPARATOR: char = '-';

/// Encode pitches into a fresh token.
pub fn encode_token(pitches: &[u8]) -> String {
    let mut token = String::with_capacity(pitches.len() * 4);
    encode_token_into(pitches, &mut token);
    token
}

/// Encode into a reusable buffer (cleared first).
pub fn encode_token_into(pitches: &[u8], token: &mut String) {
    token.clear();
    for pitch in pitches {
        // Writing into a String cannot fail
        let _ = write!(token, "{}{}", pitch, SEPARATOR);
    }
}

/// Decode a token into a fresh pitch list.
pub fn decode_token(token: &str) -> Vec<u8> {
    let mut pitches = Vec::new();
    decode_token_into(token, &mut pitches);
    pitches
}

/// Decode into a reusable buffer (cleared first).
///
/// Returns the number of fragments that were skipped because they were not
/// a pitch in 0..=127.
pub fn decode_token_into(token: &str, pitches: &mut Vec<u8>) -> usize {
    pitches.clear();
    if token == EMPTY_CHORD_TOKEN {
        return 0;
    }
    let mut skipped = 0;
    for fragment in token.split(SEPARATOR).filter(|f| !f.is_empty()) {
        match fragment.trim().parse::<u8>() {
            Ok(pitch) if pitch <= MAX_PITCH => pitches.push(pitch),
            _ => skipped += 1,
        }
    }
    skipped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_has_trailing_separator() {
        assert_eq!(encode_token(&[60, 64, 67]), "60-64-67-");
        assert_eq!(encode_token(&[0]), "0-");
    }

    #[test]
    fn decode_sentinel_is_empty() {
        assert!(decode_token(EMPTY_CHORD_TOKEN).is_empty());
    }

    #[test]
    fn round_trip_ordered_sequences() {
        let cases: [&[u8]; 5] = [&[60], &[0], &[127, 3, 64], &[48, 52, 55, 59, 62], &[12, 0]];
        for pitches in cases {
            assert_eq!(decode_token(&encode_token(pitches)), pitches.to_vec());
        }
    }

    #[test]
    fn decode_discards_empty_fragments() {
        assert_eq!(decode_token("60--64-"), vec![60, 64]);
        assert_eq!(decode_token("-72"), vec![72]);
    }

    #[test]
    fn decode_skips_malformed_fragments() {
        let mut pitches = Vec::new();
        let skipped = decode_token_into("60-abc-200-67-", &mut pitches);
        assert_eq!(pitches, vec![60, 67]);
        assert_eq!(skipped, 2);
    }

    #[test]
    fn into_variants_reuse_buffers() {
        let mut token = String::from("stale");
        encode_token_into(&[1, 2], &mut token);
        assert_eq!(token, "1-2-");

        let mut pitches = vec![99, 98];
        decode_token_into("5-", &mut pitches);
        assert_eq!(pitches, vec![5]);
    }
}
