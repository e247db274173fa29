//! Rune/UTF-8 utilities: boundary finding, bounded decode, conversions.
//!
//! This module is the only place in the crate that performs UTF-8
//! lookahead. Every higher layer hands it a bounded slice and works with
//! the rune counts and byte offsets it reports.

use crate::error::{BufferError, Result};

/// Maximum number of bytes a single rune can occupy in UTF-8.
pub const MAX_RUNE_WIDTH: usize = 4;

/// True when `byte` begins a UTF-8 sequence (it is not a continuation
/// byte).
#[inline]
pub const fn is_rune_start(byte: u8) -> bool {
    byte & 0xC0 != 0x80
}

/// Find the index of the first byte within `text` that begins a UTF-8
/// sequence.
///
/// Scans forward by default; with `reverse` set, scans from the end of the
/// slice and reports the last sequence start instead.
///
/// # Errors
///
/// Returns [`BufferError::InvalidEncoding`] when the slice holds no
/// sequence start at all (it is empty or made of continuation bytes only).
pub fn rune_start(text: &[u8], reverse: bool) -> Result<usize> {
    let found = if reverse {
        text.iter().rposition(|&b| is_rune_start(b))
    } else {
        text.iter().position(|&b| is_rune_start(b))
    };
    found.ok_or(BufferError::InvalidEncoding)
}

/// Decode the first rune in `text`, reporting the rune and its width in
/// bytes.
///
/// # Errors
///
/// Returns [`BufferError::InvalidEncoding`] when `text` is empty or does
/// not begin with a well-formed sequence.
pub fn decode_rune(text: &[u8]) -> Result<(char, usize)> {
    let first = *text.first().ok_or(BufferError::InvalidEncoding)?;
    let width = match first {
        0x00..=0x7F => 1,
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => return Err(BufferError::InvalidEncoding),
    };
    let seq = text.get(..width).ok_or(BufferError::InvalidEncoding)?;
    let decoded = std::str::from_utf8(seq).map_err(|_| BufferError::InvalidEncoding)?;
    decoded
        .chars()
        .next()
        .map(|ch| (ch, width))
        .ok_or(BufferError::InvalidEncoding)
}

/// Decode up to `n` runes from the start of `text`, appending them in
/// order to `out`.
///
/// Returns `(runes_decoded, bytes_consumed)`. Stops early at the end of
/// input.
///
/// # Errors
///
/// Returns [`BufferError::InvalidEncoding`] on a malformed sequence;
/// `out` may hold the runes decoded before the malformed one.
pub fn decode_n(text: &[u8], n: usize, out: &mut Vec<char>) -> Result<(usize, usize)> {
    let (mut count, mut consumed) = (0, 0);
    while count < n && consumed < text.len() {
        let (ch, width) = decode_rune(&text[consumed..])?;
        out.push(ch);
        consumed += width;
        count += 1;
    }
    Ok((count, consumed))
}

/// Convert a full byte slice to its rune image.
///
/// # Errors
///
/// Returns [`BufferError::InvalidEncoding`] on malformed input.
pub fn bytes_to_runes(text: &[u8]) -> Result<Vec<char>> {
    let decoded = std::str::from_utf8(text).map_err(|_| BufferError::InvalidEncoding)?;
    Ok(decoded.chars().collect())
}

/// Convert a rune slice to its UTF-8 byte image.
pub fn runes_to_bytes(runes: &[char]) -> Vec<u8> {
    runes.iter().collect::<String>().into_bytes()
}

/// Byte offsets of every rune start in `text`, in order.
pub fn rune_positions(text: &[u8]) -> Vec<usize> {
    text.iter()
        .enumerate()
        .filter_map(|(i, &b)| is_rune_start(b).then_some(i))
        .collect()
}

/// Count the runes in a well-formed byte slice.
#[inline]
pub fn rune_count(text: &[u8]) -> usize {
    text.iter().filter(|&&b| is_rune_start(b)).count()
}

/// Map the rune offset `pos` within well-formed `text` to its byte
/// offset. `pos` equal to the rune count maps to `text.len()`.
///
/// # Errors
///
/// Returns [`BufferError::IndexOutOfBound`] when `pos` exceeds the rune
/// count.
pub fn byte_offset(text: &[u8], pos: usize) -> Result<usize> {
    if pos == 0 {
        return Ok(0);
    }
    let mut seen = 0;
    for (i, &b) in text.iter().enumerate() {
        if is_rune_start(b) {
            if seen == pos {
                return Ok(i);
            }
            seen += 1;
        }
    }
    if seen == pos {
        Ok(text.len())
    } else {
        Err(BufferError::IndexOutOfBound)
    }
}

/// Map `n` runes starting at rune offset `pos` within well-formed `text`
/// to the byte range they occupy.
///
/// # Errors
///
/// Returns [`BufferError::IndexOutOfBound`] when fewer than `pos + n`
/// runes are available.
pub fn byte_span(text: &[u8], pos: usize, n: usize) -> Result<std::ops::Range<usize>> {
    let start = byte_offset(text, pos)?;
    let end = start + byte_offset(&text[start..], n)?;
    Ok(start..end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::CHINESE;

    #[test]
    fn test_rune_start_forward_covers_sample() {
        let text = CHINESE.as_bytes();
        let mut offs = Vec::new();
        let mut i = 0;
        while i < text.len() {
            let Ok(n) = rune_start(&text[i..], false) else {
                break;
            };
            offs.push(i + n);
            i += n + 1;
        }
        let runes: Vec<char> = offs
            .iter()
            .map(|&off| decode_rune(&text[off..]).unwrap().0)
            .collect();
        assert_eq!(runes.iter().collect::<String>(), CHINESE);
    }

    #[test]
    fn test_rune_start_reverse_covers_sample() {
        let text = CHINESE.as_bytes();
        let mut offs = Vec::new();
        let mut n = text.len();
        while n > 0 {
            let at = rune_start(&text[..n], true).unwrap();
            offs.push(at);
            n = at;
        }
        offs.reverse();
        let runes: Vec<char> = offs
            .iter()
            .map(|&off| decode_rune(&text[off..]).unwrap().0)
            .collect();
        assert_eq!(runes.iter().collect::<String>(), CHINESE);
    }

    #[test]
    fn test_rune_start_rejects_continuation_only() {
        // trailing bytes of a 3-byte sequence
        let text = &"道".as_bytes()[1..];
        assert_eq!(rune_start(text, false), Err(BufferError::InvalidEncoding));
        assert_eq!(rune_start(&[], true), Err(BufferError::InvalidEncoding));
    }

    #[test]
    fn test_decode_n_full_sample() {
        let text = CHINESE.as_bytes();
        let total = CHINESE.chars().count();
        let mut out = Vec::new();
        let (count, consumed) = decode_n(text, total, &mut out).unwrap();
        assert_eq!(count, total);
        assert_eq!(consumed, text.len());
        assert_eq!(out.iter().collect::<String>(), CHINESE);
    }

    #[test]
    fn test_decode_n_stops_at_bound() {
        let mut out = Vec::new();
        let (count, consumed) = decode_n("héllo".as_bytes(), 2, &mut out).unwrap();
        assert_eq!(count, 2);
        assert_eq!(consumed, 3); // 'h' + two-byte 'é'
        assert_eq!(out, vec!['h', 'é']);
    }

    #[test]
    fn test_decode_n_stops_at_end_of_input() {
        let mut out = Vec::new();
        let (count, consumed) = decode_n(b"ab", 10, &mut out).unwrap();
        assert_eq!((count, consumed), (2, 2));
    }

    #[test]
    fn test_decode_rune_rejects_malformed() {
        assert_eq!(decode_rune(&[0xFF]), Err(BufferError::InvalidEncoding));
        assert_eq!(decode_rune(&[0xE4, 0x20]), Err(BufferError::InvalidEncoding));
        assert_eq!(decode_rune(&[]), Err(BufferError::InvalidEncoding));
    }

    #[test]
    fn test_bytes_to_runes_round_trip() {
        let runes = bytes_to_runes(CHINESE.as_bytes()).unwrap();
        assert_eq!(runes_to_bytes(&runes), CHINESE.as_bytes());
    }

    #[test]
    fn test_bytes_to_runes_rejects_malformed() {
        let mut text = CHINESE.as_bytes().to_vec();
        text.truncate(text.len() - 1); // cut inside the final rune
        assert_eq!(bytes_to_runes(&text), Err(BufferError::InvalidEncoding));
    }

    #[test]
    fn test_rune_positions_counts_sample() {
        assert_eq!(rune_positions(CHINESE.as_bytes()).len(), 51);
        assert_eq!(rune_count(CHINESE.as_bytes()), 51);
    }

    #[test]
    fn test_byte_offset_boundaries() {
        let text = CHINESE.as_bytes();
        assert_eq!(byte_offset(text, 0).unwrap(), 0);
        assert_eq!(byte_offset(text, 51).unwrap(), text.len());
        assert_eq!(byte_offset(text, 52), Err(BufferError::IndexOutOfBound));
        for (i, off) in rune_positions(text).into_iter().enumerate() {
            assert_eq!(byte_offset(text, i).unwrap(), off);
        }
    }

    #[test]
    fn test_byte_span_maps_runes() {
        let text = "a道b".as_bytes();
        assert_eq!(byte_span(text, 0, 3).unwrap(), 0..5);
        assert_eq!(byte_span(text, 1, 1).unwrap(), 1..4);
        assert_eq!(byte_span(text, 1, 3), Err(BufferError::IndexOutOfBound));
    }
}
