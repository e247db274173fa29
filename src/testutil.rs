//! Shared fixtures for unit tests.

use crate::buffer::RuneReader;

/// 51-rune CJK sample with mixed-width runes, line breaks and ASCII
/// punctuation.
pub const CHINESE: &str = "左司馬販（《春秋左傳·哀公四年》 #2.2）\n當為左司馬「眅」，音「攀」上聲。 \n並非「販賣」之「販」";

/// Drain a reader into a string.
pub fn read_all(reader: &mut dyn RuneReader) -> String {
    let mut out = String::new();
    while let Some((ch, _)) = reader.read_rune() {
        out.push(ch);
    }
    out
}
