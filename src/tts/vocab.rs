//! Kokoro phoneme vocabulary.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Maximum phoneme tokens the model accepts in one pass, before padding.
pub const MAX_PHONEME_LEN: usize = 510;

const VOCAB: &[(char, i64)] = &[
    (';', 1), (':', 2), (',', 3), ('.', 4), ('!', 5), ('?', 6), ('—', 9), ('…', 10), ('"', 11),
    ('(', 12), (')', 13), ('\u{201c}', 14), ('\u{201d}', 15), (' ', 16), ('\u{0303}', 17),
    ('ʣ', 18), ('ʥ', 19), ('ʦ', 20), ('ʨ', 21), ('ᵝ', 22), ('ꭧ', 23), ('A', 24), ('I', 25),
    ('O', 31), ('Q', 33), ('S', 35), ('T', 36), ('W', 39), ('Y', 41), ('ᵊ', 42), ('a', 43),
    ('b', 44), ('c', 45), ('d', 46), ('e', 47), ('f', 48), ('h', 50), ('i', 51), ('j', 52),
    ('k', 53), ('l', 54), ('m', 55), ('n', 56), ('o', 57), ('p', 58), ('q', 59), ('r', 60),
    ('s', 61), ('t', 62), ('u', 63), ('v', 64), ('w', 65), ('x', 66), ('y', 67), ('z', 68),
    ('ɑ', 69), ('ɐ', 70), ('ɒ', 71), ('æ', 72), ('β', 75), ('ɔ', 76), ('ɕ', 77), ('ç', 78),
    ('ɖ', 80), ('ð', 81), ('ʤ', 82), ('ə', 83), ('ɚ', 85), ('ɛ', 86), ('ɜ', 87), ('ɟ', 90),
    ('ɡ', 92), ('ɥ', 99), ('ɨ', 101), ('ɪ', 102), ('ʝ', 103), ('ɯ', 110), ('ɰ', 111),
    ('ŋ', 112), ('ɳ', 113), ('ɲ', 114), ('ɴ', 115), ('ø', 116), ('ɸ', 118), ('θ', 119),
    ('œ', 120), ('ɹ', 123), ('ɾ', 125), ('ɻ', 126), ('ʁ', 128), ('ɽ', 129), ('ʂ', 130),
    ('ʃ', 131), ('ʈ', 132), ('ʧ', 133), ('ʊ', 135), ('ʋ', 136), ('ʌ', 138), ('ɣ', 139),
    ('ɤ', 140), ('χ', 142), ('ʎ', 143), ('ʒ', 147), ('ʔ', 148), ('ˈ', 156), ('ˌ', 157),
    ('ː', 158), ('ʰ', 162), ('ʲ', 164), ('↓', 169), ('→', 171), ('↗', 172), ('↘', 173),
    ('ᵻ', 177),
];

fn vocab() -> &'static HashMap<char, i64> {
    static MAP: OnceLock<HashMap<char, i64>> = OnceLock::new();
    MAP.get_or_init(|| VOCAB.iter().copied().collect())
}

/// Map IPA phonemes to token ids. Unknown symbols are dropped.
pub fn tokenize(phonemes: &str) -> Vec<i64> {
    let map = vocab();
    phonemes.chars().filter_map(|c| map.get(&c).copied()).collect()
}

/// Ids of `; : , . ! ?`, preferred places to cut a long sequence.
const BREAK_IDS: [i64; 6] = [1, 2, 3, 4, 5, 6];

/// Cut `ids` into consecutive batches of at most `MAX_PHONEME_LEN` tokens,
/// splitting after the last punctuation mark in each window when there is one.
/// No token is dropped.
pub fn batches(ids: &[i64]) -> Vec<&[i64]> {
    let mut out = Vec::new();
    let mut rest = ids;

    while rest.len() > MAX_PHONEME_LEN {
        let window = &rest[..MAX_PHONEME_LEN];
        let cut = window
            .iter()
            .rposition(|id| BREAK_IDS.contains(id))
            .map(|i| i + 1)
            .unwrap_or(MAX_PHONEME_LEN);
        let (head, tail) = rest.split_at(cut);
        out.push(head);
        rest = tail;
    }
    if !rest.is_empty() {
        out.push(rest);
    }

    if out.len() > 1 {
        tracing::debug!(tokens = ids.len(), batches = out.len(), "Phoneme sequence split");
    }
    out
}
