//! Decoding of river's tag bitfields.
//!
//! river describes tags as 32-bit masks where bit `n` stands for tag `n`.
//! Some events carry a single mask, `view_tags` carries one mask per view
//! packed into a wire array.

/// Number of tags a single mask can describe.
pub const MAX_TAGS: u32 = 32;

/// Returns the indices of the bits set in `mask`, ascending.
pub fn decode(mask: u32) -> Vec<u32> {
    (0..MAX_TAGS).filter(|&bit| mask & (1 << bit) != 0).collect()
}

/// Merges several masks into one ascending, de-duplicated list of indices.
pub fn decode_words<I>(words: I) -> Vec<u32>
where
    I: IntoIterator<Item = u32>,
{
    decode(words.into_iter().fold(0, |merged, word| merged | word))
}

/// Decodes a wire `array` of native-endian 32-bit masks.
///
/// A trailing partial word is ignored.
pub fn decode_array(bytes: &[u8]) -> Vec<u32> {
    decode_words(
        bytes
            .chunks_exact(4)
            .map(|chunk| u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])),
    )
}

/// Mask selecting only `tag`, or `None` when the tag does not fit in a mask.
pub fn mask_for(tag: u32) -> Option<u32> {
    1u32.checked_shl(tag)
}
