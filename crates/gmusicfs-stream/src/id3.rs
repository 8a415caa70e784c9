//! ID3v1 trailer synthesized onto single-stream tracks
//!
//! The record is 128 bytes:
//!
//! | offset | size | field |
//! |-------:|-----:|-------|
//! | 0      | 3    | `TAG` |
//! | 3      | 30   | title |
//! | 33     | 30   | artist |
//! | 63     | 30   | album |
//! | 93     | 4    | year, always `"0"` then NUL |
//! | 97     | 30   | comment |
//! | 127    | 1    | genre, always 12 ("Other") |
//!
//! Text is Latin-1, truncated to the field width and padded with spaces.

/// Size of the synthesized record appended after the network bytes
pub const ID3V1_TRAILER_SIZE: usize = 128;

const MARKER: &[u8; 3] = b"TAG";
const TEXT_FIELD: usize = 30;
const YEAR: [u8; 4] = *b"0\0\0\0";

/// Genre byte. Catalog genres are free text and do not map onto the ID3v1
/// genre table.
pub const GENRE_OTHER: u8 = 12;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Id3v1Tag {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub comment: String,
}

impl Id3v1Tag {
    pub fn new(
        title: impl Into<String>,
        artist: impl Into<String>,
        album: impl Into<String>,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            album: album.into(),
            comment: comment.into(),
        }
    }

    /// Encode the 128-byte record
    pub fn to_bytes(&self) -> [u8; ID3V1_TRAILER_SIZE] {
        let mut record = [b' '; ID3V1_TRAILER_SIZE];
        record[..3].copy_from_slice(MARKER);
        put_text(&mut record[3..33], &self.title);
        put_text(&mut record[33..63], &self.artist);
        put_text(&mut record[63..93], &self.album);
        record[93..97].copy_from_slice(&YEAR);
        put_text(&mut record[97..127], &self.comment);
        record[127] = GENRE_OTHER;
        record
    }
}

/// Latin-1 encode `text` into `field`, leaving the space padding in place
fn put_text(field: &mut [u8], text: &str) {
    debug_assert_eq!(field.len(), TEXT_FIELD);
    for (slot, ch) in field.iter_mut().zip(text.chars()) {
        *slot = u8::try_from(u32::from(ch)).unwrap_or(b'?');
    }
}
