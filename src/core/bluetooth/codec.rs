//! Frame codec for the message characteristic
//! A frame is the raw UTF-8 of the message text. There is no length prefix and
//! no checksum; the negotiated ATT payload size is left to the radio stack.

use std::borrow::Cow;

/// Result of decoding one characteristic value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub text: String,
    /// True when invalid UTF-8 was replaced with U+FFFD
    pub lossy: bool,
}

/// Converts message text to the bytes placed in the characteristic value
pub fn encode(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}

/// Reconstructs text from a characteristic value, replacing invalid sequences
pub fn decode(value: &[u8]) -> String {
    decode_frame(value).text
}

/// Like [`decode`], but also reports whether any bytes had to be replaced
pub fn decode_frame(value: &[u8]) -> DecodedFrame {
    match String::from_utf8_lossy(value) {
        Cow::Borrowed(text) => DecodedFrame {
            text: text.to_owned(),
            lossy: false,
        },
        Cow::Owned(text) => DecodedFrame { text, lossy: true },
    }
}
