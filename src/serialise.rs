//! Wire encoding for GELF messages.
//!
//! TCP frames are JSON followed by a single NUL delimiter. UDP datagrams are
//! JSON, optionally gzip-compressed according to [`UdpCompression`]. Oversized
//! UDP payloads are never chunked.

use std::borrow::Cow;
use std::io::Write;

use encoding_rs::mem::decode_latin1;
use flate2::{Compression, write::GzEncoder};
use serde::{Deserialize, Serialize};

use crate::{error::GelfError, message::GelfMessage};

/// Delimiter terminating each message on a TCP stream.
pub const TCP_DELIMITER: u8 = 0;

/// Gzip level used for compressed UDP payloads.
pub const GZIP_LEVEL: u32 = 9;

/// Payload mode for UDP datagrams.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UdpCompression {
    /// Gzip the JSON body (the conventional GELF UDP encoding).
    #[default]
    Gzip,
    /// Send the JSON body uncompressed.
    None,
}

/// Decode text that may not be valid UTF-8.
///
/// Valid UTF-8 is borrowed unchanged; anything else is decoded as
/// ISO-8859-1, mapping each byte to the code point of the same value.
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => decode_latin1(bytes),
    }
}

/// Serialise the message as UTF-8 JSON.
pub fn encode_json(msg: &GelfMessage) -> Result<Vec<u8>, GelfError> {
    let mut buf = Vec::with_capacity(256);
    serde_json::to_writer(&mut buf, msg).map_err(GelfError::encoding)?;
    Ok(buf)
}

/// Frame the message for a TCP stream.
pub fn encode_tcp(msg: &GelfMessage) -> Result<Vec<u8>, GelfError> {
    let mut buf = encode_json(msg)?;
    buf.push(TCP_DELIMITER);
    Ok(buf)
}

/// Encode the message as a single UDP datagram body.
pub fn encode_udp(msg: &GelfMessage, compression: UdpCompression) -> Result<Vec<u8>, GelfError> {
    let json = encode_json(msg)?;
    match compression {
        UdpCompression::None => Ok(json),
        UdpCompression::Gzip => gzip(&json),
    }
}

fn gzip(data: &[u8]) -> Result<Vec<u8>, GelfError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::new(GZIP_LEVEL));
    encoder.write_all(data).map_err(GelfError::encoding)?;
    encoder.finish().map_err(GelfError::encoding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        log_record::GelfLogRecord,
        message::{MessageBuilder, MessageConfig},
    };
    use flate2::read::GzDecoder;
    use rstest::{fixture, rstest};
    use std::io::Read;

    #[fixture]
    fn message() -> GelfMessage {
        let builder = MessageBuilder::new(MessageConfig {
            from_host: Some("node-a".into()),
            ..Default::default()
        });
        builder
            .build(&GelfLogRecord::new("api", "INFO", "naïve café ☕").with_created(1.25))
            .expect("message builds")
    }

    #[rstest]
    fn tcp_frames_end_with_a_single_nul(message: GelfMessage) {
        let frame = encode_tcp(&message).unwrap();
        assert_eq!(frame.last(), Some(&TCP_DELIMITER));
        assert_eq!(frame.iter().filter(|b| **b == 0).count(), 1);
        let parsed: serde_json::Value = serde_json::from_slice(&frame[..frame.len() - 1]).unwrap();
        assert_eq!(parsed["short_message"], "naïve café ☕");
    }

    #[rstest]
    fn udp_gzip_payloads_carry_the_gzip_magic(message: GelfMessage) {
        let datagram = encode_udp(&message, UdpCompression::Gzip).unwrap();
        assert_eq!(&datagram[..2], &[0x1f, 0x8b]);
        let mut json = String::new();
        GzDecoder::new(datagram.as_slice())
            .read_to_string(&mut json)
            .unwrap();
        assert_eq!(json.as_bytes(), encode_json(&message).unwrap());
    }

    #[rstest]
    fn udp_raw_payloads_are_plain_json(message: GelfMessage) {
        let datagram = encode_udp(&message, UdpCompression::None).unwrap();
        assert_eq!(datagram, encode_json(&message).unwrap());
        assert!(!datagram.contains(&TCP_DELIMITER));
    }

    #[rstest]
    #[case(b"plain ascii".as_slice(), "plain ascii")]
    #[case("żółw".as_bytes(), "żółw")]
    #[case(b"caf\xe9".as_slice(), "café")]
    #[case(b"\xff\xfe".as_slice(), "ÿþ")]
    #[case(b"\x80\x9f".as_slice(), "\u{80}\u{9f}")]
    fn decode_text_falls_back_to_latin1(#[case] input: &[u8], #[case] expected: &str) {
        assert_eq!(decode_text(input), expected);
    }

    #[rstest]
    fn compression_mode_uses_snake_case_names() {
        assert_eq!(
            serde_json::from_str::<UdpCompression>("\"none\"").unwrap(),
            UdpCompression::None
        );
        assert_eq!(serde_json::to_string(&UdpCompression::Gzip).unwrap(), "\"gzip\"");
    }
}
