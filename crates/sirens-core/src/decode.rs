//! Payload decoding: charset detection, HTML parsing, gzip.

use std::io::Read;

use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use flate2::read::GzDecoder;
use scraper::Html;

use crate::error::AppError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Guess the character encoding of a raw body.
pub fn detect_encoding(content: &[u8]) -> &'static Encoding {
    let mut detector = EncodingDetector::new();
    detector.feed(content, true);
    detector.guess(None, true)
}

/// Decode a raw body with the detected encoding and parse it as HTML.
///
/// A BOM, when present, overrides the guess.
pub fn decode_html(content: &[u8]) -> Result<Html, AppError> {
    let encoding = detect_encoding(content);
    let (text, actual, had_errors) = encoding.decode(content);
    if had_errors {
        return Err(AppError::DecodeError(format!(
            "body is not valid {}",
            actual.name()
        )));
    }
    if text.trim().is_empty() {
        return Err(AppError::DecodeError("document is empty".into()));
    }
    tracing::trace!(encoding = actual.name(), bytes = content.len(), "Decoded document");
    Ok(Html::parse_document(&text))
}

/// Decompress a gzip body. Bodies without the gzip magic are returned as-is,
/// since transports commonly undo `Content-Encoding: gzip` already.
pub fn gunzip(content: &[u8]) -> Result<Vec<u8>, AppError> {
    if !content.starts_with(&GZIP_MAGIC) {
        return Ok(content.to_vec());
    }
    let mut out = Vec::new();
    GzDecoder::new(content)
        .read_to_end(&mut out)
        .map_err(|e| AppError::DecodeError(format!("invalid gzip payload: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::fixtures::gzip;

    #[test]
    fn detects_utf8() {
        let body = "<p>Grüße aus Köln, ça va? Ñandú</p>".as_bytes();
        assert_eq!(detect_encoding(body), encoding_rs::UTF_8);
    }

    #[test]
    fn decodes_legacy_encoding() {
        // "café crème" in windows-1252
        let body = b"<html><body><p>caf\xe9 cr\xe8me</p></body></html>";
        let doc = decode_html(body).unwrap();
        let sel = scraper::Selector::parse("p").unwrap();
        let text: String = doc.select(&sel).next().unwrap().text().collect();
        assert!(text.starts_with("café"), "unexpected decode: {text}");
    }

    #[test]
    fn empty_document_fails() {
        assert!(matches!(
            decode_html(b"   \n "),
            Err(AppError::DecodeError(_))
        ));
    }

    #[test]
    fn gunzip_roundtrip_and_passthrough() {
        let raw = b"<urlset/>".to_vec();
        assert_eq!(gunzip(&gzip(&raw)).unwrap(), raw);
        assert_eq!(gunzip(&raw).unwrap(), raw);
    }

    #[test]
    fn gunzip_truncated_fails() {
        let mut compressed = gzip(b"<urlset><url><loc>http://a.example</loc></url></urlset>");
        compressed.truncate(12);
        assert!(matches!(gunzip(&compressed), Err(AppError::DecodeError(_))));
    }
}
