use crate::library_store::CoverImage;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

// FB2 payloads are MIME-style: wrapped lines, padding not always present
const FB2_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

lazy_static! {
    static ref COVERPAGE_RE: Regex =
        Regex::new(r"(?s)<(?:\w+:)?coverpage\b[^>]*>(.*?)</(?:\w+:)?coverpage>").unwrap();
    static ref COVER_HREF_RE: Regex =
        Regex::new(r#"<(?:\w+:)?image\b[^>]*?(?:\w+:)?href\s*=\s*["']#([^"']+)["']"#).unwrap();
    static ref BINARY_RE: Regex =
        Regex::new(r"(?s)<(?:\w+:)?binary\b([^>]*)>(.*?)</(?:\w+:)?binary>").unwrap();
    static ref ID_ATTR_RE: Regex = Regex::new(r#"\bid\s*=\s*["']([^"']+)["']"#).unwrap();
}

/// Pulls the cover image out of an FB2 document.
///
/// Picks the `<binary>` that `<coverpage>` points at, falling back to the
/// first binary that decodes. `None` when the document carries no usable
/// binary at all.
pub fn extract_cover(document: &[u8]) -> Option<CoverImage> {
    let text = String::from_utf8_lossy(document);

    let cover_id = COVERPAGE_RE
        .captures(&text)
        .and_then(|coverpage| COVER_HREF_RE.captures(coverpage.get(1)?.as_str()))
        .and_then(|href| href.get(1))
        .map(|id| id.as_str().to_string());

    let mut first_decoded = None;
    for binary in BINARY_RE.captures_iter(&text) {
        let attributes = binary.get(1).map_or("", |m| m.as_str());
        let payload = binary.get(2).map_or("", |m| m.as_str());
        let id = ID_ATTR_RE
            .captures(attributes)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str());

        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            continue;
        }
        let bytes = match FB2_BASE64.decode(compact.as_bytes()) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Skipping binary {:?}: invalid base64 ({})", id, e);
                continue;
            }
        };

        if cover_id.is_some() && id == cover_id.as_deref() {
            return Some(CoverImage::new(bytes));
        }
        if first_decoded.is_none() {
            first_decoded = Some(bytes);
        }
    }

    first_decoded.map(CoverImage::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;

    fn document(coverpage: &str, binaries: &[(&str, &str)]) -> Vec<u8> {
        let mut doc = String::from(
            r#"<?xml version="1.0" encoding="utf-8"?>
<FictionBook xmlns="http://www.gribuser.ru/xml/fictionbook/2.0" xmlns:l="http://www.w3.org/1999/xlink">
<description><title-info><book-title>Test</book-title>"#,
        );
        doc.push_str(coverpage);
        doc.push_str("</title-info></description><body><p>Text</p></body>\n");
        for (id, bytes) in binaries {
            let encoded = STANDARD.encode(bytes.as_bytes());
            // Wrap like real files do
            let wrapped = encoded
                .as_bytes()
                .chunks(16)
                .map(|chunk| std::str::from_utf8(chunk).unwrap())
                .collect::<Vec<_>>()
                .join("\n");
            doc.push_str(&format!(
                "<binary id=\"{}\" content-type=\"image/jpeg\">\n{}\n</binary>\n",
                id, wrapped
            ));
        }
        doc.push_str("</FictionBook>");
        doc.into_bytes()
    }

    #[test]
    fn test_extracts_referenced_cover() {
        let doc = document(
            r##"<coverpage><l:image l:href="#cover.jpg"/></coverpage>"##,
            &[("illustration.png", "not the cover"), ("cover.jpg", "the cover bytes")],
        );
        let cover = extract_cover(&doc).unwrap();
        assert_eq!(cover.bytes(), b"the cover bytes");
    }

    #[test]
    fn test_falls_back_to_first_binary() {
        let doc = document("", &[("a.jpg", "first"), ("b.jpg", "second")]);
        assert_eq!(extract_cover(&doc).unwrap().bytes(), b"first");

        // Reference to a binary that does not exist
        let doc = document(
            r##"<coverpage><image xlink:href="#missing.jpg"/></coverpage>"##,
            &[("a.jpg", "first")],
        );
        assert_eq!(extract_cover(&doc).unwrap().bytes(), b"first");
    }

    #[test]
    fn test_skips_undecodable_binary() {
        let mut doc = String::from_utf8(document("", &[("good.jpg", "good")])).unwrap();
        doc = doc.replace(
            "<binary id=\"good.jpg\"",
            "<binary id=\"bad.jpg\">!!!not base64!!!</binary><binary id=\"good.jpg\"",
        );
        assert_eq!(extract_cover(doc.as_bytes()).unwrap().bytes(), b"good");
    }

    #[test]
    fn test_no_binaries() {
        let doc = document("", &[]);
        assert!(extract_cover(&doc).is_none());
        assert!(extract_cover(b"\xff\xfe not even xml").is_none());
    }
}
