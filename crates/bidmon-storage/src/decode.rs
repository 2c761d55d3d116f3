//! Charset-aware decoding of fetched page bodies.

use encoding_rs::{Encoding, UTF_8};
use once_cell::sync::Lazy;
use regex::Regex;

static HEADER_CHARSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)charset\s*=\s*["']?([^"'\s;]+)"#).expect("header charset pattern"));

static META_CHARSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta\s+[^>]*?charset\s*=\s*["']?([^"'\s/>;]+)"#).expect("meta charset pattern")
});

const META_SCAN_BYTES: usize = 4096;

fn label_encoding(re: &Regex, haystack: &str) -> Option<&'static Encoding> {
    let label = re.captures(haystack)?.get(1)?.as_str().trim();
    Encoding::for_label(label.as_bytes())
}

// Header charset first, then <meta charset> / http-equiv in the first 4 KiB, then UTF-8.
pub(crate) fn detect_encoding(content_type: Option<&str>, body: &[u8]) -> &'static Encoding {
    if let Some(encoding) = content_type.and_then(|ct| label_encoding(&HEADER_CHARSET, ct)) {
        return encoding;
    }
    if let Some((encoding, _)) = Encoding::for_bom(body) {
        return encoding;
    }
    let head = String::from_utf8_lossy(&body[..body.len().min(META_SCAN_BYTES)]);
    label_encoding(&META_CHARSET, &head).unwrap_or(UTF_8)
}

pub(crate) fn decode_body(content_type: Option<&str>, body: &[u8]) -> String {
    let encoding = detect_encoding(content_type, body);
    let (text, _, _) = encoding.decode(body);
    text.into_owned()
}
