//! Data URIs and `<img>` markup for memory-backed images.

use crate::blob::encode_base64;
use crate::detect::ImageFormat;
use once_cell::sync::Lazy;
use regex::Regex;

/// Line length of wrapped base64 in data URIs.
const LINE_LENGTH: usize = 76;

/// Filename stem in front of a short alphanumeric extension.
static FILENAME_STEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([^/]*)\.[a-zA-Z0-9]{1,6}$").expect("filename stem pattern is valid"));

/// Build `data:image/<format>;base64,<payload>`.
///
/// The payload is split into 76 character lines, each terminated by CRLF.
pub fn data_uri(format: ImageFormat, data: &[u8]) -> String {
    format!("data:{};base64,{}", format.mime_type(), wrap_lines(&encode_base64(data)))
}

fn wrap_lines(encoded: &str) -> String {
    let mut wrapped = String::with_capacity(encoded.len() + (encoded.len() / LINE_LENGTH + 1) * 2);
    for (i, c) in encoded.chars().enumerate() {
        if i > 0 && i % LINE_LENGTH == 0 {
            wrapped.push_str("\r\n");
        }
        wrapped.push(c);
    }
    if !encoded.is_empty() {
        wrapped.push_str("\r\n");
    }
    wrapped
}

/// Alt text: the title when set, otherwise the filename without directory
/// and extension, otherwise the filename as is.
pub fn alt_text(title: &str, filename: &str) -> String {
    if !title.is_empty() {
        return title.to_string();
    }
    FILENAME_STEM
        .captures(filename)
        .and_then(|caps| caps.get(1))
        .map(|stem| stem.as_str().to_string())
        .unwrap_or_else(|| filename.to_string())
}

/// Escape a value for use inside a double-quoted attribute.
pub fn escape_attribute(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '"' => output.push_str("&quot;"),
            '\'' => output.push_str("&#039;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            _ => output.push(c),
        }
    }
    output
}

/// `<img src="..." alt="..." />` with an escaped alt attribute.
pub fn img_tag(src: &str, alt: &str) -> String {
    format!("<img src=\"{}\" alt=\"{}\" />", src, escape_attribute(alt))
}
