//! Minimal S3 XML codec.
//!
//! The multipart protocol exchanges three small XML documents. The shapes
//! are fixed and flat, so extraction works on tag boundaries rather than a
//! full XML parser; malformed input surfaces as a protocol error.

use crate::error::{StorageError, StorageResult};
use crate::traits::PartInfo;
use wharf_core::CompletedPart;

/// Extract the text content of the first `<tag>...</tag>` in `xml`.
fn text_between<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(&xml[start..end])
}

/// Parse an `InitiateMultipartUploadResult`, returning the upload ID.
pub fn parse_initiate(xml: &str) -> StorageResult<String> {
    text_between(xml, "UploadId")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            StorageError::Protocol("initiate response is missing UploadId".to_string())
        })
}

/// Parse a `ListPartsResult` into part records.
pub fn parse_list_parts(xml: &str) -> StorageResult<Vec<PartInfo>> {
    let mut parts = Vec::new();

    for fragment in xml.split("<Part>").skip(1) {
        let part_xml = fragment.split("</Part>").next().ok_or_else(|| {
            StorageError::Protocol("unterminated Part element in list-parts response".to_string())
        })?;

        let part_number = text_between(part_xml, "PartNumber")
            .and_then(|s| s.trim().parse::<u32>().ok())
            .ok_or_else(|| {
                StorageError::Protocol("Part is missing a numeric PartNumber".to_string())
            })?;

        let etag = text_between(part_xml, "ETag")
            .map(|s| s.trim().to_string())
            .ok_or_else(|| StorageError::Protocol("Part is missing an ETag".to_string()))?;

        let size = text_between(part_xml, "Size")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .unwrap_or(0);

        parts.push(PartInfo { part_number, etag, size });
    }

    Ok(parts)
}

/// Build the `CompleteMultipartUpload` request body.
///
/// Callers pass parts sorted ascending by number. The document omits the
/// 2006-03-01 namespace; some strict backends want it, the targets this
/// registry runs against do not.
pub fn build_complete_body(parts: &[CompletedPart]) -> String {
    let mut body = String::from("<CompleteMultipartUpload>");
    for part in parts {
        body.push_str(&format!(
            "<Part><PartNumber>{}</PartNumber><ETag>{}</ETag></Part>",
            part.part_number, part.etag
        ));
    }
    body.push_str("</CompleteMultipartUpload>");
    body
}
