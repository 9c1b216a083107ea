//! Download serialization: RFC 7233 byte ranges and content types.

use crate::error::ApiError;

/// A resolved, clamped byte range (inclusive bounds).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered by the range.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Ranges are never empty once validated.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Parse a `Range` header against a file of `file_size` bytes.
///
/// Accepts `bytes=start-end`, `bytes=start-`, and `bytes=-suffix`. Bounds are
/// clamped to the file; an inverted range (or any range against an empty
/// file) is rejected.
pub fn parse_range(header: &str, file_size: u64) -> Result<ByteRange, ApiError> {
    let spec = header
        .strip_prefix("bytes=")
        .ok_or_else(|| ApiError::RangeInvalid(format!("unsupported range unit: {header}")))?;

    let (start_str, end_str) = spec
        .split_once('-')
        .ok_or_else(|| ApiError::RangeInvalid(format!("malformed range: {header}")))?;

    if file_size == 0 {
        return Err(ApiError::RangeInvalid(
            "cannot satisfy a range against an empty file".to_string(),
        ));
    }

    let (start, end) = if start_str.is_empty() {
        // bytes=-suffix: the final `suffix` bytes.
        let suffix: u64 = end_str
            .parse()
            .map_err(|_| ApiError::RangeInvalid(format!("invalid range suffix: {header}")))?;
        if suffix == 0 {
            return Err(ApiError::RangeInvalid(
                "zero-length suffix range".to_string(),
            ));
        }
        (file_size.saturating_sub(suffix), file_size - 1)
    } else if end_str.is_empty() {
        // bytes=start-: from start to the end of the file.
        let start: u64 = start_str
            .parse()
            .map_err(|_| ApiError::RangeInvalid(format!("invalid range start: {header}")))?;
        (start, file_size - 1)
    } else {
        let start: u64 = start_str
            .parse()
            .map_err(|_| ApiError::RangeInvalid(format!("invalid range start: {header}")))?;
        let end: u64 = end_str
            .parse()
            .map_err(|_| ApiError::RangeInvalid(format!("invalid range end: {header}")))?;
        (start, end)
    };

    let end = end.min(file_size - 1);
    if start > end {
        return Err(ApiError::RangeInvalid(format!(
            "start {start} past end {end}"
        )));
    }

    Ok(ByteRange { start, end })
}

/// Derive a Content-Type from the file extension.
pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "m3u8" => "application/vnd.apple.mpegurl",
        "ts" => "video/mp2t",
        "mp3" => "audio/mpeg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_range() {
        let range = parse_range("bytes=1048576-2097151", 12 * 1024 * 1024).unwrap();
        assert_eq!(range.start, 1_048_576);
        assert_eq!(range.end, 2_097_151);
        assert_eq!(range.len(), 1_048_576);
    }

    #[test]
    fn test_open_range() {
        let range = parse_range("bytes=10-", 100).unwrap();
        assert_eq!(range, ByteRange { start: 10, end: 99 });
    }

    #[test]
    fn test_suffix_range() {
        let range = parse_range("bytes=-25", 100).unwrap();
        assert_eq!(range, ByteRange { start: 75, end: 99 });
        // A suffix larger than the file covers the whole file.
        let range = parse_range("bytes=-500", 100).unwrap();
        assert_eq!(range, ByteRange { start: 0, end: 99 });
    }

    #[test]
    fn test_end_clamped_to_size() {
        let range = parse_range("bytes=90-500", 100).unwrap();
        assert_eq!(range, ByteRange { start: 90, end: 99 });
    }

    #[test]
    fn test_inverted_range_rejected() {
        assert!(parse_range("bytes=50-10", 100).is_err());
    }

    #[test]
    fn test_start_past_eof_rejected() {
        assert!(parse_range("bytes=100-", 100).is_err());
        assert!(parse_range("bytes=200-300", 100).is_err());
    }

    #[test]
    fn test_malformed_rejected() {
        assert!(parse_range("bites=0-1", 100).is_err());
        assert!(parse_range("bytes=abc-def", 100).is_err());
        assert!(parse_range("bytes=", 100).is_err());
        assert!(parse_range("bytes=-", 100).is_err());
    }

    #[test]
    fn test_empty_file_rejected() {
        assert!(parse_range("bytes=0-0", 0).is_err());
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("movie.mp4"), "video/mp4");
        assert_eq!(content_type_for("MOVIE.MKV"), "video/x-matroska");
        assert_eq!(content_type_for("clip.webm"), "video/webm");
        assert_eq!(content_type_for("clip.mov"), "video/quicktime");
        assert_eq!(content_type_for("old.avi"), "video/x-msvideo");
        assert_eq!(content_type_for("live.m3u8"), "application/vnd.apple.mpegurl");
        assert_eq!(content_type_for("seg.ts"), "video/mp2t");
        assert_eq!(content_type_for("song.mp3"), "audio/mpeg");
        assert_eq!(content_type_for("archive.bin"), "application/octet-stream");
        assert_eq!(content_type_for("noextension"), "application/octet-stream");
    }
}
