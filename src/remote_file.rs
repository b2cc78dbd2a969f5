use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_RANGE};
use reqwest::StatusCode;

/// Parsed `Content-Range: bytes <start>-<end>/<total>` header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: Option<u64>,
}

impl ContentRange {
    pub fn parse(value: &str) -> Option<ContentRange> {
        let rest = value.trim().strip_prefix("bytes")?.trim_start();
        let (range, total) = rest.split_once('/')?;
        let total = match total.trim() {
            "*" => None,
            total => Some(total.parse().ok()?),
        };
        let (start, end) = range.trim().split_once('-')?;
        let start: u64 = start.trim().parse().ok()?;
        let end: u64 = end.trim().parse().ok()?;
        if end < start {
            return None;
        }
        Some(ContentRange { start, end, total })
    }
}

/// What the server said about the body it is about to send.
pub struct RemoteFileInfo {
    pub status: StatusCode,
    pub content_length: Option<u64>,
    pub content_range: Option<ContentRange>,
}

impl RemoteFileInfo {
    pub fn new(status: StatusCode, head_map: &HeaderMap) -> Self {
        let mut content_length = None;
        let mut content_range = None;
        if let Some(value) = head_map.get(CONTENT_LENGTH) {
            if let Ok(value) = value.to_str() {
                content_length = value.trim().parse().ok();
            }
        }
        if let Some(value) = head_map.get(CONTENT_RANGE) {
            if let Ok(value) = value.to_str() {
                content_range = ContentRange::parse(value);
            }
        }
        Self {
            status,
            content_length,
            content_range,
        }
    }

    /// True when the server confirmed it is sending bytes from `offset` onward.
    pub fn honors_resume_from(&self, offset: u64) -> bool {
        self.status == StatusCode::PARTIAL_CONTENT
            && matches!(self.content_range, Some(range) if range.start == offset)
    }

    /// Full size of the artifact given how many bytes are already kept on disk.
    pub fn expected_total(&self, kept: u64) -> Option<u64> {
        match (self.content_length, self.content_range) {
            (Some(length), _) => Some(length + kept),
            (None, Some(range)) => range.total.or(Some(range.end + 1)),
            (None, None) => None,
        }
    }
}
