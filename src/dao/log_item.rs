/// A single log line plus the source it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogItem {
    pub pod: String,
    pub container: String,
    pub single_container: bool,
    pub is_error: bool,
    pub bytes: Vec<u8>,
}

impl LogItem {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Renders the line for display.
    ///
    /// Lines are fetched with server timestamps; the leading timestamp is
    /// dropped unless `show_timestamp` is set. Entries from multi-container
    /// sessions are prefixed with their pod and container.
    pub fn render(&self, show_timestamp: bool) -> String {
        let raw = String::from_utf8_lossy(&self.bytes);
        let raw = raw.trim_end_matches(['\r', '\n']);
        let body = if show_timestamp {
            raw
        } else {
            strip_timestamp(raw)
        };

        let mut out = String::with_capacity(body.len() + 32);
        if !self.pod.is_empty() {
            out.push_str(&self.pod);
            out.push(' ');
        }
        if !self.single_container && !self.container.is_empty() {
            out.push_str(&self.container);
            out.push(' ');
        }
        out.push_str(body);
        out
    }
}

fn strip_timestamp(line: &str) -> &str {
    match line.split_once(' ') {
        Some((head, rest)) if looks_like_timestamp(head) => rest,
        _ => line,
    }
}

fn looks_like_timestamp(token: &str) -> bool {
    let bytes = token.as_bytes();
    bytes.len() >= 20
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'-'
        && bytes[10] == b'T'
        && (token.ends_with('Z') || bytes[19..].iter().any(|b| matches!(b, b'+' | b'-')))
}

#[cfg(test)]
mod tests {
    use super::LogItem;

    fn item(line: &str) -> LogItem {
        LogItem::new(line.as_bytes().to_vec())
    }

    #[test]
    fn render_strips_server_timestamp_by_default() {
        let mut entry = item("2024-05-01T10:00:00.123456789Z starting server\n");
        entry.single_container = true;
        assert_eq!(entry.render(false), "starting server");
        assert_eq!(
            entry.render(true),
            "2024-05-01T10:00:00.123456789Z starting server"
        );
    }

    #[test]
    fn render_strips_timestamps_with_numeric_offsets() {
        let mut entry = item("2024-05-01T03:00:00.5-07:00 west coast");
        entry.single_container = true;
        assert_eq!(entry.render(false), "west coast");

        let mut entry = item("2024-05-01T12:00:00+02:00 east");
        entry.single_container = true;
        assert_eq!(entry.render(false), "east");
    }

    #[test]
    fn render_keeps_lines_without_timestamp() {
        let mut entry = item("plain text line");
        entry.single_container = true;
        assert_eq!(entry.render(false), "plain text line");
    }

    #[test]
    fn render_prefixes_pod_and_container() {
        let mut entry = item("2024-05-01T10:00:00Z ready");
        entry.pod = "web-0".to_string();
        entry.container = "main".to_string();
        assert_eq!(entry.render(false), "web-0 main ready");

        entry.single_container = true;
        assert_eq!(entry.render(false), "web-0 ready");
    }
}
