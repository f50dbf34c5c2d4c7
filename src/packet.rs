//! The AMI packet: an ordered sequence of `Name: Value` header lines
//! terminated by a blank line.
//!
//! Header-name comparison is case-insensitive (AMI mixes cases across
//! server versions) but original casing is preserved for display and for
//! re-emitting headers verbatim (e.g. `map`-shaped results).

/// A single parsed AMI packet.
///
/// Duplicate header names (notably `Variable`) are preserved in arrival
/// order; [`Packet::header`] returns only the first occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    headers: Vec<(String, String)>,
    /// The packet's original bytes, `\r\n`-joined, with the blank-line
    /// terminator already stripped by the framer. Populated for every
    /// packet so `text`/`queues` shapes can recover colon-free body lines
    /// (command output, `--END COMMAND--`) that never made it into
    /// `headers`.
    raw: String,
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

impl Packet {
    /// Parse one packet's worth of bytes (no trailing blank line expected;
    /// the framer has already stripped the packet terminator).
    pub fn parse(bytes: &[u8]) -> Packet {
        let text = String::from_utf8_lossy(bytes).into_owned();
        let mut headers = Vec::new();
        for line in text.split("\r\n") {
            if line.is_empty() {
                continue;
            }
            if let Some(idx) = line.find(": ") {
                let name = line[..idx].to_owned();
                let value = line[idx + 2..].to_owned();
                headers.push((name, value));
            }
            // Lines without `": "` are ignored as headers but remain part
            // of `raw` for shapes that want the unparsed body.
        }
        Packet { headers, raw: text }
    }

    /// Build a packet directly from an ordered header list (used by tests
    /// and by code constructing synthetic packets).
    pub fn from_headers(headers: Vec<(String, String)>) -> Packet {
        let raw = headers
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join("\r\n");
        Packet { headers, raw }
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First occurrence of `name`, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| eq_ignore_case(k, name))
            .map(|(_, v)| v.as_str())
    }

    pub fn action_id(&self) -> Option<&str> {
        self.header("ActionID")
    }

    pub fn response(&self) -> Option<&str> {
        self.header("Response")
    }

    pub fn event(&self) -> Option<&str> {
        self.header("Event")
    }

    pub fn is_event(&self) -> bool {
        self.response().is_none() && self.event().is_some()
    }

    /// The raw text of the packet (headers and any colon-free body lines),
    /// `\r\n`-joined, with the packet terminator stripped.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Headers minus the named set, case-insensitive, in arrival order.
    pub fn headers_excluding(&self, exclude: &[&str]) -> Vec<(String, String)> {
        self.headers
            .iter()
            .filter(|(k, _)| !exclude.iter().any(|e| eq_ignore_case(k, e)))
            .cloned()
            .collect()
    }
}
