//! Exposition formatter for the Prometheus text format.
//!
//! Renders TYPE declarations, label-annotated sample lines and the
//! response envelope that wraps a finished body. The label layout is kept
//! byte-compatible with the output existing scrape configurations were
//! written against, including the space-separated labels.

use ahash::AHashSet as HashSet;
use std::fmt::Write as FmtWrite;

/// First line of every body.
pub const PREAMBLE: &str = "# prometheus data\n";

/// Content type announced in the envelope.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Protocol version used in the status line.
pub const DEFAULT_PROTOCOL: &str = "HTTP/1.0";

/// Default status code of a scrape response.
pub const DEFAULT_STATUS: u16 = 200;

/// Metric kind announced in a TYPE line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

/// Separator written in front of a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    /// `, `
    Comma,
    /// ` `
    Space,
}

impl Separator {
    fn as_str(&self) -> &'static str {
        match self {
            Separator::Comma => ", ",
            Separator::Space => " ",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Label {
    separator: Separator,
    key: String,
    value: String,
}

/// Ordered label set of a single sample.
///
/// Keys are unique; labels render in insertion order so that repeated
/// collections over unchanged data produce identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<Label>,
}

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a label preceded by `, `.
    pub fn comma(self, key: &str, value: &str) -> Self {
        self.push(Separator::Comma, key, value)
    }

    /// Appends a label preceded by a single space.
    pub fn space(self, key: &str, value: &str) -> Self {
        self.push(Separator::Space, key, value)
    }

    /// Appends a label, replacing the value of an existing key in place.
    pub fn push(mut self, separator: Separator, key: &str, value: &str) -> Self {
        if let Some(existing) = self.labels.iter_mut().find(|l| l.key == key) {
            existing.value = value.to_string();
            return self;
        }
        self.labels.push(Label {
            separator,
            key: key.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.key == key)
            .map(|l| l.value.as_str())
    }

    /// Renders `{k="v", ...}`, or nothing for an empty set.
    pub fn render(&self, escape: bool) -> String {
        if self.labels.is_empty() {
            return String::new();
        }

        let mut out = String::with_capacity(self.labels.len() * 24);
        out.push('{');
        for (i, label) in self.labels.iter().enumerate() {
            if i > 0 {
                out.push_str(label.separator.as_str());
            }
            out.push_str(&label.key);
            out.push_str("=\"");
            if escape {
                out.push_str(&escape_label_value(&label.value));
            } else {
                out.push_str(&label.value);
            }
            out.push('"');
        }
        out.push('}');
        out
    }
}

/// Escapes backslash, double quote and newline in a label value.
pub fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Renders `# TYPE <name> <kind>\n`.
pub fn render_type_line(name: &str, kind: MetricKind) -> String {
    format!("# TYPE {} {}\n", name, kind.as_str())
}

/// Renders `<name>{labels} <value>\n`.
pub fn render_sample_line(name: &str, labels: &LabelSet, value: u64, escape: bool) -> String {
    format!("{}{} {}\n", name, labels.render(escape), value)
}

/// Body under construction.
///
/// A TYPE line is written once per metric name, directly in front of the
/// first sample carrying that name.
#[derive(Debug, Default)]
pub struct Document {
    body: String,
    declared: HashSet<String>,
    escape: bool,
}

impl Document {
    /// Creates a document that already holds the preamble.
    pub fn new(escape: bool) -> Self {
        let mut body = String::with_capacity(16 * 1024);
        body.push_str(PREAMBLE);
        Self {
            body,
            declared: HashSet::new(),
            escape,
        }
    }

    /// Appends one sample, declaring its type first if needed.
    pub fn sample(&mut self, name: &str, kind: MetricKind, labels: &LabelSet, value: u64) {
        if !self.declared.contains(name) {
            self.body.push_str(&render_type_line(name, kind));
            self.declared.insert(name.to_string());
        }
        self.body
            .push_str(&render_sample_line(name, labels, value, self.escape));
    }

    pub fn as_str(&self) -> &str {
        &self.body
    }

    pub fn into_body(self) -> String {
        self.body
    }
}

/// Reason phrase for the status codes the exporter emits.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Wraps `body` in the default `HTTP/1.0 200 OK` envelope.
pub fn render_envelope(body: &str) -> Vec<u8> {
    render_envelope_with(body, DEFAULT_STATUS, DEFAULT_PROTOCOL)
}

/// Wraps `body` in a status line, `Content-Length`, `Content-Type` and a
/// blank line. The body is copied unmodified and never inspected.
pub fn render_envelope_with(body: &str, status: u16, protocol: &str) -> Vec<u8> {
    let mut head = String::with_capacity(96);
    write!(
        head,
        "{} {} {}\r\nContent-Length: {}\r\nContent-Type: {}\r\n\r\n",
        protocol,
        status,
        reason_phrase(status),
        body.len(),
        CONTENT_TYPE
    )
    .ok();

    let mut out = Vec::with_capacity(head.len() + body.len());
    out.extend_from_slice(head.as_bytes());
    out.extend_from_slice(body.as_bytes());
    out
}
