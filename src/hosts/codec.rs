//! Line codec for the hosts file.
//!
//! Lines written by this daemon end with [`OWNERSHIP_MARKER`] and carry the
//! owning container id in a trailing comment:
//!
//! ```text
//! 10.0.0.5	web		#c1 managed-by-hostsync
//! ```
//!
//! Every other line is foreign and is reproduced byte for byte.

use crate::types::HostRecord;

/// Marker token closing every line owned by this daemon.
pub const OWNERSHIP_MARKER: &str = "managed-by-hostsync";

/// A single line of the hosts file.
///
/// Foreign and orphan lines keep their raw text, terminator included, so
/// they are written back byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileLine {
    /// Text not produced by this daemon.
    Foreign(String),
    /// A well formed owned entry.
    Owned {
        record: HostRecord,
        ending: LineEnding,
    },
    /// Carries the marker but no recoverable owner. Only a full cleanup
    /// removes these.
    Orphan(String),
}

impl FileLine {
    pub fn owned(record: HostRecord, ending: LineEnding) -> Self {
        FileLine::Owned { record, ending }
    }

    pub fn is_owned_by(&self, container_id: &str) -> bool {
        matches!(self, FileLine::Owned { record, .. } if record.container_id == container_id)
    }

    pub fn is_managed(&self) -> bool {
        !matches!(self, FileLine::Foreign(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

/// Decoded hosts file: its lines in file order plus the file's dominant
/// line terminator, used for lines added to it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    pub lines: Vec<FileLine>,
    pub ending: LineEnding,
}

/// Whether `field` can be written as an address, alias or container id and
/// read back unchanged.
pub fn is_encodable(field: &str) -> bool {
    !field.is_empty() && !field.contains(|c: char| c.is_whitespace() || c == '#')
}

pub fn decode(content: &str) -> Document {
    let (mut lf, mut crlf) = (0usize, 0usize);
    for raw in content.split_inclusive('\n') {
        match split_ending(raw).1 {
            Some(LineEnding::CrLf) => crlf += 1,
            Some(LineEnding::Lf) => lf += 1,
            None => {}
        }
    }
    let ending = if crlf > lf {
        LineEnding::CrLf
    } else {
        LineEnding::Lf
    };

    let lines = content
        .split_inclusive('\n')
        .map(|raw| decode_line(raw, ending))
        .collect();
    Document { lines, ending }
}

pub fn encode(document: &Document) -> String {
    let mut out = String::new();
    for line in &document.lines {
        // An unterminated last line gets a terminator once something follows it.
        if !out.is_empty() && !out.ends_with('\n') {
            out.push_str(document.ending.as_str());
        }
        match line {
            FileLine::Foreign(raw) | FileLine::Orphan(raw) => out.push_str(raw),
            FileLine::Owned { record, ending } => {
                out.push_str(&format_record(record));
                out.push_str(ending.as_str());
            }
        }
    }
    out
}

fn format_record(record: &HostRecord) -> String {
    format!(
        "{}\t{}\t\t#{} {}",
        record.address, record.alias, record.container_id, OWNERSHIP_MARKER
    )
}

fn split_ending(raw: &str) -> (&str, Option<LineEnding>) {
    if let Some(body) = raw.strip_suffix("\r\n") {
        (body, Some(LineEnding::CrLf))
    } else if let Some(body) = raw.strip_suffix('\n') {
        (body, Some(LineEnding::Lf))
    } else {
        (raw, None)
    }
}

fn decode_line(raw: &str, default_ending: LineEnding) -> FileLine {
    let (line, ending) = split_ending(raw);
    let Some(body) = line.trim_end().strip_suffix(OWNERSHIP_MARKER) else {
        return FileLine::Foreign(raw.to_string());
    };
    // The marker must stand as its own token.
    if !(body.is_empty() || body.ends_with(char::is_whitespace) || body.ends_with('#')) {
        return FileLine::Foreign(raw.to_string());
    }
    match parse_record(body) {
        Some(record) => FileLine::owned(record, ending.unwrap_or(default_ending)),
        None => FileLine::Orphan(raw.to_string()),
    }
}

fn parse_record(body: &str) -> Option<HostRecord> {
    let (payload, tag) = body.rsplit_once('#')?;
    let container_id = tag.trim();
    if !is_encodable(container_id) {
        return None;
    }
    let mut fields = payload.split_whitespace();
    let (address, alias) = (fields.next()?, fields.next()?);
    if fields.next().is_some() || !is_encodable(address) || !is_encodable(alias) {
        return None;
    }
    Some(HostRecord {
        address: address.to_string(),
        alias: alias.to_string(),
        container_id: container_id.to_string(),
    })
}
