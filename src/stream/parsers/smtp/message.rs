//! DATA body handling: dot-unstuffing and the header/body split.

use indexmap::IndexMap;

/// Strip the line terminator (LF, optionally preceded by CR).
pub(crate) fn trim_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Undo dot-stuffing on one body line.
pub fn unstuff(line: &[u8]) -> &[u8] {
    if line.starts_with(b"..") {
        &line[1..]
    } else {
        line
    }
}

/// Split a line-terminated buffer into lines, terminators kept.
fn lines(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    data.split_inclusive(|&b| b == b'\n')
}

fn is_blank(line: &[u8]) -> bool {
    trim_eol(line).is_empty()
}

fn looks_like_header(line: &[u8]) -> bool {
    let line = trim_eol(line);
    match line.iter().position(|&b| b == b':') {
        Some(colon) => colon > 0 && !line[..colon].iter().any(|b| b.is_ascii_whitespace()),
        None => false,
    }
}

/// Split a message into its header block and body.
///
/// The body starts right after the first blank line. Without a blank line
/// the whole message is taken as headers when it starts with a header line,
/// and as body otherwise.
pub fn split_message(data: &[u8]) -> (IndexMap<Vec<u8>, Vec<u8>>, Vec<u8>) {
    let mut offset = 0;
    for line in lines(data) {
        if is_blank(line) {
            let headers = parse_headers(&data[..offset]);
            return (headers, data[offset + line.len()..].to_vec());
        }
        offset += line.len();
    }

    match lines(data).next() {
        Some(first) if looks_like_header(first) => (parse_headers(data), Vec::new()),
        _ => (IndexMap::new(), data.to_vec()),
    }
}

/// Parse `Name: Value` lines.
///
/// Continuation lines (leading space or tab) are appended to the previous
/// value as they are. A repeated name keeps its first position and takes
/// the last value.
pub fn parse_headers(block: &[u8]) -> IndexMap<Vec<u8>, Vec<u8>> {
    let mut headers: IndexMap<Vec<u8>, Vec<u8>> = IndexMap::new();
    let mut last: Option<Vec<u8>> = None;

    for line in lines(block) {
        let line = trim_eol(line);
        if line.is_empty() {
            continue;
        }

        if line[0] == b' ' || line[0] == b'\t' {
            if let Some(value) = last.as_ref().and_then(|name| headers.get_mut(name)) {
                value.extend_from_slice(line);
            }
            continue;
        }

        let Some(colon) = line.iter().position(|&b| b == b':') else {
            last = None;
            continue;
        };
        let name = line[..colon].to_vec();
        let value = line[colon + 1..].trim_ascii_start().to_vec();
        headers.insert(name.clone(), value);
        last = Some(name);
    }

    headers
}
