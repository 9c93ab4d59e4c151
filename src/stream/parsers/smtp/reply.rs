/// Server side of an SMTP session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmtpReply {
    /// Last reply code seen
    pub rescode: Option<u16>,
    /// First `220` line of the connection, terminator included
    pub ready_message: Option<Vec<u8>>,
    /// Every other 2xx line, terminator stripped
    pub ok_responses: Vec<Vec<u8>>,
}

impl SmtpReply {
    /// Record one reply line. `line` still carries its terminator.
    pub(crate) fn record(&mut self, line: &[u8], text: &[u8], reply: ReplyLine) {
        self.rescode = Some(reply.code);
        if reply.code == 220 && self.ready_message.is_none() {
            self.ready_message = Some(line.to_vec());
        } else if reply.is_success() {
            self.ok_responses.push(text.to_vec());
        }
    }
}

/// `<code>[-| ]<text>` header of a reply line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyLine {
    pub code: u16,
    /// `false` for `-` continuation lines
    pub is_final: bool,
}

impl ReplyLine {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

/// Parse one server line (terminator already stripped).
pub fn parse_reply_line(line: &[u8]) -> Option<ReplyLine> {
    let digits = line.get(..3)?;
    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let code = digits
        .iter()
        .fold(0u16, |code, d| code * 10 + u16::from(d - b'0'));

    let is_final = match line.get(3) {
        None | Some(b' ') => true,
        Some(b'-') => false,
        Some(_) => return None,
    };
    Some(ReplyLine { code, is_final })
}
