use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use indexmap::IndexMap;

/// Client side of one SMTP mail transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmtpRequest {
    /// One entry per `MAIL FROM`
    pub mail_from: Vec<Vec<u8>>,
    /// One entry per `RCPT TO`
    pub mail_to: Vec<Vec<u8>>,
    /// Message headers in first-seen order
    pub headers: IndexMap<Vec<u8>, Vec<u8>>,
    /// Message body after the header block, dot-stuffing undone
    pub message: Vec<u8>,
    pub username: Option<Vec<u8>>,
    pub password: Option<Vec<u8>>,
    /// Lower-cased AUTH mechanism
    pub auth_type: Option<Vec<u8>>,
}

impl SmtpRequest {
    /// Whether the envelope or the message carries anything.
    pub fn has_content(&self) -> bool {
        !self.mail_from.is_empty()
            || !self.mail_to.is_empty()
            || !self.headers.is_empty()
            || !self.message.is_empty()
    }

    /// Fresh request for the next mail on the same session; the
    /// authentication state stays.
    pub(crate) fn carry_over(&self) -> Self {
        Self {
            username: self.username.clone(),
            password: self.password.clone(),
            auth_type: self.auth_type.clone(),
            ..Self::default()
        }
    }
}

/// A parsed client command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Hello,
    /// Address of `MAIL FROM`, `None` when the argument has no `:`.
    MailFrom(Option<&'a [u8]>),
    RcptTo(Option<&'a [u8]>),
    Auth {
        mechanism: &'a [u8],
        initial_response: Option<&'a [u8]>,
    },
    Data,
    StartTls,
    Quit,
    Other,
}

/// AUTH mechanisms with credential extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    Login,
    Plain,
    CramMd5,
    Other,
}

impl Mechanism {
    pub fn from_name(name: &[u8]) -> Self {
        if name.eq_ignore_ascii_case(b"login") {
            Mechanism::Login
        } else if name.eq_ignore_ascii_case(b"plain") {
            Mechanism::Plain
        } else if name.eq_ignore_ascii_case(b"cram-md5") {
            Mechanism::CramMd5
        } else {
            Mechanism::Other
        }
    }
}

fn split_word(line: &[u8]) -> (&[u8], &[u8]) {
    match line.iter().position(|&b| b == b' ') {
        Some(space) => (&line[..space], line[space + 1..].trim_ascii_start()),
        None => (line, &line[line.len()..]),
    }
}

/// Parse one client line (terminator already stripped).
pub fn parse_request_line(line: &[u8]) -> Command<'_> {
    let (verb, rest) = split_word(line.trim_ascii());

    if verb.eq_ignore_ascii_case(b"HELO") || verb.eq_ignore_ascii_case(b"EHLO") {
        Command::Hello
    } else if verb.eq_ignore_ascii_case(b"MAIL") {
        Command::MailFrom(parse_path(rest))
    } else if verb.eq_ignore_ascii_case(b"RCPT") {
        Command::RcptTo(parse_path(rest))
    } else if verb.eq_ignore_ascii_case(b"AUTH") {
        let (mechanism, initial) = split_word(rest);
        let initial = initial.trim_ascii();
        Command::Auth {
            mechanism,
            initial_response: (!initial.is_empty()).then_some(initial),
        }
    } else if verb.eq_ignore_ascii_case(b"DATA") {
        Command::Data
    } else if verb.eq_ignore_ascii_case(b"STARTTLS") {
        Command::StartTls
    } else if verb.eq_ignore_ascii_case(b"QUIT") {
        Command::Quit
    } else {
        Command::Other
    }
}

/// Address from `FROM:<addr> params` / `TO:<addr>`.
///
/// Returns the text between the angle brackets, or the bare token when
/// there are none. `<>` gives an empty address.
fn parse_path(arg: &[u8]) -> Option<&[u8]> {
    let colon = arg.iter().position(|&b| b == b':')?;
    let path = arg[colon + 1..].trim_ascii_start();

    if let Some(inner) = path.strip_prefix(b"<") {
        let end = inner.iter().position(|&b| b == b'>').unwrap_or(inner.len());
        return Some(&inner[..end]);
    }
    let end = path
        .iter()
        .position(|b| b.is_ascii_whitespace())
        .unwrap_or(path.len());
    Some(&path[..end])
}

/// Decode one base64 AUTH response. `=` is the empty response.
pub fn decode_response(response: &[u8]) -> Option<Vec<u8>> {
    let response = response.trim_ascii();
    if response == b"=" {
        return Some(Vec::new());
    }
    STANDARD.decode(response).ok()
}

/// Split a decoded PLAIN response into `(authcid, password)`.
pub(crate) fn plain_credentials(decoded: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
    let fields: Vec<&[u8]> = decoded.split(|&b| b == 0).collect();
    match fields.as_slice() {
        [_authzid, authcid, password] => Some((authcid.to_vec(), password.to_vec())),
        [authcid, password] => Some((authcid.to_vec(), password.to_vec())),
        _ => None,
    }
}

/// Username from a decoded CRAM-MD5 response (`user digest`).
pub(crate) fn cram_md5_username(decoded: &[u8]) -> Vec<u8> {
    decoded
        .split(|&b| b == b' ')
        .next()
        .unwrap_or_default()
        .to_vec()
}
