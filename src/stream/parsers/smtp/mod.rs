//! SMTP session decoder.
//!
//! [`SmtpHandler`] follows both legs of an SMTP session line by line and
//! collects one [`SmtpRequest`]/[`SmtpReply`] pair per mail transaction:
//! envelope addresses, AUTH credentials (LOGIN, PLAIN, CRAM-MD5), message
//! headers and body on the client side; the greeting banner, reply codes and
//! positive replies on the server side.
//!
//! A transaction is complete once the server has answered the `.` that ends
//! a DATA body. Credentials and the greeting carry over to later mails of
//! the same session, and the reply keeps accumulating over the connection.
//! After a successful `STARTTLS` the rest of the session is encrypted and
//! ignored.

mod message;
mod reply;
mod request;

use std::collections::VecDeque;

use tracing::{debug, trace};

use super::super::{Direction, HandlerFactory, Reply, Request, StreamContext, StreamHandler};

pub use message::{parse_headers, split_message, unstuff};
pub use reply::{parse_reply_line, ReplyLine, SmtpReply};
pub use request::{decode_response, parse_request_line, Command, Mechanism, SmtpRequest};

use message::trim_eol;
use request::{cram_md5_username, plain_credentials};

/// Where the session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpState {
    Command,
    /// Reading base64 responses of an AUTH exchange; `step` counts from 1.
    AuthChallenge { mechanism: Mechanism, step: u8 },
    /// `DATA` was sent; client lines wait for the server's answer.
    DataPending,
    DataBody,
    /// The body ended; client lines wait for the reply to the final dot.
    DataDone,
    /// `STARTTLS` was sent; client lines wait for the server's answer.
    TlsPending,
    /// STARTTLS succeeded.
    Encrypted,
}

/// What a client line sent to the server waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Reply,
    Auth,
    Data,
    /// The `.` ending a body.
    Dot,
    StartTls,
}

/// State to start a handler in the middle of an AUTH exchange.
#[derive(Debug, Clone, Default)]
pub struct SmtpResume {
    /// Mechanism name as sent in `AUTH`.
    pub auth_mechanism: Option<Vec<u8>>,
    /// Next response expected, from 1.
    pub auth_step: u8,
    /// Last reply code seen.
    pub rescode: Option<u16>,
}

/// Decoder for one SMTP connection.
#[derive(Debug)]
pub struct SmtpHandler {
    state: SmtpState,
    request: SmtpRequest,
    reply: SmtpReply,
    client_buf: Vec<u8>,
    server_buf: Vec<u8>,
    /// Client lines waiting for a reply to decide how they are read.
    held: VecDeque<Vec<u8>>,
    body: Vec<u8>,
    /// Client lines without a final reply yet, oldest first.
    pending: VecDeque<Pending>,
    /// The server banner has been seen.
    greeted: bool,
    ready: VecDeque<(SmtpRequest, SmtpReply)>,
    emitted: u64,
    finished: bool,
}

impl Default for SmtpHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SmtpHandler {
    pub fn new() -> Self {
        Self {
            state: SmtpState::Command,
            request: SmtpRequest::default(),
            reply: SmtpReply::default(),
            client_buf: Vec::new(),
            server_buf: Vec::new(),
            held: VecDeque::new(),
            body: Vec::new(),
            pending: VecDeque::new(),
            greeted: false,
            ready: VecDeque::new(),
            emitted: 0,
            finished: false,
        }
    }

    /// Start a handler in the middle of a session.
    pub fn resume(resume: SmtpResume) -> Self {
        let mut handler = Self::new();
        handler.greeted = true;
        handler.reply.rescode = resume.rescode;
        if let Some(name) = resume.auth_mechanism {
            handler.state = SmtpState::AuthChallenge {
                mechanism: Mechanism::from_name(&name),
                step: resume.auth_step.max(1),
            };
            handler.request.auth_type = Some(name.to_ascii_lowercase());
        }
        handler
    }

    pub fn state(&self) -> SmtpState {
        self.state
    }

    /// The request being collected.
    pub fn request(&self) -> &SmtpRequest {
        &self.request
    }

    /// The reply state of the connection.
    pub fn reply(&self) -> &SmtpReply {
        &self.reply
    }

    fn take_lines(buf: &mut Vec<u8>) -> Vec<Vec<u8>> {
        let Some(last) = buf.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let complete: Vec<u8> = buf.drain(..=last).collect();
        complete
            .split_inclusive(|&b| b == b'\n')
            .map(<[u8]>::to_vec)
            .collect()
    }

    fn feed_client(&mut self, data: &[u8]) {
        self.client_buf.extend_from_slice(data);
        for line in Self::take_lines(&mut self.client_buf) {
            self.client_line(line);
            if self.state == SmtpState::Encrypted {
                self.client_buf.clear();
                return;
            }
        }
    }

    fn feed_server(&mut self, data: &[u8]) {
        self.server_buf.extend_from_slice(data);
        for line in Self::take_lines(&mut self.server_buf) {
            self.server_line(&line);
            if self.state == SmtpState::Encrypted {
                self.server_buf.clear();
                return;
            }
        }
    }

    fn client_line(&mut self, line: Vec<u8>) {
        match self.state {
            SmtpState::Encrypted => {}
            SmtpState::DataPending | SmtpState::DataDone | SmtpState::TlsPending => {
                self.held.push_back(line)
            }
            SmtpState::DataBody => self.body_line(&line),
            SmtpState::AuthChallenge { .. } => self.auth_response(trim_eol(&line)),
            SmtpState::Command => self.command(trim_eol(&line)),
        }
    }

    fn command(&mut self, line: &[u8]) {
        if line.is_empty() {
            return;
        }

        let pending = match parse_request_line(line) {
            Command::MailFrom(Some(address)) => {
                self.request.mail_from.push(address.to_vec());
                Pending::Reply
            }
            Command::RcptTo(Some(address)) => {
                self.request.mail_to.push(address.to_vec());
                Pending::Reply
            }
            Command::Auth {
                mechanism,
                initial_response,
            } => {
                self.request.auth_type = Some(mechanism.to_ascii_lowercase());
                self.state = SmtpState::AuthChallenge {
                    mechanism: Mechanism::from_name(mechanism),
                    step: 1,
                };
                if let Some(response) = initial_response {
                    self.auth_response(response);
                }
                Pending::Auth
            }
            Command::Data => {
                self.state = SmtpState::DataPending;
                Pending::Data
            }
            Command::StartTls => {
                self.state = SmtpState::TlsPending;
                Pending::StartTls
            }
            Command::MailFrom(None) | Command::RcptTo(None) => {
                trace!("MAIL/RCPT without address");
                Pending::Reply
            }
            Command::Hello | Command::Quit | Command::Other => Pending::Reply,
        };
        self.pending.push_back(pending);
    }

    fn auth_response(&mut self, response: &[u8]) {
        let SmtpState::AuthChallenge { mechanism, step } = self.state else {
            return;
        };
        if response == b"*" {
            self.state = SmtpState::Command;
            return;
        }

        let decoded = decode_response(response);
        if decoded.is_none() {
            trace!(step, "undecodable AUTH response");
        }

        self.state = match mechanism {
            Mechanism::Login if step == 1 => {
                self.request.username = decoded;
                SmtpState::AuthChallenge {
                    mechanism,
                    step: 2,
                }
            }
            Mechanism::Login => {
                self.request.password = decoded;
                SmtpState::Command
            }
            Mechanism::Plain => {
                if let Some((username, password)) = decoded.as_deref().and_then(plain_credentials)
                {
                    self.request.username = Some(username);
                    self.request.password = Some(password);
                }
                SmtpState::Command
            }
            Mechanism::CramMd5 => {
                if let Some(decoded) = decoded {
                    self.request.username = Some(cram_md5_username(&decoded));
                }
                SmtpState::Command
            }
            Mechanism::Other => SmtpState::AuthChallenge {
                mechanism,
                step: step.saturating_add(1),
            },
        };
    }

    fn body_line(&mut self, line: &[u8]) {
        if trim_eol(line) == b"." {
            self.complete_body();
            self.state = SmtpState::DataDone;
            self.pending.push_back(Pending::Dot);
            return;
        }
        self.body.extend_from_slice(unstuff(line));
    }

    fn complete_body(&mut self) {
        let (headers, message) = split_message(&self.body);
        self.request.headers = headers;
        self.request.message = message;
        self.body.clear();
    }

    fn server_line(&mut self, line: &[u8]) {
        if self.state == SmtpState::Encrypted {
            return;
        }
        let text = trim_eol(line);
        let Some(parsed) = parse_reply_line(text) else {
            trace!(len = text.len(), "ignoring line outside reply grammar");
            return;
        };
        self.reply.record(line, text, parsed);
        if !parsed.is_final {
            return;
        }

        let code = parsed.code;
        // AUTH challenges do not answer a command.
        if code == 334 {
            return;
        }
        if !self.greeted {
            self.greeted = true;
            if code == 220 || self.pending.is_empty() {
                return;
            }
        }

        let answered = if code == 354 {
            // Replies lost in the capture must not hide the answer to DATA.
            let Some(at) = self.pending.iter().position(|p| *p == Pending::Data) else {
                trace!("354 without a pending DATA");
                return;
            };
            self.pending.drain(..=at);
            Pending::Data
        } else {
            let Some(answered) = self.pending.pop_front() else {
                trace!(code, "reply without a pending command");
                return;
            };
            answered
        };

        match (answered, self.state) {
            (Pending::Auth, SmtpState::AuthChallenge { .. }) => self.state = SmtpState::Command,
            (Pending::Data, SmtpState::DataPending) => {
                self.state = if code == 354 {
                    SmtpState::DataBody
                } else {
                    SmtpState::Command
                };
                self.replay_held();
            }
            (Pending::Dot, SmtpState::DataDone) => {
                self.emit();
                self.state = SmtpState::Command;
                self.replay_held();
            }
            (Pending::StartTls, SmtpState::TlsPending) => {
                if code == 220 {
                    debug!("STARTTLS accepted, ignoring the rest of the session");
                    self.state = SmtpState::Encrypted;
                    self.held.clear();
                } else {
                    self.state = SmtpState::Command;
                    self.replay_held();
                }
            }
            _ => {}
        }
    }

    fn replay_held(&mut self) {
        let held = std::mem::take(&mut self.held);
        for line in held {
            self.client_line(line);
        }
    }

    fn emit(&mut self) {
        let next = self.request.carry_over();
        let request = std::mem::replace(&mut self.request, next);
        self.ready.push_back((request, self.reply.clone()));
        self.emitted += 1;
    }

    fn flush(&mut self) {
        for line in Self::take_lines(&mut self.client_buf) {
            self.client_line(line);
        }
        if !self.client_buf.is_empty() {
            let rest = std::mem::take(&mut self.client_buf);
            self.client_line(rest);
        }
        for line in Self::take_lines(&mut self.server_buf) {
            self.server_line(&line);
        }
        if !self.server_buf.is_empty() {
            let rest = std::mem::take(&mut self.server_buf);
            self.server_line(&rest);
        }

        // Answers that were never captured count as accepted.
        loop {
            match self.state {
                SmtpState::DataPending => {
                    self.state = SmtpState::DataBody;
                    self.replay_held();
                }
                SmtpState::DataDone => {
                    self.emit();
                    self.state = SmtpState::Command;
                    self.replay_held();
                }
                SmtpState::TlsPending => {
                    self.state = SmtpState::Encrypted;
                    self.held.clear();
                }
                _ => break,
            }
        }
        self.pending.clear();

        if self.state == SmtpState::DataBody {
            self.complete_body();
            self.emit();
        } else if self.request.has_content() || self.emitted == 0 {
            self.emit();
        }
    }
}

impl StreamHandler for SmtpHandler {
    fn name(&self) -> &'static str {
        "smtp"
    }

    fn consume(&mut self, direction: Direction, data: &[u8]) {
        if self.finished || self.state == SmtpState::Encrypted {
            return;
        }
        match direction {
            Direction::ToServer => self.feed_client(data),
            Direction::ToClient => self.feed_server(data),
        }
    }

    fn transaction_ready(&mut self) -> Option<(Request, Reply)> {
        self.ready
            .pop_front()
            .map(|(request, reply)| (Request::Smtp(request), Reply::Smtp(reply)))
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.flush();
        self.finished = true;
    }
}

/// Creates an [`SmtpHandler`] per connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmtpHandlerFactory;

impl HandlerFactory for SmtpHandlerFactory {
    fn name(&self) -> &'static str {
        "smtp"
    }

    fn create(&self, _context: &StreamContext) -> Box<dyn StreamHandler> {
        Box::new(SmtpHandler::new())
    }
}
