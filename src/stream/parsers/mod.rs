//! Protocol handlers.

pub mod smtp;

pub use smtp::{SmtpHandler, SmtpHandlerFactory};
