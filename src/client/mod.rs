pub mod api;
pub mod consumer;
pub mod conversation;
pub mod credentials;

use crate::core::terminal;

/// A user-visible notice raised by the client. Every failed operation raises exactly one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    LoginRequired,
    Error(String),
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Prints notices with the terminal helpers.
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, notice: Notice) {
        match notice {
            Notice::LoginRequired => {
                terminal::print_warn("Login required. Run `mevchat login --token <TOKEN>`.")
            }
            Notice::Error(message) => terminal::print_error(&message),
        }
    }
}
