//! Host Control Messages
//!
//! Discrete messages arrive between render calls as a selector plus a list of
//! atoms (`timbre 0.4`, `plug trig 1`). Each adapter parses them into its own
//! `Copy` control enum, so clamping and validation happen off the audio path.
//!
//! Hosts that cannot serialize the control path against the audio callback
//! can hand parsed controls over through [`control_channel`], a lock-free
//! single-producer/single-consumer queue.

use crate::error::MessageError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[cfg(feature = "rtrb")]
use rtrb::{Consumer, Producer, RingBuffer};

/// One message argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Atom {
    Float(f32),
    Symbol(String),
}

impl Atom {
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Atom::Float(v) => Some(*v),
            Atom::Symbol(_) => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Atom::Symbol(s) => Some(s),
            Atom::Float(_) => None,
        }
    }

    fn parse(token: &str) -> Self {
        token
            .parse::<f32>()
            .map(Atom::Float)
            .unwrap_or_else(|_| Atom::Symbol(token.to_string()))
    }
}

/// A selector with its arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostMessage {
    pub selector: String,
    pub args: Vec<Atom>,
}

impl HostMessage {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, arg: Atom) -> Self {
        self.args.push(arg);
        self
    }

    pub fn with_float(self, value: f32) -> Self {
        self.with_arg(Atom::Float(value))
    }

    pub fn with_symbol(self, value: impl Into<String>) -> Self {
        self.with_arg(Atom::Symbol(value.into()))
    }

    /// Parse a whitespace separated message such as `"plug trig 1"`.
    ///
    /// Tokens that read as numbers become floats, everything else a symbol.
    pub fn parse(text: &str) -> Option<Self> {
        let mut tokens = text.split_whitespace();
        let selector = tokens.next()?;
        Some(Self {
            selector: selector.to_string(),
            args: tokens.map(Atom::parse).collect(),
        })
    }

    /// Float argument at `index`
    pub fn float(&self, index: usize) -> Result<f32, MessageError> {
        self.args
            .get(index)
            .and_then(Atom::as_f32)
            .ok_or_else(|| self.missing())
    }

    /// Float argument read as a switch (non-zero is on)
    pub fn flag(&self, index: usize) -> Result<bool, MessageError> {
        self.float(index).map(|v| v != 0.0)
    }

    /// Symbol argument at `index`
    pub fn symbol(&self, index: usize) -> Result<&str, MessageError> {
        self.args
            .get(index)
            .and_then(Atom::as_symbol)
            .ok_or_else(|| self.missing())
    }

    pub fn unknown(&self) -> MessageError {
        MessageError::UnknownSelector(self.selector.clone())
    }

    fn missing(&self) -> MessageError {
        MessageError::MissingArgument {
            selector: self.selector.clone(),
        }
    }
}

/// Source of controls drained at the top of a render call
pub trait MessageReceiver<C> {
    fn pop(&mut self) -> Option<C>;
}

impl<C> MessageReceiver<C> for VecDeque<C> {
    fn pop(&mut self) -> Option<C> {
        self.pop_front()
    }
}

#[cfg(feature = "rtrb")]
impl<C> MessageReceiver<C> for Consumer<C> {
    fn pop(&mut self) -> Option<C> {
        Consumer::pop(self).ok()
    }
}

#[cfg(feature = "rtrb")]
pub type ControlSender<C> = Producer<C>;

#[cfg(feature = "rtrb")]
pub type ControlReceiver<C> = Consumer<C>;

/// Lock-free handoff from a control thread to the audio thread
#[cfg(feature = "rtrb")]
pub fn control_channel<C>(capacity: usize) -> (ControlSender<C>, ControlReceiver<C>) {
    RingBuffer::new(capacity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_message() {
        let msg = HostMessage::parse("plug trig 1").unwrap();
        assert_eq!(msg.selector, "plug");
        assert_eq!(msg.symbol(0), Ok("trig"));
        assert_eq!(msg.flag(1), Ok(true));

        assert!(HostMessage::parse("   ").is_none());
    }

    #[test]
    fn test_missing_argument() {
        let msg = HostMessage::new("timbre");
        assert_eq!(
            msg.float(0),
            Err(MessageError::MissingArgument {
                selector: "timbre".into()
            })
        );

        // A symbol where a float is expected is also missing
        let msg = HostMessage::new("timbre").with_symbol("high");
        assert!(msg.float(0).is_err());
    }

    #[test]
    fn test_builder() {
        let msg = HostMessage::new("freq").with_float(440.0);
        assert_eq!(msg.args, vec![Atom::Float(440.0)]);
        assert_eq!(msg.unknown(), MessageError::UnknownSelector("freq".into()));
    }

    #[test]
    fn test_vecdeque_receiver() {
        let mut queue: VecDeque<u8> = [1, 2].into_iter().collect();
        assert_eq!(MessageReceiver::pop(&mut queue), Some(1));
        assert_eq!(MessageReceiver::pop(&mut queue), Some(2));
        assert_eq!(MessageReceiver::pop(&mut queue), None);
    }

    #[cfg(feature = "rtrb")]
    #[test]
    fn test_control_channel_handoff() {
        let (mut tx, mut rx) = control_channel::<f32>(2);
        assert!(tx.push(0.25).is_ok());
        assert!(tx.push(0.5).is_ok());
        assert!(tx.push(0.75).is_err());

        let handle = std::thread::spawn(move || {
            let mut seen = Vec::new();
            while let Some(v) = MessageReceiver::pop(&mut rx) {
                seen.push(v);
            }
            seen
        });
        assert_eq!(handle.join().unwrap(), vec![0.25, 0.5]);
    }
}
