//! Message and Mode — the unit of communication and its send flags.

use std::fmt;

use bitflags::bitflags;
use bytes::Bytes;

/// The action a message asks for. Servers dispatch on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Verb {
    Ack,
    Attach,
    Auth,
    Connect,
    Error,
    File,
    Get,
    Log,
    Ls,
    Register,
    Set,
    Spawn,
    Start,
    Stop,
    Watch,
    Other(String),
}

impl Verb {
    pub fn as_str(&self) -> &str {
        match self {
            Verb::Ack => "ack",
            Verb::Attach => "attach",
            Verb::Auth => "auth",
            Verb::Connect => "connect",
            Verb::Error => "error",
            Verb::File => "file",
            Verb::Get => "get",
            Verb::Log => "log",
            Verb::Ls => "ls",
            Verb::Register => "register",
            Verb::Set => "set",
            Verb::Spawn => "spawn",
            Verb::Start => "start",
            Verb::Stop => "stop",
            Verb::Watch => "watch",
            Verb::Other(name) => name,
        }
    }
}

impl From<&str> for Verb {
    fn from(name: &str) -> Self {
        match name {
            "ack" => Verb::Ack,
            "attach" => Verb::Attach,
            "auth" => Verb::Auth,
            "connect" => Verb::Connect,
            "error" => Verb::Error,
            "file" => Verb::File,
            "get" => Verb::Get,
            "log" => Verb::Log,
            "ls" => Verb::Ls,
            "register" => Verb::Register,
            "set" => Verb::Set,
            "spawn" => Verb::Spawn,
            "start" => Verb::Start,
            "stop" => Verb::Stop,
            "watch" => Verb::Watch,
            other => Verb::Other(other.to_string()),
        }
    }
}

impl From<String> for Verb {
    fn from(name: String) -> Self {
        Verb::from(name.as_str())
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A verb, its string arguments, and an optional attached payload.
///
/// The reply capability is not a field: it travels in the pipe envelope
/// and is handed out by [`crate::Receiver::receive`] when asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub verb: Verb,
    pub args: Vec<String>,
    pub att: Option<Bytes>,
}

impl Message {
    pub fn new(verb: impl Into<Verb>) -> Self {
        Self {
            verb: verb.into(),
            args: Vec::new(),
            att: None,
        }
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_att(mut self, att: impl Into<Bytes>) -> Self {
        self.att = Some(att.into());
        self
    }

    /// Conventional acknowledgement reply.
    pub fn ack() -> Self {
        Self::new(Verb::Ack)
    }

    /// Conventional failure reply carrying a human-readable reason.
    pub fn error(reason: impl Into<String>) -> Self {
        Self::new(Verb::Error).with_arg(reason)
    }

    pub fn log(text: impl Into<String>) -> Self {
        Self::new(Verb::Log).with_arg(text)
    }

    /// Value of the first `key=value` argument matching `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        lookup_arg(&self.args, key)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.verb)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        if let Some(att) = &self.att {
            write!(f, " <{} bytes>", att.len())?;
        }
        Ok(())
    }
}

/// Find `key` in a list of `key=value` arguments.
pub fn lookup_arg<'a>(args: &'a [String], key: &str) -> Option<&'a str> {
    args.iter().find_map(|arg| {
        let (k, v) = arg.split_once('=')?;
        (k == key).then_some(v)
    })
}

bitflags! {
    /// Embedded continuation endpoints requested on send or receive.
    ///
    /// On send, `RECEIVER` asks for a reply path back and `SENDER` asks
    /// for a forward stream. On receive, `SENDER` picks up the peer's
    /// reply path and `RECEIVER` picks up its forward stream.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Mode: u8 {
        /// "I want a Receiver back."
        const RECEIVER = 1 << 0;
        /// "I want a Sender back."
        const SENDER = 1 << 1;
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::empty()
    }
}
