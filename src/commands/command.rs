//! Request Parsing
//!
//! Turns a request frame into a typed `Command`. Names are matched
//! case-insensitively; argument counts are checked here so the handler
//! only ever sees well-formed requests.

use crate::protocol::Frame;
use bytes::Bytes;
use thiserror::Error;

/// A parsed client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `ADD key value [ttl]`
    Add {
        key: String,
        value: String,
        ttl: String,
    },
    /// `SET key value [ttl]`
    Set {
        key: String,
        value: String,
        ttl: String,
    },
    /// `GET key`
    Get { key: String },
    /// `DEL key`
    Del { key: String },
    /// `PING [message]`
    Ping(Option<Bytes>),
    DbSize,
    /// Forces a flush of the index to the backing file
    Save,
    Info,
    Quit,
}

/// Why a request frame could not be turned into a `Command`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("invalid command format")]
    NotAnArray,

    #[error("empty command")]
    Empty,

    #[error("invalid command name")]
    InvalidName,

    #[error("unknown command '{0}'")]
    Unknown(String),

    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    #[error("argument {0} is not valid UTF-8")]
    InvalidArgument(usize),
}

impl Command {
    /// Parses a request frame.
    pub fn from_frame(frame: Frame) -> Result<Self, CommandError> {
        let Frame::Array(parts) = frame else {
            return Err(CommandError::NotAnArray);
        };
        let Some((name, args)) = parts.split_first() else {
            return Err(CommandError::Empty);
        };

        let name = name
            .as_str()
            .ok_or(CommandError::InvalidName)?
            .to_ascii_uppercase();

        match name.as_str() {
            "ADD" => {
                let (key, value, ttl) = key_value_ttl("ADD", args)?;
                Ok(Command::Add { key, value, ttl })
            }
            "SET" => {
                let (key, value, ttl) = key_value_ttl("SET", args)?;
                Ok(Command::Set { key, value, ttl })
            }
            "GET" => Ok(Command::Get {
                key: single_key("GET", args)?,
            }),
            "DEL" => Ok(Command::Del {
                key: single_key("DEL", args)?,
            }),
            "PING" => match args {
                [] => Ok(Command::Ping(None)),
                [Frame::Bulk(msg)] => Ok(Command::Ping(Some(msg.clone()))),
                [Frame::Simple(msg)] => Ok(Command::Ping(Some(Bytes::from(msg.clone())))),
                _ => Err(CommandError::WrongArity("PING")),
            },
            "DBSIZE" => no_args("DBSIZE", args, Command::DbSize),
            "SAVE" => no_args("SAVE", args, Command::Save),
            "INFO" => Ok(Command::Info),
            "QUIT" => Ok(Command::Quit),
            _ => Err(CommandError::Unknown(name)),
        }
    }

    /// Upper-case command name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Add { .. } => "ADD",
            Command::Set { .. } => "SET",
            Command::Get { .. } => "GET",
            Command::Del { .. } => "DEL",
            Command::Ping(_) => "PING",
            Command::DbSize => "DBSIZE",
            Command::Save => "SAVE",
            Command::Info => "INFO",
            Command::Quit => "QUIT",
        }
    }
}

fn text(args: &[Frame], index: usize) -> Result<String, CommandError> {
    args[index]
        .as_str()
        .map(str::to_string)
        .ok_or(CommandError::InvalidArgument(index + 1))
}

fn single_key(name: &'static str, args: &[Frame]) -> Result<String, CommandError> {
    if args.len() != 1 {
        return Err(CommandError::WrongArity(name));
    }
    text(args, 0)
}

fn key_value_ttl(
    name: &'static str,
    args: &[Frame],
) -> Result<(String, String, String), CommandError> {
    match args.len() {
        2 => Ok((text(args, 0)?, text(args, 1)?, String::new())),
        3 => Ok((text(args, 0)?, text(args, 1)?, text(args, 2)?)),
        _ => Err(CommandError::WrongArity(name)),
    }
}

fn no_args(name: &'static str, args: &[Frame], command: Command) -> Result<Command, CommandError> {
    if args.is_empty() {
        Ok(command)
    } else {
        Err(CommandError::WrongArity(name))
    }
}
