//! Interactive client commands.
//!
//! This module defines the [`Command`] enum, the commands a user can type
//! into the interactive client, and how they are parsed from a line of input.
//!
//! # Overview
//! The supported commands are:
//!
//! - `.exit`: Close the session.
//! - `get <instance>`: Stream every data point of an instance.
//! - `put <instance> <path> <value>`: Overwrite one data point of an instance.
//!
//! A path is a dot separated list of members, where `[n]` selects an index,
//! e.g. `tags.[0].name`. A value is `null`, `true`, `false`, a number, or
//! anything else which is taken as a string.
//!
//! # Example
//! ```rust
//! use mishmash::command::Command;
//!
//! let cmd: Command = "get A".try_into().unwrap();
//! assert_eq!(cmd, Command::Get { instance: "A".into() });
//! ```
use thiserror::Error;

use crate::data::{DataPoint, Decimal, Instance, Key, Value};

/// List of possible errors when reading a command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("unrecognized command '{0}'")]
    UnrecognizedCommand(String),

    #[error("invalid '{command}' command, {reason}")]
    InvalidCommandArguments { command: String, reason: String },

    #[error("failed to read command: {0}")]
    Io(String),

    #[error("no command provided")]
    Empty,
}

/// User supplied commands for the interactive client.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Terminate the session.
    Exit,
    /// Read every point of an instance.
    Get { instance: Instance },
    /// Write a single point of an instance.
    Put { instance: Instance, point: DataPoint },
}

impl TryInto<Command> for &str {
    type Error = CommandError;

    fn try_into(self) -> Result<Command, Self::Error> {
        let mut parts = self.split_whitespace();
        let Some(name) = parts.next() else {
            return Err(CommandError::Empty);
        };

        match name {
            ".exit" => Ok(Command::Exit),
            "get" => {
                let instance = parts
                    .next()
                    .ok_or_else(|| invalid("get", "requires an instance. Example: get A"))?;
                Ok(Command::Get {
                    instance: instance.into(),
                })
            }
            "put" => {
                let (Some(instance), Some(path)) = (parts.next(), parts.next()) else {
                    return Err(invalid(
                        "put",
                        "requires instance, path and value. Example: put A size 5",
                    ));
                };
                let value = parts.collect::<Vec<_>>().join(" ");
                if value.is_empty() {
                    return Err(invalid("put", "requires a value"));
                }

                let instance = Instance::from(instance);
                let keys = parse_path(path, &instance)?;
                Ok(Command::Put {
                    point: DataPoint::new(keys, parse_value(&value)),
                    instance,
                })
            }
            s => Err(CommandError::UnrecognizedCommand(s.to_string())),
        }
    }
}

fn invalid(command: &str, reason: &str) -> CommandError {
    CommandError::InvalidCommandArguments {
        command: command.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_path(path: &str, instance: &Instance) -> Result<Vec<Key>, CommandError> {
    path.split('.')
        .map(|segment| {
            if segment.is_empty() {
                return Err(invalid("put", "path segments cannot be empty"));
            }
            match segment.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                Some(index) => index
                    .parse::<i64>()
                    .map(|i| Key::index(i, instance.clone()))
                    .map_err(|_| invalid("put", "index segments must be integers. Example: [0]")),
                None => Ok(Key::member(segment, instance.clone())),
            }
        })
        .collect()
}

fn parse_value(value: &str) -> Value {
    match value {
        "null" => Value::null(),
        "true" => Value::boolean(true),
        "false" => Value::boolean(false),
        s => match Decimal::parse(s) {
            Ok(d) => Value::decimal(d.narrowest()),
            Err(_) => Value::string(s),
        },
    }
}
