//! CLI utilities for Mishmash.
//!
//! The utilities present in this module can be used to create an interactive
//! client for a Mishmash server.
use std::{
    io::{BufRead, Write},
    net::SocketAddr,
};

use crate::{
    builder::SetBuilder,
    client::{MutationClient, StreamClient},
    command::{Command, CommandError},
    config::ConversationConfig,
    data::{Instance, MutationType, Setup},
    error::MishmashError,
};

/// Prompt user for a valid command.
///
/// End of input reads as [`Command::Exit`].
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> Result<Command, CommandError>
where
    R: BufRead,
    W: Write,
{
    let mut s = String::default();
    write!(&mut writer, "> ").map_err(|e| CommandError::Io(e.to_string()))?;
    writer.flush().map_err(|e| CommandError::Io(e.to_string()))?;

    let read = reader
        .read_line(&mut s)
        .map_err(|e| CommandError::Io(e.to_string()))?;
    if read == 0 {
        return Ok(Command::Exit);
    }

    s.as_str().try_into()
}

fn instance_setup(
    instance: Instance,
    mutation_type: Option<MutationType>,
) -> Result<Setup, MishmashError> {
    let mut builder = SetBuilder::new();
    builder
        .enter_intersection()?
        .add_instance(instance)?
        .leave_intersection()?;
    if let Some(mutation_type) = mutation_type {
        builder.set_mutation_type(mutation_type);
    }
    builder.build()
}

/// Runs one command against the server at `address`, printing results to
/// `writer`. Returns `false` once the session should end.
pub async fn execute<W: Write>(
    command: Command,
    address: SocketAddr,
    config: &ConversationConfig,
    mut writer: W,
) -> Result<bool, MishmashError> {
    match command {
        Command::Exit => Ok(false),
        Command::Get { instance } => {
            let setup = instance_setup(instance, None)?;
            let mut client = StreamClient::connect(address, setup, config).await?;

            let mut count = 0;
            while let Some(point) = client.get().await? {
                writeln!(writer, "{point}")
                    .map_err(|e| MishmashError::Internal(e.to_string()))?;
                count += 1;
            }
            writeln!(writer, "({count} point(s))")
                .map_err(|e| MishmashError::Internal(e.to_string()))?;
            client.close().await?;
            Ok(true)
        }
        Command::Put { instance, point } => {
            let setup = instance_setup(instance, Some(MutationType::Overwrite))?;
            let client = MutationClient::connect(address, setup, config).await?;
            client.put(point).await?;
            client.close().await?;
            writeln!(writer, "ok").map_err(|e| MishmashError::Internal(e.to_string()))?;
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_prints_correctly() {
        let input = b".exit\n";
        let mut output = Vec::new();

        let cmd = prompt(&input[..], &mut output).unwrap();
        assert_eq!(cmd, Command::Exit);

        let output = String::from_utf8(output).expect("not valid UTF-8");
        assert_eq!("> ", output);
    }

    #[test]
    fn prompt_end_of_input_exits() {
        let input = b"";
        let mut output = Vec::new();

        let res = prompt(&input[..], &mut output).unwrap();
        assert_eq!(Command::Exit, res);
    }

    #[test]
    fn prompt_unrecognized_command() {
        let input = b".something_wrong\n";
        let mut output = Vec::new();

        let err = prompt(&input[..], &mut output).unwrap_err();
        assert_eq!(err.to_string(), "unrecognized command '.something_wrong'");
    }

    #[test]
    fn instance_setups() {
        let setup = instance_setup("A".into(), Some(MutationType::Append)).unwrap();
        assert_eq!(setup.single_instance(), Some(&Instance::from("A")));
        assert_eq!(setup.mutation_type, Some(MutationType::Append));
    }
}
