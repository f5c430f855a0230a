//! Input line parsing.

use crate::domain::{MessageId, RoomId};

use super::error::CommandError;

pub const HELP: &str = "\
Commands:
  /join <room_id>            switch to a room
  /leave                     leave the active room
  /focus                     mark the active room as seen
  /reply <message_id> <text> reply to a message
  /quit                      exit
Any other line is sent to the active room.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join(RoomId),
    Leave,
    Focus,
    Reply { to: MessageId, content: String },
    Help,
    Quit,
    /// Plain text for the active room
    Send(String),
}

pub fn parse(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Send(line.to_string()));
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    match name {
        "join" => {
            let room = RoomId::new(args).map_err(|_| CommandError::Usage("/join <room_id>"))?;
            if args.contains(char::is_whitespace) {
                return Err(CommandError::Usage("/join <room_id>"));
            }
            Ok(Command::Join(room))
        }
        "leave" => Ok(Command::Leave),
        "focus" => Ok(Command::Focus),
        "reply" => {
            const USAGE: &str = "/reply <message_id> <text>";
            let (id, content) = args
                .split_once(char::is_whitespace)
                .ok_or(CommandError::Usage(USAGE))?;
            let to = MessageId::new(id).map_err(|_| CommandError::Usage(USAGE))?;
            Ok(Command::Reply {
                to,
                content: content.trim().to_string(),
            })
        }
        "help" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}
