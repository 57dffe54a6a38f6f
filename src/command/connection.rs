use crate::error::{Error, Result};
use crate::resp::Reply;

/// Commands answered without touching the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionCommand {
    Ping { message: Option<Vec<u8>> },
    Echo { message: Vec<u8> },
    Quit,
}

impl ConnectionCommand {
    pub fn parse(name: &'static str, args: &[Vec<u8>]) -> Result<Self> {
        match name {
            "PING" => Ok(ConnectionCommand::Ping {
                message: args.first().cloned(),
            }),
            "ECHO" => Ok(ConnectionCommand::Echo {
                message: args[0].clone(),
            }),
            "QUIT" => Ok(ConnectionCommand::Quit),
            _ => Err(Error::UnknownCommand(name.to_string())),
        }
    }

    pub fn run(&self) -> Reply {
        match self {
            ConnectionCommand::Ping { message: None } => Reply::simple("PONG"),
            ConnectionCommand::Ping { message: Some(msg) } => Reply::bulk(msg.clone()),
            ConnectionCommand::Echo { message } => Reply::bulk(message.clone()),
            ConnectionCommand::Quit => Reply::ok(),
        }
    }
}
