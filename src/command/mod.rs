pub mod connection;
pub mod key;
pub mod string;

use crate::error::{Error, Result};
use crate::resp::Reply;
use crate::store::Store;
use crate::store::tx::Tx;
use crate::types::value::{parse_f64, parse_i64};

use connection::ConnectionCommand;
use key::KeyCommand;
use string::StringCommand;

/// Arity constraints for a command, counting arguments after the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandArity {
    Exact(usize),
    AtLeast(usize),
    Between(usize, usize),
}

impl CommandArity {
    pub fn accepts(&self, n: usize) -> bool {
        match *self {
            CommandArity::Exact(want) => n == want,
            CommandArity::AtLeast(min) => n >= min,
            CommandArity::Between(min, max) => (min..=max).contains(&n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandGroup {
    Connection,
    String,
    Key,
}

/// One entry of the command table.
#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    /// Canonical uppercase command name.
    pub name: &'static str,
    pub arity: CommandArity,
    pub group: CommandGroup,
}

const fn spec(name: &'static str, arity: CommandArity, group: CommandGroup) -> CommandSpec {
    CommandSpec { name, arity, group }
}

use CommandArity::{AtLeast, Between, Exact};
use CommandGroup as G;

pub static COMMANDS: &[CommandSpec] = &[
    spec("PING", Between(0, 1), G::Connection),
    spec("ECHO", Exact(1), G::Connection),
    spec("QUIT", Exact(0), G::Connection),
    spec("GET", Exact(1), G::String),
    spec("SET", AtLeast(2), G::String),
    spec("SETNX", Exact(2), G::String),
    spec("SETEX", Exact(3), G::String),
    spec("PSETEX", Exact(3), G::String),
    spec("GETSET", Exact(2), G::String),
    spec("GETDEL", Exact(1), G::String),
    spec("MGET", AtLeast(1), G::String),
    spec("MSET", AtLeast(2), G::String),
    spec("MSETNX", AtLeast(2), G::String),
    spec("INCR", Between(1, 2), G::String),
    spec("INCRBY", Exact(2), G::String),
    spec("DECR", Exact(1), G::String),
    spec("DECRBY", Exact(2), G::String),
    spec("INCRBYFLOAT", Exact(2), G::String),
    spec("APPEND", Exact(2), G::String),
    spec("STRLEN", Exact(1), G::String),
    spec("GETRANGE", Exact(3), G::String),
    spec("SUBSTR", Exact(3), G::String),
    spec("SETRANGE", Exact(3), G::String),
    spec("DEL", AtLeast(1), G::Key),
    spec("UNLINK", AtLeast(1), G::Key),
    spec("EXISTS", AtLeast(1), G::Key),
    spec("EXPIRE", Exact(2), G::Key),
    spec("PEXPIRE", Exact(2), G::Key),
    spec("EXPIREAT", Exact(2), G::Key),
    spec("PEXPIREAT", Exact(2), G::Key),
    spec("PERSIST", Exact(1), G::Key),
    spec("TTL", Exact(1), G::Key),
    spec("PTTL", Exact(1), G::Key),
    spec("TYPE", Exact(1), G::Key),
    spec("KEYS", Exact(1), G::Key),
    spec("DBSIZE", Exact(0), G::Key),
    spec("FLUSHDB", Between(0, 1), G::Key),
];

/// Look up a command by name, case-insensitively.
pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|spec| spec.name.eq_ignore_ascii_case(name))
}

/// A request as it arrived: the command name and its raw arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    /// Canonical uppercase name.
    pub name: &'static str,
    pub args: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    Connection(ConnectionCommand),
    String(StringCommand),
    Key(KeyCommand),
}

/// A validated command, ready to execute once.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub frame: CommandFrame,
    pub kind: CommandKind,
}

impl Command {
    /// Validate name and arity, then parse the arguments.
    pub fn parse(mut request: Vec<Vec<u8>>) -> Result<Command> {
        if request.is_empty() {
            return Err(Error::UnknownCommand(String::new()));
        }
        let args = request.split_off(1);
        let name = String::from_utf8_lossy(&request[0]).into_owned();
        let spec = lookup(&name).ok_or(Error::UnknownCommand(name))?;
        if !spec.arity.accepts(args.len()) {
            return Err(Error::InvalidArgNum(spec.name.to_lowercase()));
        }

        let kind = match spec.group {
            CommandGroup::Connection => {
                CommandKind::Connection(ConnectionCommand::parse(spec.name, &args)?)
            }
            CommandGroup::String => CommandKind::String(StringCommand::parse(spec.name, &args)?),
            CommandGroup::Key => CommandKind::Key(KeyCommand::parse(spec.name, &args)?),
        };
        Ok(Command {
            frame: CommandFrame {
                name: spec.name,
                args,
            },
            kind,
        })
    }

    pub fn name(&self) -> &'static str {
        self.frame.name
    }

    /// Whether executing this command touches the store.
    pub fn uses_store(&self) -> bool {
        !matches!(self.kind, CommandKind::Connection(_))
    }

    pub fn is_quit(&self) -> bool {
        matches!(self.kind, CommandKind::Connection(ConnectionCommand::Quit))
    }
}

/// Runs commands against the store, one transaction per command.
#[derive(Clone)]
pub struct Dispatcher {
    store: Store,
}

impl Dispatcher {
    pub fn new(store: Store) -> Self {
        Dispatcher { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Execute a command. Store commands commit on success and roll back on
    /// any error; the error is returned for the caller to report.
    pub fn execute(&self, cmd: &Command) -> Result<Reply> {
        match &cmd.kind {
            CommandKind::Connection(c) => Ok(c.run()),
            CommandKind::String(c) => self.in_tx(c.is_write(), |tx| c.run(tx)),
            CommandKind::Key(c) => self.in_tx(c.is_write(), |tx| c.run(tx)),
        }
    }

    /// Parse and execute a raw request, turning any failure into an error reply.
    pub fn dispatch(&self, request: Vec<Vec<u8>>) -> Reply {
        match Command::parse(request).and_then(|cmd| self.execute(&cmd)) {
            Ok(reply) => reply,
            Err(e) => Reply::from(&e),
        }
    }

    fn in_tx<F>(&self, write: bool, f: F) -> Result<Reply>
    where
        F: FnOnce(&Tx<'_>) -> Result<Reply>,
    {
        if write {
            self.store.update(f)
        } else {
            self.store.view(f)
        }
    }
}

/// Keys are stored as text; invalid UTF-8 is replaced.
pub(crate) fn arg_to_key(arg: &[u8]) -> String {
    String::from_utf8_lossy(arg).into_owned()
}

pub(crate) fn arg_to_i64(arg: &[u8]) -> Result<i64> {
    parse_i64(arg).ok_or(Error::NotInteger)
}

/// Parse a float argument. Accepts `inf`, rejects NaN.
pub(crate) fn arg_to_f64(arg: &[u8]) -> Result<f64> {
    parse_f64(arg).ok_or(Error::NotFloat)
}

pub(crate) fn arg_to_upper(arg: &[u8]) -> String {
    String::from_utf8_lossy(arg).to_uppercase()
}
