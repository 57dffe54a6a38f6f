use crate::command::{arg_to_i64, arg_to_key, arg_to_upper};
use crate::error::{Error, Result};
use crate::resp::Reply;
use crate::store::tx::Tx;
use crate::types::rkey::KeyRepo;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCommand {
    Del { keys: Vec<String> },
    Exists { keys: Vec<String> },
    Expire { key: String, ttl: Duration },
    ExpireAt { key: String, at_millis: i64 },
    Persist { key: String },
    Ttl { key: String, millis: bool },
    Type { key: String },
    Keys { pattern: String },
    DbSize,
    FlushDb,
}

impl KeyCommand {
    pub fn parse(name: &'static str, args: &[Vec<u8>]) -> Result<Self> {
        let keys = || args.iter().map(|a| arg_to_key(a)).collect::<Vec<_>>();

        let cmd = match name {
            "DEL" | "UNLINK" => KeyCommand::Del { keys: keys() },
            "EXISTS" => KeyCommand::Exists { keys: keys() },
            "EXPIRE" | "PEXPIRE" => {
                let n = arg_to_i64(&args[1])?.max(0);
                let ms = if name == "EXPIRE" {
                    n.checked_mul(1000).ok_or_else(|| invalid_expire(name))?
                } else {
                    n
                };
                KeyCommand::Expire {
                    key: arg_to_key(&args[0]),
                    ttl: Duration::from_millis(ms.unsigned_abs()),
                }
            }
            "EXPIREAT" | "PEXPIREAT" => {
                let n = arg_to_i64(&args[1])?;
                let at_millis = if name == "EXPIREAT" {
                    n.checked_mul(1000).ok_or_else(|| invalid_expire(name))?
                } else {
                    n
                };
                KeyCommand::ExpireAt {
                    key: arg_to_key(&args[0]),
                    at_millis,
                }
            }
            "PERSIST" => KeyCommand::Persist {
                key: arg_to_key(&args[0]),
            },
            "TTL" | "PTTL" => KeyCommand::Ttl {
                key: arg_to_key(&args[0]),
                millis: name == "PTTL",
            },
            "TYPE" => KeyCommand::Type {
                key: arg_to_key(&args[0]),
            },
            "KEYS" => KeyCommand::Keys {
                pattern: arg_to_key(&args[0]),
            },
            "DBSIZE" => KeyCommand::DbSize,
            "FLUSHDB" => {
                if let Some(mode) = args.first() {
                    if !matches!(arg_to_upper(mode).as_str(), "ASYNC" | "SYNC") {
                        return Err(Error::Syntax);
                    }
                }
                KeyCommand::FlushDb
            }
            _ => return Err(Error::UnknownCommand(name.to_string())),
        };
        Ok(cmd)
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self,
            KeyCommand::Del { .. }
                | KeyCommand::Expire { .. }
                | KeyCommand::ExpireAt { .. }
                | KeyCommand::Persist { .. }
                | KeyCommand::FlushDb
        )
    }

    pub fn run(&self, tx: &Tx<'_>) -> Result<Reply> {
        let keys = KeyRepo::new(tx);
        let reply = match self {
            KeyCommand::Del { keys: names } => Reply::Integer(keys.delete(names)? as i64),
            KeyCommand::Exists { keys: names } => Reply::Integer(keys.exists(names)? as i64),
            KeyCommand::Expire { key, ttl } => Reply::bool(keys.expire(key, *ttl)?),
            KeyCommand::ExpireAt { key, at_millis } => {
                Reply::bool(keys.expire_at(key, *at_millis)?)
            }
            KeyCommand::Persist { key } => Reply::bool(keys.persist(key)?),
            KeyCommand::Ttl { key, millis } => {
                let ttl = keys.ttl(key)?;
                Reply::Integer(if *millis { ttl.millis() } else { ttl.secs() })
            }
            KeyCommand::Type { key } => {
                Reply::simple(keys.key_type(key)?.map_or("none", |tag| tag.type_name()))
            }
            KeyCommand::Keys { pattern } => {
                Reply::Array(keys.keys(pattern)?.into_iter().map(Reply::bulk).collect())
            }
            KeyCommand::DbSize => Reply::Integer(keys.len()? as i64),
            KeyCommand::FlushDb => {
                keys.flush()?;
                Reply::ok()
            }
        };
        Ok(reply)
    }
}

fn invalid_expire(command: &str) -> Error {
    Error::InvalidExpire(command.to_lowercase())
}
