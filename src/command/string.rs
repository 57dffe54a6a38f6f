use crate::command::{arg_to_f64, arg_to_i64, arg_to_key, arg_to_upper};
use crate::error::{Error, Result};
use crate::resp::Reply;
use crate::store::tx::Tx;
use crate::types::rstring::{SetOptions, SetTtl, StringRepo};
use crate::types::value::{Value, format_float};
use std::time::Duration;

/// A parsed string command.
#[derive(Debug, Clone, PartialEq)]
pub enum StringCommand {
    Get { key: String },
    Set { key: String, value: Value, opts: SetOptions },
    SetNx { key: String, value: Value },
    SetEx { key: String, value: Value, ttl: Duration },
    GetSet { key: String, value: Value },
    GetDel { key: String },
    MGet { keys: Vec<String> },
    MSet { items: Vec<(String, Value)> },
    MSetNx { items: Vec<(String, Value)> },
    IncrBy { key: String, delta: i64 },
    IncrByFloat { key: String, delta: f64 },
    Append { key: String, value: Value },
    StrLen { key: String },
    GetRange { key: String, start: i64, end: i64 },
    SetRange { key: String, offset: usize, value: Value },
}

impl StringCommand {
    /// Parse arguments of a command whose arity has already been checked.
    pub fn parse(name: &'static str, args: &[Vec<u8>]) -> Result<Self> {
        let key = || arg_to_key(&args[0]);
        let value = |i: usize| Value::from(args[i].as_slice());

        let cmd = match name {
            "GET" => StringCommand::Get { key: key() },
            "SET" => StringCommand::Set {
                key: key(),
                value: value(1),
                opts: parse_set_options(&args[2..])?,
            },
            "SETNX" => StringCommand::SetNx {
                key: key(),
                value: value(1),
            },
            "SETEX" | "PSETEX" => {
                let n = arg_to_i64(&args[1])?;
                let ttl = if name == "SETEX" {
                    ttl_from_secs(n, name)?
                } else {
                    ttl_from_millis(n)
                };
                StringCommand::SetEx {
                    key: key(),
                    value: value(2),
                    ttl,
                }
            }
            "GETSET" => StringCommand::GetSet {
                key: key(),
                value: value(1),
            },
            "GETDEL" => StringCommand::GetDel { key: key() },
            "MGET" => StringCommand::MGet {
                keys: args.iter().map(|a| arg_to_key(a)).collect(),
            },
            "MSET" | "MSETNX" => {
                if args.len() % 2 != 0 {
                    return Err(Error::InvalidArgNum(name.to_lowercase()));
                }
                let items = args
                    .chunks_exact(2)
                    .map(|pair| (arg_to_key(&pair[0]), Value::from(pair[1].as_slice())))
                    .collect();
                if name == "MSET" {
                    StringCommand::MSet { items }
                } else {
                    StringCommand::MSetNx { items }
                }
            }
            "INCR" => StringCommand::IncrBy {
                key: key(),
                delta: match args.get(1) {
                    Some(arg) => arg_to_i64(arg)?,
                    None => 1,
                },
            },
            "INCRBY" => StringCommand::IncrBy {
                key: key(),
                delta: arg_to_i64(&args[1])?,
            },
            "DECR" => StringCommand::IncrBy {
                key: key(),
                delta: -1,
            },
            "DECRBY" => StringCommand::IncrBy {
                key: key(),
                delta: arg_to_i64(&args[1])?
                    .checked_neg()
                    .ok_or(Error::Overflow)?,
            },
            "INCRBYFLOAT" => StringCommand::IncrByFloat {
                key: key(),
                delta: arg_to_f64(&args[1])?,
            },
            "APPEND" => StringCommand::Append {
                key: key(),
                value: value(1),
            },
            "STRLEN" => StringCommand::StrLen { key: key() },
            "GETRANGE" | "SUBSTR" => StringCommand::GetRange {
                key: key(),
                start: arg_to_i64(&args[1])?,
                end: arg_to_i64(&args[2])?,
            },
            "SETRANGE" => {
                let offset = usize::try_from(arg_to_i64(&args[1])?)
                    .map_err(|_| Error::OffsetOutOfRange)?;
                StringCommand::SetRange {
                    key: key(),
                    offset,
                    value: value(2),
                }
            }
            _ => return Err(Error::UnknownCommand(name.to_string())),
        };
        Ok(cmd)
    }

    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            StringCommand::Get { .. }
                | StringCommand::MGet { .. }
                | StringCommand::StrLen { .. }
                | StringCommand::GetRange { .. }
        )
    }

    pub fn run(&self, tx: &Tx<'_>) -> Result<Reply> {
        let strings = StringRepo::new(tx);
        let reply = match self {
            StringCommand::Get { key } => match strings.get(key) {
                Ok(value) => Reply::Bulk(value.into_bytes()),
                Err(Error::NotFound) => Reply::Nil,
                Err(e) => return Err(e),
            },
            StringCommand::Set { key, value, opts } => {
                let out = strings.set_with(key, value.clone(), *opts)?;
                if opts.get {
                    Reply::bulk_or_nil(out.prev.map(Value::into_bytes))
                } else if out.created || out.updated {
                    Reply::ok()
                } else {
                    Reply::Nil
                }
            }
            StringCommand::SetNx { key, value } => {
                Reply::bool(strings.set_not_exists(key, value.clone(), Duration::ZERO)?)
            }
            StringCommand::SetEx { key, value, ttl } => {
                strings.set_expires(key, value.clone(), *ttl)?;
                Reply::ok()
            }
            StringCommand::GetSet { key, value } => {
                let prev = strings.get_set(key, value.clone(), Duration::ZERO)?;
                Reply::bulk_or_nil(prev.map(Value::into_bytes))
            }
            StringCommand::GetDel { key } => {
                Reply::bulk_or_nil(strings.get_del(key)?.map(Value::into_bytes))
            }
            StringCommand::MGet { keys } => {
                let found = strings.get_many(keys)?;
                let items = keys
                    .iter()
                    .map(|key| Reply::bulk_or_nil(found.get(key).map(Value::as_bytes)))
                    .collect();
                Reply::Array(items)
            }
            StringCommand::MSet { items } => {
                strings.set_many(items)?;
                Reply::ok()
            }
            StringCommand::MSetNx { items } => Reply::bool(strings.set_many_nx(items)?),
            StringCommand::IncrBy { key, delta } => Reply::Integer(strings.incr(key, *delta)?),
            StringCommand::IncrByFloat { key, delta } => {
                Reply::bulk(format_float(strings.incr_float(key, *delta)?))
            }
            StringCommand::Append { key, value } => {
                Reply::Integer(strings.append(key, value.as_bytes())? as i64)
            }
            StringCommand::StrLen { key } => Reply::Integer(strings.strlen(key)? as i64),
            StringCommand::GetRange { key, start, end } => {
                Reply::Bulk(strings.get_range(key, *start, *end)?.into_bytes())
            }
            StringCommand::SetRange { key, offset, value } => {
                Reply::Integer(strings.set_range(key, *offset, value.as_bytes())? as i64)
            }
        };
        Ok(reply)
    }
}

/// Parse SET options: EX/PX/EXAT/PXAT/KEEPTTL, NX/XX and GET.
fn parse_set_options(args: &[Vec<u8>]) -> Result<SetOptions> {
    let mut opts = SetOptions::new();
    let mut has_ttl = false;
    let mut has_cond = false;

    let mut i = 0;
    while i < args.len() {
        let opt = arg_to_upper(&args[i]);
        match opt.as_str() {
            "NX" | "XX" => {
                if has_cond {
                    return Err(Error::Syntax);
                }
                has_cond = true;
                opts = if opt == "NX" {
                    opts.if_not_exists()
                } else {
                    opts.if_exists()
                };
            }
            "GET" => opts = opts.get(),
            "KEEPTTL" => {
                if has_ttl {
                    return Err(Error::Syntax);
                }
                has_ttl = true;
                opts = opts.keep_ttl();
            }
            "EX" | "PX" | "EXAT" | "PXAT" => {
                if has_ttl {
                    return Err(Error::Syntax);
                }
                has_ttl = true;
                i += 1;
                let n = arg_to_i64(args.get(i).ok_or(Error::Syntax)?)?;
                opts.ttl = match opt.as_str() {
                    "EX" => SetTtl::After(ttl_from_secs(n, "set")?),
                    "PX" => SetTtl::After(ttl_from_millis(n)),
                    "EXAT" if n > 0 => {
                        SetTtl::At(n.checked_mul(1000).ok_or_else(|| invalid_expire("set"))?)
                    }
                    "PXAT" if n > 0 => SetTtl::At(n),
                    _ => return Err(invalid_expire("set")),
                };
            }
            _ => return Err(Error::Syntax),
        }
        i += 1;
    }
    Ok(opts)
}

/// Relative TTL in seconds. Zero or negative means no expiry.
fn ttl_from_secs(secs: i64, command: &str) -> Result<Duration> {
    let ms = secs
        .max(0)
        .checked_mul(1000)
        .ok_or_else(|| invalid_expire(command))?;
    Ok(ttl_from_millis(ms))
}

fn ttl_from_millis(ms: i64) -> Duration {
    Duration::from_millis(u64::try_from(ms).unwrap_or(0))
}

fn invalid_expire(command: &str) -> Error {
    Error::InvalidExpire(command.to_lowercase())
}
