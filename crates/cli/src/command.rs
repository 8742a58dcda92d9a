use std::time::{Duration, SystemTime};

use bytes::Bytes;
use clap::{Parser, Subcommand};

use rivet_storage::Rivet;

/// Verbos aceitos tanto na linha de comando quanto no REPL.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Cmd {
    /// Lê o valor de uma chave
    Get { key: String },
    /// Grava um valor (sem TTL, a menos que --ttl-ms seja informado)
    Set {
        key: String,
        value: String,
        #[arg(long)]
        ttl_ms: Option<u64>,
    },
    /// Remove uma chave
    Del { key: String },
    /// 1 se a chave existe e não expirou
    Exists { key: String },
    /// Define TTL em milissegundos; negativo expira imediatamente
    Expire {
        key: String,
        #[arg(allow_hyphen_values = true)]
        ms: i64,
    },
    /// Remove o TTL de uma chave
    Persist { key: String },
    /// Milissegundos restantes (-1 sem TTL, -2 inexistente)
    Ttl { key: String },
    /// Lista as chaves vivas do bucket
    Keys,
    /// Lista o índice de expiração do arquivo inteiro
    Expirations,
}

/// Uma linha do REPL, interpretada com o mesmo parser dos argumentos.
#[derive(Parser, Debug)]
#[command(no_binary_name = true, disable_help_flag = true)]
pub struct Line {
    #[command(subcommand)]
    pub cmd: Cmd,
}

impl Line {
    pub fn parse_tokens(mut tokens: Vec<String>) -> Result<Cmd, clap::Error> {
        if let Some(verb) = tokens.first_mut() {
            *verb = verb.to_lowercase();
        }
        Line::try_parse_from(tokens).map(|line| line.cmd)
    }
}

/// Resposta de um comando, no estilo redis-cli.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ok,
    Nil,
    Integer(i64),
    Bulk(Bytes),
    Array(Vec<Bytes>),
    Lines(Vec<String>),
}

pub fn execute(db: &Rivet, cmd: Cmd) -> anyhow::Result<Reply> {
    let reply = match cmd {
        Cmd::Get { key } => match db.get_bytes(&key)? {
            Some(value) => Reply::Bulk(value),
            None => Reply::Nil,
        },
        Cmd::Set { key, value, ttl_ms } => {
            match ttl_ms {
                Some(ms) => db.set_x(&key, &value, Duration::from_millis(ms))?,
                None => db.set(&key, &value)?,
            }
            Reply::Ok
        }
        Cmd::Del { key } => Reply::Integer(db.delete(&key)? as i64),
        Cmd::Exists { key } => Reply::Integer(db.exists(&key)? as i64),
        Cmd::Expire { key, ms } => {
            let set = if ms >= 0 {
                db.expire(&key, Duration::from_millis(ms as u64))?
            } else {
                db.expire_at(&key, SystemTime::now() - Duration::from_millis(ms.unsigned_abs()))?
            };
            Reply::Integer(set as i64)
        }
        Cmd::Persist { key } => Reply::Integer(db.persist(&key)? as i64),
        Cmd::Ttl { key } => Reply::Integer(db.ttl(&key)?.as_millis()),
        Cmd::Keys => Reply::Array(db.keys_bytes()?),
        Cmd::Expirations => {
            let now = SystemTime::now();
            let lines = db
                .expirations()?
                .into_iter()
                .map(|entry| {
                    let state = match entry.at.duration_since(now) {
                        Ok(d) => format!("{}ms", d.as_millis()),
                        Err(_) => "vencido".to_string(),
                    };
                    format!(
                        "{}\t{}\t{state}",
                        entry.bucket,
                        String::from_utf8_lossy(&entry.key)
                    )
                })
                .collect();
            Reply::Lines(lines)
        }
    };
    Ok(reply)
}

/// Formata a resposta para exibição humana.
pub fn format_reply(reply: &Reply) -> String {
    match reply {
        Reply::Ok => "OK".to_string(),
        Reply::Nil => "(nil)".to_string(),
        Reply::Integer(n) => format!("(integer) {n}"),
        Reply::Bulk(data) => format_bulk(data),
        Reply::Array(items) => {
            if items.is_empty() {
                return "(empty array)".to_string();
            }
            items
                .iter()
                .enumerate()
                .map(|(i, item)| format!("{}) {}", i + 1, format_bulk(item)))
                .collect::<Vec<_>>()
                .join("\n")
        }
        Reply::Lines(lines) => {
            if lines.is_empty() {
                return "(empty)".to_string();
            }
            lines.join("\n")
        }
    }
}

fn format_bulk(data: &Bytes) -> String {
    match std::str::from_utf8(data) {
        Ok(s) => format!("\"{s}\""),
        Err(_) => format!("(binary) {} bytes", data.len()),
    }
}
