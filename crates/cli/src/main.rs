use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use tracing::{debug, info};

use rivet_common::{DEFAULT_BUCKET, DEFAULT_CACHE_SIZE, DEFAULT_DB_FILE};
use rivet_storage::{Registry, RegistryConfig, Rivet};

mod command;

use command::{Cmd, Line, execute, format_reply};

#[derive(Parser, Debug)]
#[command(name = "rivet", about = "Rivet: key-value store embarcado com TTL")]
struct Args {
    /// Arquivo do banco (criado se não existir)
    #[arg(long, value_name = "FILE", default_value = DEFAULT_DB_FILE)]
    db: PathBuf,
    #[arg(long, short, default_value = DEFAULT_BUCKET)]
    bucket: String,
    /// Cache de páginas da engine, em bytes
    #[arg(long, default_value_t = DEFAULT_CACHE_SIZE)]
    cache_size: usize,

    /// Comando para executar diretamente (sem comando: modo interativo)
    #[command(subcommand)]
    command: Option<Cmd>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rivet_cli=info".into()),
        )
        .init();

    let args = Args::parse();
    let registry = Registry::with_config(RegistryConfig {
        cache_size: args.cache_size,
    });
    let db = Rivet::open(&registry, &args.db, &args.bucket)?;

    // Modo comando único (via argumentos)
    if let Some(cmd) = args.command {
        println!("{}", format_reply(&execute(&db, cmd)?));
        return Ok(());
    }

    info!(
        path = %db.path().display(),
        bucket = db.name(),
        cache_size = registry.config().cache_size,
        "banco aberto"
    );

    let stdin = io::stdin();
    let mut input = String::new();

    loop {
        print!("rivet> ");
        io::stdout().flush()?;

        input.clear();
        if stdin.read_line(&mut input)? == 0 {
            break; // EOF
        }

        let line = input.trim();
        if line.is_empty() {
            continue;
        }

        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            break;
        }

        let tokens = tokenize(line);
        if tokens.is_empty() {
            continue;
        }

        let cmd = match Line::parse_tokens(tokens) {
            Ok(cmd) => cmd,
            Err(e) => {
                println!("(error) {}", e.to_string().lines().next().unwrap_or_default());
                continue;
            }
        };

        debug!(?cmd, "executando");
        match execute(&db, cmd) {
            Ok(reply) => println!("{}", format_reply(&reply)),
            Err(e) => println!("(error) {e}"),
        }
    }

    db.close();
    Ok(())
}

/// Tokeniza a linha de input com suporte a strings quoted.
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    let mut quote_char = '"';
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quote {
            if c == quote_char {
                in_quote = false;
            } else if c == '\\' {
                match chars.peek() {
                    Some(&(next @ ('\\' | '"' | '\''))) => {
                        current.push(next);
                        chars.next();
                    }
                    Some(&'n') => {
                        current.push('\n');
                        chars.next();
                    }
                    Some(&'t') => {
                        current.push('\t');
                        chars.next();
                    }
                    _ => current.push(c),
                }
            } else {
                current.push(c);
            }
        } else if c == '"' || c == '\'' {
            in_quote = true;
            quote_char = c;
        } else if c.is_whitespace() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}
