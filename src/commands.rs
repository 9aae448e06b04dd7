//! Command line parsing and dispatch for client connections
//!
//! Each client line is one command. Words are split on whitespace; the first
//! word selects the command (case-insensitive).

use herder_core::prelude::*;
use herder_daemon::{
    watch_matching, Connection, Process, ProcessConfig, WatchOutcome, WatchSession,
};

use crate::server::ServerState;

const HELP: &str = "\
Commands:
    process <name> [option=value ...] <command> [args ...]
        Start a process. Options: uid, gid, working_dir, shell, output,
        stdout, stderr, watch, env.<NAME>, rlimit.<NAME>
    processes [pattern ...]
        List processes, optionally filtered by shell-style patterns
    watch <pattern> [pattern ...]
        Stream the output of matching processes
    help
        Show this text
    quit
        Close the connection";

/// A parsed `process` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub name: String,
    pub options: Vec<(String, String)>,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Process(ProcessRequest),
    Processes(Vec<String>),
    Watch(Vec<String>),
    Help,
    Quit,
}

/// What the connection should do after a command ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Send this text, then a newline
    Text(String),
    /// Close the connection
    Close,
}

impl Command {
    /// Parse one command line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(None);
        };
        let rest: Vec<String> = words.map(str::to_string).collect();

        let command = match command.to_ascii_lowercase().as_str() {
            "process" => Command::Process(parse_process(rest)?),
            "processes" => Command::Processes(rest),
            "watch" => Command::Watch(rest),
            "help" => Command::Help,
            "quit" | "exit" => Command::Quit,
            _ => {
                return Err(Error::UnknownCommand {
                    command: command.to_string(),
                })
            }
        };
        Ok(Some(command))
    }
}

/// `<name> [key=value ...] <command> [args ...]`
fn parse_process(words: Vec<String>) -> Result<ProcessRequest> {
    let mut words = words.into_iter().peekable();
    let name = words
        .next()
        .ok_or_else(|| Error::protocol("process requires a name"))?;

    let mut options = Vec::new();
    while let Some((key, value)) = words.peek().and_then(|word| split_option(word)) {
        options.push((key, value));
        words.next();
    }

    Ok(ProcessRequest {
        name,
        options,
        args: words.collect(),
    })
}

/// Split `key=value` where `key` looks like an option name
fn split_option(word: &str) -> Option<(String, String)> {
    let (key, value) = word.split_once('=')?;
    let is_key = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    is_key.then(|| (key.to_string(), value.to_string()))
}

/// Run `command` against the shared state. Watch commands stream over `conn`
/// before returning their final message.
pub async fn dispatch<C: Connection>(
    command: Command,
    state: &ServerState,
    conn: &mut C,
) -> Result<Reply> {
    let text = match command {
        Command::Process(request) => process(request, state, conn).await?,
        Command::Processes(patterns) => processes(&patterns, state).await?,
        Command::Watch(patterns) => watch(&patterns, state, conn).await?,
        Command::Help => HELP.to_string(),
        Command::Quit => return Ok(Reply::Close),
    };
    Ok(Reply::Text(text))
}

async fn process<C: Connection>(
    request: ProcessRequest,
    state: &ServerState,
    conn: &mut C,
) -> Result<String> {
    let output_size = state
        .settings
        .process
        .output_size()
        .unwrap_or(herder_daemon::DEFAULT_OUTPUT_SIZE);

    let mut watch = false;
    let mut builder = ProcessConfig::builder(request.name, request.args).output_size(output_size);
    for (key, value) in &request.options {
        if key == "watch" {
            watch = value
                .parse::<i64>()
                .map_err(|_| Error::config(format!("watch must be an integer, not {value:?}")))?
                != 0;
            continue;
        }
        builder = builder.option(key, value)?;
    }
    let config = builder.build()?;

    let process = {
        let mut registry = state.registry.lock().await;
        Process::spawn(config, &mut registry)?
    };

    if !watch {
        return Ok(process.to_string());
    }

    conn.send(format!("{process}\n").as_bytes()).await?;
    let name = process.name().to_string();
    let session = WatchSession::new(state.registry.clone(), [(name, process)])
        .with_poll_interval(state.settings.watch.poll_interval());
    Ok(session.run(conn).await.to_string())
}

async fn processes(patterns: &[String], state: &ServerState) -> Result<String> {
    let found = state.registry.lock().await.matching(patterns)?;
    let mut lines: Vec<String> = found
        .iter()
        .map(|(_, process)| process.to_string())
        .collect();
    lines.sort();
    Ok(lines.join("\n"))
}

async fn watch<C: Connection>(
    patterns: &[String],
    state: &ServerState,
    conn: &mut C,
) -> Result<String> {
    // A bare `watch` selects nothing rather than everything
    if patterns.is_empty() {
        return Ok(WatchOutcome::NothingToWatch.to_string());
    }

    let outcome = watch_matching(
        &state.registry,
        patterns,
        state.settings.watch.poll_interval(),
        conn,
    )
    .await?;
    Ok(outcome.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_parse_process_with_options() {
        let command = Command::parse(
            "PROCESS web uid=1001 env.PORT=8080 rlimit.nofile=512 /usr/bin/server --port=8080",
        )
        .unwrap()
        .unwrap();

        assert_eq!(
            command,
            Command::Process(ProcessRequest {
                name: "web".to_string(),
                options: vec![
                    ("uid".to_string(), "1001".to_string()),
                    ("env.PORT".to_string(), "8080".to_string()),
                    ("rlimit.nofile".to_string(), "512".to_string()),
                ],
                args: words("/usr/bin/server --port=8080"),
            })
        );
    }

    #[test]
    fn test_options_stop_at_first_non_option() {
        let command = Command::parse("process job /bin/echo a=b").unwrap().unwrap();
        let Command::Process(request) = command else {
            panic!("expected a process command");
        };
        assert!(request.options.is_empty());
        assert_eq!(request.args, words("/bin/echo a=b"));
    }

    #[test]
    fn test_parse_other_commands() {
        assert_eq!(Command::parse("   ").unwrap(), None);
        assert_eq!(
            Command::parse("processes web.*").unwrap(),
            Some(Command::Processes(words("web.*")))
        );
        assert_eq!(
            Command::parse("watch a b").unwrap(),
            Some(Command::Watch(words("a b")))
        );
        assert_eq!(Command::parse("help").unwrap(), Some(Command::Help));
        assert_eq!(Command::parse("exit").unwrap(), Some(Command::Quit));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Command::parse("launch x"),
            Err(Error::UnknownCommand { .. })
        ));
        assert!(matches!(
            Command::parse("process"),
            Err(Error::Protocol { .. })
        ));
    }

    #[test]
    fn test_split_option() {
        assert_eq!(
            split_option("output=1m"),
            Some(("output".to_string(), "1m".to_string()))
        );
        assert_eq!(split_option("=x"), None);
        assert_eq!(split_option("/bin/x=y"), None);
        assert_eq!(split_option("plain"), None);
    }
}
