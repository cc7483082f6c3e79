//! Interactive REPL for friendrec.
//!
//! Type a student id to see their recommended friends. History is kept in
//! `~/.friendrec_history`.

use anyhow::{Context, Result};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{CompletionType, Config, EditMode, Editor};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{find_closest_match, format_did_you_mean};
use crate::model::UserId;
use crate::{RecommendationEngine, UserDirectory};

const COMMANDS: &[&str] = &["rec", "info", "stats", "help", "quit", "exit"];

/// REPL session state.
pub struct ReplSession {
    engine: RecommendationEngine,
    directory: UserDirectory,
    default_top_k: usize,
    last_query: Option<i64>,
    history_path: PathBuf,
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Recommend { id: i64, top_k: Option<usize> },
    Info { id: i64 },
    Stats,
    Help { command: Option<String> },
    Quit,
}

/// Run the REPL session.
///
/// # Errors
///
/// Returns an error if readline setup or history persistence fails.
pub fn run(engine: RecommendationEngine, directory: UserDirectory, default_top_k: usize) -> Result<()> {
    let config = Config::builder()
        .history_ignore_space(true)
        .history_ignore_dups(true)?
        .completion_type(CompletionType::List)
        .edit_mode(EditMode::Emacs)
        .build();

    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;

    let history_path = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".friendrec_history");

    let mut session = ReplSession {
        engine,
        directory,
        default_top_k,
        last_query: None,
        history_path,
    };

    let _ = rl.load_history(&session.history_path);

    info!("Starting friendrec REPL session");
    println!(
        "{}",
        "friendrec interactive mode. Enter a student id, 'help' for commands, 'quit' to exit."
            .cyan()
    );
    println!();

    loop {
        let prompt = session.format_prompt();
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                if !matches!(line, "quit" | "exit" | "q") {
                    rl.add_history_entry(line)?;
                }

                debug!(command = %line, "REPL command");
                match session.execute(line) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => {
                        warn!(error = %e, "REPL command failed");
                        eprintln!("{}: {e}", "Error".red());
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
            }
            Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(e) => {
                return Err(anyhow::anyhow!(e)).context("Readline failed");
            }
        }
    }

    rl.save_history(&session.history_path)?;
    info!("Ended friendrec REPL session");
    println!("Goodbye!");
    Ok(())
}

impl ReplSession {
    fn format_prompt(&self) -> String {
        match self.last_query {
            None => "friendrec> ".to_string(),
            Some(id) => format!("friendrec [{id}]> "),
        }
    }

    fn execute(&mut self, input: &str) -> Result<bool> {
        match parse_command(input)? {
            Command::Recommend { id, top_k } => {
                self.run_recommend(id, top_k.unwrap_or(self.default_top_k));
            }
            Command::Info { id } => {
                println!("  {}", self.directory.display(UserId(id)));
            }
            Command::Stats => self.run_stats(),
            Command::Help { command } => print_help(command.as_deref()),
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }

    fn run_recommend(&mut self, id: i64, top_k: usize) {
        self.last_query = Some(id);
        let student = UserId(id);

        if !self.engine.contains(id) {
            println!(
                "{}",
                format!(
                    "Student {id} is not in the embedding store (valid ids: 1..={}).",
                    self.engine.len()
                )
                .yellow()
            );
            return;
        }

        if let Some(info) = self.directory.get(student) {
            println!("  {} {}", "Student:".dimmed(), info);
        }

        let recs = self.engine.recommend_scored(id, top_k);
        println!(
            "{} {}",
            recs.len().to_string().cyan(),
            "recommended friends".dimmed()
        );
        for (rank, rec) in recs.iter().enumerate() {
            println!(
                "{:>3}. [{}] {} {}",
                rank + 1,
                rec.user.to_string().cyan(),
                self.directory.display(rec.user),
                format!("({:.3})", rec.score).dimmed()
            );
        }
    }

    fn run_stats(&self) {
        let stats = self.engine.store().stats();
        println!("{}", "Embedding Store".bold().cyan());
        println!("{}", crate::header_divider());
        println!("  {:<20} {}", "Students:", stats.users);
        println!("  {:<20} {}", "Dimension:", stats.dimension);
        println!("  {:<20} {}", "Zero vectors:", stats.zero_norm_rows);
        println!("  {:<20} {}", "Directory entries:", self.directory.len());
    }
}

fn parse_id(raw: &str) -> Result<i64> {
    raw.parse()
        .with_context(|| format!("'{raw}' is not a student id"))
}

fn parse_command(input: &str) -> Result<Command> {
    let parts: Vec<&str> = input.split_whitespace().collect();
    let Some(&head) = parts.first() else {
        anyhow::bail!("Empty command");
    };

    // A bare number is the common case
    if let Ok(id) = head.parse::<i64>() {
        return Ok(Command::Recommend { id, top_k: None });
    }

    match head {
        "rec" | "r" => {
            let id = parse_id(parts.get(1).context("Usage: rec <id> [k]")?)?;
            let top_k = parts
                .get(2)
                .map(|k| k.parse::<usize>().with_context(|| format!("'{k}' is not a count")))
                .transpose()?;
            Ok(Command::Recommend { id, top_k })
        }
        "info" | "i" => {
            let id = parse_id(parts.get(1).context("Usage: info <id>")?)?;
            Ok(Command::Info { id })
        }
        "stats" => Ok(Command::Stats),
        "help" | "h" | "?" => Ok(Command::Help {
            command: parts.get(1).map(ToString::to_string),
        }),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => match find_closest_match(other, COMMANDS, None) {
            Some(closest) => anyhow::bail!("Unknown command: {other}. {}", format_did_you_mean(closest)),
            None => anyhow::bail!("Unknown command: {other}. Type 'help' for available commands."),
        },
    }
}

fn print_help(command: Option<&str>) {
    match command {
        Some("rec") => println!("rec <id> [k]    - recommend k friends for a student (or just type the id)"),
        Some("info") => println!("info <id>       - show a student's directory entry"),
        Some("stats") => println!("stats           - show embedding store statistics"),
        Some("quit" | "exit") => println!("quit            - exit the REPL"),
        _ => {
            println!("{}", "Commands:".bold().cyan());
            println!("  <id>            - recommend friends for a student");
            println!("  rec <id> [k]    - recommend k friends");
            println!("  info <id>       - show a student's directory entry");
            println!("  stats           - show embedding store statistics");
            println!("  help [command]  - show help");
            println!("  quit            - exit");
        }
    }
}
