//! friendrec - embedding-based friend recommendations
//!
//! Main entry point for the friendrec command-line tool.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use serde::Serialize;
use std::io;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};

use friendrec::doctor::{self, CheckStatus, HealthCheck};
use friendrec::logging::{LogConfig, init_cli_logging, init_logging};
use friendrec::server::{self, AppState, UserResponse, UsersResponse};
use friendrec::*;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn report_error(err: &anyhow::Error) {
    match err.downcast_ref::<FriendRecError>() {
        Some(e @ FriendRecError::StoreLoad { .. }) => {
            let suggestions: Vec<&str> = e.suggestion().into_iter().collect();
            eprintln!(
                "{}",
                format_error("Could not load embeddings", &e.to_string(), &suggestions)
            );
        }
        Some(e) => {
            eprintln!("{} {e}", "Error:".red().bold());
            if let Some(hint) = e.suggestion() {
                eprintln!("  {hint}");
            }
        }
        None => eprintln!("{} {err:#}", "Error:".red().bold()),
    }
}

/// Resolved settings shared by every subcommand.
struct Session {
    config: Config,
    format: OutputFormat,
}

fn run(cli: &Cli) -> Result<ExitCode> {
    // Logging starts before the config file is read, so only the environment
    // can switch log colors off.
    let log_colors = std::env::var_os("NO_COLOR").is_none()
        && std::env::var_os("FRIENDREC_NO_COLOR").is_none();
    if matches!(cli.command, Commands::Serve(_)) && !cli.quiet && !cli.verbose {
        let mut log_config = LogConfig::server();
        log_config.colors = log_colors;
        init_logging(&log_config);
    } else {
        init_cli_logging(cli.quiet, cli.verbose, log_colors);
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(path) = &cli.embeddings {
        config.paths.embeddings = Some(path.clone());
    }
    if let Some(path) = &cli.directory {
        config.paths.directory = Some(path.clone());
    }

    if !config.output.colors {
        colored::control::set_override(false);
    }

    let format = cli
        .format
        .or_else(|| OutputFormat::from_config(&config.output.format))
        .unwrap_or_default();
    debug!(?format, "Output format resolved");

    let session = Session { config, format };

    match &cli.command {
        Commands::Recommend(args) => cmd_recommend(&session, args),
        Commands::User(args) => cmd_user(&session, args),
        Commands::Users(args) => cmd_users(&session, args),
        Commands::Stats => cmd_stats(&session),
        Commands::Doctor => cmd_doctor(&session),
        Commands::Serve(args) => cmd_serve(&session, args),
        Commands::Repl => cmd_repl(&session),
        Commands::Config(args) => cmd_config(&session, args),
        Commands::Completions(args) => cmd_completions(args),
    }
}

fn load_engine(config: &Config) -> Result<RecommendationEngine> {
    let path = config.embeddings_path();
    let store = friendrec::timed!(friendrec::perf::STORE_LOAD, EmbeddingStore::load(&path))?;
    Ok(RecommendationEngine::new(store))
}

fn load_directory(config: &Config) -> UserDirectory {
    UserDirectory::load_or_empty(config.directory_path().as_deref())
}

fn print_json<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    let json = if format == OutputFormat::JsonPretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{json}");
    Ok(())
}

const fn is_json(format: OutputFormat) -> bool {
    matches!(format, OutputFormat::Json | OutputFormat::JsonPretty)
}

#[derive(Serialize)]
struct RecommendOutput {
    student_id: i64,
    student_info: String,
    count: usize,
    recommendations: Vec<RecommendRow>,
}

#[derive(Serialize)]
struct RecommendRow {
    uid: UserId,
    info: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<f32>,
}

fn cmd_recommend(session: &Session, args: &cli::RecommendArgs) -> Result<ExitCode> {
    let engine = load_engine(&session.config)?;
    let directory = load_directory(&session.config);
    let top_k = args.top_k.unwrap_or(session.config.recommend.top_k);

    let recs = engine.recommend_scored(args.id, top_k);
    let rows: Vec<RecommendRow> = recs
        .iter()
        .map(|r| RecommendRow {
            uid: r.user,
            info: directory.display(r.user),
            score: args.scores.then_some(r.score),
        })
        .collect();

    match session.format {
        OutputFormat::Json | OutputFormat::JsonPretty => {
            let output = RecommendOutput {
                student_id: args.id,
                student_info: directory.display(UserId(args.id)),
                count: rows.len(),
                recommendations: rows,
            };
            print_json(&output, session.format)?;
        }
        OutputFormat::Csv => {
            if args.scores {
                println!("rank,uid,info,score");
            } else {
                println!("rank,uid,info");
            }
            for (rank, row) in rows.iter().enumerate() {
                let mut line = format!("{},{},{}", rank + 1, row.uid, csv_escape_text(&row.info));
                if let Some(score) = row.score {
                    line.push_str(&format!(",{score:.6}"));
                }
                println!("{line}");
            }
        }
        OutputFormat::Compact => {
            for row in &rows {
                println!("{}\t{}", row.uid, row.info);
            }
        }
        OutputFormat::Text => {
            if !engine.contains(args.id) {
                println!(
                    "{}",
                    format!(
                        "Student {} is not in the embedding store (valid ids: 1..={}).",
                        args.id,
                        engine.len()
                    )
                    .yellow()
                );
                return Ok(ExitCode::SUCCESS);
            }

            println!(
                "{} {} {}",
                "Friends for".bold(),
                args.id.to_string().cyan().bold(),
                format!("({})", directory.display(UserId(args.id))).dimmed()
            );
            println!("{}", header_divider());
            if rows.is_empty() {
                println!("{}", "No recommendations.".yellow());
            }
            for (rank, row) in rows.iter().enumerate() {
                let score = row
                    .score
                    .map(|s| format!(" ({s:.3})").dimmed().to_string())
                    .unwrap_or_default();
                println!(
                    "{:>3}. [{}] {}{score}",
                    rank + 1,
                    row.uid.to_string().cyan(),
                    row.info
                );
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn cmd_user(session: &Session, args: &cli::UserArgs) -> Result<ExitCode> {
    let directory = load_directory(&session.config);
    let id = UserId(args.id);
    let known = directory.get(id).is_some();
    let info = directory.display(id);

    match session.format {
        OutputFormat::Json | OutputFormat::JsonPretty => {
            print_json(
                &UserResponse {
                    uid: args.id,
                    info,
                    known,
                },
                session.format,
            )?;
        }
        OutputFormat::Csv => {
            println!("uid,info");
            println!("{},{}", args.id, csv_escape_text(&info));
        }
        OutputFormat::Compact => println!("{}\t{info}", args.id),
        OutputFormat::Text => {
            if known {
                println!("[{}] {info}", args.id.to_string().cyan());
            } else {
                println!("[{}] {}", args.id.to_string().cyan(), info.dimmed());
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn cmd_users(session: &Session, args: &cli::UsersArgs) -> Result<ExitCode> {
    let directory = load_directory(&session.config);
    let users: Vec<UserEntry> = directory
        .entries()
        .take(args.limit.unwrap_or(usize::MAX))
        .collect();

    match session.format {
        OutputFormat::Json | OutputFormat::JsonPretty => {
            print_json(
                &UsersResponse {
                    count: users.len(),
                    users,
                },
                session.format,
            )?;
        }
        OutputFormat::Csv => {
            println!("uid,info");
            for user in &users {
                println!("{},{}", user.uid, csv_escape_text(&user.info));
            }
        }
        OutputFormat::Compact => {
            for user in &users {
                println!("{}\t{}", user.uid, user.info);
            }
        }
        OutputFormat::Text => {
            if users.is_empty() {
                println!("{}", "Directory is empty.".yellow());
            }
            for user in &users {
                println!("{:>8}  {}", user.uid.to_string().cyan(), user.info);
            }
            if directory.len() > users.len() {
                println!(
                    "{}",
                    format!("... {} more", directory.len() - users.len()).dimmed()
                );
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn cmd_stats(session: &Session) -> Result<ExitCode> {
    let engine = load_engine(&session.config)?;
    let stats = engine.store().stats();

    if is_json(session.format) {
        print_json(&stats, session.format)?;
        return Ok(ExitCode::SUCCESS);
    }

    println!("{}", "Embedding Store".bold().cyan());
    println!("{}", header_divider());
    println!("  {:<20} {:>12}", "Students:", format_number_usize(stats.users));
    println!("  {:<20} {:>12}", "Dimension:", stats.dimension);
    println!("  {:<20} {:>12}", "Zero vectors:", stats.zero_norm_rows);
    println!("  {:<20} {:>12.4}", "Min norm:", stats.min_norm);
    println!("  {:<20} {:>12.4}", "Mean norm:", stats.mean_norm);
    println!("  {:<20} {:>12.4}", "Max norm:", stats.max_norm);

    Ok(ExitCode::SUCCESS)
}

fn cmd_doctor(session: &Session) -> Result<ExitCode> {
    let config = &session.config;
    let embeddings = config.embeddings_path();
    let directory_path = config.directory_path();

    let checks = match EmbeddingStore::load(&embeddings) {
        Ok(store) => {
            let engine = RecommendationEngine::new(store);
            let directory = UserDirectory::load_or_empty(directory_path.as_deref());
            doctor::run_all(
                &engine,
                &directory,
                directory_path.as_deref(),
                config.recommend.top_k,
            )
        }
        Err(e) => vec![doctor::check_store_load_failure(&embeddings, &e)],
    };

    if is_json(session.format) {
        print_json(&checks, session.format)?;
    } else {
        print_checks(&checks, &embeddings);
    }

    Ok(if doctor::has_errors(&checks) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn print_checks(checks: &[HealthCheck], embeddings: &Path) {
    println!(
        "{} {}",
        "friendrec doctor".bold().cyan(),
        embeddings.display().to_string().dimmed()
    );
    println!("{}", header_divider());

    for check in checks {
        let badge = match check.status {
            CheckStatus::Pass => "PASS".green(),
            CheckStatus::Warning => "WARN".yellow(),
            CheckStatus::Error => "FAIL".red(),
        };
        println!("  [{badge}] {:<22} {}", check.name, check.message);
        if let Some(suggestion) = &check.suggestion {
            println!("         {}", suggestion.dimmed());
        }
    }

    let warnings = checks
        .iter()
        .filter(|c| c.status == CheckStatus::Warning)
        .count();
    let errors = checks
        .iter()
        .filter(|c| c.status == CheckStatus::Error)
        .count();
    println!("{}", header_divider());
    println!("  {} checks, {warnings} warnings, {errors} errors", checks.len());
}

fn cmd_serve(session: &Session, args: &cli::ServeArgs) -> Result<ExitCode> {
    let config = &session.config;
    let engine = load_engine(config)?;
    let directory = load_directory(config);

    let host = args.host.clone().unwrap_or_else(|| config.server.host.clone());
    let port = args.port.unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");

    let state = Arc::new(AppState {
        engine,
        directory,
        default_top_k: config.recommend.top_k,
    });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(server::serve(state, &addr))?;

    info!("Server stopped");
    Ok(ExitCode::SUCCESS)
}

fn cmd_repl(session: &Session) -> Result<ExitCode> {
    let engine = load_engine(&session.config)?;
    let directory = load_directory(&session.config);
    repl::run(engine, directory, session.config.recommend.top_k)?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_config(session: &Session, args: &cli::ConfigArgs) -> Result<ExitCode> {
    let config = &session.config;

    if args.init {
        print!("{}", Config::default_config_content());
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(key) = &args.get {
        return Ok(match config.get(key) {
            Some(value) => {
                println!("{value}");
                ExitCode::SUCCESS
            }
            None => {
                eprintln!(
                    "{}",
                    format_unknown_value_error("config key", key, VALID_CONFIG_KEYS)
                );
                ExitCode::FAILURE
            }
        });
    }

    if is_json(session.format) {
        print_json(config, session.format)?;
        return Ok(ExitCode::SUCCESS);
    }

    println!("{}", "Current Configuration".bold().cyan());
    println!("{}", header_divider());
    println!(
        "  Config file: {}",
        Config::user_config_path()
            .map_or_else(|| "(none)".to_string(), |p| p.display().to_string())
    );
    println!("  Embeddings:  {}", config.embeddings_path().display());
    println!(
        "  Directory:   {}",
        config
            .directory_path()
            .map_or_else(|| "(none)".to_string(), |p| p.display().to_string())
    );
    for key in VALID_CONFIG_KEYS {
        if let Some(value) = config.get(key) {
            println!("  {key:<18} = {value}");
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn cmd_completions(args: &cli::CompletionsArgs) -> Result<ExitCode> {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "friendrec", &mut io::stdout());
    Ok(ExitCode::SUCCESS)
}
