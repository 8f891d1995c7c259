pub mod bootstrap;
pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use mailquote_core::config::{AppConfig, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "mailquote",
    about = "mailquote operator CLI",
    long_about = "Turn stored customer emails into quotation drafts: extract, resolve against the ERP, price, and correct.",
    after_help = "Examples:\n  mailquote ingest mail-42 --body mail.txt --attachment table.txt\n  mailquote analyze mail-42\n  mailquote correct mail-42 --target line:0 --set quantity=250 --author alice\n  mailquote reprice mail-42"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, database connectivity and ERP sessions")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Store an email body (file or stdin) and optional attachment text")]
    Ingest {
        source_id: String,
        #[arg(long, help = "File holding the email body; read from stdin when omitted")]
        body: Option<PathBuf>,
        #[arg(long, help = "File holding the extracted attachment text")]
        attachment: Option<PathBuf>,
    },
    #[command(about = "Analyze a stored email, reusing the cached result unless --force")]
    Analyze {
        source_id: String,
        #[arg(long, help = "Discard the cached analysis and run the pipeline again")]
        force: bool,
    },
    #[command(about = "Show the corrected analysis (or the raw machine result with --raw)")]
    Show {
        source_id: String,
        #[arg(long, help = "Show the machine result without corrections")]
        raw: bool,
    },
    #[command(about = "Record an operator correction on the customer, a line or the delivery")]
    Correct {
        source_id: String,
        #[arg(long, help = "customer | delivery | line:N")]
        target: String,
        #[arg(long = "set", value_name = "FIELD=VALUE", required = true)]
        set: Vec<String>,
        #[arg(long)]
        author: String,
    },
    #[command(about = "Reprice lines from the corrected selections")]
    Reprice { source_id: String },
    #[command(about = "List manual price corrections, oldest first")]
    History {
        source_id: String,
        #[arg(long, help = "Only corrections for this line index")]
        line: Option<usize>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging(AppConfig::load(LoadOptions::default()).ok().as_ref());

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Ingest { source_id, body, attachment } => {
            commands::ingest::run(&source_id, body.as_deref(), attachment.as_deref())
        }
        Command::Analyze { source_id, force } => commands::analyze::run(&source_id, force),
        Command::Show { source_id, raw } => commands::show::run(&source_id, raw),
        Command::Correct { source_id, target, set, author } => {
            commands::correct::run(&source_id, &target, &set, &author)
        }
        Command::Reprice { source_id } => commands::reprice::run(&source_id),
        Command::History { source_id, line } => commands::history::run(&source_id, line),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout carries only the command payload.
fn init_logging(config: Option<&AppConfig>) {
    use tracing::Level;

    let log_level = config
        .and_then(|config| config.logging.level.parse::<Level>().ok())
        .unwrap_or(Level::WARN);
    let format = config.map(|config| config.logging.format).unwrap_or(LogFormat::Compact);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
