use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use gridlayout::breakdown::{self, EntityNames, Period, SessionRecord, TimeBreakdown};
use gridlayout::config::{DEFAULT_API_URL, HttpConfig};
use gridlayout::http::HttpRepository;
use gridlayout::model::BoardCustomization;
use gridlayout::repository::{CustomizationRepository, RepositoryError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use time::{OffsetDateTime, UtcOffset};

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("health check failed: HTTP {0}")]
    Unhealthy(u16),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("board {board_id} not found")]
    BoardNotFound { board_id: String },
    #[error("board id mismatch: path says {path}, body says {body}")]
    BoardIdMismatch { path: String, body: String },
    #[error("failed to read {path}: {source}")]
    Read { path: String, source: io::Error },
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("failed to start async runtime: {0}")]
    Runtime(io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "studyboard-cli", about = "Studyboard customization API and time breakdown CLI")]
struct Cli {
    #[arg(long, env = "STUDYBOARD_API_URL", default_value = DEFAULT_API_URL)]
    base_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the server answers its health probe.
    Ping,
    Customization(CustomizationCommand),
    Board(BoardCommand),
    /// Per-course and per-project totals from an exported session list.
    Breakdown(BreakdownArgs),
}

#[derive(Args, Debug)]
struct CustomizationCommand {
    #[command(subcommand)]
    command: CustomizationSubcommand,
}

#[derive(Subcommand, Debug)]
enum CustomizationSubcommand {
    Show,
    /// Replace the whole board list from a JSON array (`-` reads stdin).
    Replace { file: PathBuf },
}

#[derive(Args, Debug)]
struct BoardCommand {
    #[command(subcommand)]
    command: BoardSubcommand,
}

#[derive(Subcommand, Debug)]
enum BoardSubcommand {
    Show {
        board_id: String,
    },
    /// Upsert one board from a JSON document (`-` reads stdin).
    Put {
        board_id: String,
        file: PathBuf,
    },
    Delete {
        board_id: String,
    },
}

#[derive(Args, Debug)]
struct BreakdownArgs {
    /// Period to total; the stats cards default to the current month.
    #[arg(long, default_value = "month")]
    period: Period,
    /// JSON array of `{startTime, duration, type, referenceId}` records.
    #[arg(long)]
    sessions: PathBuf,
    /// JSON object `{courses: {id: title}, projects: {id: name}}`.
    #[arg(long)]
    names: Option<PathBuf>,
}

fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    // The local offset can only be read while the process is single-threaded.
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);

    match cli.command {
        Command::Breakdown(args) => run_breakdown(&args, offset),
        command => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(CliError::Runtime)?;
            runtime.block_on(run_remote(&cli.base_url, command, offset))
        }
    }
}

async fn run_remote(base_url: &str, command: Command, offset: UtcOffset) -> Result<(), CliError> {
    match command {
        Command::Ping => run_ping(base_url).await,
        Command::Customization(customization) => run_customization(base_url, customization).await,
        Command::Board(board) => run_board(base_url, board).await,
        Command::Breakdown(args) => run_breakdown(&args, offset),
    }
}

async fn run_ping(base_url: &str) -> Result<(), CliError> {
    let client = reqwest::Client::new();
    let response = client.get(health_url(base_url)).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(CliError::Unhealthy(status.as_u16()));
    }
    println!("ok");
    Ok(())
}

async fn run_customization(base_url: &str, customization: CustomizationCommand) -> Result<(), CliError> {
    let repo = HttpRepository::new(&HttpConfig::with_base_url(base_url))?;
    match customization.command {
        CustomizationSubcommand::Show => {
            let doc = repo.fetch_all().await?;
            print_json(&doc)
        }
        CustomizationSubcommand::Replace { file } => {
            let boards: Vec<BoardCustomization> = read_json_input(&file)?;
            let doc = repo.replace_all(&boards).await?;
            print_json(&doc)
        }
    }
}

async fn run_board(base_url: &str, board: BoardCommand) -> Result<(), CliError> {
    let repo = HttpRepository::new(&HttpConfig::with_base_url(base_url))?;
    match board.command {
        BoardSubcommand::Show { board_id } => match repo.load(&board_id).await? {
            Some(board) => print_json(&board),
            None => Err(CliError::BoardNotFound { board_id }),
        },
        BoardSubcommand::Put { board_id, file } => {
            let board: BoardCustomization = read_json_input(&file)?;
            check_board_id(&board_id, &board)?;
            let saved = repo.save(&board_id, &board).await?;
            print_json(&saved)
        }
        BoardSubcommand::Delete { board_id } => {
            repo.delete(&board_id).await?;
            eprintln!("deleted board {board_id}");
            Ok(())
        }
    }
}

fn run_breakdown(args: &BreakdownArgs, offset: UtcOffset) -> Result<(), CliError> {
    let result = compute_breakdown(args, now_in(offset))?;
    print_json(&result)
}

/// Period boundaries follow `now`'s offset, so callers pass local time.
fn compute_breakdown(args: &BreakdownArgs, now: OffsetDateTime) -> Result<TimeBreakdown, CliError> {
    let sessions: Vec<SessionRecord> = read_json_input(&args.sessions)?;
    let names: EntityNames = match &args.names {
        Some(path) => read_json_input(path)?,
        None => EntityNames::default(),
    };
    Ok(breakdown::time_breakdown(&sessions, args.period, now, &names))
}

fn now_in(offset: UtcOffset) -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(offset)
}

/// The health probe lives beside the API root, not under it.
fn health_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let root = base.strip_suffix("/api").unwrap_or(base);
    format!("{root}/healthz")
}

fn check_board_id(path_id: &str, board: &BoardCustomization) -> Result<(), CliError> {
    if board.board_id == path_id {
        return Ok(());
    }
    Err(CliError::BoardIdMismatch {
        path: path_id.to_owned(),
        body: board.board_id.clone(),
    })
}

fn read_json_input<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let read_error = |source| CliError::Read {
        path: path.display().to_string(),
        source,
    };
    let text = if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf).map_err(read_error)?;
        buf
    } else {
        fs::read_to_string(path).map_err(read_error)?
    };
    parse_json(&text)
}

fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, CliError> {
    Ok(serde_json::from_str(text)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
