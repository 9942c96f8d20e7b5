use std::fmt;
use std::sync::Arc;

use lesson_core::model::{LessonId, Question};
use services::{
    ApiClient, ApiConfig, FlowError, FlowSnapshot, FlowState, NavigationTrigger,
    QuizFlowController,
};
use storage::repository::Storage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidLessonId { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
            ArgsError::InvalidLessonId { raw } => write!(f, "invalid --lesson-id value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    lesson_id: LessonId,
    last_lesson: bool,
    video_watched: bool,
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- [play] [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>     SQLite URL (default: sqlite:dev.sqlite3)");
    eprintln!("  --lesson-id <id>      Lesson to play (default: 1)");
    eprintln!("  --last-lesson         Treat the lesson as the last of its course");
    eprintln!("  --video-pending       Start with the lesson video unwatched");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  LEARN_DB_URL, LEARN_LESSON_ID");
    eprintln!("  LEARN_API_BASE_URL, LEARN_API_TOKEN  use the HTTP attempt store instead of SQLite");
    eprintln!("  RUST_LOG                             log filter (default: info)");
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("LEARN_DB_URL")
            .ok()
            .map_or_else(|| normalize_sqlite_url("sqlite:dev.sqlite3".into()), normalize_sqlite_url);
        let mut lesson_id = std::env::var("LEARN_LESSON_ID")
            .ok()
            .and_then(|value| value.parse::<LessonId>().ok())
            .unwrap_or_else(|| LessonId::new(1));
        let mut last_lesson = false;
        let mut video_watched = true;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--lesson-id" => {
                    let value = require_value(args, "--lesson-id")?;
                    lesson_id = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidLessonId { raw: value.clone() })?;
                }
                "--last-lesson" => last_lesson = true,
                "--video-pending" => video_watched = false,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            lesson_id,
            last_lesson,
            video_watched,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

async fn open_storage(args: &Args) -> Result<Storage, Box<dyn std::error::Error>> {
    if let Some(config) = ApiConfig::from_env() {
        tracing::info!(base_url = %config.base_url, "using HTTP attempt store");
        return Ok(Storage::from_repository(ApiClient::new(config)?));
    }

    prepare_sqlite_file(&args.db_url)?;
    tracing::info!(db_url = %args.db_url, "using SQLite attempt store");
    Ok(Storage::sqlite(&args.db_url).await?)
}

/// Prints the hand-off instead of routing to another screen.
struct ConsoleNavigation;

impl NavigationTrigger for ConsoleNavigation {
    fn advance_requested(&self, lesson_id: LessonId) {
        println!("Lesson {lesson_id} complete, moving on to the next lesson.");
    }
}

//
// ─── PLAYER ────────────────────────────────────────────────────────────────────
//

enum Control {
    Continue,
    Quit,
}

fn next_unanswered(snapshot: &FlowSnapshot) -> Option<(usize, &Question)> {
    snapshot
        .current_questions
        .iter()
        .enumerate()
        .find(|(_, question)| snapshot.answers.get(question.id()).is_none())
}

fn render(snapshot: &FlowSnapshot) {
    if let Some(error) = &snapshot.error {
        println!("! {error}");
    }

    match &snapshot.state {
        FlowState::Locked => println!("Watch the lesson video first. [v] mark watched  [q] quit"),
        FlowState::Loading => println!("Quizzes are not loaded. [l] reload  [q] quit"),
        FlowState::NoQuizRequired => {
            let proceed = if snapshot.can_proceed { "[p] next lesson  " } else { "" };
            println!("This lesson has no quiz. {proceed}[q] quit");
        }
        FlowState::ReadyToStart { index } | FlowState::Starting { index } => println!(
            "Quiz {} of {} is ready ({:.0}% done). [s] start  [q] quit",
            index + 1,
            snapshot.quiz_count,
            snapshot.progress.percent()
        ),
        FlowState::InQuiz { index, .. } | FlowState::Submitting { index, .. } => {
            match next_unanswered(snapshot) {
                Some((position, question)) => {
                    println!(
                        "Quiz {}/{}, question {}/{}: {}",
                        index + 1,
                        snapshot.quiz_count,
                        position + 1,
                        snapshot.current_questions.len(),
                        question.text()
                    );
                    for (n, option) in question.options().iter().enumerate() {
                        println!("  {}. {option}", n + 1);
                    }
                }
                None => println!("All questions answered. [enter] submit  [q] quit"),
            }
        }
        FlowState::Finished(_) => {
            if let Some(result) = &snapshot.final_result {
                println!("{}: {:.1}%", result.verdict.label(), result.score);
                let proceed = if result.can_proceed { "[p] next lesson  " } else { "" };
                println!("[r] retry  {proceed}[q] quit");
            }
        }
    }
}

async fn handle(
    flow: &mut QuizFlowController,
    snapshot: &FlowSnapshot,
    line: &str,
) -> Result<Control, FlowError> {
    match (line, &snapshot.state) {
        ("q", _) => return Ok(Control::Quit),
        ("v", _) => flow.set_video_completed(true).await?,
        ("l", _) => flow.initialize().await?,
        ("s", _) => flow.start().await?,
        ("r", _) => flow.retry().await?,
        ("p", _) => {
            flow.proceed().await?;
            return Ok(Control::Quit);
        }
        (choice, FlowState::InQuiz { .. }) => {
            if let Some((_, question)) = next_unanswered(snapshot) {
                let picked = choice
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|n| question.options().get(n));
                match picked {
                    Some(option) => flow.select_answer(question.id(), option.clone()).await?,
                    None => println!("Pick an option between 1 and {}.", question.options().len()),
                }
            }
            if next_unanswered(&flow.snapshot()).is_none() {
                flow.submit().await?;
            }
        }
        (other, _) => println!("Unknown command: {other}"),
    }
    Ok(Control::Continue)
}

async fn play(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let storage = open_storage(&args).await?;
    let mut flow =
        QuizFlowController::from_storage(args.lesson_id, &storage, Arc::new(ConsoleNavigation));
    flow.set_last_lesson(args.last_lesson);
    if args.video_watched {
        if let Err(err) = flow.set_video_completed(true).await {
            tracing::warn!(%err, "initial load failed");
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let snapshot = flow.snapshot();
        render(&snapshot);

        let Some(line) = lines.next_line().await? else {
            return Ok(());
        };
        match handle(&mut flow, &snapshot, line.trim()).await {
            Ok(Control::Continue) => {}
            Ok(Control::Quit) => return Ok(()),
            // Store failures are shown with the next render.
            Err(FlowError::Storage(err)) => tracing::debug!(%err, "store call failed"),
            Err(err) => println!("! {err}"),
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    if let Err(err) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("logging disabled: {err}");
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1).peekable();

    let first = argv.peek().cloned();
    match first.as_deref() {
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some("play") => {
            argv.next();
        }
        Some(first) if !first.starts_with("--") => {
            let err = ArgsError::UnknownCommand(first.to_string());
            eprintln!("{err}");
            print_usage();
            return Err(err.into());
        }
        _ => {}
    }

    let args = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    play(args).await
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
