use std::fmt;

use lesson_core::model::{LessonId, Question, QuestionId, Quiz, QuizId};
use storage::grading::AnswerKey;
use storage::sqlite::SqliteRepository;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    lesson_id: LessonId,
    quizzes: u32,
    questions: u32,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidLessonId { raw: String },
    InvalidCount { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidLessonId { raw } => write!(f, "invalid --lesson-id value: {raw}"),
            ArgsError::InvalidCount { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
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

fn parse_count(value: String, flag: &'static str) -> Result<u32, ArgsError> {
    match value.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ArgsError::InvalidCount { flag, raw: value }),
    }
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("LEARN_DB_URL").unwrap_or_else(|_| "sqlite:dev.sqlite3?mode=rwc".into());
        let mut lesson_id = std::env::var("LEARN_LESSON_ID")
            .ok()
            .and_then(|value| value.parse::<LessonId>().ok())
            .unwrap_or_else(|| LessonId::new(1));
        let mut quizzes = 2;
        let mut questions = 3;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--lesson-id" => {
                    let value = require_value(&mut args, "--lesson-id")?;
                    lesson_id = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidLessonId { raw: value.clone() })?;
                }
                "--quizzes" => {
                    quizzes = parse_count(require_value(&mut args, "--quizzes")?, "--quizzes")?;
                }
                "--questions" => {
                    questions =
                        parse_count(require_value(&mut args, "--questions")?, "--questions")?;
                }
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
            quizzes,
            questions,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>     SQLite URL (default: sqlite:dev.sqlite3?mode=rwc)");
    eprintln!("  --lesson-id <id>      Lesson to attach quizzes to (default: 1)");
    eprintln!("  --quizzes <n>         Number of quizzes (default: 2)");
    eprintln!("  --questions <n>       Questions per quiz (default: 3)");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Environment (same as flags): LEARN_DB_URL, LEARN_LESSON_ID");
}

const SAMPLES: [(&str, [&str; 3], usize); 5] = [
    ("What is 2 + 3?", ["4", "5", "6"], 1),
    ("Which planet is closest to the sun?", ["Venus", "Earth", "Mercury"], 2),
    ("How many sides does a hexagon have?", ["6", "8", "5"], 0),
    ("Which gas do plants absorb?", ["Oxygen", "Carbon dioxide", "Nitrogen"], 1),
    ("What is the boiling point of water at sea level?", ["90 C", "100 C", "110 C"], 1),
];

fn sample_quiz(lesson_id: LessonId, index: u32, questions: u32) -> (Quiz, AnswerKey) {
    let quiz_id = QuizId::new(lesson_id.value() * 1_000 + u64::from(index) + 1);
    let mut key = AnswerKey::new();
    let questions = (0..questions)
        .map(|n| {
            let (text, options, correct) = SAMPLES[((index + n) as usize) % SAMPLES.len()];
            let question_id = QuestionId::new(quiz_id.value() * 100 + u64::from(n) + 1);
            key.insert(question_id, options[correct]);
            Question::new(
                question_id,
                text,
                options.iter().map(|o| (*o).to_string()).collect(),
            )
        })
        .collect();
    (
        Quiz::new(quiz_id, format!("Check-in {}", index + 1), questions),
        key,
    )
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let repo = SqliteRepository::connect(&args.db_url).await?;
    repo.migrate().await?;

    for index in 0..args.quizzes {
        let (quiz, key) = sample_quiz(args.lesson_id, index, args.questions);
        repo.upsert_quiz(args.lesson_id, index, &quiz, &key).await?;
    }

    println!(
        "Seeded lesson {} with {} quizzes of {} questions into {}",
        args.lesson_id, args.quizzes, args.questions, args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
