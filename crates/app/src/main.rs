use std::fmt;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use interview_core::model::{AnswerPayload, InterviewId, TemplateId};
use services::{AppServices, Clock, ServiceConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArgument { name: &'static str },
    UnknownArg(String),
    InvalidTemplateId { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArgument { name } => write!(f, "missing argument: <{name}>"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidTemplateId { raw } => write!(f, "invalid template id: {raw}"),
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

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- run    <template_id> [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- import <template.json> [--title <title>] [--db <sqlite_url>]");
    eprintln!();
    eprintln!("While running: type an answer, `skip` to skip, an empty line to stop.");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  INTERVIEW_DB_URL, INTERVIEW_AI_API_KEY, INTERVIEW_WORKFLOW_URL, RUST_LOG");
}

#[derive(Debug)]
enum Command {
    Run { template_id: TemplateId },
    Import { file: PathBuf, title: Option<String> },
}

struct Args {
    command: Command,
    db_url: Option<String>,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Option<Self>, ArgsError> {
        let Some(sub) = args.next() else {
            return Ok(None);
        };

        let mut positional: Option<String> = None;
        let mut db_url = None;
        let mut title = None;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = Some(normalize_sqlite_url(value));
                }
                "--title" if sub == "import" => {
                    title = Some(require_value(&mut args, "--title")?);
                }
                "--help" | "-h" => return Ok(None),
                _ if positional.is_none() && !arg.starts_with("--") => positional = Some(arg),
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let command = match sub.as_str() {
            "run" => {
                let raw = positional.ok_or(ArgsError::MissingArgument {
                    name: "template_id",
                })?;
                let template_id = raw
                    .parse::<TemplateId>()
                    .map_err(|_| ArgsError::InvalidTemplateId { raw: raw.clone() })?;
                Command::Run { template_id }
            }
            "import" => {
                let file = positional.ok_or(ArgsError::MissingArgument {
                    name: "template.json",
                })?;
                Command::Import {
                    file: PathBuf::from(file),
                    title,
                }
            }
            "--help" | "-h" => return Ok(None),
            _ => return Err(ArgsError::UnknownArg(sub)),
        };

        Ok(Some(Self { command, db_url }))
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
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> anyhow::Result<()> {
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

fn prompt(text: &str) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "{text}")?;
    stdout.flush()?;
    Ok(())
}

async fn import(
    services: &AppServices,
    file: &Path,
    title: Option<String>,
) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let template = services.templates().import_json(&raw, title).await?;
    println!("{}", template.id());
    info!(
        template_id = %template.id(),
        questions = template.questions().count(),
        "template imported"
    );
    Ok(())
}

async fn run_interview(services: &AppServices, template_id: TemplateId) -> anyhow::Result<()> {
    let interviews = services.interviews();
    let interview_id: InterviewId = interviews.start(template_id).await?.id;
    println!("interview {interview_id} started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(question) = interviews.current_question(interview_id).await? {
        let position = interviews.position(interview_id).await?;
        println!();
        println!("[{}/{}] {}", position.step, position.total, question.text);
        prompt("> ")?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let answer = line.map(|l| l.trim().to_string()).unwrap_or_default();
        if answer.is_empty() {
            break;
        }

        let payload = if answer.eq_ignore_ascii_case("skip") {
            AnswerPayload::skipped()
        } else {
            AnswerPayload::text(answer)
        };
        interviews
            .submit_answer(interview_id, question.question_ref, payload)
            .await?;

        // follow-ups must be in the question set before moving on
        services.queue().wait_idle().await;
        if interviews.next_question(interview_id).await?.is_none() {
            break;
        }
    }

    println!();
    println!("stopping, synthesizing wikis...");
    let wikis = interviews.stop(interview_id).await?;
    if wikis.is_empty() {
        println!("no wiki could be produced");
    }
    for wiki in &wikis {
        println!();
        println!("=== wiki {} (prompt {}) ===", wiki.id, wiki.prompt_id);
        println!("{}", wiki.content);
    }

    let failed = services.failed_jobs();
    if !failed.is_empty() {
        eprintln!("{} background job(s) failed", failed.len());
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let Some(args) = Args::parse(std::env::args().skip(1)).inspect_err(|_| print_usage())? else {
        print_usage();
        return Ok(());
    };

    let mut config = ServiceConfig::from_env()?;
    if let Some(db_url) = args.db_url {
        config.db_url = db_url;
    }
    config.db_url = normalize_sqlite_url(config.db_url);

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&config.db_url)?;
    let services = AppServices::from_config(&config, Clock::default()).await?;

    let result = match &args.command {
        Command::Import { file, title } => import(&services, file, title.clone()).await,
        Command::Run { template_id } => run_interview(&services, *template_id).await,
    };
    services.shutdown().await;
    result
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err:#}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &[&str]) -> Result<Option<Args>, ArgsError> {
        Args::parse(raw.iter().map(|s| (*s).to_string()))
    }

    #[test]
    fn run_takes_template_id() {
        let args = parse(&["run", "7"]).unwrap().unwrap();
        assert!(matches!(args.command, Command::Run { template_id } if template_id == TemplateId::new(7)));
        assert!(args.db_url.is_none());
    }

    #[test]
    fn import_takes_file_title_and_db() {
        let args = parse(&["import", "t.json", "--title", "Intake", "--db", "sqlite::memory:"])
            .unwrap()
            .unwrap();
        assert_eq!(args.db_url.as_deref(), Some("sqlite::memory:"));
        match args.command {
            Command::Import { file, title } => {
                assert_eq!(file, PathBuf::from("t.json"));
                assert_eq!(title.as_deref(), Some("Intake"));
            }
            Command::Run { .. } => panic!("import expected"),
        }
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            parse(&["run", "seven"]),
            Err(ArgsError::InvalidTemplateId { .. })
        ));
        assert!(matches!(
            parse(&["run"]),
            Err(ArgsError::MissingArgument { .. })
        ));
        assert!(matches!(
            parse(&["run", "1", "--title", "x"]),
            Err(ArgsError::UnknownArg(_))
        ));
        assert!(matches!(parse(&["serve"]), Err(ArgsError::UnknownArg(_))));
    }

    #[test]
    fn no_arguments_prints_usage() {
        assert!(parse(&[]).unwrap().is_none());
    }
}
