use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use rollcall_core::{
    daily_report, mark_manual_attendance, AttendanceEngine, AttendanceStore, FaceEncoder, OnnxFaceEncoder, Person,
    PersonId, Photo, ReportSummary,
};
use rollcall_store::{DirectoryArchive, SqliteStore};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-recognition attendance from class photos")]
struct Cli {
    /// TOML config file (defaults to $ROLLCALL_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a student from a reference photo
    Register {
        /// Display name
        #[arg(short, long)]
        name: String,
        /// Roll number or other external id, unique across the roster
        #[arg(short, long)]
        id: String,
        /// Reference photo (png, jpg or jpeg)
        photo: PathBuf,
    },
    /// Mark attendance from a class photo
    Mark {
        /// Class photo (png, jpg or jpeg)
        photo: PathBuf,
        /// Attendance date, YYYY-MM-DD (default: today)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    /// Mark attendance by hand; listed ids present, everyone else absent
    Manual {
        /// Attendance date, YYYY-MM-DD (default: today)
        #[arg(short, long)]
        date: Option<NaiveDate>,
        /// External ids of present students
        present: Vec<String>,
    },
    /// Print the attendance report for a day
    Report {
        /// Report date, YYYY-MM-DD (default: today)
        #[arg(short, long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        json: bool,
    },
    /// List registered students
    Roster {
        #[arg(long)]
        json: bool,
    },
    /// Run face detection on a photo and print what was found
    Detect {
        photo: PathBuf,
    },
}

#[derive(Serialize)]
struct RosterEntry<'a> {
    id: PersonId,
    display_name: &'a str,
    external_id: &'a str,
    photo_ref: Option<&'a str>,
    created_at: DateTime<Utc>,
}

impl<'a> From<&'a Person> for RosterEntry<'a> {
    fn from(person: &'a Person) -> Self {
        Self {
            id: person.id,
            display_name: &person.display_name,
            external_id: &person.external_id,
            photo_ref: person.photo_ref.as_deref(),
            created_at: person.created_at,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Register { name, id, photo } => {
            let mut engine = open_engine(&config)?;
            let photo = read_photo(&config, &photo)?;
            let person_id = engine
                .register(&name, &id, &photo)
                .with_context(|| format!("registering {id}"))?;
            println!("Registered {name} ({id}) as person {person_id}");
        }
        Commands::Mark { photo, date } => {
            let date = date.unwrap_or_else(today);
            let mut engine = open_engine(&config)?;
            let photo = read_photo(&config, &photo)?;
            let summary = engine
                .reconcile(&photo, date)
                .with_context(|| format!("marking attendance for {date}"))?;
            println!(
                "{date}: {} of {} present, {} absent",
                summary.present_count,
                summary.total_count,
                summary.absent_count()
            );
        }
        Commands::Manual { date, present } => {
            let date = date.unwrap_or_else(today);
            let mut store = open_store(&config)?;
            let summary = mark_manual_attendance(&mut store, date, &present)
                .with_context(|| format!("recording manual attendance for {date}"))?;
            println!("{date}: {} of {} present", summary.present_count, summary.total_count);
        }
        Commands::Report { date, json } => {
            let date = date.unwrap_or_else(today);
            let store = open_store(&config)?;
            let rows = daily_report(&store, date).with_context(|| format!("loading report for {date}"))?;
            let summary = ReportSummary::from_rows(&rows);

            if json {
                let out = serde_json::json!({ "date": date, "summary": summary, "rows": rows });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else if rows.is_empty() {
                println!("No attendance recorded for {date}");
            } else {
                println!("Attendance for {date}");
                for row in &rows {
                    println!(
                        "  {:<24} {:<12} {:<8} {}",
                        row.display_name,
                        row.external_id,
                        row.status(),
                        row.source.as_str()
                    );
                }
                println!(
                    "Total {}, present {}, absent {}",
                    summary.total, summary.present, summary.absent
                );
            }
        }
        Commands::Roster { json } => {
            let store = open_store(&config)?;
            let persons = store.list_persons().context("listing roster")?;

            if json {
                let entries: Vec<RosterEntry<'_>> = persons.iter().map(RosterEntry::from).collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if persons.is_empty() {
                println!("No students registered");
            } else {
                for person in &persons {
                    println!(
                        "  {:>4}  {:<24} {:<12} {}",
                        person.id.0,
                        person.display_name,
                        person.external_id,
                        person.created_at.format("%Y-%m-%d")
                    );
                }
            }
        }
        Commands::Detect { photo } => {
            let photo = read_photo(&config, &photo)?;
            let mut encoder = load_encoder(&config)?;
            let faces = encoder.encode_all(photo.image()).context("running face detection")?;

            println!("{}: {} face(s)", photo.file_name(), faces.len());
            for (i, face) in faces.iter().enumerate() {
                let loc = &face.location;
                println!(
                    "  #{i}: x={:.0} y={:.0} w={:.0} h={:.0} confidence={:.3}",
                    loc.x, loc.y, loc.width, loc.height, loc.confidence
                );
            }
        }
    }

    Ok(())
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn read_photo(config: &Config, path: &Path) -> Result<Photo> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("{} is not a file", path.display()))?;
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Photo::decode(&file_name, bytes, config.engine.max_photo_bytes).with_context(|| format!("loading {file_name}"))
}

fn open_store(config: &Config) -> Result<SqliteStore> {
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    SqliteStore::open(&config.db_path).with_context(|| format!("opening database {}", config.db_path.display()))
}

fn load_encoder(config: &Config) -> Result<OnnxFaceEncoder> {
    OnnxFaceEncoder::load(&config.detector_model_path(), &config.recognizer_model_path())
        .with_context(|| format!("loading face models from {}", config.model_dir.display()))
}

fn open_engine(config: &Config) -> Result<AttendanceEngine<OnnxFaceEncoder, SqliteStore, DirectoryArchive>> {
    let encoder = load_encoder(config)?;
    let store = open_store(config)?;
    let archive = DirectoryArchive::new(&config.photo_dir);
    Ok(AttendanceEngine::new(encoder, store, archive, config.engine.clone()))
}
