use anyhow::{Context, Result};
use cardgate_core::OnnxFaceEncoder;
use cardgate_hw::{Camera, OnDemandCamera};
use cardgate_store::{CardRecord, CardStore};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod config;
mod gate;

use config::Config;
use gate::{AccessOutcome, CardDetails, Gate, PhotoDirs, RegisterOutcome};

#[derive(Parser)]
#[command(name = "cardgate", version, about = "Credit card information access, gated by your face")]
struct Cli {
    /// User database workbook (overrides CARDGATE_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the user database if it does not exist
    Init,
    /// Register a card and the face allowed to unlock it
    Register {
        /// Card holder name
        #[arg(short, long)]
        name: String,
        #[command(flatten)]
        card: CardArgs,
    },
    /// Show card details after a face check
    Access {
        #[command(flatten)]
        card: CardArgs,
        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// List registered users with card numbers masked
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// List video capture devices
    Devices,
}

#[derive(Args)]
struct CardArgs {
    /// Credit card number
    #[arg(short, long)]
    card: String,
    /// CVV
    #[arg(long)]
    cvv: String,
    /// Expiry date (MM/YY)
    #[arg(short, long)]
    expiry: String,
}

impl From<CardArgs> for CardDetails {
    fn from(args: CardArgs) -> Self {
        Self {
            card_number: args.card,
            cvv: args.cvv,
            expiry_date: args.expiry,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = Config::from_env();
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    match cli.command {
        Commands::Devices => list_devices(),
        Commands::Init => {
            let store = open_store(&config)?;
            println!("User database ready: {}", store.path().display());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Register { name, card } => {
            let mut gate = open_gate(&config, open_store(&config)?)?;
            println!("Please look at the camera to register your face.");
            match gate.register(&name, &card.into())? {
                RegisterOutcome::Registered { .. } => {
                    println!("User registered successfully!");
                    Ok(ExitCode::SUCCESS)
                }
                RegisterOutcome::NoFace => {
                    println!("No face detected! Please try again.");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Access { card, json } => {
            let mut gate = open_gate(&config, open_store(&config)?)?;
            if !json {
                println!("Please look at the camera for face recognition.");
            }
            let outcome = gate.access(&card.into())?;
            report_access(&outcome, json)?;
            Ok(match outcome {
                AccessOutcome::Granted { .. } => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            })
        }
        Commands::List { json } => {
            let store = open_store(&config)?;
            list_users(&store.load_all()?, json)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// The workbook is created on first use by every command that touches it.
fn open_store(config: &Config) -> Result<CardStore> {
    let store = CardStore::new(&config.db_path);
    store.ensure().context("creating user database")?;
    Ok(store)
}

fn open_gate(config: &Config, store: CardStore) -> Result<Gate<OnDemandCamera, OnnxFaceEncoder>> {
    let encoder = OnnxFaceEncoder::load(&config.model_dir)
        .with_context(|| format!("loading face models from {}", config.model_dir.display()))?;
    tracing::info!(
        camera = %config.camera_device,
        tolerance = config.match_tolerance,
        "face check ready"
    );

    Ok(Gate::new(
        store,
        OnDemandCamera::new(config.camera_device.clone(), config.warmup_frames),
        encoder,
        config.match_tolerance,
        PhotoDirs {
            registration: config.registration_dir.clone(),
            access: config.access_dir.clone(),
            fraud: config.fraud_dir.clone(),
        },
    ))
}

fn report_access(outcome: &AccessOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }
    for line in access_messages(outcome) {
        println!("{line}");
    }
    Ok(())
}

fn access_messages(outcome: &AccessOutcome) -> Vec<String> {
    match outcome {
        AccessOutcome::NoUsers => vec!["No users registered yet.".into()],
        AccessOutcome::NotFound => vec!["Credit card details not found!".into()],
        AccessOutcome::Granted { record, .. } => vec![
            "Face matched. Access granted.".into(),
            format!("Name: {}", record.name),
            format!("Credit Card Number: {}", record.card_number),
            format!("CVV: {}", record.cvv),
            format!("Expiry Date: {}", record.expiry_date),
        ],
        AccessOutcome::Denied {
            face_detected,
            evidence,
            ..
        } => {
            let mut lines = Vec::new();
            if !face_detected {
                lines.push("No face detected! Please try again.".into());
            }
            lines.push("Fraud detected! Face doesn't match registered user.".into());
            if let Some(path) = evidence {
                lines.push(format!("Snapshot saved to {}", path.display()));
            }
            lines
        }
    }
}

fn list_users(records: &[CardRecord], json: bool) -> Result<()> {
    if json {
        let rows: Vec<serde_json::Value> = records
            .iter()
            .map(|r| {
                serde_json::json!({
                    "name": r.name,
                    "card_number": r.masked_card_number(),
                    "expiry_date": r.expiry_date,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No users registered yet.");
        return Ok(());
    }
    for r in records {
        println!("{:<24} {:<24} {}", r.name, r.masked_card_number(), r.expiry_date);
    }
    Ok(())
}

fn list_devices() -> Result<ExitCode> {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No video capture devices found.");
        return Ok(ExitCode::FAILURE);
    }
    for d in devices {
        println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
    }
    Ok(ExitCode::SUCCESS)
}
