use anyhow::Result;
use chrono::Utc;
use clap::{ArgAction, Parser};
use rise_client_sdk::{
    list::Confirm, screens::SignupPolicy, Backend, GatewayClient, MemoryBackend, SessionStore,
};
use rise_protocol::{BugReport, BugStatus, MediaItem, UserRecord, BUGS, COURSES, MUSIC, USERS};
use std::io::{self, Write};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod render;
mod shell;

use shell::{Shell, Step};

const DEMO_EMAIL: &str = "admin@rise.dev";
const DEMO_PASSWORD: &str = "rise-admin";

#[derive(Parser, Debug)]
#[command(
    name = "rise-console",
    version,
    about = "Terminal admin dashboard for the Rise content platform"
)]
struct Args {
    #[arg(long, env = "RISE_GATEWAY_URL", default_value = "http://localhost:9009")]
    gateway_url: String,

    /// Upload chunk size in KiB.
    #[arg(long, default_value_t = 64)]
    chunk_kb: usize,

    /// Write `isAdmin: true` on accounts created through `signup`.
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    grant_admin_on_signup: bool,

    /// Run against an in-memory backend seeded with demo data.
    #[arg(long)]
    offline: bool,

    /// Path opened after start-up.
    #[arg(long, default_value = "/")]
    start: String,
}

struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        print!("{prompt} [y/N] ");
        let _ = io::stdout().flush();
        let mut answer = String::new();
        if io::stdin().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

fn demo_backend(chunk_size: usize) -> Arc<MemoryBackend> {
    let memory = Arc::new(MemoryBackend::new().with_chunk_size(chunk_size));
    let admin_id = memory.insert_account(DEMO_EMAIL, DEMO_PASSWORD);
    let now = Utc::now();

    memory.seed_record(
        USERS,
        &UserRecord {
            id: admin_id,
            display_name: Some("Demo Admin".into()),
            email: Some(DEMO_EMAIL.into()),
            is_admin: true,
            created_at: Some(now),
            ..Default::default()
        },
    );
    let subscribers = [("u1", "Maya", true), ("u2", "Jonas", false), ("u3", "Priya", true)];
    for (id, name, free_plan) in subscribers {
        memory.seed_record(
            USERS,
            &UserRecord {
                id: id.into(),
                display_name: Some(name.into()),
                email: Some(format!("{}@example.com", name.to_ascii_lowercase())),
                free_plan,
                start_date: Some(now),
                ..Default::default()
            },
        );
    }
    for (collection, id, title, category) in [
        (COURSES, "v1", "Morning Flow", "Yoga"),
        (COURSES, "v2", "Breath Basics", "Breathing"),
        (MUSIC, "s1", "Rainfall", "Sleep"),
        (MUSIC, "s2", "Forest Walk", "Focus"),
    ] {
        memory.seed_record(
            collection,
            &MediaItem {
                id: id.into(),
                title: title.into(),
                categories: category.into(),
                created_at: Some(now),
                ..Default::default()
            },
        );
    }
    memory.seed_record(
        BUGS,
        &BugReport {
            id: "b1".into(),
            subject: "Audio stops on lock screen".into(),
            description: "Playback pauses after the phone locks.".into(),
            status: Some(BugStatus::Open),
        },
    );
    memory
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let chunk_size = args.chunk_kb.max(1) * 1024;
    let policy = SignupPolicy {
        grant_admin: args.grant_admin_on_signup,
    };
    let session = SessionStore::new();

    let mut shell = if args.offline {
        println!("Offline mode. Demo login: {DEMO_EMAIL} {DEMO_PASSWORD}");
        Shell::new(Backend::from_shared(demo_backend(chunk_size)), session, policy)
    } else {
        tracing::info!("Using gateway at {}", args.gateway_url);
        let gateway = GatewayClient::new(args.gateway_url).with_chunk_size(chunk_size);
        Shell::new(Backend::from_shared(Arc::new(gateway)), session, policy)
    }
    .with_live_progress(true);

    println!("{}", shell.navigate(&args.start).await);
    println!("Type 'help' for commands.");

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("{}> ", shell.route());
        io::stdout().flush()?;
        line.clear();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        match shell.execute(&line, &StdinConfirm).await {
            Step::Output(text) if text.is_empty() => {}
            Step::Output(text) => println!("{text}"),
            Step::Quit => break,
        }
    }

    Ok(())
}
