use amua_recorder::capture::CaptureMode;
use amua_recorder::command::{self, Context};
use amua_recorder::config::Config;
use amua_recorder::db::SqliteStore;
use anyhow::Context as _;
use dotenvy::dotenv;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn print_help() {
    println!("Usage: amua <command> [args]");
    println!();
    println!("Commands:");
    println!("  sessions                         List sessions (* marks the current one)");
    println!("  new-session [name]               Create a session and make it current");
    println!("  use-session <id>                 Make a session current");
    println!("  rename-session <id> <name>       Rename a session");
    println!("  delete-session <id>              Delete a session and its recordings");
    println!("  recordings [session-id]          List recordings");
    println!("  replay <log> [name] [--buffered] Replay a packet hexdump log into the current session");
}

fn arg<'a>(args: &'a [String], index: usize, what: &str) -> anyhow::Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .with_context(|| format!("Missing {}", what))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(cmd) = args.first().map(String::as_str) else {
        print_help();
        return Ok(());
    };
    if matches!(cmd, "--help" | "-h" | "help") {
        print_help();
        return Ok(());
    }

    let config = Config::from_env().context("Invalid configuration")?;
    let store = SqliteStore::connect(&config.database_url)
        .await
        .context("Failed to initialize database")?;
    info!("Database initialized successfully");

    std::fs::create_dir_all(&config.recordings_dir).ok();
    let ctx = Context::new(config, store);

    match cmd {
        "sessions" => {
            command::list_sessions(&ctx).await?;
        }
        "new-session" => {
            let name = args.get(1).map(String::as_str);
            command::new_session(&ctx, name).await?;
        }
        "use-session" => {
            command::use_session(&ctx, arg(&args, 1, "session id")?).await?;
        }
        "rename-session" => {
            let id = arg(&args, 1, "session id")?;
            let name = args[2..].join(" ");
            command::rename_session(&ctx, id, &name).await?;
        }
        "delete-session" => {
            command::delete_session(&ctx, arg(&args, 1, "session id")?).await?;
        }
        "recordings" => {
            command::list_recordings(&ctx, args.get(1).map(String::as_str)).await?;
        }
        "replay" => {
            let log = PathBuf::from(arg(&args, 1, "log file")?);
            let mut name = None;
            let mut mode = CaptureMode::Streaming;
            for extra in &args[2..] {
                match extra.as_str() {
                    "--buffered" => mode = CaptureMode::Buffered,
                    other => name = Some(other),
                }
            }
            command::replay(&ctx, &log, name, mode).await?;
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_help();
        }
    }

    Ok(())
}
