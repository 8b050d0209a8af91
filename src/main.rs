#![forbid(unsafe_code)]

mod editor;
mod model;
mod placement;
mod store;
mod x11_backend;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level as TraceLevel};
use tracing_subscriber::FmtSubscriber;

use editor::{CanvasEditor, Point};
use placement::PlacementService;
use store::ProfileStore;
use x11_backend::X11WindowSystem;

#[derive(Parser)]
#[command(name = "zonetiler", about = "Tiling profile manager for X11", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List stored profiles
    List,
    /// Print one profile as JSON
    Show { name: String },
    /// Create a profile with evenly split columns
    New {
        name: String,
        /// Number of side-by-side zones
        #[arg(long, default_value_t = 2)]
        columns: usize,
    },
    /// Resolve a profile against the current monitors and windows and
    /// move the matching windows into their zones
    Apply {
        name: String,
        /// Print the placement plan without touching any window
        #[arg(long)]
        dry_run: bool,
        /// Also launch the commands configured on the profile's zones
        #[arg(long)]
        launch: bool,
    },
    /// Delete a stored profile
    Delete { name: String },
    /// Write a sample three-pane dashboard profile
    InitExample,
}

fn main() -> Result<()> {
    // Parse log level from environment variable
    let log_level = match std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "warn".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "info" => TraceLevel::INFO,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::WARN,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let store = ProfileStore::open_default();

    match cli.command {
        Command::List => {
            let profiles = store.load_all()?;
            if profiles.is_empty() {
                println!("No profiles in {:?}", store.path());
            }
            for profile in profiles {
                println!(
                    "{}  ({} zone(s), {} monitor slot(s))",
                    profile.name,
                    profile.zones.len(),
                    profile.monitor_slot_count
                );
            }
        }
        Command::Show { name } => {
            let profile = store.load(&name)?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        Command::New { name, columns } => {
            let profile = column_profile(&name, columns)?;
            info!("created profile '{}' with {} column(s)", name, columns);
            store.save(profile)?;
            println!("Saved profile '{name}' to {:?}", store.path());
        }
        Command::Apply {
            name,
            dry_run,
            launch,
        } => {
            let profile = store.load(&name)?;
            let service = PlacementService::new(X11WindowSystem::connect()?);

            if launch {
                let launched = service.launch(&profile);
                println!("Launched {launched} command(s)");
                if launched > 0 && !dry_run {
                    // Give the WM a moment so the new windows are mapped and
                    // their titles/classes are set before matching runs
                    std::thread::sleep(std::time::Duration::from_millis(1500));
                }
            }

            if dry_run {
                let plan = service.plan(&profile)?;
                for p in &plan.placements {
                    println!(
                        "{}: window {} -> {},{} {}x{}",
                        p.zone, p.window, p.rect.x, p.rect.y, p.rect.width, p.rect.height
                    );
                }
                for zone in &plan.unfilled {
                    println!("{zone}: unfilled");
                }
                for slot in &plan.missing_slots {
                    warn!("monitor slot {slot} has no physical monitor");
                }
            } else {
                let report = service.apply(&profile)?;
                println!(
                    "Placed {} window(s), {} failed, {} zone(s) unfilled",
                    report.placed.len(),
                    report.failed.len(),
                    report.unfilled.len()
                );
                for failure in &report.failed {
                    warn!(
                        "zone '{}' window {}: {}",
                        failure.zone, failure.window, failure.error
                    );
                }
                for slot in &report.missing_slots {
                    warn!("monitor slot {slot} has no physical monitor");
                }
            }
        }
        Command::Delete { name } => {
            if store.delete(&name)? {
                println!("Deleted profile '{name}'");
            } else {
                println!("No profile named '{name}'");
            }
        }
        Command::InitExample => {
            store.write_example()?;
            println!("Wrote example profile to {:?}", store.path());
        }
    }

    Ok(())
}

/// Build an N-column layout by driving the canvas editor: each column is
/// one create drag, with edge snapping pulling neighbors flush.
fn column_profile(name: &str, columns: usize) -> Result<model::Profile> {
    anyhow::ensure!(columns > 0, "a profile needs at least one column");
    anyhow::ensure!(
        columns <= 8,
        "more than 8 columns would be below the minimum zone size"
    );

    let mut editor = CanvasEditor::new();
    let step = 1.0 / columns as f64;
    for i in 0..columns {
        // Anchor just past the previous column's edge: outside its resize
        // handle so this starts a create, inside snap tolerance so the new
        // column lands flush against it.
        let prev_edge = editor
            .zones()
            .last()
            .map(|(_, z)| z.x + z.width)
            .unwrap_or(0.0);
        editor.begin_drag(Point::new(prev_edge + 0.018, 0.0));
        editor.update_drag(Point::new((i + 1) as f64 * step, 1.0));
        editor.end_drag()?;
    }
    Ok(editor.export_profile(name)?)
}
