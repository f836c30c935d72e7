use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use v8unpack::{unpack_flat, unpack_recursive, Container, Element};

#[derive(Parser)]
#[command(name = "v8unpack", version, about = "Unpack 1C:Enterprise V8 containers (.cf, .epf, .erf, .cfe)")]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug).  RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// One-level unpack: every element becomes a file, packed data inflated
    Unpack {
        input:      PathBuf,
        output_dir: PathBuf,
    },
    /// Recursive unpack: nested containers become directories
    Parse {
        input:      PathBuf,
        output_dir: PathBuf,
    },
    /// List container elements
    List {
        input: PathBuf,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show container metadata
    Info {
        input: PathBuf,
    },
}

#[derive(Serialize)]
struct ListRow {
    #[serde(flatten)]
    element:     Element,
    stored_size: u64,
    packed:      bool,
    container:   bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {

        // ── Unpack ───────────────────────────────────────────────────────────
        Commands::Unpack { input, output_dir } => {
            let cf = Container::open(&input)?;
            let report = unpack_flat(&cf, &output_dir)?;
            for path in &report.damaged {
                eprintln!("  damaged  {}", path.display());
            }
            println!("Done. {} file(s) written to {}", report.files_written, output_dir.display());
        }

        // ── Parse ────────────────────────────────────────────────────────────
        Commands::Parse { input, output_dir } => {
            let cf = Container::open(&input)?;
            let mut spinner = Spinner::default();
            let mut tick = |_: &Element| spinner.tick();
            let report = unpack_recursive(&cf, &output_dir, Some(&mut tick))?;
            eprint!("\u{8}");
            for path in &report.damaged {
                eprintln!("  damaged  {}", path.display());
            }
            println!(
                "Done. {} file(s), {} nested container(s) expanded into {}",
                report.files_written,
                report.containers_expanded,
                output_dir.display()
            );
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, json } => {
            let cf = Container::open(&input)?;
            let mut rows = Vec::with_capacity(cf.len());
            for element in cf.files() {
                let element = element?;
                let stream = cf.open_stream(&element, false)?;
                let (stored_size, class) = (stream.stored_len(), stream.classification());
                drop(stream);
                rows.push(ListRow {
                    element,
                    stored_size,
                    packed:    class.is_packed,
                    container: class.is_container,
                });
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("Container: {} ({})", input.display(), cf.address_format());
                println!("{:<40} {:>12} {:>6} {:>9}  {:<19}  {:<19}",
                         "Name", "Stored", "Packed", "Container", "Created", "Modified");
                for row in &rows {
                    println!("{:<40} {:>12} {:>6} {:>9}  {:<19}  {:<19}",
                        row.element.name(),
                        row.stored_size,
                        yes_no(row.packed),
                        yes_no(row.container),
                        row.element.created().format("%Y-%m-%d %H:%M:%S").to_string(),
                        row.element.modified().format("%Y-%m-%d %H:%M:%S").to_string());
                }
            }
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            let cf = Container::open(&input)?;
            let header = cf.header();
            println!("── V8 container ─────────────────────────────────────────");
            println!("  Path            {}", input.display());
            println!("  Addressing      {}", cf.address_format());
            println!("  Free page       0x{:x}", header.free_page_address);
            println!("  Page size       {} B", header.page_size);
            println!("  Storage version {}", header.storage_version);
            println!("  Elements        {}", cf.len());
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

#[derive(Default)]
struct Spinner {
    frame: usize,
}

impl Spinner {
    const FRAMES: [char; 4] = ['|', '/', '-', '\\'];

    fn tick(&mut self) {
        let mut err = std::io::stderr();
        let _ = write!(err, "\u{8}{}", Self::FRAMES[self.frame]);
        let _ = err.flush();
        self.frame = (self.frame + 1) % Self::FRAMES.len();
    }
}
