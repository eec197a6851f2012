use clap::{Parser, Subcommand};

use arcfs_compress::compressor::{get_compressor_by_name, Compressor, OptionParse};
use std::io::Write;
use std::path::PathBuf;

/// Default filesystem block size, matching the builder.
const DEFAULT_BLOCK_SIZE: usize = 131072;

#[derive(Parser)]
#[command(name = "arcfs-compress", about = "Compressor plugin tool for arcfs filesystems")]
struct Cli {
    /// Compressor backend to operate
    #[arg(short, long, default_value = "brotli")]
    compressor: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse -X options and write the stored-options record
    DumpOpts {
        output: PathBuf,
        #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
        block_size: usize,
        /// Compressor options, e.g. `-- -Xcompression-level 5`
        #[arg(last = true)]
        xopts: Vec<String>,
    },
    /// Display a stored-options record human-readably
    ShowOpts {
        input: PathBuf,
    },
    /// Compress one block
    Compress {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
        block_size: usize,
        /// Configure from a stored-options record instead of -X options
        /// (append mode)
        #[arg(long)]
        opts: Option<PathBuf>,
        #[arg(last = true)]
        xopts: Vec<String>,
    },
    /// Decompress one block
    Uncompress {
        input: PathBuf,
        output: PathBuf,
        /// Original (uncompressed) block size
        #[arg(long)]
        size: usize,
    },
    /// Print the backend's option usage text
    Usage {
        #[arg(long, default_value_t = 80)]
        cols: usize,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut comp = get_compressor_by_name(&cli.compressor)?;

    match cli.command {

        // ── DumpOpts ─────────────────────────────────────────────────────────
        Commands::DumpOpts { output, block_size, xopts } => {
            apply_options(comp.as_mut(), &xopts)?;
            comp.post_process(block_size)?;
            match comp.dump_options(block_size) {
                Some(record) => {
                    std::fs::write(&output, &record)?;
                    println!("Wrote {} byte {} options record: {}",
                             record.len(), comp.name(), output.display());
                }
                None => println!("{}: no options to store", comp.name()),
            }
        }

        // ── ShowOpts ─────────────────────────────────────────────────────────
        Commands::ShowOpts { input } => {
            let record = std::fs::read(&input)?;
            let mut stdout = std::io::stdout();
            comp.display_options(&record, &mut stdout)?;
            stdout.flush()?;
        }

        // ── Compress ─────────────────────────────────────────────────────────
        Commands::Compress { input, output, block_size, opts, xopts } => {
            match opts {
                Some(path) => {
                    let record = std::fs::read(&path)?;
                    comp.extract_options(block_size, &record)?;
                }
                None => {
                    apply_options(comp.as_mut(), &xopts)?;
                    comp.post_process(block_size)?;
                }
            }
            let data = std::fs::read(&input)?;
            comp.init(block_size, true)?;
            let compressed = comp.compress(&data, block_size)?;
            std::fs::write(&output, &compressed)?;
            println!("  {} -> {} bytes ({})", data.len(), compressed.len(), comp.name());
        }

        // ── Uncompress ───────────────────────────────────────────────────────
        Commands::Uncompress { input, output, size } => {
            let data = std::fs::read(&input)?;
            comp.init(size, true)?;
            let restored = comp.uncompress(&data, size)?;
            std::fs::write(&output, &restored)?;
            println!("  {} -> {} bytes ({})", data.len(), restored.len(), comp.name());
        }

        // ── Usage ────────────────────────────────────────────────────────────
        Commands::Usage { cols } => {
            let mut stdout = std::io::stdout();
            writeln!(stdout, "{} compressor options:", comp.name())?;
            comp.usage(&mut stdout, cols)?;
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

/// The host option loop: offer each token to the backend, stepping over the
/// values it consumes.  With a single backend built in, an unrecognised
/// option has nowhere else to go and is rejected here.
fn apply_options(comp: &mut dyn Compressor, xopts: &[String])
    -> Result<(), Box<dyn std::error::Error>>
{
    let mut i = 0;
    while i < xopts.len() {
        let rest: Vec<&str> = xopts[i + 1..].iter().map(String::as_str).collect();
        match comp.parse_option(&xopts[i], &rest)? {
            OptionParse::Consumed(n) => i += 1 + n,
            OptionParse::Unrecognized => {
                return Err(format!("{}: unrecognised option {}", comp.name(), xopts[i]).into());
            }
        }
    }
    Ok(())
}
