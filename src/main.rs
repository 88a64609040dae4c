use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use xbin::asset::Asset;
use xbin::file::{self, DecodeOptions};
use xbin::{scan_blocks, AssetType, EncodeOptions, Envelope};

#[derive(Parser)]
#[command(name = "xbin", about = "Inspect and convert *LZ4* xmodel_bin / xanim_bin files")]
struct Cli {
    /// More log output (-v debug, -vv trace).  RUST_LOG overrides this.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Model,
    Anim,
}

impl From<Kind> for AssetType {
    fn from(k: Kind) -> Self {
        match k {
            Kind::Model => AssetType::Model,
            Kind::Anim  => AssetType::Anim,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show envelope sizes, asset type and element counts
    Info {
        input: PathBuf,
        /// Require this asset type
        #[arg(short = 't', long = "type", value_enum)]
        kind: Option<Kind>,
        /// Accept a stored length that disagrees with the payload
        #[arg(long)]
        no_verify_length: bool,
    },
    /// List every block with its offset and tag
    Blocks {
        input: PathBuf,
    },
    /// Write the decompressed block stream
    Dump {
        input: PathBuf,
        /// Defaults to <input>.dump
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Decode to JSON
    Export {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short = 't', long = "type", value_enum)]
        kind: Option<Kind>,
    },
    /// Encode a JSON asset
    Import {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Store this comment in the file header
        #[arg(long)]
        comment: Option<String>,
        /// Write only the color map into material image strings
        #[arg(long)]
        no_extended_features: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input, kind, no_verify_length } => {
            let bytes = std::fs::read(&input)?;
            let envelope = Envelope::read(&bytes[..])?;
            let options = DecodeOptions {
                expected:      kind.map(AssetType::from),
                verify_length: !no_verify_length,
            };
            let asset = file::read_asset(&bytes, &options)?;

            println!("── {} ─────────────────────────────────────────", input.display());
            println!("  File size      {} B", bytes.len());
            println!("  Stream size    {} B", envelope.uncompressed_len);
            println!("  Payload size   {} B", envelope.payload.len());
            println!("  Asset type     {}", asset.asset_type());
            match &asset {
                Asset::Model(m) => {
                    if let Some(c) = &m.comment {
                        println!("  Comment        {c}");
                    }
                    println!("  Bones          {} ({} cosmetic)", m.bones.len(), m.cosmetic_count());
                    println!("  Meshes         {}", m.meshes.len());
                    println!("  Vertices       {}", m.vertex_count());
                    println!("  Faces          {}", m.face_count());
                    println!("  Materials      {}", m.materials.len());
                }
                Asset::Anim(a) => {
                    if let Some(c) = &a.comment {
                        println!("  Comment        {c}");
                    }
                    println!("  Framerate      {}", a.framerate);
                    println!("  Parts          {}", a.parts.len());
                    println!("  Frames         {}", a.frames.len());
                    println!("  Notes          {}", a.notes.len());
                }
            }
        }

        // ── Blocks ───────────────────────────────────────────────────────────
        Commands::Blocks { input } => {
            let raw = file::open_stream(&std::fs::read(&input)?, true)?;
            let scan = scan_blocks(&raw);
            println!("{:>10}  {:>6}  Name", "Offset", "Tag");
            for b in &scan.blocks {
                println!("{:>#10X}  {:04X}  {}", b.offset, b.tag.id(), b.tag.name());
            }
            match scan.error {
                Some(e) => return Err(e.into()),
                None => println!(
                    "{} block(s), {}",
                    scan.blocks.len(),
                    scan.asset_type.map_or_else(|| "no asset marker".to_string(), |t| t.to_string())
                ),
            }
        }

        // ── Dump ─────────────────────────────────────────────────────────────
        Commands::Dump { input, output } => {
            let raw = file::open_stream(&std::fs::read(&input)?, true)?;
            let output = output.unwrap_or_else(|| with_suffix(&input, ".dump"));
            std::fs::write(&output, &raw)?;
            println!("Wrote {} B → {}", raw.len(), output.display());
        }

        // ── Export ───────────────────────────────────────────────────────────
        Commands::Export { input, output, kind } => {
            let options = DecodeOptions { expected: kind.map(AssetType::from), ..DecodeOptions::default() };
            let asset = file::read_asset_file(&input, &options)?;
            std::fs::write(&output, file::asset_to_json(&asset)?)?;
            println!("Exported {} → {}", asset.asset_type(), output.display());
        }

        // ── Import ───────────────────────────────────────────────────────────
        Commands::Import { input, output, comment, no_extended_features } => {
            let mut asset = file::asset_from_json(&std::fs::read_to_string(&input)?)?;
            if comment.is_some() {
                match &mut asset {
                    Asset::Model(m) => m.comment = comment,
                    Asset::Anim(a)  => a.comment = comment,
                }
            }
            let options = EncodeOptions { extended_features: !no_extended_features };
            file::write_asset_file(&output, &asset, &options)?;
            println!("Imported {} → {}", asset.asset_type(), output.display());
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}
