use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use image::{ImageBuffer, Luma};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

use clip_bridge::{Bridge, Config, Session, SyntheticEngine};

#[derive(Parser)]
#[command(
    name = "clip-bridge",
    version,
    about = "Fetch packed raw frames from a video script",
    long_about = "clip-bridge evaluates a video script, reports its output clip's geometry and timing, and fetches decoded frames as tightly packed planar buffers on a background worker pool."
)]
struct Cli {
    /// Configuration file (optional)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the clip's info as JSON
    Info {
        /// Script file
        script: PathBuf,

        /// Working directory for evaluation (defaults to the script's directory)
        #[arg(short, long)]
        working_dir: Option<PathBuf>,
    },

    /// Write a range of packed frames back to back into a file
    Frames {
        /// Script file
        script: PathBuf,

        /// Output file for the raw frames
        #[arg(short, long)]
        output: PathBuf,

        /// First frame to fetch
        #[arg(short, long, default_value_t = 0)]
        start: i32,

        /// Number of frames (defaults to the rest of the clip)
        #[arg(short = 'n', long)]
        count: Option<i32>,

        /// Working directory for evaluation (defaults to the script's directory)
        #[arg(short, long)]
        working_dir: Option<PathBuf>,
    },

    /// Save the first plane of one frame as a grayscale PNG
    Snapshot {
        /// Script file
        script: PathBuf,

        /// Frame to save
        #[arg(short, long, default_value_t = 0)]
        frame: i32,

        /// Output PNG path
        #[arg(short, long)]
        output: PathBuf,

        /// Working directory for evaluation (defaults to the script's directory)
        #[arg(short, long)]
        working_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting clip-bridge v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => Config::default(),
    };

    let bridge = Bridge::new(config, SyntheticEngine::new())?;
    bridge.initialize()?;

    match cli.command {
        Command::Info { script, working_dir } => {
            let session = open(&bridge, &script, working_dir.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&session.info())?);
        }
        Command::Frames { script, output, start, count, working_dir } => {
            let session = open(&bridge, &script, working_dir.as_deref()).await?;
            write_frames(&bridge, &session, &output, start, count).await?;
        }
        Command::Snapshot { script, frame, output, working_dir } => {
            let session = open(&bridge, &script, working_dir.as_deref()).await?;
            snapshot(&session, frame, &output).await?;
        }
    }

    Ok(())
}

async fn open(bridge: &Bridge, script: &Path, working_dir: Option<&Path>) -> Result<Session> {
    bridge
        .open_script_file(script, working_dir)
        .await
        .with_context(|| format!("could not open script {:?}", script))
}

async fn write_frames(bridge: &Bridge, session: &Session, output: &Path, start: i32, count: Option<i32>) -> Result<()> {
    let num_frames = session.info().num_frames;
    if start < 0 || start >= num_frames {
        bail!("start frame {} is outside 0..{}", start, num_frames);
    }
    let end = match count {
        Some(count) => start.saturating_add(count.max(0)).min(num_frames),
        None => num_frames,
    };

    let file = File::create(output).with_context(|| format!("could not create {:?}", output))?;
    let mut writer = BufWriter::new(file);

    info!("Writing frames {}..{} to {:?}", start, end, output);
    let written = bridge
        .stream_frames(session, start..end, |_, bytes| {
            writer.write_all(bytes)?;
            Ok(())
        })
        .await?;
    writer.flush()?;

    info!(
        "Wrote {} frames ({} bytes each) to {:?}",
        written,
        session.frame_size(),
        output
    );
    Ok(())
}

async fn snapshot(session: &Session, frame: i32, output: &Path) -> Result<()> {
    let completion = session.get_frame(frame, session.allocate_frame_buffer()).await?;
    let (error, frame, buffer) = completion.into_parts();
    if let Some(error) = error {
        return Err(error.into());
    }

    let plane = session
        .layout()
        .plane(0)
        .copied()
        .context("clip has no planes")?;
    let bytes = &buffer[plane.offset..plane.offset + plane.len()];

    match session.clip_info().format.bytes_per_sample {
        1 => {
            let image: ImageBuffer<Luma<u8>, Vec<u8>> =
                ImageBuffer::from_raw(plane.width, plane.height, bytes.to_vec())
                    .context("plane does not match its dimensions")?;
            image.save(output)?;
        }
        2 => {
            let samples = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            let image: ImageBuffer<Luma<u16>, Vec<u16>> =
                ImageBuffer::from_raw(plane.width, plane.height, samples)
                    .context("plane does not match its dimensions")?;
            image.save(output)?;
        }
        other => bail!("{}-byte samples cannot be saved as PNG", other),
    }

    info!("Saved frame {} ({}x{}) to {:?}", frame, plane.width, plane.height, output);
    Ok(())
}
