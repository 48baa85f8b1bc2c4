use std::{
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use clap::{Parser, Subcommand, ValueEnum};
use horizon_leveler_core::{
    timeline::{self, FrameRecord},
    CropMode, DeviceCapabilities, HostEvent, Leveler, LevelerConfig, LockedOrientation,
};
use tracing_subscriber::EnvFilter;

fn main() -> horizon_leveler_core::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    match cli.command {
        Commands::Replay {
            script,
            config,
            output,
        } => run_replay(&script, config.as_deref(), output.as_deref()),
        Commands::Simulate {
            crop_mode,
            locked_orientation,
            from,
            to,
            frames,
            record,
        } => run_simulate(crop_mode, locked_orientation, from, to, frames, record),
        Commands::Defaults => {
            let json = serde_json::to_string_pretty(&LevelerConfig::default())?;
            println!("{json}");
            Ok(())
        }
    }
}

fn run_replay(
    script: &Path,
    config: Option<&Path>,
    output: Option<&Path>,
) -> horizon_leveler_core::Result<()> {
    let config = match config {
        Some(path) => LevelerConfig::load(path)?,
        None => LevelerConfig::default(),
    };
    tracing::info!(?script, crop_mode = ?config.crop_mode, "replaying host script");

    let events = timeline::parse_script(&std::fs::read_to_string(script)?)?;
    let leveler = Leveler::activate(config, Some(DeviceCapabilities::default()))?;
    let outcome = timeline::replay(&leveler, &events)?;

    for event in &outcome.events {
        tracing::info!(?event, "leveler event");
    }

    match output {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            write_frames(BufWriter::new(file), &outcome.frames)?;
        }
        None => write_frames(std::io::stdout().lock(), &outcome.frames)?,
    }

    tracing::info!(frames = outcome.frames.len(), "replay finished");
    Ok(())
}

fn run_simulate(
    crop_mode: CropModeArg,
    locked_orientation: LockedOrientationArg,
    from: f64,
    to: f64,
    frames: usize,
    record: bool,
) -> horizon_leveler_core::Result<()> {
    let config = LevelerConfig {
        crop_mode: crop_mode.into(),
        locked_orientation: locked_orientation.into(),
        ..Default::default()
    };
    let fps = config.capture.frame_rate;

    let mut script = Vec::new();
    if record {
        script.push(HostEvent::StartRecording);
    }
    script.extend(timeline::sweep_script(from, to, frames, fps));
    if record {
        script.push(HostEvent::StopRecording);
    }

    let leveler = Leveler::activate(config, Some(DeviceCapabilities::default()))?;
    let outcome = timeline::replay(&leveler, &script)?;
    write_frames(std::io::stdout().lock(), &outcome.frames)
}

fn write_frames(mut out: impl Write, frames: &[FrameRecord]) -> horizon_leveler_core::Result<()> {
    for frame in frames {
        serde_json::to_writer(&mut out, frame)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.with_target(true).try_init()
    };
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Horizon leveling engine tools", long_about = None)]
struct Cli {
    /// Log filter used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a JSON-lines host script and print one transform per frame.
    Replay {
        /// Path to the host script.
        script: PathBuf,
        /// Optional JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Write frame records here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Sweep a synthetic device rotation through the leveler.
    Simulate {
        #[arg(long, value_enum, default_value_t = CropModeArg::Flex)]
        crop_mode: CropModeArg,
        #[arg(long, value_enum, default_value_t = LockedOrientationArg::Auto)]
        locked_orientation: LockedOrientationArg,
        /// Start tilt in degrees.
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        from: f64,
        /// End tilt in degrees.
        #[arg(long, default_value_t = 90.0, allow_hyphen_values = true)]
        to: f64,
        #[arg(long, default_value_t = 90)]
        frames: usize,
        /// Record for the whole sweep.
        #[arg(long)]
        record: bool,
    },
    /// Print the default configuration as JSON.
    Defaults,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CropModeArg {
    Flex,
    Rotate,
    Locked,
}

impl From<CropModeArg> for CropMode {
    fn from(value: CropModeArg) -> Self {
        match value {
            CropModeArg::Flex => CropMode::Flex,
            CropModeArg::Rotate => CropMode::Rotate,
            CropModeArg::Locked => CropMode::Locked,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LockedOrientationArg {
    Auto,
    Vertical,
    AlwaysVertical,
    Horizontal,
    AlwaysHorizontal,
}

impl From<LockedOrientationArg> for LockedOrientation {
    fn from(value: LockedOrientationArg) -> Self {
        match value {
            LockedOrientationArg::Auto => LockedOrientation::Auto,
            LockedOrientationArg::Vertical => LockedOrientation::Vertical,
            LockedOrientationArg::AlwaysVertical => LockedOrientation::AlwaysVertical,
            LockedOrientationArg::Horizontal => LockedOrientation::Horizontal,
            LockedOrientationArg::AlwaysHorizontal => LockedOrientation::AlwaysHorizontal,
        }
    }
}
