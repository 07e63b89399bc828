//! Convert FireSide binary session logs to CSV on a host computer.
//!
//! Uses the same converter as the firmware's CONVERT state, so a table produced here is identical
//! to one produced on the board.
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use fireside::channels::FIRESIDE;
use fireside::design_parameters::{
    CHANNELS, PROGRESS_INTERVAL, ROWS_PER_BLOCK, TABLE_EXTENSION,
};
use fireside::log_converter::{LogConverter, Report};
use fireside::settings::Settings;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Binary session log, e.g. `3.dat`.
    #[arg(required_unless_present = "print_settings")]
    input: Option<PathBuf>,

    /// Output table. Defaults to the input with a `.csv` extension.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Channels per row in the log.
    #[arg(short, long, default_value_t = CHANNELS as u8,
          value_parser = clap::value_parser!(u8).range(1..=CHANNELS as i64))]
    channels: u8,

    /// Log bytes between progress messages.
    #[arg(long, default_value_t = PROGRESS_INTERVAL as u64)]
    progress: u64,

    /// Print the default settings file and exit.
    #[arg(long)]
    print_settings: bool,
}

/// Adapts a `std::io` stream to `embedded_io`.
struct Host<T>(T);

impl<T> embedded_io::ErrorType for Host<T> {
    type Error = io::Error;
}

impl<T: io::Read> embedded_io::Read for Host<T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, io::Error> {
        self.0.read(buf)
    }
}

impl<T: io::Write> embedded_io::Write for Host<T> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, io::Error> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> Result<(), io::Error> {
        self.0.flush()
    }
}

impl<T: io::Seek> embedded_io::Seek for Host<T> {
    fn seek(&mut self, pos: embedded_io::SeekFrom) -> Result<u64, io::Error> {
        let pos = match pos {
            embedded_io::SeekFrom::Start(offset) => io::SeekFrom::Start(offset),
            embedded_io::SeekFrom::End(offset) => io::SeekFrom::End(offset),
            embedded_io::SeekFrom::Current(offset) => {
                io::SeekFrom::Current(offset)
            }
        };
        self.0.seek(pos)
    }
}

fn convert<const C: usize, R, W>(
    input: &mut Host<R>,
    output: &mut Host<W>,
    progress: u64,
) -> Result<Report>
where
    R: io::Read + io::Seek,
    W: io::Write,
{
    let labels = core::array::from_fn(|i| FIRESIDE.inputs[i].label);
    let converter = LogConverter::<C, ROWS_PER_BLOCK>::new(labels, progress);
    let report = converter.convert(input, output, |progress| {
        log::info!(
            "Progress: {} / {} bytes",
            progress.position,
            progress.size
        );
    })?;
    Ok(report)
}

fn dispatch<R, W>(
    channels: u8,
    input: &mut Host<R>,
    output: &mut Host<W>,
    progress: u64,
) -> Result<Report>
where
    R: io::Read + io::Seek,
    W: io::Write,
{
    match channels {
        1 => convert::<1, _, _>(input, output, progress),
        2 => convert::<2, _, _>(input, output, progress),
        3 => convert::<3, _, _>(input, output, progress),
        4 => convert::<4, _, _>(input, output, progress),
        5 => convert::<5, _, _>(input, output, progress),
        6 => convert::<6, _, _>(input, output, progress),
        7 => convert::<7, _, _>(input, output, progress),
        8 => convert::<8, _, _>(input, output, progress),
        other => bail!("Unsupported channel count {other}"),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .init();
    let cli = Cli::parse();

    if cli.print_settings {
        let mut buffer = [0u8; 256];
        let len = Settings::default()
            .to_json(&mut buffer)
            .map_err(|e| anyhow::anyhow!("Serializing settings: {e:?}"))?;
        println!("{}", std::str::from_utf8(&buffer[..len])?);
        return Ok(());
    }

    let Some(input_path) = cli.input else {
        bail!("No input log given");
    };
    let output_path = cli
        .output
        .unwrap_or_else(|| input_path.with_extension(TABLE_EXTENSION));

    let input = File::open(&input_path)
        .with_context(|| format!("Opening {}", input_path.display()))?;
    let output = File::create(&output_path)
        .with_context(|| format!("Creating {}", output_path.display()))?;
    log::info!("{} -> {}", input_path.display(), output_path.display());

    let report = dispatch(
        cli.channels,
        &mut Host(BufReader::new(input)),
        &mut Host(BufWriter::new(output)),
        cli.progress,
    )
    .with_context(|| format!("Converting {}", input_path.display()))?;

    if report.trailing != 0 {
        log::warn!(
            "Ignored {} bytes of a truncated final record",
            report.trailing
        );
    }
    log::info!(
        "Wrote {} rows from {} records ({} bytes)",
        report.rows,
        report.records,
        report.size
    );
    Ok(())
}
