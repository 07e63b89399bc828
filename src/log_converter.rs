//! Binary log to CSV conversion
//!
//! # Design
//!
//! A session log is a sequence of fixed-size records, each a `u32` microsecond timestamp taken
//! when the block was committed followed by `ROWS` rows of `CHANNELS` samples. Only one timestamp
//! exists per block, so row times are reconstructed by spreading the rows of a block evenly over
//! the interval since the previous record's timestamp.
//!
//! The first record has no predecessor. Its rows are spread backwards over the interval that
//! follows it (the next record's delta), clamped so that no row time is negative. A log holding a
//! single record places every row at that record's timestamp.
//!
//! Timestamps wrap every ~71.6 minutes. Deltas are computed with wrapping arithmetic and
//! accumulated into a 64-bit time base, so row times keep increasing across a wrap.
//!
//! Rows are streamed straight from the input; no block-sized buffer is needed. A truncated final
//! record is ignored.
use core::fmt::Write as _;
use embedded_io::{Read, ReadExactError, Seek, SeekFrom, Write};
use heapless::String;

use crate::error::storage;
use crate::Error;

/// Summary of a finished conversion.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Report {
    /// Complete records converted.
    pub records: u64,
    /// Rows written, excluding the header.
    pub rows: u64,
    /// Size of the input in bytes.
    pub size: u64,
    /// Bytes of a truncated final record that were ignored.
    pub trailing: u64,
}

/// Conversion progress.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Progress {
    /// Input bytes consumed.
    pub position: u64,
    /// Total input bytes.
    pub size: u64,
}

pub struct LogConverter<const CHANNELS: usize, const ROWS: usize> {
    labels: [&'static str; CHANNELS],
    progress_interval: u64,
}

impl<const CHANNELS: usize, const ROWS: usize> LogConverter<CHANNELS, ROWS> {
    /// Bytes per record.
    pub const RECORD_SIZE: u64 = (4 + CHANNELS * ROWS * 2) as u64;

    /// # Args
    /// * `labels` - Column labels, in channel order.
    /// * `progress_interval` - Input bytes between progress callbacks.
    pub fn new(
        labels: [&'static str; CHANNELS],
        progress_interval: u64,
    ) -> Self {
        Self {
            labels,
            progress_interval: progress_interval.max(1),
        }
    }

    /// Convert a complete log.
    ///
    /// # Args
    /// * `input` - The binary log. Read from the start regardless of its position.
    /// * `output` - Receives the table. The caller truncates it beforehand.
    /// * `progress` - Called every `progress_interval` input bytes.
    pub fn convert<R, W>(
        &self,
        input: &mut R,
        output: &mut W,
        mut progress: impl FnMut(Progress),
    ) -> Result<Report, Error>
    where
        R: Read + Seek,
        W: Write,
    {
        let size = input.seek(SeekFrom::End(0)).map_err(storage)?;
        let records = size / Self::RECORD_SIZE;
        let mut report = Report {
            records,
            rows: 0,
            size,
            trailing: size % Self::RECORD_SIZE,
        };
        if report.trailing != 0 {
            log::warn!("Ignoring {} trailing log bytes", report.trailing);
        }

        self.write_header(output)?;
        if records == 0 {
            output.flush().map_err(storage)?;
            return Ok(report);
        }

        // Peek at the second timestamp to size the first block's interval.
        let next = if records > 1 {
            input
                .seek(SeekFrom::Start(Self::RECORD_SIZE))
                .map_err(storage)?;
            Some(read_timestamp(input)?)
        } else {
            None
        };
        input.seek(SeekFrom::Start(0)).map_err(storage)?;
        let mut previous = read_timestamp(input)?;
        let span = next.map_or(0, |next| next.wrapping_sub(previous));

        let mut end = previous as u64;
        let span = (span as u64).min(end);
        report.rows += self.write_block(input, output, end - span, end)?;

        let mut reported = 0;
        for record in 1..records {
            let timestamp = read_timestamp(input)?;
            let start = end;
            end += timestamp.wrapping_sub(previous) as u64;
            previous = timestamp;
            report.rows += self.write_block(input, output, start, end)?;

            let position = (record + 1) * Self::RECORD_SIZE;
            if position - reported >= self.progress_interval {
                reported = position;
                progress(Progress { position, size });
            }
        }

        output.flush().map_err(storage)?;
        Ok(report)
    }

    fn write_header<W: Write>(&self, output: &mut W) -> Result<(), Error> {
        output.write_all(b"Time (us)").map_err(storage)?;
        for label in self.labels.iter() {
            output.write_all(b", ").map_err(storage)?;
            output.write_all(label.as_bytes()).map_err(storage)?;
        }
        output.write_all(b"\r\n").map_err(storage)
    }

    /// Stream the rows of one block, spread evenly over `[start, end)`.
    fn write_block<R: Read, W: Write>(
        &self,
        input: &mut R,
        output: &mut W,
        start: u64,
        end: u64,
    ) -> Result<u64, Error> {
        let mut row = [0u16; CHANNELS];
        let mut line: String<128> = String::new();
        for index in 0..ROWS as u64 {
            input
                .read_exact(bytemuck::bytes_of_mut(&mut row))
                .map_err(read)?;

            let time = start + (end - start) * index / ROWS as u64;
            line.clear();
            write!(line, "{time}")?;
            for sample in row.iter() {
                write!(line, ", {}", u16::from_le(*sample))?;
            }
            line.push_str("\r\n").map_err(|_| Error::Format)?;
            output.write_all(line.as_bytes()).map_err(storage)?;
        }
        Ok(ROWS as u64)
    }
}

fn read_timestamp<R: Read>(input: &mut R) -> Result<u32, Error> {
    let mut bytes = [0; 4];
    input.read_exact(&mut bytes).map_err(read)?;
    Ok(u32::from_le_bytes(bytes))
}

fn read<E: embedded_io::Error>(error: ReadExactError<E>) -> Error {
    match error {
        ReadExactError::UnexpectedEof => {
            Error::Storage(embedded_io::ErrorKind::Other)
        }
        ReadExactError::Other(e) => storage(e),
    }
}
