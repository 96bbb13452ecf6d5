//! Image-update driver
//!
//! Feeds decoded Intel-HEX records into a [`LinearProgrammer`]. The record
//! decoder itself lives outside this crate and is reached through
//! [`RecordSource`].

use core::fmt;

use crate::controller::FlashController;
use crate::error::Error;
use crate::flash::{LinearProgrammer, ProgramStats};
use crate::status::FlashingFlag;

/// A decoded hex record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record<'a> {
    /// Payload at a 16-bit offset from the current upper address
    Data {
        /// Lower 16 bits of the load address
        offset: u16,
        /// Payload bytes
        data: &'a [u8],
    },
    /// End of file
    EndOfFile,
    /// Segment base for the following data (unsupported)
    ExtendedSegmentAddress(u16),
    /// 8086 entry point (unsupported)
    StartSegmentAddress {
        /// Code segment
        cs: u16,
        /// Instruction pointer
        ip: u16,
    },
    /// Upper 16 bits of the load address for the following data
    ExtendedLinearAddress(u16),
    /// Application entry point
    StartLinearAddress(u32),
}

impl Record<'_> {
    /// Record type code as it appears in the file
    pub const fn type_code(&self) -> u8 {
        match self {
            Self::Data { .. } => 0x00,
            Self::EndOfFile => 0x01,
            Self::ExtendedSegmentAddress(_) => 0x02,
            Self::StartSegmentAddress { .. } => 0x03,
            Self::ExtendedLinearAddress(_) => 0x04,
            Self::StartLinearAddress(_) => 0x05,
        }
    }
}

/// Failures reported by the record decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HexError {
    /// Reading the underlying file failed
    File,
    /// Record is malformed (bad start code, length, checksum or type)
    InvalidRecord,
    /// Decoder was called with arguments it cannot handle
    InvalidArguments,
    /// A record line is not terminated
    MissingNewline,
}

impl fmt::Display for HexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "file read error"),
            Self::InvalidRecord => write!(f, "invalid record"),
            Self::InvalidArguments => write!(f, "invalid arguments"),
            Self::MissingNewline => write!(f, "missing newline"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HexError {}

/// Supplier of decoded records in file order
pub trait RecordSource {
    /// Next record, or `None` once the input is exhausted
    fn next_record(&mut self) -> Option<Result<Record<'_>, HexError>>;
}

/// Why an update pass stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateError {
    /// The flash layer rejected a chunk or failed verification mid-stream
    Flash(Error),
    /// Committing the staged pages at the end of the pass failed
    Finish(Error),
    /// The record decoder failed
    Hex(HexError),
    /// A segment-addressing record was found; carries its type code
    UnsupportedRecord(u8),
}

impl UpdateError {
    /// Whether the pass read through to the end of the records before
    /// failing
    ///
    /// False for aborts in the middle of the stream, which leave the open
    /// page uncommitted.
    pub fn reached_end(&self) -> bool {
        matches!(self, Self::Finish(_) | Self::Hex(_))
    }
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flash(e) => write!(f, "flash error: {}", e),
            Self::Finish(e) => write!(f, "flash error on final commit: {}", e),
            Self::Hex(e) => write!(f, "hex error: {}", e),
            Self::UnsupportedRecord(t) => write!(f, "unsupported record type 0x{:02X}", t),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for UpdateError {}

impl From<Error> for UpdateError {
    fn from(e: Error) -> Self {
        Self::Flash(e)
    }
}

impl From<HexError> for UpdateError {
    fn from(e: HexError) -> Self {
        Self::Hex(e)
    }
}

/// Summary of a completed update pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpdateReport {
    /// Records consumed, including the end-of-file record
    pub records: usize,
    /// Payload bytes programmed
    pub bytes: usize,
    /// Page commit counters
    pub pages: ProgramStats,
    /// Entry point from a start-linear-address record, if present
    pub entry_point: Option<u32>,
}

/// Callback for progress reporting during an update pass
pub trait UpdateProgress {
    /// Called after each data record has been staged
    fn record(&mut self, address: u32, len: usize);

    /// Called after each page commit
    fn page_committed(&mut self, stats: &ProgramStats);

    /// Called when the pass completes successfully
    fn complete(&mut self, report: &UpdateReport);
}

/// A no-op progress reporter
pub struct NoProgress;

impl UpdateProgress for NoProgress {
    fn record(&mut self, _address: u32, _len: usize) {}
    fn page_committed(&mut self, _stats: &ProgramStats) {}
    fn complete(&mut self, _report: &UpdateReport) {}
}

/// Program the image supplied by `source` into flash
///
/// `flag` is raised for the duration of the pass. Data records are
/// addressed as `(upper << 16) + offset`, where `upper` comes from the most
/// recent extended-linear-address record.
///
/// A flash error or a segment-addressing record aborts the pass at once,
/// leaving the open page uncommitted. A decode error stops reading, but the
/// pages staged so far are still committed before it is reported; a failure
/// of that final commit is reported as [`UpdateError::Finish`] instead.
pub fn apply_image<S, C, P>(
    source: &mut S,
    ctrl: &mut C,
    flag: &FlashingFlag,
    progress: &mut P,
) -> Result<UpdateReport, UpdateError>
where
    S: RecordSource + ?Sized,
    C: FlashController + ?Sized,
    P: UpdateProgress + ?Sized,
{
    let _flashing = flag.raise();

    let mut programmer = LinearProgrammer::new();
    programmer.start();

    let mut report = UpdateReport::default();
    let mut upper: u16 = 0;
    let mut decode_error = None;

    while let Some(next) = source.next_record() {
        let record = match next {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Hex decode failed after {} records: {}", report.records, e);
                decode_error = Some(e);
                break;
            }
        };
        report.records += 1;

        match record {
            Record::Data { offset, data } => {
                let address = ((upper as u32) << 16) + offset as u32;
                log::trace!("Data 0x{:08X}+{}", address, data.len());

                let committed = programmer.stats().pages_committed;
                if let Err(e) = programmer.program(ctrl, address, data) {
                    log::error!("Programming 0x{:08X} failed: {}", address, e);
                    return Err(e.into());
                }
                report.bytes += data.len();
                progress.record(address, data.len());
                let stats = programmer.stats();
                if stats.pages_committed != committed {
                    progress.page_committed(&stats);
                }
            }
            Record::ExtendedLinearAddress(value) => {
                log::debug!("Upper address 0x{:04X}", value);
                upper = value;
            }
            Record::StartLinearAddress(entry) => {
                log::debug!("Entry point 0x{:08X}", entry);
                report.entry_point = Some(entry);
            }
            Record::EndOfFile => {
                log::debug!("End of file record");
                break;
            }
            Record::ExtendedSegmentAddress(_) | Record::StartSegmentAddress { .. } => {
                let code = record.type_code();
                log::error!("Segment addressing (type 0x{:02X}) is not supported", code);
                return Err(UpdateError::UnsupportedRecord(code));
            }
        }
    }

    let committed = programmer.stats().pages_committed;
    programmer.finish(ctrl).map_err(UpdateError::Finish)?;
    report.pages = programmer.stats();
    if report.pages.pages_committed != committed {
        progress.page_committed(&report.pages);
    }

    if let Some(e) = decode_error {
        return Err(e.into());
    }

    log::info!(
        "Programmed {} bytes from {} records ({} pages committed, {} erased)",
        report.bytes,
        report.records,
        report.pages.pages_committed,
        report.pages.pages_erased
    );
    progress.complete(&report);
    Ok(report)
}
