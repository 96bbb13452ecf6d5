//! Loading Intel HEX files
//!
//! Decodes a firmware file line by line with the `ihex` crate and hands the
//! records to the update driver through [`RecordSource`]. Decoding stops at
//! the first bad line; the error is reported when the driver reaches it.

use hexboot_core::update::{HexError, Record, RecordSource};

/// A decoded firmware file
#[derive(Debug)]
pub struct HexFile {
    records: Vec<Result<ihex::Record, HexError>>,
    pos: usize,
}

impl HexFile {
    /// Decode the raw contents of a firmware file
    pub fn parse(hexdata: &[u8]) -> Self {
        let text = match core::str::from_utf8(hexdata) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("Firmware file is not valid UTF-8 ({})", e);
                return Self::failed(HexError::InvalidRecord);
            }
        };

        let mut records = Vec::new();
        for (lineno, line) in text.split_inclusive('\n').enumerate() {
            let Some(record) = line.strip_suffix('\n') else {
                if !line.trim().is_empty() {
                    log::warn!("Line {} is not terminated", lineno + 1);
                    records.push(Err(HexError::MissingNewline));
                }
                break;
            };
            let record = record.trim_end_matches('\r').trim();
            if record.is_empty() {
                continue;
            }

            match decode_line(record) {
                Ok(rec) => records.push(Ok(rec)),
                Err(e) => {
                    log::warn!("Line {}: {}", lineno + 1, e);
                    records.push(Err(HexError::InvalidRecord));
                    break;
                }
            }
        }

        Self { records, pos: 0 }
    }

    /// A file that fails with `error` on the first read
    pub fn failed(error: HexError) -> Self {
        Self {
            records: vec![Err(error)],
            pos: 0,
        }
    }

    /// Total payload bytes in the data records that decoded
    pub fn payload_len(&self) -> usize {
        self.records
            .iter()
            .map(|r| match r {
                Ok(ihex::Record::Data { value, .. }) => value.len(),
                _ => 0,
            })
            .sum()
    }

    /// Number of lines decoded, including a trailing bad one
    pub fn len(&self) -> usize {
        self.records.len()
    }
}

/// Decode a single record line
fn decode_line(line: &str) -> Result<ihex::Record, String> {
    match ihex::Reader::new(line).next() {
        Some(Ok(record)) => Ok(record),
        Some(Err(e)) => Err(format!("Invalid record: {}", e)),
        None => Err("Empty record".to_string()),
    }
}

impl RecordSource for HexFile {
    fn next_record(&mut self) -> Option<Result<Record<'_>, HexError>> {
        let entry = self.records.get(self.pos)?;
        self.pos += 1;

        Some(entry.as_ref().map_err(|e| *e).map(|rec| match rec {
            ihex::Record::Data { offset, value } => Record::Data {
                offset: *offset,
                data: value,
            },
            ihex::Record::EndOfFile => Record::EndOfFile,
            ihex::Record::ExtendedSegmentAddress(base) => Record::ExtendedSegmentAddress(*base),
            ihex::Record::StartSegmentAddress { cs, ip } => Record::StartSegmentAddress {
                cs: *cs,
                ip: *ip,
            },
            ihex::Record::ExtendedLinearAddress(upper) => Record::ExtendedLinearAddress(*upper),
            ihex::Record::StartLinearAddress(entry) => Record::StartLinearAddress(*entry),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(file: &mut HexFile) -> Vec<Result<(u8, Vec<u8>), HexError>> {
        let mut out = Vec::new();
        while let Some(next) = file.next_record() {
            out.push(next.map(|rec| {
                let data = match rec {
                    Record::Data { data, .. } => data.to_vec(),
                    _ => Vec::new(),
                };
                (rec.type_code(), data)
            }));
        }
        out
    }

    #[test]
    fn test_decodes_records() {
        let text = ":020000040800F2\r\n:0400000001020304F2\r\n:00000001FF\r\n";
        let mut file = HexFile::parse(text.as_bytes());
        assert_eq!(file.len(), 3);
        assert_eq!(file.payload_len(), 4);

        let records = collect(&mut file);
        assert_eq!(records[0], Ok((0x04, Vec::new())));
        assert_eq!(records[1], Ok((0x00, vec![1, 2, 3, 4])));
        assert_eq!(records[2], Ok((0x01, Vec::new())));
        assert!(file.next_record().is_none());
    }

    #[test]
    fn test_bad_checksum_stops_decoding() {
        let text = ":0400000001020304F2\n:0400040001020304FF\n:00000001FF\n";
        let mut file = HexFile::parse(text.as_bytes());
        let records = collect(&mut file);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], Err(HexError::InvalidRecord));
    }

    #[test]
    fn test_unterminated_last_line() {
        let mut file = HexFile::parse(b":0400000001020304F2\n:00000001FF");
        let records = collect(&mut file);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], Err(HexError::MissingNewline));
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let mut file = HexFile::parse(b"\n:00000001FF\n\n");
        assert_eq!(collect(&mut file), vec![Ok((0x01, Vec::new()))]);
    }

    #[test]
    fn test_garbage_is_invalid_record() {
        let mut file = HexFile::parse(b"hello\n");
        assert_eq!(collect(&mut file), vec![Err(HexError::InvalidRecord)]);

        let mut file = HexFile::parse(&[0x3A, 0xFF, 0xFE, b'\n']);
        assert_eq!(collect(&mut file), vec![Err(HexError::InvalidRecord)]);
    }
}
