//! Log reader
//!
//! Reads commit records frame by frame, distinguishing a clean end of log, a
//! torn tail (a final frame left incomplete or unverifiable by a crash
//! mid-append), and corruption (a bad frame with readable data after it).

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::{Error, Result};

use super::record::{frame_crc, Record, HEADER_SIZE, MAX_PAYLOAD_LEN};

/// Outcome of reading one frame
#[derive(Debug)]
pub enum NextRecord {
    /// A complete, verified record
    Record(Record),

    /// Clean end of the log at a frame boundary
    End,

    /// The final frame is incomplete or fails verification; `offset` is
    /// where it starts
    Torn { offset: u64 },
}

/// Reads commit records from a log file
pub struct WalReader {
    file: BufReader<File>,

    /// Total file length at open, for telling a bad tail frame from a bad
    /// frame with readable data after it
    file_len: u64,

    /// Byte offset of the next unread frame. Advances only on a complete,
    /// verified record, so after `Torn` or a corruption error it marks the
    /// truncation point.
    offset: u64,
}

impl WalReader {
    /// Open a log file for reading from the start
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        Ok(Self {
            file: BufReader::new(file),
            file_len,
            offset: 0,
        })
    }

    /// Read the next frame
    ///
    /// A frame that fails verification (bad length field, checksum mismatch,
    /// undecodable payload) is reported as `Torn` when it runs to the end of
    /// the file, since a crash mid-append leaves exactly that shape. The
    /// same damage with readable data after it returns `Err(Corruption)`.
    /// The reader is not resumable after `Torn`, `End`, or an error.
    pub fn next_record(&mut self) -> Result<NextRecord> {
        let frame_start = self.offset;

        let mut header = [0u8; HEADER_SIZE];
        let n = read_fully(&mut self.file, &mut header)?;
        if n == 0 {
            return Ok(NextRecord::End);
        }
        if n < HEADER_SIZE {
            return Ok(NextRecord::Torn {
                offset: frame_start,
            });
        }

        let lsn = u64::from_le_bytes(header[0..8].try_into().unwrap());
        let crc = u32::from_le_bytes(header[8..12].try_into().unwrap());
        let len = u32::from_le_bytes(header[12..16].try_into().unwrap());

        if len > MAX_PAYLOAD_LEN {
            // The writer never frames a payload this large, so the length
            // field itself is damaged. If the claim swallows the rest of the
            // file there is nothing left to verify and the frame counts as
            // the tail; otherwise readable data follows and this is
            // corruption proper.
            let claimed_end = frame_start + HEADER_SIZE as u64 + len as u64;
            if claimed_end >= self.file_len {
                return Ok(NextRecord::Torn {
                    offset: frame_start,
                });
            }
            return Err(Error::Corruption(format!(
                "record at offset {} claims a {} byte payload",
                frame_start, len
            )));
        }

        let mut payload = vec![0u8; len as usize];
        let n = read_fully(&mut self.file, &mut payload)?;
        if n < payload.len() {
            return Ok(NextRecord::Torn {
                offset: frame_start,
            });
        }

        let frame_end = frame_start + (HEADER_SIZE + payload.len()) as u64;
        let at_tail = frame_end == self.file_len;

        if frame_crc(lsn, &payload) != crc {
            if at_tail {
                return Ok(NextRecord::Torn {
                    offset: frame_start,
                });
            }
            return Err(Error::Corruption(format!(
                "checksum mismatch in record at offset {}",
                frame_start
            )));
        }

        let record = match Record::decode(lsn, &payload) {
            Ok(record) => record,
            Err(_) if at_tail => {
                return Ok(NextRecord::Torn {
                    offset: frame_start,
                });
            }
            Err(e) => {
                return Err(Error::Corruption(format!(
                    "undecodable record at offset {}: {}",
                    frame_start, e
                )));
            }
        };

        self.offset = frame_end;
        Ok(NextRecord::Record(record))
    }

    /// Byte offset of the next unread frame
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

/// Read until `buf` is full or EOF; returns the number of bytes read.
///
/// Unlike `read_exact`, a short read is reported by count rather than an
/// error, which is what torn-tail detection needs.
fn read_fully(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(filled)
}
