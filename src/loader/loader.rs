use std::fs::File;
use std::io;
use std::io::{BufRead, BufReader, Cursor};
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::instructions::instructions::{OpType, RegisterType, TraceRecord};

#[derive(Debug, Error)]
pub(crate) enum LoadError {
    #[error("could not open trace file {path}: {source}")]
    Open { path: String, source: io::Error },
}

/// Streams instruction records out of a trace. One record per line, five
/// whitespace-separated fields: hex pc, op type, dest, src1, src2. The
/// first short or malformed record finalizes the input like a normal end
/// of file; the reader stays exhausted from then on.
pub(crate) struct TraceReader {
    reader: Box<dyn BufRead>,
    line: String,
    done: bool,
}

impl TraceReader {
    pub(crate) fn open(path: &Path) -> Result<TraceReader, LoadError> {
        let file = File::open(path).map_err(|source| LoadError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Ok(TraceReader::from_reader(Box::new(BufReader::new(file))))
    }

    pub(crate) fn from_str(trace: &str) -> TraceReader {
        TraceReader::from_reader(Box::new(Cursor::new(trace.to_string())))
    }

    fn from_reader(reader: Box<dyn BufRead>) -> TraceReader {
        TraceReader {
            reader,
            line: String::new(),
            done: false,
        }
    }

    pub(crate) fn next_record(&mut self) -> Option<TraceRecord> {
        if self.done {
            return None;
        }

        self.line.clear();
        // a read error ends the stream the same way EOF does
        let read = self.reader.read_line(&mut self.line).unwrap_or(0);
        if read == 0 {
            self.done = true;
            return None;
        }

        match parse_record(&self.line) {
            Some(record) => Some(record),
            None => {
                debug!("malformed trace record {:?}, finalizing input", self.line.trim_end());
                self.done = true;
                None
            }
        }
    }
}

fn parse_record(line: &str) -> Option<TraceRecord> {
    let mut fields = line.split_whitespace();

    // the 0x prefix on the pc is optional
    let field = fields.next()?;
    let pc = u64::from_str_radix(
        field
            .strip_prefix("0x")
            .or_else(|| field.strip_prefix("0X"))
            .unwrap_or(field),
        16,
    )
    .ok()?;
    let op = OpType::from_code(fields.next()?.parse().ok()?);
    let dest = parse_reg(fields.next()?)?;
    let src1 = parse_reg(fields.next()?)?;
    let src2 = parse_reg(fields.next()?)?;

    Some(TraceRecord { pc, op, dest, src1, src2 })
}

// A record is malformed only when a field fails to parse as an integer;
// register values are not bounds checked.
fn parse_reg(field: &str) -> Option<Option<RegisterType>> {
    let value: i64 = field.parse().ok()?;
    match value {
        -1 => Some(None),
        _ => Some(Some(value as RegisterType)),
    }
}
