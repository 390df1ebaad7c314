//! Turn raw perf records into [`RawRecord`]s

use log::debug;
use perf_event_data::endian::Little;
use perf_event_data::parse::{ParseConfig, Parser};
use perf_event_data::Record;
use selfprof_common::{PerfEventHeader, USER_ADDR_LIMIT};

use crate::domain::{Pid, Tid};
use crate::trace::{RawRecord, RecordKind};

/// Decode one record, header included. Records that fail to parse yield `None`.
///
/// Sample callchains arrive innermost-first and interleaved with context
/// markers; markers, kernel addresses and null entries are dropped, the
/// innermost `max_depth` user frames are kept, and the result is reversed so
/// the outermost caller comes first.
pub fn decode_record(
    header: &PerfEventHeader,
    bytes: &[u8],
    config: &ParseConfig<Little>,
    max_depth: usize,
) -> Option<RawRecord> {
    let mut parser = Parser::new(bytes, config.clone());
    let record = match parser.parse::<Record>() {
        Ok(record) => record,
        Err(e) => {
            debug!("Dropping undecodable record of type {}: {e}", header.type_);
            return None;
        }
    };

    match record {
        Record::Sample(sample) => {
            let mut frames: Vec<u64> = sample
                .callchain()
                .unwrap_or(&[])
                .iter()
                .copied()
                .filter(|&addr| addr != 0 && addr < USER_ADDR_LIMIT)
                .take(max_depth)
                .collect();
            frames.reverse();

            let pid = Pid(sample.pid()?);
            let tid = Tid(sample.tid()?);
            Some(RawRecord::sample(pid, tid, frames))
        }
        Record::Lost(lost) => Some(RawRecord::lost(Pid(0), lost.lost)),
        _ => Some(RawRecord {
            pid: Pid(0),
            tid: Tid(0),
            kind: RecordKind::Other(header.type_),
            frames: Vec::new(),
        }),
    }
}
