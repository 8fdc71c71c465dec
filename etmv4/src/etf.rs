//! ETF (Embedded Trace FIFO) framing demultiplexer.
//!
//! CoreSight's trace formatter multiplexes several trace IDs' byte
//! streams into fixed 16-byte records. Each of the seven even byte
//! slots (0, 2, .., 12) either carries a literal data byte for the
//! current ID or an ID-change marker in its low bit; byte 15 is a flag
//! byte whose low 7 bits disambiguate those two cases per slot (and
//! whose top bit reconstructs slot 14's stolen low bit).

use std::collections::BTreeMap;
use std::io::Read;

use crate::error::Error;

const RECORD_LEN: usize = 16;
const LAST_BYTE: usize = RECORD_LEN - 1;
const SECOND_LAST_BYTE: usize = LAST_BYTE - 1;

/// Splits a raw ETF capture into one byte buffer per trace ID, kept
/// in memory (the CLI can additionally persist them with
/// `--keeptmpbin`).
pub fn demultiplex<R: Read>(mut input: R) -> Result<BTreeMap<u8, Vec<u8>>, Error> {
    let mut sinks: BTreeMap<u8, Vec<u8>> = BTreeMap::new();
    let mut cur_id: u8 = 0;
    let mut buf = [0u8; RECORD_LEN];

    loop {
        let read = read_record(&mut input, &mut buf)?;
        if read == 0 {
            break;
        }
        log::debug!("Read {} bytes, current ID: {}", read, cur_id);

        let mut i = 0;
        while i < SECOND_LAST_BYTE {
            let aux = (buf[LAST_BYTE] >> (i / 2)) & 1;
            if buf[i] & 1 == 0 {
                let reconstructed = (buf[i] & 0xfe) | aux;
                let sink = sinks.entry(cur_id).or_default();
                sink.push(reconstructed);
                sink.push(buf[i + 1]);
                log::trace!(
                    "Data mode, wrote {:#04x} and {:#04x} for ID {}",
                    reconstructed,
                    buf[i + 1],
                    cur_id
                );
            } else if aux == 0 {
                let old_id = cur_id;
                cur_id = (buf[i] >> 1) & 0x7f;
                sinks.entry(cur_id).or_default().push(buf[i + 1]);
                log::debug!("ID update {} -> {}", old_id, cur_id);
            } else {
                sinks.entry(cur_id).or_default().push(buf[i + 1]);
                let old_id = cur_id;
                cur_id = (buf[i] >> 1) & 0x7f;
                log::debug!("ID update {} -> {}", old_id, cur_id);
            }
            i += 2;
        }

        if buf[SECOND_LAST_BYTE] & 1 == 1 {
            let old_id = cur_id;
            cur_id = (buf[SECOND_LAST_BYTE] >> 1) & 0x7f;
            log::debug!("ID update {} -> {}", old_id, cur_id);
            sinks.entry(cur_id).or_default();
        } else {
            let reconstructed = (buf[SECOND_LAST_BYTE] & 0xfe) | ((buf[LAST_BYTE] >> 7) & 1);
            log::trace!("Writing byte 14: {:#04x} ID {}", reconstructed, cur_id);
            sinks.entry(cur_id).or_default().push(reconstructed);
        }
    }

    Ok(sinks)
}

/// Reads one 16-byte record, treating a clean EOF at a record
/// boundary as end-of-input (returns 0) and any other short read as a
/// fatal framing error.
fn read_record<R: Read>(input: &mut R, buf: &mut [u8; RECORD_LEN]) -> Result<usize, Error> {
    let mut total = 0;
    while total < RECORD_LEN {
        match input.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    if total != 0 && total != RECORD_LEN {
        return Err(Error::FrameLength { read: total });
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn single_id_data_only_frame() {
        let mut record = [0u8; RECORD_LEN];
        for (i, b) in record.iter_mut().enumerate().take(SECOND_LAST_BYTE) {
            *b = (i as u8) & 0xfe;
        }
        record[SECOND_LAST_BYTE] = 0xAA & 0xfe;
        record[LAST_BYTE] = 0x00;

        let sinks = demultiplex(Cursor::new(record.to_vec())).unwrap();
        assert_eq!(sinks.len(), 1);
        assert!(sinks.contains_key(&0));
    }

    #[test]
    fn non_multiple_of_16_is_fatal() {
        let data = vec![0u8; 20];
        let err = demultiplex(Cursor::new(data)).unwrap_err();
        assert!(matches!(err, Error::FrameLength { read: 4 }));
    }

    #[test]
    fn immediate_id_change_updates_current_id() {
        let mut record = [0u8; RECORD_LEN];
        record[0] = (7 << 1) | 1; // ID-change to 7
        record[1] = 0x42;
        record[LAST_BYTE] = 0x00; // aux=0 -> immediate

        let sinks = demultiplex(Cursor::new(record.to_vec())).unwrap();
        assert_eq!(sinks.get(&7).unwrap()[0], 0x42);
    }
}
