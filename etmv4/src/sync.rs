use std::io::Read;

use crate::error::Error;
use crate::reader::ByteReader;

/// Scans a byte stream for the ETMv4 ASYNC alignment marker: a run of
/// at least 11 zero bytes terminated by 0x80. Any non-zero byte other
/// than a terminating 0x80 (including an 0x80 that arrives too early)
/// resets the run counter, so leading garbage is silently skipped.
///
/// On success the reader is left positioned immediately after the
/// terminating 0x80 — i.e. the 11+ zero bytes and the 0x80 have all
/// been consumed, which is exactly the byte sequence an `Async`
/// packet consists of.
pub(crate) fn synchronize<R: Read>(reader: &mut ByteReader<R>) -> Result<(), Error> {
    let mut zeros = 0usize;
    loop {
        let b = reader
            .read_byte()
            .map_err(|_| Error::MissingAsync)?;
        if b == 0x00 {
            zeros += 1;
        } else if b == 0x80 && zeros >= 11 {
            return Ok(());
        } else {
            zeros = 0;
        }
    }
}

/// Pure variant of [`synchronize`] operating over an in-memory buffer,
/// returning the offset of the first byte of the matched run (used by
/// property tests and by the `--etf` CLI path, which already has the
/// full per-ID byte buffer in hand).
pub fn find_async_start(data: &[u8]) -> Option<usize> {
    let mut zeros = 0usize;
    let mut run_start = 0usize;
    for (i, &b) in data.iter().enumerate() {
        if b == 0x00 {
            if zeros == 0 {
                run_start = i;
            }
            zeros += 1;
        } else if b == 0x80 && zeros >= 11 {
            return Some(run_start);
        } else {
            zeros = 0;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn finds_minimal_async() {
        let mut data = vec![0x00; 11];
        data.push(0x80);
        let mut r = ByteReader::new(Cursor::new(data));
        assert!(synchronize(&mut r).is_ok());
    }

    #[test]
    fn skips_leading_garbage() {
        let mut data = vec![0xFF, 0xAB];
        data.extend(std::iter::repeat(0x00).take(11));
        data.push(0x80);
        let mut r = ByteReader::new(Cursor::new(data));
        assert!(synchronize(&mut r).is_ok());
    }

    #[test]
    fn longer_zero_run_still_matches() {
        let mut data = vec![0x00; 20];
        data.push(0x80);
        let mut r = ByteReader::new(Cursor::new(data));
        assert!(synchronize(&mut r).is_ok());
    }

    #[test]
    fn missing_async_is_fatal() {
        let data = vec![0x00; 5];
        let mut r = ByteReader::new(Cursor::new(data));
        assert!(matches!(synchronize(&mut r), Err(Error::MissingAsync)));
    }

    #[test]
    fn pure_finder_is_idempotent_on_its_own_result() {
        let mut data = vec![0xDE, 0xAD];
        data.extend(std::iter::repeat(0x00).take(11));
        data.push(0x80);
        let start = find_async_start(&data).unwrap();
        assert_eq!(find_async_start(&data[start..]), Some(0));
    }
}
