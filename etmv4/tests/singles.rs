use etmv4::{demultiplex, DecodeContext, Decoder, Error, TracePacket};
use std::io::Cursor;

fn minimal_async() -> Vec<u8> {
    let mut data = vec![0x00; 11];
    data.push(0x80);
    data
}

/// S1: eleven 0x00 bytes plus a single 0x80 decode to exactly one
/// `Async` packet, then the stream ends cleanly.
#[test]
fn s1_minimal_async() {
    let mut decoder = Decoder::new(Cursor::new(minimal_async()), DecodeContext::default());
    let packets: Vec<_> = decoder.singles().map(Result::unwrap).collect();
    assert_eq!(packets, vec![TracePacket::Async]);
}

/// A run of zeros longer than the 11-byte minimum still synchronizes.
#[test]
fn longer_zero_run_still_synchronizes() {
    let mut data = vec![0x00; 20];
    data.push(0x80);
    let mut decoder = Decoder::new(Cursor::new(data), DecodeContext::default());
    let packets: Vec<_> = decoder.singles().map(Result::unwrap).collect();
    assert_eq!(packets, vec![TracePacket::Async]);
}

/// A stream with no ASYNC marker at all is a fatal error, not a clean
/// empty decode.
#[test]
fn missing_async_is_fatal_not_empty() {
    let data = vec![0x01, 0x02, 0x03];
    let mut decoder = Decoder::new(Cursor::new(data), DecodeContext::default());
    let results: Vec<_> = decoder.singles().collect();
    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(Error::MissingAsync)));
}

/// `0x00 0x05` after synchronization decodes as an OVERFLOW packet.
#[test]
fn overflow_packet_after_sync() {
    let mut data = minimal_async();
    data.push(0x00);
    data.push(0x05);
    let mut decoder = Decoder::new(Cursor::new(data), DecodeContext::default());
    let packets: Vec<_> = decoder.singles().map(Result::unwrap).collect();
    assert_eq!(packets, vec![TracePacket::Async, TracePacket::Overflow]);
}

/// S4 (worked example): Atom Fmt6 header 0x23 decodes to a=1,
/// count=3, producing 3+2 E atoms followed by one N atom.
#[test]
fn s4_atom_fmt6_worked_example() {
    let mut data = minimal_async();
    data.push(0x23);
    let mut decoder = Decoder::new(Cursor::new(data), DecodeContext::default());
    let packets: Vec<_> = decoder.singles().map(Result::unwrap).collect();
    match &packets[1] {
        TracePacket::Atom { atoms } => {
            assert_eq!(atoms.len(), 6);
            assert!(atoms[..5].iter().all(|a| *a == etmv4::Atom::E));
            assert_eq!(atoms[5], etmv4::Atom::N);
        }
        other => panic!("expected an Atom packet, got {:?}", other),
    }
}

/// S5: pushing two absolute addresses then an exact-match packet
/// referencing the older one replays it to the top of the stack.
#[test]
fn s5_exact_address_replay() {
    let mut data = minimal_async();
    data.push(0x9D);
    data.extend_from_slice(&[0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
    data.push(0x9E);
    data.extend_from_slice(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
    data.push(0x92); // match index 1 -> the first address pushed
    let mut decoder = Decoder::new(Cursor::new(data), DecodeContext::default());
    let packets: Vec<_> = decoder.singles().map(Result::unwrap).collect();
    assert_eq!(
        packets[3],
        TracePacket::ExactAddr { match_index: 1 }
    );
}

/// A malformed Atom Fmt5 pattern is the one fatal mid-stream decode
/// error; it terminates the iterator with an `Err`, not a dropped byte.
#[test]
fn malformed_atom_fmt5_terminates_with_fatal_error() {
    let mut data = minimal_async();
    data.push(0x6A); // bit5=1, h&0x3=2 -> abc=6, an in-range but invalid Fmt5 pattern
    let mut decoder = Decoder::new(Cursor::new(data), DecodeContext::default());
    let results: Vec<_> = decoder.singles().collect();
    assert!(matches!(
        results.last(),
        Some(Err(Error::MalformedAtomFmt5 { pattern: 0x6A }))
    ));
}

/// Exception packet decode threads a null return address through to
/// the packet, rather than failing the whole decode, when the embedded
/// address header isn't a recognized LongAddress32/64 header.
#[test]
fn exception_with_unrecognized_return_address_header_is_null_not_fatal() {
    let mut data = minimal_async();
    data.push(0x06); // Exception header, e1e0 bit0 = 0 -> no info1 byte
    data.push(0x00); // info0: e1e0 = 0, exception_type bits all 0
    data.push(0xFF); // not a recognized LongAddress32/64 header
    let mut decoder = Decoder::new(Cursor::new(data), DecodeContext::default());
    let packets: Vec<_> = decoder.singles().map(Result::unwrap).collect();
    match &packets[1] {
        TracePacket::Exception { return_address, .. } => assert!(return_address.is_none()),
        other => panic!("expected an Exception packet, got {:?}", other),
    }
}

/// The ETF demultiplexer round-trips a single-ID ETMv4 ASYNC capture:
/// feeding demuxed bytes for that ID back through the packet decoder
/// still finds the ASYNC marker.
#[test]
fn etf_demux_then_decode_round_trip() {
    let mut record = [0u8; 16];
    // First seven data bytes (even/odd pairs), all zero -> contributes
    // to the leading run of zeros the synchronizer needs.
    for b in record.iter_mut().take(14) {
        *b = 0x00;
    }
    record[14] = 0x00;
    record[15] = 0x00;

    let mut raw = Vec::new();
    raw.extend_from_slice(&record);
    // Second record: the async marker needs an 0x80 terminator
    // somewhere in the byte stream for trace ID 0.
    let mut record2 = [0u8; 16];
    record2[0] = 0x80;
    record2[1] = 0x00;
    raw.extend_from_slice(&record2);

    let sinks = demultiplex(Cursor::new(raw)).unwrap();
    let id0 = sinks.get(&0).cloned().unwrap_or_default();
    assert!(etmv4::find_async_start(&id0).is_some());
}
