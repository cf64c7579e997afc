//! Framing properties over the public codec API

use triton::vebus::codec::{append_checksum, destuff, prepare_frame, stuff};

/// Exhaustive single-byte and pairwise round-trips, plus a few frames that
/// historically went wrong on the wire.
#[test]
fn destuff_inverts_stuff_for_payloads_without_trailing_escape() {
    let mut payloads: Vec<Vec<u8>> = (0u8..=255).map(|b| vec![b, 0x00]).collect();
    payloads.push(vec![0x00, 0xFA, 0x12]);
    payloads.push(vec![0xFF, 0xFE, 0xFD, 0xFC, 0xFB, 0xFA, 0x00]);
    payloads.push(vec![0x00, 0x81, 0x37, 0x02, 0x83, 0x24, 0x00]);

    for payload in payloads {
        let mut framed = stuff(&payload);
        framed.push(0xFF);
        destuff(&mut framed);
        assert_eq!(framed.pop(), Some(0xFF));
        assert_eq!(framed, payload, "round-trip failed");
    }
}

#[test]
fn spec_example_stuffing() {
    assert_eq!(stuff(&[0x00, 0xFA, 0x12]), vec![0x00, 0xFA, 0x7A, 0x12]);
}

#[test]
fn checksum_encoding_wraps_at_0xfb() {
    // Byte sum 0x06 after the id bytes: checksum 0xFB escapes to FA 01
    let mut frame = vec![0x98, 0xF7, 0x01, 0x02, 0x03];
    append_checksum(&mut frame);
    assert_eq!(&frame[5..], &[0xFA, 0x01, 0xFF]);

    // Byte sum 0x00: checksum stays a plain byte
    let mut frame = vec![0x98, 0xF7, 0x00];
    append_checksum(&mut frame);
    assert_eq!(&frame[3..], &[0x01, 0xFF]);
}

#[test]
fn checksum_identity_holds_for_all_single_byte_payloads() {
    for byte in 0u8..=255 {
        let frame = prepare_frame(&[0x00, 0x90, 0x32, byte], 0x33);
        let total: u8 = frame[2..frame.len() - 1]
            .iter()
            .fold(0u8, |acc, &b| acc.wrapping_add(b));
        assert_eq!(total, 1, "identity failed for payload byte {:#04x}", byte);
        assert_eq!(*frame.last().unwrap(), 0xFF);
        // Nothing between header and terminator may alias the terminator
        assert!(!frame[..frame.len() - 1].contains(&0xFF));
    }
}

#[test]
fn prepared_frames_carry_mk3_header_and_advanced_counter() {
    let frame = prepare_frame(&[0x00, 0x80, 0x30, 0x04], 0x7F);
    assert_eq!(&frame[..4], &[0x98, 0xF7, 0xFE, 0x00]);
}
