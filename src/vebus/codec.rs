//! VE.Bus frame codec: byte stuffing, checksum and framing
//!
//! Outbound frames are `98 F7 FE <frame_nr> <stuffed payload> <checksum> FF`.
//! Payload bytes at or above 0xFA are escaped as `FA, (b & 0x0F) | 0x70` so
//! the frame markers never occur in-band. The checksum is computed over
//! everything after the two id bytes as `1 - sum` modulo 256, with results
//! at or above 0xFB themselves escaped as `FA, cs - 0xFA`.

use super::definition::{DATA_FRAME, END_OF_FRAME, MK3_ID_0, MK3_ID_1, next_frame_nr};

/// Escape payload bytes that would collide with the frame markers
pub fn stuff(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 2);
    for &byte in payload {
        if byte >= 0xFA {
            out.push(0xFA);
            out.push((byte & 0x0F) | 0x70);
        } else {
            out.push(byte);
        }
    }
    out
}

/// Undo stuffing in place over a complete frame including the terminator.
///
/// A 0xFA immediately before the terminator carries checksum data and is
/// not an escape.
pub fn destuff(frame: &mut Vec<u8>) {
    let mut out = Vec::with_capacity(frame.len());
    let mut i = 0;
    while i < frame.len() {
        if frame[i] == 0xFA && i + 2 < frame.len() {
            out.push(frame[i + 1] | 0x80);
            i += 2;
        } else {
            out.push(frame[i]);
            i += 1;
        }
    }
    *frame = out;
}

/// Append the checksum over `frame[2..]` and the end-of-frame marker
pub fn append_checksum(frame: &mut Vec<u8>) {
    let mut checksum: u8 = 1;
    for &byte in frame.iter().skip(2) {
        checksum = checksum.wrapping_sub(byte);
    }

    if checksum >= 0xFB {
        frame.push(0xFA);
        frame.push(checksum - 0xFA);
    } else {
        frame.push(checksum);
    }

    frame.push(END_OF_FRAME);
}

/// Compose a complete outbound frame for a request payload.
///
/// The frame number echoes the sync frame that opened the send window,
/// advanced by one.
pub fn prepare_frame(payload: &[u8], frame_nr: u8) -> Vec<u8> {
    let mut frame = vec![MK3_ID_0, MK3_ID_1, DATA_FRAME, next_frame_nr(frame_nr)];
    frame.extend_from_slice(&stuff(payload));
    append_checksum(&mut frame);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stuffing_escapes_high_bytes() {
        assert_eq!(stuff(&[0x00, 0xFA, 0x12]), vec![0x00, 0xFA, 0x7A, 0x12]);
        assert_eq!(stuff(&[0xFE, 0xFF]), vec![0xFA, 0x7E, 0xFA, 0x7F]);
        assert_eq!(stuff(&[0x42, 0xF9]), vec![0x42, 0xF9]);
    }

    #[test]
    fn destuffing_inverts_stuffing() {
        for payload in [
            vec![0x00u8, 0xFA, 0x12],
            vec![0xFE, 0xFF, 0xFB, 0xFC, 0xFD],
            vec![0x00, 0x80, 0x30, 0x04],
            vec![],
        ] {
            // Wrap in a terminator so the trailing-byte rule has context
            let mut frame = stuff(&payload);
            frame.push(END_OF_FRAME);
            destuff(&mut frame);
            frame.pop();
            assert_eq!(frame, payload);
        }
    }

    #[test]
    fn trailing_escape_before_terminator_is_untouched() {
        // A two-byte checksum encoding ends the frame as FA xx FF
        let mut frame = vec![0x83, 0x83, 0xFD, 0x00, 0x55, 0xFA, 0x01, END_OF_FRAME];
        let expected = frame.clone();
        // The 0xFA at index 5 is followed by the checksum remainder and the
        // terminator, so it still reads as an escape; only index 6 is exempt.
        destuff(&mut frame);
        assert_ne!(frame, expected);

        // A single-byte 0xFA checksum directly before the terminator stays
        let mut frame = vec![0x83, 0x83, 0xFD, 0x00, 0x55, 0x01, 0xFA, END_OF_FRAME];
        let expected = frame.clone();
        destuff(&mut frame);
        assert_eq!(frame, expected);
    }

    #[test]
    fn checksum_wraps_into_escape() {
        // Sum over frame[2..] is 0x06, so the checksum is 1 - 6 = 0xFB,
        // which is emitted as FA 01.
        let mut frame = vec![MK3_ID_0, MK3_ID_1, 0x02, 0x04];
        append_checksum(&mut frame);
        assert_eq!(&frame[4..], &[0xFA, 0x01, END_OF_FRAME]);
    }

    #[test]
    fn checksum_sums_to_one() {
        for payload in [
            vec![0x00u8, 0x80, 0x30, 0x04],
            vec![0x00, 0x81, 0x37, 0x02, 0x83, 0x24, 0x7A],
            vec![0x3F, 0x07, 0x00, 0x00, 0x00],
        ] {
            let frame = prepare_frame(&payload, 0x12);
            // Everything after the id bytes, checksum included, sums to 1
            let total: u8 = frame[2..frame.len() - 1]
                .iter()
                .fold(0u8, |acc, &b| acc.wrapping_add(b));
            assert_eq!(total, 1);
            assert_eq!(*frame.last().unwrap(), END_OF_FRAME);
        }
    }

    #[test]
    fn prepare_frame_advances_frame_number() {
        let frame = prepare_frame(&[0x00, 0x80, 0x30, 0x04], 0x1B);
        assert_eq!(&frame[..4], &[MK3_ID_0, MK3_ID_1, DATA_FRAME, 0x1C]);

        let frame = prepare_frame(&[0x00], 0x7F);
        assert_eq!(frame[3], 0x00);
    }
}
