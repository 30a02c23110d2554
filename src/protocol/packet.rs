//! Addressed packet framing
//!
//! Outbound packets carry a 6-byte addressing header and end with `0x0A`:
//!
//! ```text
//! [t_hi, t_lo, t_offset, o_hi, o_lo, o_offset, payload..., 0x0A]
//! ```
//!
//! In fixed-point mode the radio consumes the target fields, so the peer
//! sees a 3-byte header, the payload, an optional RSSI byte and the
//! terminator. The format has no escaping: a payload or RSSI byte equal to
//! the terminator ends the frame early.

use crate::config::protocol::{
    FRAME_TERMINATOR, MAX_PACKET_LEN, MAX_PAYLOAD, RX_HEADER_LEN,
};
use heapless::Vec;

/// Frame decode errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// No terminator yet; more bytes are needed
    Incomplete,
    /// Terminator before a header and one payload byte
    TooShort,
    /// Output buffer smaller than the payload
    BufferTooSmall,
}

/// Decoded inbound packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub payload: Vec<u8, MAX_PAYLOAD>,
    /// Packet RSSI in dBm, when reporting is enabled. `i16` because
    /// `-(256 - raw)` reaches -256, below `i8::MIN`.
    pub rssi_dbm: Option<i16>,
}

/// Build an outbound packet
///
/// Payloads longer than [`MAX_PAYLOAD`] are truncated.
pub fn encode(
    target_addr: u16,
    own_addr: u16,
    own_offset: u8,
    target_offset: u8,
    payload: &[u8],
) -> Vec<u8, MAX_PACKET_LEN> {
    let payload = &payload[..payload.len().min(MAX_PAYLOAD)];

    let mut packet = Vec::new();
    let [t_hi, t_lo] = target_addr.to_be_bytes();
    let [o_hi, o_lo] = own_addr.to_be_bytes();

    // Capacity covers header, truncated payload and terminator
    let _ = packet.extend_from_slice(&[t_hi, t_lo, target_offset, o_hi, o_lo, own_offset]);
    let _ = packet.extend_from_slice(payload);
    let _ = packet.push(FRAME_TERMINATOR);
    packet
}

/// Index of the first terminator in `buf`
pub fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == FRAME_TERMINATOR)
}

/// Convert the raw RSSI byte to dBm
pub fn rssi_dbm(raw: u8) -> i16 {
    -(256 - i16::from(raw))
}

/// Decode the first frame in `buf`, copying its payload into `out`
///
/// Returns the payload length and the RSSI, if present.
pub fn decode_into(
    buf: &[u8],
    rssi_enabled: bool,
    out: &mut [u8],
) -> Result<(usize, Option<i16>), FrameError> {
    let n = find_terminator(buf).ok_or(FrameError::Incomplete)?;
    if n < RX_HEADER_LEN + 1 {
        return Err(FrameError::TooShort);
    }

    let (end, rssi) = if rssi_enabled && n >= RX_HEADER_LEN + 2 {
        (n - 1, Some(rssi_dbm(buf[n - 1])))
    } else {
        (n, None)
    };

    let payload = &buf[RX_HEADER_LEN..end];
    let dest = out
        .get_mut(..payload.len())
        .ok_or(FrameError::BufferTooSmall)?;
    dest.copy_from_slice(payload);

    Ok((payload.len(), rssi))
}

/// Decode the first frame in `buf`
pub fn decode(buf: &[u8], rssi_enabled: bool) -> Result<ReceivedMessage, FrameError> {
    let mut out = [0u8; MAX_PAYLOAD];
    let (len, rssi_dbm) = decode_into(buf, rssi_enabled, &mut out)?;

    let mut payload = Vec::new();
    payload
        .extend_from_slice(&out[..len])
        .map_err(|_| FrameError::BufferTooSmall)?;

    Ok(ReceivedMessage { payload, rssi_dbm })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::protocol::TX_HEADER_LEN;
    use proptest::prelude::*;
    use proptest::proptest;

    /// What the peer's radio hands over: the sender fields onward
    fn as_received(packet: &[u8]) -> &[u8] {
        &packet[RX_HEADER_LEN..]
    }

    /// Payload bytes that avoid the terminator
    fn payload_of(len: usize) -> std::vec::Vec<u8> {
        (0..len).map(|i| 0x20 + (i % 0x5F) as u8).collect()
    }

    #[test]
    fn test_header_layout() {
        let packet = encode(0x1234, 0xABCD, 18, 20, b"hi");
        assert_eq!(
            packet.as_slice(),
            &[0x12, 0x34, 20, 0xAB, 0xCD, 18, b'h', b'i', 0x0A]
        );
    }

    #[test]
    fn test_round_trip_all_lengths() {
        for len in 1..=MAX_PAYLOAD {
            let payload = payload_of(len);
            let packet = encode(7, 1001, 18, 18, &payload);
            assert_eq!(packet.len(), TX_HEADER_LEN + len + 1);

            let msg = decode(as_received(&packet), false).unwrap();
            assert_eq!(msg.payload.as_slice(), payload.as_slice(), "len {}", len);
            assert_eq!(msg.rssi_dbm, None);
        }
    }

    #[test]
    fn test_empty_payload_encodes_minimal_packet() {
        let packet = encode(1, 2, 3, 4, &[]);
        assert_eq!(packet.len(), TX_HEADER_LEN + 1);
        // Header alone is not a frame
        assert_eq!(decode(as_received(&packet), false), Err(FrameError::TooShort));
    }

    #[test]
    fn test_long_payload_truncated() {
        let payload = payload_of(300);
        let packet = encode(1, 2, 0, 0, &payload);
        assert_eq!(packet.len(), MAX_PACKET_LEN);

        let msg = decode(as_received(&packet), false).unwrap();
        assert_eq!(msg.payload.len(), MAX_PAYLOAD);
        assert_eq!(msg.payload.as_slice(), &payload[..MAX_PAYLOAD]);
    }

    #[test]
    fn test_incomplete_without_terminator() {
        assert_eq!(decode(&[], false), Err(FrameError::Incomplete));
        assert_eq!(decode(&[0x00, 0x01, 0x12, 0x41, 0x42], true), Err(FrameError::Incomplete));
    }

    #[test]
    fn test_too_short() {
        for n in 0..4 {
            let mut buf = [0x55u8; 6];
            buf[n] = FRAME_TERMINATOR;
            assert_eq!(decode(&buf, false), Err(FrameError::TooShort), "n = {}", n);
        }
    }

    #[test]
    fn test_rssi_byte_excluded() {
        let frame = [0x03, 0xE9, 0x12, b'o', b'k', 0xE0, 0x0A];
        let msg = decode(&frame, true).unwrap();
        assert_eq!(msg.payload.as_slice(), b"ok");
        assert_eq!(msg.rssi_dbm, Some(-32));

        // Same bytes with reporting off: the RSSI byte is payload
        let msg = decode(&frame, false).unwrap();
        assert_eq!(msg.payload.as_slice(), &[b'o', b'k', 0xE0]);
        assert_eq!(msg.rssi_dbm, None);
    }

    #[test]
    fn test_single_byte_frame_has_no_rssi() {
        let msg = decode(&[0x00, 0x01, 0x12, 0x99, 0x0A], true).unwrap();
        assert_eq!(msg.payload.as_slice(), &[0x99]);
        assert_eq!(msg.rssi_dbm, None);
    }

    #[test]
    fn test_rssi_range() {
        assert_eq!(rssi_dbm(0x00), -256);
        assert_eq!(rssi_dbm(0xFF), -1);
    }

    #[test]
    fn test_only_first_frame_decoded() {
        let buf = [0, 1, 2, b'a', 0x0A, 0, 1, 2, b'b', 0x0A];
        let msg = decode(&buf, false).unwrap();
        assert_eq!(msg.payload.as_slice(), b"a");
        assert_eq!(find_terminator(&buf), Some(4));
    }

    #[test]
    fn test_buffer_too_small() {
        let frame = [0, 1, 2, b'a', b'b', b'c', 0x0A];
        let mut out = [0u8; 2];
        assert_eq!(
            decode_into(&frame, false, &mut out),
            Err(FrameError::BufferTooSmall)
        );

        let mut out = [0u8; 3];
        assert_eq!(decode_into(&frame, false, &mut out), Ok((3, None)));
        assert_eq!(&out, b"abc");
    }

    #[test]
    fn test_oversized_frame_rejected_by_decode() {
        let mut frame = std::vec![0u8, 1, 2];
        frame.extend(payload_of(MAX_PAYLOAD + 5));
        frame.push(FRAME_TERMINATOR);
        assert_eq!(decode(&frame, false), Err(FrameError::BufferTooSmall));
    }

    fn payload_bytes() -> impl Strategy<Value = std::vec::Vec<u8>> {
        proptest::collection::vec(
            any::<u8>().prop_filter("terminator", |&b| b != FRAME_TERMINATOR),
            1..=MAX_PAYLOAD,
        )
    }

    proptest! {
        #[test]
        fn prop_decode_total(
            buf in proptest::collection::vec(any::<u8>(), 0..600),
            rssi_enabled in any::<bool>(),
            out_len in 0usize..300,
        ) {
            let _ = decode(&buf, rssi_enabled);

            let mut out = std::vec![0u8; out_len];
            if let Ok((len, _)) = decode_into(&buf, rssi_enabled, &mut out) {
                prop_assert!(len <= out_len);
            }
        }

        #[test]
        fn prop_round_trip(
            target in any::<u16>(),
            own in any::<u16>(),
            offset in any::<u8>(),
            payload in payload_bytes(),
        ) {
            let packet = encode(target, own, offset, offset, &payload);
            prop_assert_eq!(&packet[..2], &target.to_be_bytes()[..]);
            prop_assert_eq!(&packet[3..5], &own.to_be_bytes()[..]);

            let msg = decode(as_received(&packet), false).unwrap();
            prop_assert_eq!(msg.payload.as_slice(), payload.as_slice());
        }
    }
}
