//! Integration Tests for CTAPHID framing
//!
//! Raw reports in, reassembled messages out, and back again.

use authorizer_transport::{
    Append, ChannelAllocator, Cmd, Error, InMessage, InitResponse, Message, Packet,
};

fn report(hex_packet: &str) -> Vec<u8> {
    let mut bytes = hex::decode(hex_packet).unwrap();
    bytes.resize(64, 0);
    bytes
}

#[test]
fn test_getinfo_request_from_reports() {
    // INIT on channel 5, CBOR, two declared bytes split across the INIT data
    let init = report("0000000590000204");
    let packet = Packet::from_report(&init).unwrap();
    assert_eq!(packet.cid(), 5);
    assert_eq!(packet.cmd(), Some(Cmd::Cbor));

    let message = InMessage::start(&packet).unwrap();
    assert!(message.is_complete());
    let message = message.into_message();
    assert_eq!(message.data, vec![0x04, 0x00]);
}

#[test]
fn test_reassembly_through_all_report_shapes() {
    let data: Vec<u8> = (0..250u16).map(|i| i as u8).collect();
    let packets = Message::new(0x0102_0304, Cmd::Msg, data.clone())
        .to_packets()
        .unwrap();

    let mut reports = Vec::new();
    for (i, packet) in packets.iter().enumerate() {
        let raw = packet.as_bytes();
        match i % 3 {
            0 => reports.push(raw.to_vec()),
            1 => {
                let mut with_id = vec![0u8];
                with_id.extend_from_slice(raw);
                reports.push(with_id);
            }
            _ if raw[62..].iter().all(|b| *b == 0) => reports.push(raw[..62].to_vec()),
            _ => reports.push(raw.to_vec()),
        }
    }

    let first = Packet::from_report(&reports[0]).unwrap();
    let mut message = InMessage::start(&first).unwrap();
    for raw in &reports[1..] {
        let packet = Packet::from_report(raw).unwrap();
        assert_eq!(message.append(&packet), Append::Accepted);
    }
    assert!(message.is_complete());
    assert_eq!(message.into_message().data, data);
}

#[test]
fn test_response_roundtrip() {
    let payload = vec![0xA5; 1000];
    let packets = Message::new(42, Cmd::Cbor, payload.clone())
        .to_packets()
        .unwrap();

    let mut message = InMessage::start(&packets[0]).unwrap();
    for packet in &packets[1..] {
        message.append(packet);
    }
    let message = message.into_message();
    assert_eq!(message.cid, 42);
    assert_eq!(message.cmd, Cmd::Cbor);
    assert_eq!(message.data, payload);
}

#[test]
fn test_bad_report_length() {
    let raw = vec![0u8; 63];
    assert_eq!(
        Packet::from_report(&raw),
        Err(Error::InvalidLength { cid: 0 })
    );
}

#[test]
fn test_init_allocation() {
    let mut allocator = ChannelAllocator::new();
    let nonce = [9, 8, 7, 6, 5, 4, 3, 2];

    let cid = allocator.allocate();
    let payload = InitResponse::new(nonce, cid, false).to_bytes();
    let response = Message::new(0xFFFF_FFFF, Cmd::Init, payload);
    let packets = response.to_packets().unwrap();
    assert_eq!(packets.len(), 1);

    let raw = packets[0].as_bytes();
    assert_eq!(
        hex::encode(&raw[..24]),
        "ffffffff8600110908070605040302000000010200000004"
    );
}
