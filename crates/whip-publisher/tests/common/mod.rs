//! Hand-built Ogg/Opus streams shared by the integration tests

const HEADER_TYPE_CONTINUATION: u8 = 0x00;
const HEADER_TYPE_BEGINNING_OF_STREAM: u8 = 0x02;
const SERIAL: u32 = 0x5eed;

/// Ogg CRC-32: polynomial 0x04c11db7, no reflection, zero initial value
fn ogg_crc(data: &[u8]) -> u32 {
    let mut crc = 0u32;
    for &byte in data {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ 0x04c1_1db7
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Build one single-segment page. Payloads must be shorter than 255 bytes.
fn page(header_type: u8, granule: u64, sequence: u32, payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() < 255);

    let mut page = Vec::with_capacity(28 + payload.len());
    page.extend_from_slice(b"OggS");
    page.push(0);
    page.push(header_type);
    page.extend_from_slice(&granule.to_le_bytes());
    page.extend_from_slice(&SERIAL.to_le_bytes());
    page.extend_from_slice(&sequence.to_le_bytes());
    page.extend_from_slice(&[0, 0, 0, 0]);
    page.push(1);
    page.push(payload.len() as u8);
    page.extend_from_slice(payload);

    let crc = ogg_crc(&page);
    page[22..26].copy_from_slice(&crc.to_le_bytes());
    page
}

fn opus_head() -> Vec<u8> {
    let mut head = Vec::with_capacity(19);
    head.extend_from_slice(b"OpusHead");
    head.push(1); // version
    head.push(2); // channels
    head.extend_from_slice(&312u16.to_le_bytes()); // pre-skip
    head.extend_from_slice(&48_000u32.to_le_bytes());
    head.extend_from_slice(&0u16.to_le_bytes()); // output gain
    head.push(0); // channel mapping family
    head
}

/// An Opus ID header page followed by one data page per granule position
pub fn stream(granules: &[u64]) -> Vec<u8> {
    let mut data = page(HEADER_TYPE_BEGINNING_OF_STREAM, 0, 0, &opus_head());
    for (i, granule) in granules.iter().enumerate() {
        let payload = vec![0xf0 | i as u8; 16 + i];
        data.extend(page(HEADER_TYPE_CONTINUATION, *granule, i as u32 + 1, &payload));
    }
    data
}
