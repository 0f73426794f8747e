/*
 * Created on Thu Jan 18 2024
 *
 * This file is a part of qmd
 * qmd is the query manager that fronts the game world, login and web
 * services with a typed query protocol over a shared SQL store.
 *
 * Copyright (c) 2024, The qmd developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

use {
    super::{
        examine_frame, write_frame, FrameError, FrameStatus, PayloadBuf, PayloadReader,
        PayloadWriter, Status,
    },
    rand::Rng,
};

fn roundtrip(payload: &[u8]) -> (usize, Vec<u8>) {
    let mut framed = Vec::new();
    write_frame(&mut framed, payload);
    match examine_frame(&framed, usize::MAX).unwrap() {
        FrameStatus::Complete { header, payload } => {
            (header, framed[header..header + payload].to_vec())
        }
        FrameStatus::Incomplete => panic!("roundtrip produced an incomplete frame"),
    }
}

#[test]
fn frame_roundtrip_short() {
    for len in [1usize, 2, 16, 255, 0xFFFE] {
        let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
        let mut framed = Vec::new();
        write_frame(&mut framed, &payload);
        assert_eq!(framed.len(), 2 + len);
        let (header, body) = roundtrip(&payload);
        assert_eq!(header, 2);
        assert_eq!(body, payload);
    }
}

#[test]
fn frame_roundtrip_extended() {
    for len in [0xFFFFusize, 0x10000, 0x12345] {
        let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
        let mut framed = Vec::new();
        write_frame(&mut framed, &payload);
        assert_eq!(framed.len(), 6 + len);
        let (header, body) = roundtrip(&payload);
        assert_eq!(header, 6);
        assert_eq!(body, payload);
    }
}

#[test]
fn frame_roundtrip_random() {
    let mut rng = rand::thread_rng();
    for _ in 0..64 {
        let len = rng.gen_range(1..2048);
        let payload: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        let (_, body) = roundtrip(&payload);
        assert_eq!(body, payload);
    }
}

#[test]
fn frame_boundary_sequence() {
    // 0xFFFE (short header), 0xFFFF (forces the extended header), then
    // 0xFFFE again; each must be extracted independently
    let mut wire = Vec::new();
    let a = vec![b'a'; 0xFFFE];
    let b = vec![b'b'; 0xFFFF];
    let c = vec![b'c'; 0xFFFE];
    write_frame(&mut wire, &a);
    write_frame(&mut wire, &b);
    write_frame(&mut wire, &c);
    let mut cursor = &wire[..];
    for (want_header, want_body) in [(2, &a), (6, &b), (2, &c)] {
        match examine_frame(cursor, usize::MAX).unwrap() {
            FrameStatus::Complete { header, payload } => {
                assert_eq!(header, want_header);
                assert_eq!(&cursor[header..header + payload], &want_body[..]);
                cursor = &cursor[header + payload..];
            }
            FrameStatus::Incomplete => panic!("expected a complete frame"),
        }
    }
    assert!(cursor.is_empty());
}

#[test]
fn frame_zero_length_is_illegal() {
    assert_eq!(
        examine_frame(&[0, 0], usize::MAX),
        Err(FrameError::ZeroLength)
    );
    // extended escape to zero is just as illegal
    assert_eq!(
        examine_frame(&[0xFF, 0xFF, 0, 0, 0, 0], usize::MAX),
        Err(FrameError::ZeroLength)
    );
}

#[test]
fn frame_too_large_is_refused() {
    let mut framed = Vec::new();
    write_frame(&mut framed, &[0u8; 512]);
    assert_eq!(examine_frame(&framed, 256), Err(FrameError::TooLarge(512)));
}

#[test]
fn frame_incomplete_wants_more() {
    let mut framed = Vec::new();
    write_frame(&mut framed, b"hello");
    for cut in 0..framed.len() {
        assert_eq!(
            examine_frame(&framed[..cut], usize::MAX).unwrap(),
            FrameStatus::Incomplete
        );
    }
}

#[test]
fn reader_typed_fields() {
    let mut data = Vec::new();
    let mut w = PayloadWriter::new(&mut data, 1024);
    w.put_u8(7);
    w.put_u16(0xBEEF);
    w.put_u32(0xDEADBEEF);
    w.put_u32_be(u32::from(std::net::Ipv4Addr::new(127, 0, 0, 1)));
    w.put_u16_be(0x0102);
    w.put_bool(true);
    w.put_string("Zanera");
    assert!(w.finish());
    let mut r = PayloadReader::new(&data);
    assert_eq!(r.u8(), 7);
    assert_eq!(r.u16(), 0xBEEF);
    assert_eq!(r.u32(), 0xDEADBEEF);
    assert_eq!(r.u32_be(), 0x7F000001);
    assert_eq!(r.u16_be(), 0x0102);
    assert!(r.bool());
    assert_eq!(r.string(), "Zanera");
    assert!(!r.overflowed());
    assert_eq!(r.remaining(), 0);
}

#[test]
fn reader_overruns_zero_fill_and_latch() {
    let mut r = PayloadReader::new(&[0xAB]);
    assert_eq!(r.u8(), 0xAB);
    assert!(!r.overflowed());
    assert_eq!(r.u32(), 0);
    assert!(r.overflowed());
    // everything after the first overrun keeps yielding zero values
    assert_eq!(r.u16(), 0);
    assert_eq!(r.string(), "");
    assert!(!r.bool());
}

#[test]
fn reader_string_with_bad_length_overflows() {
    // announces 100 bytes, carries 2
    let mut data = Vec::new();
    data.extend_from_slice(&100u16.to_le_bytes());
    data.extend_from_slice(b"ab");
    let mut r = PayloadReader::new(&data);
    assert_eq!(r.string(), "");
    assert!(r.overflowed());
}

#[test]
fn writer_overflow_latches_without_partial_fields() {
    let mut data = Vec::new();
    let mut w = PayloadWriter::new(&mut data, 4);
    w.put_u16(1);
    w.put_u32(2); // does not fit
    assert!(w.overflowed());
    assert!(!w.finish());
    assert_eq!(data, 1u16.to_le_bytes());
}

#[test]
fn writer_string_never_splits() {
    let mut data = Vec::new();
    let mut w = PayloadWriter::new(&mut data, 6);
    w.put_string("hello"); // 2 + 5 > 6
    assert!(w.overflowed());
    assert!(data.is_empty());
}

#[test]
fn writer_long_string_uses_extended_prefix() {
    let s = "x".repeat(0xFFFF);
    let mut data = Vec::new();
    let mut w = PayloadWriter::new(&mut data, s.len() + 16);
    w.put_string(&s);
    assert!(w.finish());
    let mut r = PayloadReader::new(&data);
    assert_eq!(r.string(), s);
    assert!(!r.overflowed());
}

#[test]
fn payloadbuf_response_cycle() {
    let mut buf = PayloadBuf::new(vec![9, 1, 2, 3], 64);
    assert_eq!(buf.opcode(), 9);
    assert_eq!(buf.status(), Status::Pending);
    {
        let mut r = buf.reader();
        assert_eq!(r.u8(), 1);
        assert_eq!(r.u16(), 0x0302);
    }
    let mut w = buf.respond_ok();
    w.put_u32(42);
    assert!(w.finish());
    assert_eq!(buf.status(), Status::Ok);
    assert_eq!(buf.bytes()[0], Status::Ok as u8);
}

#[test]
fn payloadbuf_error_and_failed() {
    let mut buf = PayloadBuf::new(vec![9], 64);
    buf.respond_error(3);
    assert_eq!(buf.status(), Status::Error);
    assert_eq!(buf.bytes(), &[Status::Error as u8, 3]);
    buf.respond_failed();
    assert_eq!(buf.status(), Status::Failed);
    assert_eq!(buf.bytes(), &[Status::Failed as u8]);
}
