//! 记录编解码基准：验证热路径（500 Hz PDO / 199 Hz SDO）无隐藏开销

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use dexhand_protocol::pdo::{JOINT_COUNT, FINGER_COUNT, PdoWrite};
use dexhand_protocol::sdo;
use dexhand_protocol::FrameReader;

fn bench_pdo_write_pack(c: &mut Criterion) {
    let write = PdoWrite {
        read_id: 0x01,
        target_positions: [[123_456_789i32; JOINT_COUNT]; FINGER_COUNT],
        timestamp: 42,
    };
    let mut buf = [0u8; PdoWrite::WIRE_SIZE];

    c.bench_function("pdo_write_pack", |b| {
        b.iter(|| {
            write.pack_into(black_box(&mut buf));
        })
    });
}

fn bench_sdo_parse(c: &mut Criterion) {
    let mut frame = Vec::new();
    for i in 0..32u16 {
        frame.extend_from_slice(&[0x39, (0x52 + (i >> 8)) as u8, (i & 0xFF) as u8, 0x01]);
        frame.extend_from_slice(&0xDDCC_BBAAu32.to_le_bytes());
    }

    c.bench_function("sdo_parse_32_records", |b| {
        b.iter(|| {
            let mut reader = FrameReader::new(black_box(&frame));
            while let Ok(Some(record)) = sdo::parse_record(&mut reader) {
                black_box(record);
            }
        })
    });
}

criterion_group!(benches, bench_pdo_write_pack, bench_sdo_parse);
criterion_main!(benches);
