use criterion::{black_box, criterion_group, criterion_main, Criterion};
use libreplication::binlog::BinlogEventHeader;
use libreplication::constants::BinlogChecksumAlg;

const TABLE_MAP_EVENT: &[u8] = b"\x00\xfc\x5a\x5d\x5d\x13\x01\x00\x00\x00\x32\x00\x00\x00\x49\x01\x00\
                                      \x00\x00\x00\x2d\x0a\x00\x00\x00\x00\x01\x00\x04\x70\x65\x74\x73\x00\
                                      \x04\x63\x61\x74\x73\x00\x04\x03\x0f\x0f\x0a\x04\x58\x02\x58\x02\x00";

const INSERT_ROW_EVENT: &[u8] = b"\x00\xfc\x5a\x5d\x5d\x1e\x01\x00\x00\x00\x37\x00\x00\x00\x80\x01\x00\
                                       \x00\x00\x00\x2d\x0a\x00\x00\x00\x00\x01\x00\x02\x00\x04\xff\xf0\x04\
                                       \x00\x00\x00\x07\x00\x43\x68\x61\x72\x6c\x69\x65\x05\x00\x52\x69\x76\
                                       \x65\x72\xb5\xc0\x0f";

fn decode_table_map(c: &mut Criterion) {
  c.bench_function("decode table_map event", |b| {
    b.iter(|| {
      let bytes = bytes::Bytes::from_static(TABLE_MAP_EVENT);
      black_box(BinlogEventHeader::parse(bytes, BinlogChecksumAlg::Off).unwrap())
    })
  });
}

fn decode_insert_row(c: &mut Criterion) {
  c.bench_function("decode insert_row event", |b| {
    b.iter(|| {
      let bytes = bytes::Bytes::from_static(INSERT_ROW_EVENT);
      black_box(BinlogEventHeader::parse(bytes, BinlogChecksumAlg::Off).unwrap())
    })
  });
}

criterion_group!(benches, decode_table_map, decode_insert_row);
criterion_main!(benches);
