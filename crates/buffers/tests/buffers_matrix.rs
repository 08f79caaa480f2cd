use docpack_buffers::{BufferError, Reader, Writer};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    U8(u8),
    I32(i32),
    U32(u32),
    I64(i64),
    F64(f64),
    CString(Vec<u8>),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<u8>().prop_map(Op::U8),
        any::<i32>().prop_map(Op::I32),
        any::<u32>().prop_map(Op::U32),
        any::<i64>().prop_map(Op::I64),
        any::<f64>().prop_map(Op::F64),
        proptest::collection::vec(1u8..=255, 0..12).prop_map(Op::CString),
    ]
}

#[test]
fn length_prefixed_frame() {
    let mut writer = Writer::with_alloc_size(8);
    let at = writer.reserve(4);
    writer.ascii("payload");
    writer.u8(0);
    writer.patch_i32_le(at, writer.len() as i32);
    let data = writer.flush();
    assert_eq!(data.len(), 12);

    let mut reader = Reader::new(&data);
    let size = reader.i32_le().unwrap() as usize;
    let outer = reader.limit(size);
    assert_eq!(reader.cstring().unwrap(), b"payload");
    assert_eq!(reader.remaining(), 0);
    reader.limit(outer);
    assert!(matches!(reader.u8(), Err(BufferError::EndOfBuffer { .. })));
}

proptest! {
    #[test]
    fn reader_reads_what_writer_wrote(ops in proptest::collection::vec(op(), 0..32)) {
        let mut writer = Writer::with_alloc_size(16);
        for op in &ops {
            match op {
                Op::U8(v) => writer.u8(*v),
                Op::I32(v) => writer.i32_le(*v),
                Op::U32(v) => writer.u32_le(*v),
                Op::I64(v) => writer.i64_le(*v),
                Op::F64(v) => writer.f64_le(*v),
                Op::CString(v) => writer.cstring(v),
            }
        }
        let data = writer.flush();
        let mut reader = Reader::new(&data);
        for op in &ops {
            match op {
                Op::U8(v) => prop_assert_eq!(reader.u8().unwrap(), *v),
                Op::I32(v) => prop_assert_eq!(reader.i32_le().unwrap(), *v),
                Op::U32(v) => prop_assert_eq!(reader.u32_le().unwrap(), *v),
                Op::I64(v) => prop_assert_eq!(reader.i64_le().unwrap(), *v),
                Op::F64(v) => prop_assert_eq!(reader.f64_le().unwrap().to_bits(), v.to_bits()),
                Op::CString(v) => prop_assert_eq!(reader.cstring().unwrap(), v.as_slice()),
            }
        }
        prop_assert_eq!(reader.remaining(), 0);
    }
}
