//! Engine-level checks: byte-order rewriting, the N-D line walker, and
//! the strided read/write/ROI drivers against in-memory streams.

use ics_core::byteorder::ByteOrder;
use ics_core::codec::{self, BodyRead, BodyWrite, Whence};
use ics_core::dtype::DataType;
use ics_core::format::{self, guess_scil_type};
use ics_core::walker::LineWalker;
use ics_core::{IcsError, IcsResult, Notice};

// ── In-memory body streams ─────────────────────────────────────────────────

/// BodyRead over a byte vector, with real forward/backward skips.
struct MemReader {
    data: Vec<u8>,
    pos: usize,
}

impl MemReader {
    fn new(data: Vec<u8>) -> MemReader {
        MemReader { data, pos: 0 }
    }
}

impl BodyRead for MemReader {
    fn read_block(&mut self, dst: &mut [u8]) -> IcsResult {
        if self.pos + dst.len() > self.data.len() {
            return Err(IcsError::EndOfStream);
        }
        dst.copy_from_slice(&self.data[self.pos..self.pos + dst.len()]);
        self.pos += dst.len();
        Ok(())
    }

    fn skip_block(&mut self, offset: i64, whence: Whence) -> IcsResult {
        let target = match whence {
            Whence::Set => offset,
            Whence::Cur => self.pos as i64 + offset,
        };
        if target < 0 || target as usize > self.data.len() {
            return Err(IcsError::EndOfStream);
        }
        self.pos = target as usize;
        Ok(())
    }
}

/// BodyWrite that accumulates everything it is fed.
#[derive(Default)]
struct MemWriter {
    data: Vec<u8>,
}

impl BodyWrite for MemWriter {
    fn write(&mut self, data: &[u8]) -> IcsResult {
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn finish(&mut self) -> IcsResult {
        Ok(())
    }
}

fn pseudo_random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = seed;
    (0..len)
        .map(|_| {
            rng = rng
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (rng >> 56) as u8
        })
        .collect()
}

// ── Byte order ─────────────────────────────────────────────────────────────

#[test]
fn native_order_is_a_permutation_of_ranks() {
    let order = ByteOrder::native(4);
    let mut entries: Vec<u8> = order.entries(4).to_vec();
    entries.sort_unstable();
    assert_eq!(entries, vec![1, 2, 3, 4]);
    assert_eq!(order.entries(4).len(), 4);
}

#[test]
fn reorder_with_native_vector_is_a_noop() {
    let mut data = pseudo_random_bytes(32, 7);
    let expected = data.clone();
    ByteOrder::native(4).reorder(&mut data, 4).unwrap();
    assert_eq!(data, expected);
}

#[test]
fn reorder_with_unspecified_vector_is_a_noop() {
    let mut data = pseudo_random_bytes(32, 8);
    let expected = data.clone();
    ByteOrder::unspecified().reorder(&mut data, 4).unwrap();
    assert_eq!(data, expected);
}

#[test]
fn reorder_from_swapped_order_reverses_sample_bytes() {
    // A vector that is the native order reversed: every sample's bytes
    // get reversed, whichever endianness the host has.
    let native = ByteOrder::native(2);
    let swapped: Vec<u8> = native.entries(2).iter().rev().copied().collect();
    let swapped = ByteOrder::from_entries(&swapped);

    let mut data = vec![0x12, 0x34, 0xAB, 0xCD];
    swapped.reorder(&mut data, 2).unwrap();
    assert_eq!(data, vec![0x34, 0x12, 0xCD, 0xAB]);
}

#[test]
fn reorder_twice_is_the_identity_for_reversed_vectors() {
    let native = ByteOrder::native(4);
    let swapped: Vec<u8> = native.entries(4).iter().rev().copied().collect();
    let swapped = ByteOrder::from_entries(&swapped);

    let original = pseudo_random_bytes(64, 99);
    let mut data = original.clone();
    swapped.reorder(&mut data, 4).unwrap();
    assert_ne!(data, original);
    swapped.reorder(&mut data, 4).unwrap();
    assert_eq!(data, original);
}

#[test]
fn reorder_rejects_ragged_regions() {
    let native = ByteOrder::native(4);
    let swapped: Vec<u8> = native.entries(4).iter().rev().copied().collect();
    let swapped = ByteOrder::from_entries(&swapped);
    let mut data = vec![0u8; 10];
    assert_eq!(
        swapped.reorder(&mut data, 4),
        Err(IcsError::BitsVsSizeConflict)
    );
}

// ── Walker ─────────────────────────────────────────────────────────────────

#[test]
fn walker_yields_lexicographic_line_offsets() {
    // A 4×3×2 array walked over its two outer dimensions.
    let offsets: Vec<usize> = LineWalker::new(&[3, 2], &[4, 12], 0).collect();
    assert_eq!(offsets, vec![0, 4, 8, 12, 16, 20]);
}

#[test]
fn walker_applies_base_and_custom_steps() {
    let offsets: Vec<usize> = LineWalker::new(&[2, 2], &[10, 100], 5).collect();
    assert_eq!(offsets, vec![5, 15, 105, 115]);
}

#[test]
fn walker_with_no_outer_dims_yields_one_line() {
    let offsets: Vec<usize> = LineWalker::new(&[], &[], 3).collect();
    assert_eq!(offsets, vec![3]);
    assert_eq!(LineWalker::new(&[], &[], 0).line_count(), 1);
}

// ── Sample types and SCIL ──────────────────────────────────────────────────

#[test]
fn dtype_widths() {
    assert_eq!(DataType::Uint8.size(), Some(1));
    assert_eq!(DataType::Sint16.size(), Some(2));
    assert_eq!(DataType::Real32.size(), Some(4));
    assert_eq!(DataType::Real64.size(), Some(8));
    assert_eq!(DataType::Complex32.size(), Some(8));
    assert_eq!(DataType::Complex64.size(), Some(16));
    assert_eq!(DataType::Unknown.size(), None);
    // Complex kinds reorder component-wise.
    assert_eq!(DataType::Complex64.reorder_size(), Some(8));
    assert_eq!(DataType::Complex32.reorder_size(), Some(4));
}

#[test]
fn scil_type_table() {
    assert_eq!(guess_scil_type(DataType::Uint8, 2).unwrap(), "g2d");
    assert_eq!(guess_scil_type(DataType::Sint16, 1).unwrap(), "g2d");
    assert_eq!(guess_scil_type(DataType::Uint16, 3).unwrap(), "g3d");
    assert_eq!(guess_scil_type(DataType::Real32, 3).unwrap(), "f3d");
    assert_eq!(guess_scil_type(DataType::Complex32, 2).unwrap(), "c2d");
    assert_eq!(
        guess_scil_type(DataType::Uint32, 2),
        Err(IcsError::NoScilType)
    );
    assert_eq!(
        guess_scil_type(DataType::Real64, 2),
        Err(IcsError::NoScilType)
    );
    assert_eq!(
        guess_scil_type(DataType::Uint8, 4),
        Err(IcsError::NoScilType)
    );
}

#[test]
fn default_order_names_follow_the_canonical_sequence() {
    let names: Vec<String> = (0..7).map(format::default_order_name).collect();
    assert_eq!(names, vec!["x", "y", "z", "t", "probe", "dim_5", "dim_6"]);
}

// ── Strided drivers ────────────────────────────────────────────────────────

#[test]
fn strided_write_with_identity_strides_matches_contiguous() {
    let sizes = [4usize, 3, 2];
    let width = 2usize;
    let data = pseudo_random_bytes(4 * 3 * 2 * width, 0xA1);

    let mut contiguous = MemWriter::default();
    contiguous.write(&data).unwrap();

    let mut strided = MemWriter::default();
    codec::write_strided(&mut strided, &data, width, &sizes, &[1, 4, 12]).unwrap();

    assert_eq!(strided.data, contiguous.data);
}

#[test]
fn strided_write_gathers_interleaved_channels() {
    // Two interleaved 3-element channels of u8: stride 2 picks one out.
    let data = [10u8, 20, 11, 21, 12, 22];
    let mut w = MemWriter::default();
    codec::write_strided(&mut w, &data, 1, &[3], &[2]).unwrap();
    assert_eq!(w.data, vec![10, 11, 12]);

    let mut w = MemWriter::default();
    codec::write_strided(&mut w, &data[1..], 1, &[3], &[2]).unwrap();
    assert_eq!(w.data, vec![20, 21, 22]);
}

#[test]
fn strided_write_rejects_short_buffers() {
    let data = [0u8; 10];
    assert_eq!(
        codec::write_strided(&mut MemWriter::default(), &data, 1, &[4, 3], &[1, 4]),
        Err(IcsError::IllParameter)
    );
}

#[test]
fn strided_read_scatters_into_destination() {
    let body: Vec<u8> = (0..12).collect();
    let mut r = MemReader::new(body.clone());

    // Scatter a 4×3 u8 image into a destination with a padded row pitch
    // of 5 elements.
    let mut dst = vec![0xFFu8; 5 * 3];
    codec::read_strided(
        &mut r,
        &ByteOrder::unspecified(),
        1,
        1,
        &mut dst,
        &[4, 3],
        &[1, 5],
    )
    .unwrap();
    assert_eq!(
        dst,
        vec![0, 1, 2, 3, 0xFF, 4, 5, 6, 7, 0xFF, 8, 9, 10, 11, 0xFF]
    );
}

#[test]
fn roi_full_region_equals_plain_read() {
    let body = pseudo_random_bytes(24, 3);
    let mut r = MemReader::new(body.clone());
    let mut dst = vec![0u8; 24];
    let notice = codec::read_roi(
        &mut r,
        &ByteOrder::unspecified(),
        2,
        2,
        &[4, 3],
        &[0, 0],
        &[4, 3],
        &[1, 1],
        &mut dst,
    )
    .unwrap();
    assert_eq!(notice, None);
    assert_eq!(dst, body);
}

#[test]
fn roi_offset_window() {
    // 4×3 of u16, bytes 0..24; window offset [1,0], size [2,3].
    let body: Vec<u8> = (0..24).collect();
    let mut r = MemReader::new(body);
    let mut dst = vec![0u8; 12];
    codec::read_roi(
        &mut r,
        &ByteOrder::unspecified(),
        2,
        2,
        &[4, 3],
        &[1, 0],
        &[2, 3],
        &[1, 1],
        &mut dst,
    )
    .unwrap();
    assert_eq!(dst, vec![2, 3, 4, 5, 10, 11, 12, 13, 18, 19, 20, 21]);
}

#[test]
fn roi_subsamples_along_the_fastest_dimension() {
    let body: Vec<u8> = (0..24).collect();
    let mut r = MemReader::new(body);
    let mut dst = vec![0u8; 12];
    codec::read_roi(
        &mut r,
        &ByteOrder::unspecified(),
        2,
        2,
        &[4, 3],
        &[0, 0],
        &[4, 3],
        &[2, 1],
        &mut dst,
    )
    .unwrap();
    assert_eq!(dst, vec![0, 1, 4, 5, 8, 9, 12, 13, 16, 17, 20, 21]);
}

#[test]
fn roi_equivalence_with_gather_from_full_array() {
    // Random regions over a 5×4×3 u16 array must match the same gather
    // done in memory on a full copy.
    let dims = [5usize, 4, 3];
    let width = 2usize;
    let body = pseudo_random_bytes(dims.iter().product::<usize>() * width, 0xBEEF);

    let cases: [([usize; 3], [usize; 3], [usize; 3]); 5] = [
        ([0, 0, 0], [5, 4, 3], [1, 1, 1]),
        ([1, 1, 0], [3, 2, 2], [1, 1, 1]),
        ([0, 0, 0], [5, 4, 3], [2, 1, 1]),
        ([1, 0, 1], [4, 3, 2], [3, 2, 2]),
        ([2, 3, 2], [2, 1, 1], [2, 1, 1]),
    ];
    for (offset, size, sampling) in cases {
        let out_len: usize = (0..3).map(|d| size[d].div_ceil(sampling[d])).product();
        let mut dst = vec![0u8; out_len * width];
        let mut r = MemReader::new(body.clone());
        codec::read_roi(
            &mut r,
            &ByteOrder::unspecified(),
            width,
            width,
            &dims,
            &offset,
            &size,
            &sampling,
            &mut dst,
        )
        .unwrap();

        let mut expected = Vec::with_capacity(out_len * width);
        for z in (0..size[2]).step_by(sampling[2]) {
            for y in (0..size[1]).step_by(sampling[1]) {
                for x in (0..size[0]).step_by(sampling[0]) {
                    let e = (offset[0] + x)
                        + (offset[1] + y) * dims[0]
                        + (offset[2] + z) * dims[0] * dims[1];
                    expected.extend_from_slice(&body[e * width..(e + 1) * width]);
                }
            }
        }
        assert_eq!(dst, expected, "roi {offset:?} {size:?} {sampling:?}");
    }
}

#[test]
fn complex_roi_addresses_full_elements() {
    // c64-style elements: 16 bytes of line/skip arithmetic, byte order
    // rewritten in 8-byte components.
    let body = pseudo_random_bytes(4 * 16, 0xC0);
    let mut r = MemReader::new(body.clone());
    let mut dst = vec![0u8; 2 * 16];
    codec::read_roi(
        &mut r,
        &ByteOrder::unspecified(),
        16,
        8,
        &[4],
        &[1],
        &[2],
        &[1],
        &mut dst,
    )
    .unwrap();
    assert_eq!(dst, body[16..48]);
}

#[test]
fn roi_validates_bounds_and_buffer() {
    let body: Vec<u8> = (0..24).collect();
    let order = ByteOrder::unspecified();

    let mut dst = vec![0u8; 64];
    let err = codec::read_roi(
        &mut MemReader::new(body.clone()),
        &order,
        2,
        2,
        &[4, 3],
        &[3, 0],
        &[2, 3],
        &[1, 1],
        &mut dst,
    );
    assert_eq!(err, Err(IcsError::IllegalRoi));

    let err = codec::read_roi(
        &mut MemReader::new(body.clone()),
        &order,
        2,
        2,
        &[4, 3],
        &[0, 0],
        &[4, 3],
        &[0, 1],
        &mut dst,
    );
    assert_eq!(err, Err(IcsError::IllegalRoi));

    let mut small = vec![0u8; 23];
    let err = codec::read_roi(
        &mut MemReader::new(body.clone()),
        &order,
        2,
        2,
        &[4, 3],
        &[0, 0],
        &[4, 3],
        &[1, 1],
        &mut small,
    );
    assert_eq!(err, Err(IcsError::BufferTooSmall));

    let mut big = vec![0u8; 30];
    let notice = codec::read_roi(
        &mut MemReader::new(body),
        &order,
        2,
        2,
        &[4, 3],
        &[0, 0],
        &[4, 3],
        &[1, 1],
        &mut big,
    )
    .unwrap();
    assert_eq!(notice, Some(Notice::OutputNotFilled));
}
