use crate::byteorder::ByteOrder;
use crate::error::{IcsError, IcsResult, Notice};
use crate::walker::LineWalker;

/// Origin of a skip on a body stream. End-relative seeks are not part of
/// the model: compressed streams cannot know their decoded length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
}

/// A body stream being decoded.
///
/// Implementations deliver raw sample bytes exactly as stored; byte-order
/// rewriting is the caller's job (the drivers below do it per delivered
/// line).
pub trait BodyRead {
    /// Fill `dst` completely, or fail with `EndOfStream`.
    fn read_block(&mut self, dst: &mut [u8]) -> IcsResult;

    /// Move the decode position. Codecs without random access emulate
    /// forward skips and may reject backward ones.
    fn skip_block(&mut self, offset: i64, whence: Whence) -> IcsResult;

    /// Release the stream. Codecs with read-ahead restore the underlying
    /// file position here.
    fn finish(&mut self) -> IcsResult {
        Ok(())
    }
}

/// A body stream being encoded. `finish` flushes everything the codec
/// still holds (for gzip: the deflate tail and the CRC/length trailer).
pub trait BodyWrite {
    fn write(&mut self, data: &[u8]) -> IcsResult;
    fn finish(&mut self) -> IcsResult;
}

// ── Strided drivers ────────────────────────────────────────────────────────
//
// All three drivers walk the same LineWalker; only what happens to each
// line differs.

/// Byte length a strided buffer must have to contain its last element.
fn strided_span(width: usize, sizes: &[usize], strides: &[usize]) -> usize {
    let last: usize = sizes
        .iter()
        .zip(strides)
        .map(|(&n, &s)| (n - 1) * s)
        .sum();
    (last + 1) * width
}

fn check_strided_args(width: usize, sizes: &[usize], strides: &[usize]) -> IcsResult {
    if width == 0 || sizes.is_empty() || sizes.len() != strides.len() {
        return Err(IcsError::IllParameter);
    }
    if sizes.contains(&0) {
        return Err(IcsError::IllParameter);
    }
    Ok(())
}

/// Feed a strided source buffer to a body writer, line by line.
///
/// Lines along dimension 0 with unit stride are fed zero-copy; any other
/// stride gathers the line into a scratch first. Codec-side concerns
/// (chunking, CRC) live behind [`BodyWrite::write`].
pub fn write_strided(
    w: &mut dyn BodyWrite,
    data: &[u8],
    width: usize,
    sizes: &[usize],
    strides: &[usize],
) -> IcsResult {
    check_strided_args(width, sizes, strides)?;
    if data.len() < strided_span(width, sizes, strides) {
        return Err(IcsError::IllParameter);
    }

    let line_len = sizes[0];
    let walker = LineWalker::new(&sizes[1..], &strides[1..], 0);
    if strides[0] == 1 {
        for start in walker {
            let a = start * width;
            w.write(&data[a..a + line_len * width])?;
        }
    } else {
        let mut line = vec![0u8; line_len * width];
        for start in walker {
            for j in 0..line_len {
                let a = (start + j * strides[0]) * width;
                line[j * width..(j + 1) * width].copy_from_slice(&data[a..a + width]);
            }
            w.write(&line)?;
        }
    }
    Ok(())
}

/// Read the full array from a body stream into a caller-strided
/// destination, rewriting byte order per delivered line.
///
/// `width` is the full element size and drives every stride and length;
/// `order_unit` is the byte-order rewrite unit, which is smaller than
/// `width` for complex kinds (their two components reorder separately).
pub fn read_strided(
    r: &mut dyn BodyRead,
    order: &ByteOrder,
    width: usize,
    order_unit: usize,
    dst: &mut [u8],
    sizes: &[usize],
    strides: &[usize],
) -> IcsResult {
    check_strided_args(width, sizes, strides)?;
    if dst.len() < strided_span(width, sizes, strides) {
        return Err(IcsError::IllParameter);
    }

    let line_len = sizes[0];
    let walker = LineWalker::new(&sizes[1..], &strides[1..], 0);
    if strides[0] == 1 {
        for start in walker {
            let a = start * width;
            let line = &mut dst[a..a + line_len * width];
            r.read_block(line)?;
            order.reorder(line, order_unit)?;
        }
    } else {
        let mut line = vec![0u8; line_len * width];
        for start in walker {
            r.read_block(&mut line)?;
            order.reorder(&mut line, order_unit)?;
            for j in 0..line_len {
                let a = (start + j * strides[0]) * width;
                dst[a..a + width].copy_from_slice(&line[j * width..(j + 1) * width]);
            }
        }
    }
    Ok(())
}

/// Read a rectangular, optionally sub-sampled region of interest.
///
/// `dims` are the full dimension extents; `offset`, `size`, and
/// `sampling` describe the region per dimension, with `size` counted in
/// source elements (the region spans `offset_i .. offset_i + size_i`).
/// The output holds `ceil(size_i / sampling_i)` elements per dimension,
/// packed contiguously.
///
/// `width` is the full element size; `order_unit` is the byte-order
/// rewrite unit (the component size for complex kinds).
///
/// The stream is consumed strictly forward: each line start is reached
/// with a relative skip from the current position, so the same code path
/// works on sequential-only codecs.
#[allow(clippy::too_many_arguments)]
pub fn read_roi(
    r: &mut dyn BodyRead,
    order: &ByteOrder,
    width: usize,
    order_unit: usize,
    dims: &[usize],
    offset: &[usize],
    size: &[usize],
    sampling: &[usize],
    dst: &mut [u8],
) -> IcsResult<Option<Notice>> {
    let ndims = dims.len();
    if width == 0
        || ndims == 0
        || offset.len() != ndims
        || size.len() != ndims
        || sampling.len() != ndims
    {
        return Err(IcsError::IllParameter);
    }
    for d in 0..ndims {
        if size[d] == 0 || sampling[d] == 0 || offset[d] + size[d] > dims[d] {
            return Err(IcsError::IllegalRoi);
        }
    }

    let expected: usize = size
        .iter()
        .zip(sampling)
        .map(|(&n, &s)| n.div_ceil(s))
        .product::<usize>()
        * width;
    if dst.len() < expected {
        return Err(IcsError::BufferTooSmall);
    }

    // Element strides of the source array, then the walker parameters of
    // the region: start at the region corner, step sampling·stride.
    let mut dim_stride = vec![0usize; ndims];
    let mut acc = 1;
    for d in 0..ndims {
        dim_stride[d] = acc;
        acc *= dims[d];
    }
    let base: usize = offset
        .iter()
        .zip(&dim_stride)
        .map(|(&o, &s)| o * s)
        .sum();
    let counts: Vec<usize> = (1..ndims).map(|d| size[d].div_ceil(sampling[d])).collect();
    let steps: Vec<usize> = (1..ndims).map(|d| sampling[d] * dim_stride[d]).collect();

    let line_bytes = size[0] * width;
    let mut scratch = if sampling[0] > 1 {
        vec![0u8; line_bytes]
    } else {
        Vec::new()
    };

    let mut cur = 0usize; // stream position, in elements
    let mut out = 0usize; // dst position, in bytes
    for start in LineWalker::new(&counts, &steps, base) {
        if start > cur {
            r.skip_block(((start - cur) * width) as i64, Whence::Cur)?;
        }
        if sampling[0] == 1 {
            let line = &mut dst[out..out + line_bytes];
            r.read_block(line)?;
            order.reorder(line, order_unit)?;
            out += line_bytes;
        } else {
            r.read_block(&mut scratch)?;
            order.reorder(&mut scratch, order_unit)?;
            for j in (0..size[0]).step_by(sampling[0]) {
                dst[out..out + width].copy_from_slice(&scratch[j * width..(j + 1) * width]);
                out += width;
            }
        }
        cur = start + size[0];
    }
    debug_assert_eq!(out, expected);

    if dst.len() > expected {
        Ok(Some(Notice::OutputNotFilled))
    } else {
        Ok(None)
    }
}
