//! Read-only decoder for the historical `compress(1)` LZW framing, kept
//! for version-1 datasets produced by old pipelines (`.ids.Z` sidecars).
//!
//! The format: magic 0x1F 0x9D, one flag byte (low five bits the maximum
//! code width 9..=16, high bit block mode), then LSB-first codes of
//! growing width. Codes are packed in groups of eight; on a width change
//! or a CLEAR the encoder pads to the next group boundary, and the
//! decoder must skip the same padding.
//!
//! Decompression is single-shot: the whole body is inflated on the first
//! read, and every later block or seek operation is refused. Writing
//! this format is not supported anywhere in the engine; writes declared
//! as `compress` are upgraded to gzip upstream.

use std::fs::File;
use std::io::Read;

use ics_core::codec::{BodyRead, Whence};
use ics_core::{IcsError, IcsResult};

const COMPRESS_MAGIC: [u8; 2] = [0x1f, 0x9d];
const BIT_MASK: u8 = 0x1f;
const BLOCK_MODE: u8 = 0x80;
const INIT_BITS: usize = 9;
const CLEAR: u16 = 256;

pub struct LzwReader {
    file: Option<File>,
    consumed: bool,
}

impl LzwReader {
    pub fn new(file: File) -> LzwReader {
        LzwReader {
            file: Some(file),
            consumed: false,
        }
    }
}

impl BodyRead for LzwReader {
    /// The one permitted read: inflate the entire body and hand back the
    /// requested prefix.
    fn read_block(&mut self, dst: &mut [u8]) -> IcsResult {
        if self.consumed {
            return Err(IcsError::BlockNotAllowed);
        }
        self.consumed = true;
        let mut file = self.file.take().ok_or(IcsError::BlockNotAllowed)?;
        let mut raw = Vec::new();
        file.read_to_end(&mut raw).map_err(|_| IcsError::FReadIds)?;
        let decoded = decompress(&raw)?;
        if decoded.len() < dst.len() {
            return Err(IcsError::EndOfStream);
        }
        dst.copy_from_slice(&decoded[..dst.len()]);
        Ok(())
    }

    fn skip_block(&mut self, _offset: i64, _whence: Whence) -> IcsResult {
        Err(IcsError::BlockNotAllowed)
    }
}

/// Inflate a whole `compress(1)` stream.
fn decompress(input: &[u8]) -> IcsResult<Vec<u8>> {
    if input.len() < 3 {
        return Err(IcsError::EndOfStream);
    }
    if input[..2] != COMPRESS_MAGIC {
        return Err(IcsError::CorruptedStream);
    }
    let max_bits = (input[2] & BIT_MASK) as usize;
    let block_mode = input[2] & BLOCK_MODE != 0;
    if !(INIT_BITS..=16).contains(&max_bits) {
        return Err(IcsError::DecompressionProblem);
    }

    let data = &input[3..];
    let total_bits = data.len() * 8;
    let table_size = 1usize << max_bits;
    let first_free: usize = if block_mode { 257 } else { 256 };

    let mut prefix = vec![0u16; table_size];
    let mut suffix = vec![0u8; table_size];
    for (i, s) in suffix.iter_mut().enumerate().take(256) {
        *s = i as u8;
    }

    let mut n_bits = INIT_BITS;
    let mut max_code: usize = (1 << n_bits) - 1;
    let mut free_ent: usize = first_free;
    let mut oldcode: Option<u16> = None;
    let mut finchar: u8 = 0;

    // Bit cursor plus the origin of the current 8-code group; padding on
    // width change or CLEAR is relative to that origin.
    let mut bit_pos: usize = 0;
    let mut group_start: usize = 0;

    let mut out = Vec::new();
    let mut stack: Vec<u8> = Vec::with_capacity(table_size);

    fn pad_group(bit_pos: &mut usize, group_start: &mut usize, n_bits: usize) {
        let group_bits = n_bits * 8;
        let used = *bit_pos - *group_start;
        if used % group_bits != 0 {
            *bit_pos += group_bits - used % group_bits;
        }
        *group_start = *bit_pos;
    }

    loop {
        if free_ent > max_code {
            pad_group(&mut bit_pos, &mut group_start, n_bits);
            n_bits += 1;
            max_code = if n_bits == max_bits {
                1 << n_bits
            } else {
                (1 << n_bits) - 1
            };
        }
        if bit_pos + n_bits > total_bits {
            break;
        }

        let byte = bit_pos >> 3;
        let shift = bit_pos & 7;
        let mut window = data[byte] as u32;
        if let Some(&b) = data.get(byte + 1) {
            window |= (b as u32) << 8;
        }
        if let Some(&b) = data.get(byte + 2) {
            window |= (b as u32) << 16;
        }
        let code = ((window >> shift) & ((1 << n_bits) - 1) as u32) as u16;
        bit_pos += n_bits;

        if block_mode && code == CLEAR {
            pad_group(&mut bit_pos, &mut group_start, n_bits);
            n_bits = INIT_BITS;
            max_code = (1 << n_bits) - 1;
            free_ent = first_free;
            oldcode = None;
            continue;
        }

        let old = match oldcode {
            None => {
                // First code (of the stream, or after CLEAR) must be a
                // literal: the table holds nothing else yet.
                if code >= 256 {
                    return Err(IcsError::CorruptedStream);
                }
                finchar = code as u8;
                out.push(finchar);
                oldcode = Some(code);
                continue;
            }
            Some(old) => old,
        };

        let incode = code;
        let mut code = code;
        if usize::from(code) >= free_ent {
            // KwKwK: the code the encoder just defined.
            if usize::from(code) > free_ent {
                return Err(IcsError::CorruptedStream);
            }
            stack.push(finchar);
            code = old;
        }
        while code >= 256 {
            stack.push(suffix[code as usize]);
            code = prefix[code as usize];
        }
        finchar = suffix[code as usize];
        out.push(finchar);
        while let Some(c) = stack.pop() {
            out.push(c);
        }

        if free_ent < table_size {
            prefix[free_ent] = old;
            suffix[free_ent] = finchar;
            free_ent += 1;
        }
        oldcode = Some(incode);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom, Write};

    /// Reference encoder, only here to produce test vectors. Mirrors
    /// compress(1): emits CLEAR when it resets, pads code groups on
    /// every width change.
    fn compress(input: &[u8], max_bits: usize) -> Vec<u8> {
        use std::collections::HashMap;

        let mut out = vec![COMPRESS_MAGIC[0], COMPRESS_MAGIC[1], max_bits as u8 | BLOCK_MODE];
        let mut bits: Vec<bool> = Vec::new();
        let mut group_start = 0usize;

        let mut n_bits = INIT_BITS;
        let mut free_ent: usize = 257;
        let mut table: HashMap<(u16, u8), u16> = HashMap::new();

        let push_code = |bits: &mut Vec<bool>, code: u16, n_bits: usize| {
            for i in 0..n_bits {
                bits.push(code & (1 << i) != 0);
            }
        };
        let pad = |bits: &mut Vec<bool>, group_start: &mut usize, n_bits: usize| {
            let group = n_bits * 8;
            let used = bits.len() - *group_start;
            if used % group != 0 {
                bits.resize(bits.len() + group - used % group, false);
            }
            *group_start = bits.len();
        };

        let mut iter = input.iter();
        let mut cur: u16 = match iter.next() {
            Some(&b) => b as u16,
            None => {
                return out;
            }
        };
        // The encoder adds its entry after emitting, so it runs one
        // entry ahead of the decoder; it widens only once the PREVIOUS
        // width is exhausted from the decoder's point of view, i.e. at
        // free_ent == (1 << n_bits) + 1.
        for &b in iter {
            if let Some(&e) = table.get(&(cur, b)) {
                cur = e;
                continue;
            }
            if n_bits < max_bits && free_ent > (1 << n_bits) {
                pad(&mut bits, &mut group_start, n_bits);
                n_bits += 1;
            }
            push_code(&mut bits, cur, n_bits);
            if free_ent < (1 << max_bits) {
                table.insert((cur, b), free_ent as u16);
                free_ent += 1;
            }
            cur = b as u16;
        }
        if n_bits < max_bits && free_ent > (1 << n_bits) {
            pad(&mut bits, &mut group_start, n_bits);
            n_bits += 1;
        }
        push_code(&mut bits, cur, n_bits);

        let mut byte = 0u8;
        for (i, &bit) in bits.iter().enumerate() {
            if bit {
                byte |= 1 << (i % 8);
            }
            if i % 8 == 7 {
                out.push(byte);
                byte = 0;
            }
        }
        if bits.len() % 8 != 0 {
            out.push(byte);
        }
        out
    }

    #[test]
    fn decodes_repetitive_stream() {
        let payload: Vec<u8> = b"abcabcabcabcabcabcabcabcabcabc".repeat(20);
        let packed = compress(&payload, 16);
        assert_eq!(decompress(&packed).unwrap(), payload);
    }

    #[test]
    fn decodes_through_width_growth() {
        // Enough distinct pairs to push the table past 512 entries and
        // force a 9 → 10 bit switch with its group padding.
        let payload: Vec<u8> = (0..8192u32).map(|i| (i * 131 % 251) as u8).collect();
        let packed = compress(&payload, 13);
        assert_eq!(decompress(&packed).unwrap(), payload);
    }

    #[test]
    fn bad_magic_is_corrupt() {
        assert_eq!(
            decompress(&[0x1f, 0x9e, 0x90, 0x00]),
            Err(IcsError::CorruptedStream)
        );
    }

    #[test]
    fn second_read_is_refused() {
        let payload = b"block reads are single-shot".to_vec();
        let packed = compress(&payload, 16);

        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&packed).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        let mut r = LzwReader::new(file);
        let mut dst = vec![0u8; payload.len()];
        r.read_block(&mut dst).unwrap();
        assert_eq!(dst, payload);
        assert_eq!(r.read_block(&mut dst), Err(IcsError::BlockNotAllowed));
        assert_eq!(r.skip_block(4, Whence::Cur), Err(IcsError::BlockNotAllowed));
    }
}
