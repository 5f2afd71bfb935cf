//! The operations callers use against an open dataset: layout, sizes,
//! whole-array / block / region reads, data attachment for writes, and
//! the positional metadata accessors.

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use ics_core::codec::{self, BodyRead, Whence};
use ics_core::dtype::DataType;
use ics_core::error::{IcsError, IcsResult, Notice};
use ics_core::format::{self, Compression, FileMode, Imel, Version, MAX_DIM};

use crate::dataset::Ics;

impl<'buf> Ics<'buf> {
    // ── Layout ─────────────────────────────────────────────────────────────

    /// The declared layout: sample kind and per-dimension sizes.
    pub fn layout(&self) -> IcsResult<(DataType, Vec<usize>)> {
        self.require_mode(&[FileMode::Read, FileMode::Update])?;
        Ok((self.header.imel.dtype, self.header.sizes()))
    }

    /// Declare the layout of a dataset being written. Installs the
    /// default order names, labels, and units for every dimension; the
    /// setters below refine them afterwards.
    pub fn set_layout(&mut self, dtype: DataType, sizes: &[usize]) -> IcsResult {
        self.require_mode(&[FileMode::Write])?;
        // The layout is fixed once declared; sizes cannot change under an
        // attached buffer.
        if !self.header.dims.is_empty() {
            return Err(IcsError::NotValidAction);
        }
        if dtype.size().is_none() {
            return Err(IcsError::UnknownDataType);
        }
        if sizes.len() > MAX_DIM {
            return Err(IcsError::TooManyDims);
        }
        if sizes.is_empty() || sizes.contains(&0) {
            return Err(IcsError::IllParameter);
        }
        self.header.imel = Imel::new(dtype);
        self.header.dims = sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| format::Dimension::new(i, size))
            .collect();
        Ok(())
    }

    /// Bytes in the whole body.
    pub fn data_size(&self) -> usize {
        self.header.data_size()
    }

    /// Bytes per image element.
    pub fn imel_size(&self) -> usize {
        self.header.imel_size()
    }

    /// Image elements in the whole array.
    pub fn image_size(&self) -> usize {
        self.header.image_size()
    }

    // ── Reading ────────────────────────────────────────────────────────────

    /// Stream the whole body (or the first `dst.len()` bytes of it) into
    /// `dst`: opens the body stream, reads, reorders bytes, closes.
    pub fn get_data(&mut self, dst: &mut [u8]) -> IcsResult {
        self.require_mode(&[FileMode::Read, FileMode::Update])?;
        self.finish_read_state()?;
        let mut reader = self.open_body_reader()?;
        reader.read_block(dst)?;
        self.reorder(dst)?;
        reader.finish()
    }

    /// Read the next `dst.len()` bytes of the body. The stream opens on
    /// the first call and stays open across calls, interleaved freely
    /// with [`skip_data_block`](Ics::skip_data_block); it is finalized at
    /// close.
    pub fn get_data_block(&mut self, dst: &mut [u8]) -> IcsResult {
        self.require_mode(&[FileMode::Read, FileMode::Update])?;
        self.read_state()?.read_block(dst)?;
        self.reorder(dst)
    }

    /// Skip the next `count` body bytes without decoding them into the
    /// caller's buffer.
    pub fn skip_data_block(&mut self, count: usize) -> IcsResult {
        self.require_mode(&[FileMode::Read, FileMode::Update])?;
        self.read_state()?.skip_block(count as i64, Whence::Cur)
    }

    /// Read a rectangular, optionally sub-sampled region.
    ///
    /// Per dimension: `offset` defaults to zero, `size` to the remainder
    /// of the dimension, `sampling` to one. The region is delivered
    /// packed. A buffer larger than the region completes with
    /// [`Notice::OutputNotFilled`].
    pub fn get_roi(
        &mut self,
        offset: Option<&[usize]>,
        size: Option<&[usize]>,
        sampling: Option<&[usize]>,
        dst: &mut [u8],
    ) -> IcsResult<Option<Notice>> {
        self.require_mode(&[FileMode::Read, FileMode::Update])?;
        let dims = self.header.sizes();
        let ndims = dims.len();
        if ndims == 0 {
            return Err(IcsError::NoLayout);
        }
        for arg in [offset, size, sampling].into_iter().flatten() {
            if arg.len() != ndims {
                return Err(IcsError::IllParameter);
            }
        }
        let offset: Vec<usize> = match offset {
            Some(o) => o.to_vec(),
            None => vec![0; ndims],
        };
        let size: Vec<usize> = match size {
            Some(s) => s.to_vec(),
            None => dims
                .iter()
                .zip(&offset)
                .map(|(&d, &o)| d.saturating_sub(o))
                .collect(),
        };
        let sampling: Vec<usize> = match sampling {
            Some(s) => s.to_vec(),
            None => vec![1; ndims],
        };

        self.finish_read_state()?;
        let mut reader = self.open_body_reader()?;
        let notice = codec::read_roi(
            reader.as_mut(),
            &self.header.byte_order,
            self.header.imel_size(),
            self.header.reorder_width(),
            &dims,
            &offset,
            &size,
            &sampling,
            dst,
        )?;
        reader.finish()?;
        Ok(notice)
    }

    /// Read the full array into a caller-strided destination. `strides`
    /// are element strides per dimension; `dst` must reach the last
    /// element they address.
    pub fn get_data_strided(&mut self, dst: &mut [u8], strides: &[usize]) -> IcsResult {
        self.require_mode(&[FileMode::Read, FileMode::Update])?;
        let sizes = self.header.sizes();
        if sizes.is_empty() {
            return Err(IcsError::NoLayout);
        }
        if strides.len() != sizes.len() {
            return Err(IcsError::IllParameter);
        }
        self.finish_read_state()?;
        let mut reader = self.open_body_reader()?;
        codec::read_strided(
            reader.as_mut(),
            &self.header.byte_order,
            self.header.imel_size(),
            self.header.reorder_width(),
            dst,
            &sizes,
            strides,
        )?;
        reader.finish()
    }

    // ── Attaching write data ───────────────────────────────────────────────

    /// Attach `data` as the body of the pending write. The buffer is
    /// borrowed until close. A length that disagrees with the layout is
    /// reported as [`Notice::SizeConflict`] but attaches anyway.
    pub fn set_data(&mut self, data: &'buf [u8]) -> IcsResult<Option<Notice>> {
        self.attach(data, None)
    }

    /// As [`set_data`](Ics::set_data), with explicit element strides
    /// describing how the source buffer is laid out.
    pub fn set_data_strided(
        &mut self,
        data: &'buf [u8],
        strides: &[usize],
    ) -> IcsResult<Option<Notice>> {
        self.require_mode(&[FileMode::Write])?;
        if strides.len() != self.header.ndims() || strides.contains(&0) {
            return Err(IcsError::IllParameter);
        }
        self.attach(data, Some(strides.to_vec()))
    }

    fn attach(
        &mut self,
        data: &'buf [u8],
        strides: Option<Vec<usize>>,
    ) -> IcsResult<Option<Notice>> {
        self.require_mode(&[FileMode::Write])?;
        if self.header.dims.is_empty() {
            return Err(IcsError::NoLayout);
        }
        if self.data.is_some() || self.header.src_file.is_some() {
            return Err(IcsError::DuplicateData);
        }
        let expected = match &strides {
            None => self.header.data_size(),
            Some(s) => {
                let last: usize = self
                    .header
                    .sizes()
                    .iter()
                    .zip(s)
                    .map(|(&n, &st)| (n - 1) * st)
                    .sum();
                (last + 1) * self.header.imel_size()
            }
        };
        self.data = Some(data);
        self.data_strides = strides;
        if data.len() != expected {
            return Ok(Some(Notice::SizeConflict));
        }
        Ok(None)
    }

    /// Point the dataset at an external body file instead of an attached
    /// buffer. Only version-2 headers can record a source file.
    pub fn set_source(&mut self, file: impl AsRef<Path>, offset: u64) -> IcsResult {
        self.require_mode(&[FileMode::Write])?;
        if self.header.version == Version::V1 {
            return Err(IcsError::NotValidAction);
        }
        if self.data.is_some() {
            return Err(IcsError::DuplicateData);
        }
        self.header.src_file = Some(file.as_ref().to_path_buf());
        self.header.src_offset = offset;
        Ok(())
    }

    // ── Compression ────────────────────────────────────────────────────────

    pub fn compression(&self) -> (Compression, u32) {
        (self.header.compression, self.compression_level)
    }

    /// Record the body compression for the pending write. Requests for
    /// the legacy `compress` format are upgraded to gzip: the engine
    /// reads that format but never produces it.
    pub fn set_compression(&mut self, method: Compression, level: u32) -> IcsResult {
        self.require_mode(&[FileMode::Write])?;
        self.header.compression = if method == Compression::Compress {
            log::debug!("compress output requested; writing gzip instead");
            Compression::Gzip
        } else {
            method
        };
        self.compression_level = level;
        Ok(())
    }

    // ── Positional metadata ────────────────────────────────────────────────

    /// Origin, scale, and unit of dimension `dim`.
    pub fn position(&self, dim: usize) -> IcsResult<(f64, f64, &str)> {
        let d = self.header.dims.get(dim).ok_or(IcsError::IllParameter)?;
        Ok((d.origin, d.scale, &d.unit))
    }

    pub fn set_position(
        &mut self,
        dim: usize,
        origin: f64,
        scale: f64,
        unit: &str,
    ) -> IcsResult {
        self.require_mode(&[FileMode::Write, FileMode::Update])?;
        let d = self
            .header
            .dims
            .get_mut(dim)
            .ok_or(IcsError::IllParameter)?;
        d.origin = origin;
        d.scale = scale;
        d.unit = if unit.is_empty() {
            format::UNITS_UNDEFINED.to_string()
        } else {
            unit.to_string()
        };
        Ok(())
    }

    /// Order name and label of dimension `dim`.
    pub fn order(&self, dim: usize) -> IcsResult<(&str, &str)> {
        let d = self.header.dims.get(dim).ok_or(IcsError::IllParameter)?;
        Ok((&d.order, &d.label))
    }

    pub fn set_order(&mut self, dim: usize, order: &str, label: &str) -> IcsResult {
        self.require_mode(&[FileMode::Write, FileMode::Update])?;
        if order.is_empty() {
            return Err(IcsError::IllParameter);
        }
        let d = self
            .header
            .dims
            .get_mut(dim)
            .ok_or(IcsError::IllParameter)?;
        d.order = order.to_string();
        d.label = if label.is_empty() { order } else { label }.to_string();
        Ok(())
    }

    pub fn coordinate_system(&self) -> &str {
        &self.header.coord
    }

    pub fn set_coordinate_system(&mut self, coord: &str) -> IcsResult {
        self.require_mode(&[FileMode::Write, FileMode::Update])?;
        self.header.coord = coord.to_string();
        Ok(())
    }

    pub fn significant_bits(&self) -> usize {
        self.header.imel.sig_bits
    }

    pub fn set_significant_bits(&mut self, bits: usize) -> IcsResult {
        self.require_mode(&[FileMode::Write, FileMode::Update])?;
        if self.header.dims.is_empty() {
            return Err(IcsError::NoLayout);
        }
        if bits == 0 || bits > self.header.imel_size() * 8 {
            return Err(IcsError::IllParameter);
        }
        self.header.imel.sig_bits = bits;
        Ok(())
    }

    /// Origin, scale, and unit of the image element values.
    pub fn imel_units(&self) -> (f64, f64, &str) {
        let imel = &self.header.imel;
        (imel.origin, imel.scale, &imel.unit)
    }

    pub fn set_imel_units(&mut self, origin: f64, scale: f64, unit: &str) -> IcsResult {
        self.require_mode(&[FileMode::Write, FileMode::Update])?;
        self.header.imel.origin = origin;
        self.header.imel.scale = scale;
        self.header.imel.unit = if unit.is_empty() {
            format::UNITS_RELATIVE.to_string()
        } else {
            unit.to_string()
        };
        Ok(())
    }

    pub fn scil_type(&self) -> Option<&str> {
        self.header.scil_type.as_deref()
    }

    pub fn set_scil_type(&mut self, scil: &str) -> IcsResult {
        self.require_mode(&[FileMode::Write, FileMode::Update])?;
        self.header.scil_type = Some(scil.to_string());
        Ok(())
    }

    /// Derive and record the SCIL type tag from the current layout.
    pub fn guess_scil_type(&mut self) -> IcsResult<&str> {
        self.require_mode(&[FileMode::Write, FileMode::Update])?;
        let scil = format::guess_scil_type(self.header.imel.dtype, self.header.ndims())?;
        self.header.scil_type = Some(scil);
        Ok(self.header.scil_type.as_deref().unwrap_or_default())
    }

    // ── Body stream plumbing ───────────────────────────────────────────────

    fn reorder(&self, data: &mut [u8]) -> IcsResult {
        self.header
            .byte_order
            .reorder(data, self.header.reorder_width())
    }

    fn finish_read_state(&mut self) -> IcsResult {
        if let Some(mut state) = self.read_state.take() {
            state.finish()?;
        }
        Ok(())
    }

    fn read_state(&mut self) -> IcsResult<&mut Box<dyn BodyRead>> {
        if self.read_state.is_none() {
            self.read_state = Some(self.open_body_reader()?);
        }
        Ok(self.read_state.as_mut().unwrap())
    }

    /// Locate and open the body stream for this dataset, choosing the
    /// codec from the declared compression — or, for a version-1 dataset
    /// whose plain `.ids` is missing, from the compressed sidecar found
    /// next to it.
    fn open_body_reader(&self) -> IcsResult<Box<dyn BodyRead>> {
        if let Some(src) = &self.header.src_file {
            let mut file = File::open(src).map_err(|_| IcsError::FOpenIds)?;
            file.seek(SeekFrom::Start(self.header.src_offset))
                .map_err(|_| IcsError::FReadIds)?;
            return ics_codecs::open_reader(file, self.header.compression);
        }
        if self.header.version == Version::V2 {
            let mut file = File::open(&self.path).map_err(|_| IcsError::FOpenIds)?;
            file.seek(SeekFrom::Start(self.data_offset))
                .map_err(|_| IcsError::FReadIds)?;
            return ics_codecs::open_reader(file, self.header.compression);
        }

        let ids = self.ids_path();
        if let Ok(file) = File::open(&ids) {
            return ics_codecs::open_reader(file, self.header.compression);
        }
        for (ext, method) in [("ids.gz", Compression::Gzip), ("ids.Z", Compression::Compress)] {
            let sidecar: PathBuf = self.path.with_extension(ext);
            if let Ok(file) = File::open(&sidecar) {
                log::debug!(
                    "{} is missing; falling back to {}",
                    ids.display(),
                    sidecar.display()
                );
                return ics_codecs::open_reader(file, method);
            }
        }
        Err(IcsError::FOpenIds)
    }
}
