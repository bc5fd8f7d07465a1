// src/codec/body.rs

//! The versioned binary body.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! u16            body schema version (currently 1)
//! record         document record:
//!                  i32 width, i32 height, u32 layer count,
//!                  u32 metadata length + that many bytes of JSON
//! per layer:
//!   record       layer record:
//!                  u32 name length + UTF-8 name,
//!                  u8 flag bits, u8 opacity,
//!                  u8 blend tag length + ASCII tag
//!   u64          pixel byte count, then that many raw BGRA bytes
//! ```
//!
//! A `record` is a u32 byte length followed by its payload. Readers
//! consume the fields they know and skip anything after them, which is
//! how same-version writers get to append fields without breaking older
//! readers. A schema version above the one compiled in is refused
//! outright: the layer pixel section is not record-framed, so there is
//! no safe way to guess at it.

use std::io::{self, Read, Write};

use anyhow::{Context, Result};
use log::{debug, warn};

use super::ProgressFn;
use crate::blend::BlendOp;
use crate::color::ColorBgra;
use crate::document::Document;
use crate::error::DocumentError;
use crate::layer::{Layer, LayerFlags};
use crate::metadata::Metadata;
use crate::surface::Surface;

/// Schema version this build writes and the newest it will read.
pub(crate) const BODY_VERSION: u16 = 1;

/// A document reconstructed from a body, before sinks are attached.
#[derive(Debug)]
pub(crate) struct LoadedDocument {
    pub width: i32,
    pub height: i32,
    pub layers: Vec<Layer>,
    pub metadata: Metadata,
}

/// A `Write` adapter that counts bytes and reports the running total to
/// an optional progress observer. Wrapped around the gzip encoder (not
/// the raw stream) so the totals are uncompressed body bytes either way.
pub(crate) struct CountingWriter<'p, W: Write> {
    inner: W,
    written: u64,
    progress: Option<&'p ProgressFn<'p>>,
}

impl<'p, W: Write> CountingWriter<'p, W> {
    pub(crate) fn new(inner: W, progress: Option<&'p ProgressFn<'p>>) -> Self {
        Self {
            inner,
            written: 0,
            progress,
        }
    }

    pub(crate) fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        if let Some(progress) = self.progress {
            progress(self.written);
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

pub(crate) fn write_body<W: Write>(document: &Document, out: &mut W) -> Result<()> {
    out.write_all(&BODY_VERSION.to_le_bytes())
        .context("writing body version")?;

    let metadata_json =
        serde_json::to_vec(document.metadata()).context("serializing metadata")?;
    let mut record = Vec::with_capacity(16 + metadata_json.len());
    record.extend_from_slice(&document.width().to_le_bytes());
    record.extend_from_slice(&document.height().to_le_bytes());
    record.extend_from_slice(&(document.layers().len() as u32).to_le_bytes());
    record.extend_from_slice(&(metadata_json.len() as u32).to_le_bytes());
    record.extend_from_slice(&metadata_json);
    write_record(out, &record).context("writing document record")?;

    for layer in document.layers().iter() {
        let name = layer.name().as_bytes();
        let tag = layer.blend_op().tag_name().as_bytes();
        let mut record = Vec::with_capacity(8 + name.len() + tag.len());
        record.extend_from_slice(&(name.len() as u32).to_le_bytes());
        record.extend_from_slice(name);
        record.push(layer.flags().bits());
        record.push(layer.opacity());
        record.push(tag.len() as u8);
        record.extend_from_slice(tag);
        write_record(out, &record)
            .with_context(|| format!("writing record for layer '{}'", layer.name()))?;

        let bytes = surface_bytes(layer.surface());
        out.write_all(&(bytes.len() as u64).to_le_bytes())
            .context("writing pixel byte count")?;
        out.write_all(bytes)
            .with_context(|| format!("writing pixels for layer '{}'", layer.name()))?;
    }

    Ok(())
}

pub(crate) fn read_body<R: Read>(stream: &mut R) -> Result<LoadedDocument> {
    let version = read_u16(stream).context("reading body version")?;
    if version == 0 || version > BODY_VERSION {
        return Err(DocumentError::UnsupportedVersion(version).into());
    }

    let record = read_record(stream).context("reading document record")?;
    let mut r = RecordReader::new(&record);
    let width = r.take_i32("width")?;
    let height = r.take_i32("height")?;
    let layer_count = r.take_u32("layer count")? as usize;
    let metadata_len = r.take_u32("metadata length")? as usize;
    let metadata_json = r.take_bytes(metadata_len, "metadata")?;
    let metadata: Metadata =
        serde_json::from_slice(metadata_json).context("parsing metadata JSON")?;
    r.finish("document record");

    if width <= 0 || height <= 0 {
        return Err(DocumentError::InvalidFormat(format!(
            "body declares a {}x{} canvas",
            width, height
        ))
        .into());
    }

    // layer_count is untrusted; reserve modestly and let the per-layer
    // record reads catch a lying header before any real allocation.
    let mut layers = Vec::with_capacity(layer_count.min(16));
    for index in 0..layer_count {
        let record =
            read_record(stream).with_context(|| format!("reading record for layer {}", index))?;
        let mut r = RecordReader::new(&record);
        let name_len = r.take_u32("name length")? as usize;
        let name = std::str::from_utf8(r.take_bytes(name_len, "name")?)
            .map_err(|e| DocumentError::InvalidFormat(format!("layer name is not UTF-8: {}", e)))?
            .to_string();
        let flag_bits = r.take_u8("flags")?;
        let opacity = r.take_u8("opacity")?;
        let tag_len = r.take_u8("blend tag length")? as usize;
        let tag = std::str::from_utf8(r.take_bytes(tag_len, "blend tag")?)
            .map_err(|e| DocumentError::InvalidFormat(format!("blend tag is not UTF-8: {}", e)))?;
        let blend_op = BlendOp::from_tag_name(tag).unwrap_or_else(|| {
            // An unknown op came from a newer writer; Normal keeps the
            // pixels visible rather than failing the whole load.
            warn!("layer '{}' has unknown blend op '{}'; using Normal", name, tag);
            BlendOp::Normal
        });
        r.finish("layer record");

        let mut surface = Surface::new(width, height);
        let needed = surface_bytes(&surface).len() as u64;
        let stored = read_u64(stream).context("reading pixel byte count")?;
        if stored < needed {
            return Err(DocumentError::InvalidFormat(format!(
                "layer '{}' stores {} pixel bytes, needs {}",
                name, stored, needed
            ))
            .into());
        }
        stream
            .read_exact(surface_bytes_mut(&mut surface))
            .map_err(|e| {
                DocumentError::InvalidFormat(format!("truncated pixels for layer '{}': {}", name, e))
            })?;
        let excess = stored - needed;
        if excess > 0 {
            debug!("skipping {} excess pixel byte(s) for layer '{}'", excess, name);
            io::copy(&mut stream.take(excess), &mut io::sink())
                .context("skipping excess pixel bytes")?;
        }

        let mut layer = Layer::new(surface, name);
        layer.set_flags(LayerFlags::from_bits_truncate(flag_bits));
        layer.set_opacity(opacity);
        layer.set_blend_op(blend_op);
        layers.push(layer);
    }

    Ok(LoadedDocument {
        width,
        height,
        layers,
        metadata,
    })
}

fn write_record<W: Write>(out: &mut W, payload: &[u8]) -> Result<()> {
    out.write_all(&(payload.len() as u32).to_le_bytes())?;
    out.write_all(payload)?;
    Ok(())
}

fn read_record<R: Read>(stream: &mut R) -> Result<Vec<u8>> {
    let len = read_u32(stream)? as usize;
    let mut payload = vec![0u8; len];
    stream
        .read_exact(&mut payload)
        .map_err(|e| DocumentError::InvalidFormat(format!("truncated {}-byte record: {}", len, e)))?;
    Ok(payload)
}

/// Cursor over a record payload. Truncation inside a record is a format
/// error; bytes left over after the known fields are skipped.
struct RecordReader<'a> {
    payload: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    fn new(payload: &'a [u8]) -> Self {
        Self { payload, pos: 0 }
    }

    fn take_bytes(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        if self.payload.len() - self.pos < len {
            return Err(DocumentError::InvalidFormat(format!(
                "record ends inside its {} field",
                what
            ))
            .into());
        }
        let bytes = &self.payload[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn take_u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take_bytes(1, what)?[0])
    }

    fn take_u32(&mut self, what: &str) -> Result<u32> {
        let bytes = self.take_bytes(4, what)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn take_i32(&mut self, what: &str) -> Result<i32> {
        Ok(self.take_u32(what)? as i32)
    }

    fn finish(self, what: &str) {
        let left = self.payload.len() - self.pos;
        if left > 0 {
            debug!("{}: skipping {} unrecognized trailing byte(s)", what, left);
        }
    }
}

fn read_u16<R: Read>(stream: &mut R) -> Result<u16> {
    let mut bytes = [0u8; 2];
    stream
        .read_exact(&mut bytes)
        .map_err(|e| DocumentError::InvalidFormat(format!("truncated body: {}", e)))?;
    Ok(u16::from_le_bytes(bytes))
}

fn read_u32<R: Read>(stream: &mut R) -> Result<u32> {
    let mut bytes = [0u8; 4];
    stream
        .read_exact(&mut bytes)
        .map_err(|e| DocumentError::InvalidFormat(format!("truncated body: {}", e)))?;
    Ok(u32::from_le_bytes(bytes))
}

fn read_u64<R: Read>(stream: &mut R) -> Result<u64> {
    let mut bytes = [0u8; 8];
    stream
        .read_exact(&mut bytes)
        .map_err(|e| DocumentError::InvalidFormat(format!("truncated body: {}", e)))?;
    Ok(u64::from_le_bytes(bytes))
}

/// Views a surface's pixels as raw bytes for serialization.
fn surface_bytes(surface: &Surface) -> &[u8] {
    let data = surface.data();
    // SAFETY: ColorBgra is #[repr(C)] with four u8 fields and no
    // padding, so any pixel slice is a valid byte slice of 4x the
    // length, and every byte pattern is a valid pixel.
    unsafe {
        std::slice::from_raw_parts(data.as_ptr() as *const u8, data.len() * ColorBgra::SIZE_OF)
    }
}

fn surface_bytes_mut(surface: &mut Surface) -> &mut [u8] {
    let data = surface.data_mut();
    // SAFETY: as above; exclusive borrow of the pixels.
    unsafe {
        std::slice::from_raw_parts_mut(data.as_mut_ptr() as *mut u8, data.len() * ColorBgra::SIZE_OF)
    }
}
