// src/codec.rs

//! The document container format.
//!
//! On-disk layout (the `PDN3` container):
//!
//! ```text
//! [0..4)   ASCII magic "PDN3"
//! [4..7)   24-bit header length N (byte 0 = low 8 bits, then mid, then high)
//! [7..7+N) UTF-8 XML header: <pdnImage width=".." height=".." layers=".."
//!          savedWithVersion=".."><custom>..</custom></pdnImage>
//! then     2-byte body marker: 0x00 0x01 = uncompressed body,
//!          0x1F 0x8B = gzip body (the gzip magic itself; the compressed
//!          stream starts at the marker)
//! then     the versioned binary body (see `body`)
//! ```
//!
//! Streams that do not start with the magic are legacy documents: no
//! header, body begins immediately and is always gzip (so the first two
//! bytes are `0x1F 0x8B`). Any other marker combination is a format
//! error. A load failure never yields a partially populated document.

use std::fmt;
use std::io::{Read, Seek, SeekFrom, Write};
use std::str::FromStr;

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, warn};
use once_cell::sync::Lazy;

use crate::document::Document;
use crate::error::DocumentError;

pub(crate) mod body;
pub(crate) mod header;

#[cfg(test)]
mod tests;

/// The four magic bytes opening a headered document stream.
pub const MAGIC_BYTES: [u8; 4] = *b"PDN3";

/// Body marker for an uncompressed body.
const MARKER_UNCOMPRESSED: [u8; 2] = [0x00, 0x01];
/// Body marker for a gzip body; also the gzip stream magic.
const MARKER_GZIP: [u8; 2] = [0x1f, 0x8b];

/// Progress observer for saves: receives the cumulative number of
/// uncompressed body bytes written so far. Values are monotonically
/// non-decreasing; callers can diff successive values to drive a
/// progress bar. May be invoked from any thread. The lifetime lets an
/// observer borrow from the caller's stack for the duration of the save.
pub type ProgressFn<'a> = dyn Fn(u64) + Sync + 'a;

/// Save-time options.
#[derive(Debug, Clone)]
pub struct SaveOptions {
    /// Gzip-compress the body (the default). When false the body is
    /// written raw behind the `0x00 0x01` marker.
    pub compress: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self { compress: true }
    }
}

/// A four-part version number, as recorded in the header's
/// `savedWithVersion` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    pub revision: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, build: u32, revision: u32) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    /// The version of this build of the engine, stamped into saved files.
    pub fn current() -> Version {
        static CURRENT: Lazy<Version> = Lazy::new(|| {
            env!("CARGO_PKG_VERSION")
                .parse()
                .expect("CARGO_PKG_VERSION is always a valid version")
        });
        *CURRENT
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

impl FromStr for Version {
    type Err = anyhow::Error;

    /// Accepts one to four dot-separated numeric parts; missing parts
    /// default to zero.
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = [0u32; 4];
        let mut count = 0;
        for (i, part) in s.split('.').enumerate() {
            if i >= 4 {
                anyhow::bail!("version '{}' has more than four parts", s);
            }
            parts[i] = part
                .parse()
                .with_context(|| format!("version '{}' has a non-numeric part", s))?;
            count = i + 1;
        }
        if count == 0 {
            anyhow::bail!("empty version string");
        }
        Ok(Version::new(parts[0], parts[1], parts[2], parts[3]))
    }
}

/// Serializes `document` to `stream`, stamping it with `saved_with`.
///
/// The caller (`Document::save_to_stream`) owns updating the document's
/// own `saved_with`/`dirty` state afterwards; this function leaves the
/// document untouched, which is what lets `try_clone` reuse it.
pub(crate) fn save_document<W: Write>(
    document: &Document,
    mut stream: W,
    saved_with: Version,
    options: &SaveOptions,
    progress: Option<&ProgressFn<'_>>,
) -> Result<()> {
    let header = header::DocumentHeader {
        width: document.width(),
        height: document.height(),
        layer_count: document.layers().len(),
        saved_with,
        custom: document.custom_headers().to_string(),
    };
    let header_xml = header::render_header(&header);
    let header_bytes = header_xml.as_bytes();
    if header_bytes.len() > 0x00ff_ffff {
        return Err(DocumentError::InvalidFormat(format!(
            "header XML is {} bytes; the 24-bit length field caps it at 16 MiB",
            header_bytes.len()
        ))
        .into());
    }

    stream.write_all(&MAGIC_BYTES).context("writing magic")?;
    let len = header_bytes.len();
    stream
        .write_all(&[len as u8, (len >> 8) as u8, (len >> 16) as u8])
        .context("writing header length")?;
    stream.write_all(header_bytes).context("writing header")?;

    if options.compress {
        // The gzip magic doubles as the body marker.
        let encoder = GzEncoder::new(&mut stream, Compression::default());
        let mut counting = body::CountingWriter::new(encoder, progress);
        body::write_body(document, &mut counting).context("writing compressed body")?;
        counting
            .into_inner()
            .finish()
            .context("finishing gzip stream")?;
    } else {
        stream
            .write_all(&MARKER_UNCOMPRESSED)
            .context("writing body marker")?;
        let mut counting = body::CountingWriter::new(&mut stream, progress);
        body::write_body(document, &mut counting).context("writing body")?;
    }

    stream.flush().context("flushing document stream")?;
    Ok(())
}

/// Deserializes a document from `stream`.
///
/// The stream must be seekable: both the legacy-format fallback and the
/// gzip marker require rewinding a short read.
pub(crate) fn load_document<R: Read + Seek>(stream: &mut R) -> Result<Document> {
    let start = stream.stream_position().context("reading stream position")?;

    // Magic check. A short stream can't be any kind of document.
    let mut magic = [0u8; 4];
    let header = match stream.read_exact(&mut magic) {
        Ok(()) if magic == MAGIC_BYTES => Some(read_header(stream)?),
        Ok(()) => {
            // Legacy (pre-header) stream: rewind and treat the whole
            // stream as the body.
            debug!("no magic bytes; trying legacy headerless format");
            stream
                .seek(SeekFrom::Start(start))
                .context("rewinding legacy stream")?;
            None
        }
        Err(e) => {
            return Err(DocumentError::InvalidFormat(format!(
                "stream too short for a document: {}",
                e
            ))
            .into())
        }
    };

    // Marker dispatch.
    let mut marker = [0u8; 2];
    stream
        .read_exact(&mut marker)
        .map_err(|e| DocumentError::InvalidFormat(format!("missing body marker: {}", e)))?;

    let loaded = if marker == MARKER_UNCOMPRESSED {
        body::read_body(stream)?
    } else if marker == MARKER_GZIP {
        // The marker is part of the gzip stream; hand it back.
        stream
            .seek(SeekFrom::Current(-2))
            .context("rewinding to gzip magic")?;
        body::read_body(&mut GzDecoder::new(stream))?
    } else {
        return Err(DocumentError::InvalidFormat(format!(
            "unrecognized body marker {:02x} {:02x}",
            marker[0], marker[1]
        ))
        .into());
    };

    if let Some(header) = &header {
        if (header.width, header.height) != (loaded.width, loaded.height) {
            warn!(
                "header claims {}x{} but body is {}x{}; trusting the body",
                header.width, header.height, loaded.width, loaded.height
            );
        }
        if header.layer_count != loaded.layers.len() {
            warn!(
                "header claims {} layer(s) but body holds {}; trusting the body",
                header.layer_count,
                loaded.layers.len()
            );
        }
    }

    let (custom, saved_with) = match header {
        Some(h) => (h.custom, h.saved_with),
        None => (String::new(), Version::default()),
    };
    Document::from_loaded_parts(loaded, custom, saved_with)
}

/// Reads the 3-byte length and the XML header that follow the magic.
fn read_header<R: Read>(stream: &mut R) -> Result<header::DocumentHeader> {
    let mut len_bytes = [0u8; 3];
    stream
        .read_exact(&mut len_bytes)
        .map_err(|e| DocumentError::InvalidFormat(format!("truncated header length: {}", e)))?;
    let len =
        len_bytes[0] as usize + ((len_bytes[1] as usize) << 8) + ((len_bytes[2] as usize) << 16);

    let mut xml_bytes = vec![0u8; len];
    stream.read_exact(&mut xml_bytes).map_err(|e| {
        DocumentError::InvalidFormat(format!("expected {} header bytes: {}", len, e))
    })?;
    let xml = String::from_utf8(xml_bytes)
        .map_err(|e| DocumentError::InvalidFormat(format!("header is not UTF-8: {}", e)))?;
    header::parse_header(&xml)
}
