// src/codec/tests.rs

use std::io::Cursor;
use std::sync::Mutex;

use flate2::write::GzEncoder;
use flate2::Compression;

use super::*;
use crate::blend::BlendOp;
use crate::color::ColorBgra;
use crate::layer::Layer;
use crate::surface::Surface;

fn sample_document() -> Document {
    let mut doc = Document::new(7, 5);
    doc.set_custom_headers("<app><zoom>1.5</zoom></app>");
    doc.metadata_mut().set("exif:Model", "Camera 9");

    let mut bottom = Layer::background(7, 5);
    bottom.set_name("paper");
    doc.layers_mut().add(bottom).unwrap();

    let mut surface = Surface::new(7, 5);
    for y in 0..5 {
        for x in 0..7 {
            surface.set_pixel(x, y, ColorBgra::from_bgra(x as u8, y as u8, 7, 9));
        }
    }
    let mut top = Layer::new(surface, "ink");
    top.set_opacity(190);
    top.set_blend_op(BlendOp::Screen);
    top.set_visible(false);
    doc.layers_mut().add(top).unwrap();
    doc
}

fn assert_documents_match(a: &Document, b: &Document) {
    assert_eq!(a.custom_headers(), b.custom_headers());
    assert_bodies_match(a, b);
}

/// Compares the state carried by the binary body alone; the custom
/// headers live in the XML header and are checked separately where a
/// header exists.
fn assert_bodies_match(a: &Document, b: &Document) {
    assert_eq!(a.size(), b.size());
    assert_eq!(a.metadata(), b.metadata());
    assert_eq!(a.layers().len(), b.layers().len());
    for (la, lb) in a.layers().iter().zip(b.layers().iter()) {
        assert_eq!(la.name(), lb.name());
        assert_eq!(la.flags(), lb.flags());
        assert_eq!(la.opacity(), lb.opacity());
        assert_eq!(la.blend_op(), lb.blend_op());
        assert_eq!(la.surface().data(), lb.surface().data());
    }
}

#[test_log::test]
fn compressed_round_trip() {
    let mut doc = sample_document();
    let mut buf = Vec::new();
    doc.save_to_stream(&mut buf).unwrap();

    assert!(!doc.is_dirty());
    assert_eq!(doc.saved_with(), Version::current());
    assert_eq!(&buf[0..4], b"PDN3");

    let mut cursor = Cursor::new(buf);
    let loaded = Document::from_stream(&mut cursor).unwrap();
    assert_documents_match(&doc, &loaded);
    assert_eq!(loaded.saved_with(), Version::current());
}

#[test]
fn uncompressed_round_trip_uses_raw_marker() {
    let mut doc = sample_document();
    let mut buf = Vec::new();
    let options = SaveOptions { compress: false };
    doc.save_to_stream_with(&mut buf, &options, None).unwrap();

    let header_len = buf[4] as usize + ((buf[5] as usize) << 8) + ((buf[6] as usize) << 16);
    let marker = &buf[7 + header_len..7 + header_len + 2];
    assert_eq!(marker, &MARKER_UNCOMPRESSED[..]);

    let mut cursor = Cursor::new(buf);
    let loaded = Document::from_stream(&mut cursor).unwrap();
    assert_documents_match(&doc, &loaded);
}

#[test]
fn compressed_body_starts_with_gzip_magic() {
    let mut doc = sample_document();
    let mut buf = Vec::new();
    doc.save_to_stream(&mut buf).unwrap();

    let header_len = buf[4] as usize + ((buf[5] as usize) << 8) + ((buf[6] as usize) << 16);
    assert_eq!(&buf[7 + header_len..7 + header_len + 2], &MARKER_GZIP[..]);
}

#[test]
fn legacy_headerless_gzip_stream_loads() {
    let doc = sample_document();

    // A legacy file is just the gzipped body, no magic or header.
    let mut bytes = Vec::new();
    {
        let encoder = GzEncoder::new(&mut bytes, Compression::default());
        let mut counting = body::CountingWriter::new(encoder, None);
        body::write_body(&doc, &mut counting).unwrap();
        counting.into_inner().finish().unwrap();
    }

    let mut cursor = Cursor::new(bytes);
    let loaded = load_document(&mut cursor).unwrap();
    assert_bodies_match(&doc, &loaded);
    // No header: passenger data and version fall back to empty.
    assert_eq!(loaded.custom_headers(), "");
    assert_eq!(loaded.saved_with(), Version::default());
}

#[test]
fn unknown_body_marker_is_rejected() {
    let xml = "<pdnImage width=\"1\" height=\"1\" layers=\"0\" savedWithVersion=\"1.0\"><custom></custom></pdnImage>";
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&MAGIC_BYTES);
    bytes.extend_from_slice(&[xml.len() as u8, 0, 0]);
    bytes.extend_from_slice(xml.as_bytes());
    bytes.extend_from_slice(&[0xAB, 0xCD]);

    let mut cursor = Cursor::new(bytes);
    let err = load_document(&mut cursor).unwrap_err();
    match err.downcast_ref::<DocumentError>() {
        Some(DocumentError::InvalidFormat(msg)) => assert!(msg.contains("marker")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn truncated_streams_fail_cleanly() {
    // Too short for even the magic probe's fallback marker read.
    let mut tiny = Cursor::new(b"P".to_vec());
    assert!(load_document(&mut tiny).is_err());

    // Magic present but the header length points past the end.
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&MAGIC_BYTES);
    bytes.extend_from_slice(&[0xff, 0x00, 0x00]);
    bytes.extend_from_slice(b"<pdnImage");
    let mut cursor = Cursor::new(bytes);
    let err = load_document(&mut cursor).unwrap_err();
    assert!(err.downcast_ref::<DocumentError>().is_some());
}

#[test]
fn header_counts_are_advisory_body_wins() {
    // Serialize normally, then rewrite the header to claim the wrong
    // canvas and layer count. The body is authoritative; the load still
    // succeeds and reflects the body.
    let mut doc = sample_document();
    let mut buf = Vec::new();
    doc.save_to_stream(&mut buf).unwrap();
    let header_len = buf[4] as usize + ((buf[5] as usize) << 8) + ((buf[6] as usize) << 16);
    let body = buf[7 + header_len..].to_vec();

    let lying = "<pdnImage width=\"7\" height=\"5\" layers=\"99\" savedWithVersion=\"2.0\"><custom></custom></pdnImage>";
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&MAGIC_BYTES);
    bytes.extend_from_slice(&[lying.len() as u8, 0, 0]);
    bytes.extend_from_slice(lying.as_bytes());
    bytes.extend_from_slice(&body);

    let mut cursor = Cursor::new(bytes);
    let loaded = load_document(&mut cursor).unwrap();
    assert_eq!(loaded.layers().len(), 2);
    assert_eq!(loaded.saved_with(), Version::new(2, 0, 0, 0));
}

#[test]
fn custom_headers_round_trip_verbatim() {
    let custom = "<x a='1'>  spacing &amp; entities stay untouched  </x>";
    let mut doc = Document::new(3, 3);
    doc.set_custom_headers(custom);
    doc.layers_mut().add(Layer::background(3, 3)).unwrap();

    let mut buf = Vec::new();
    doc.save_to_stream(&mut buf).unwrap();
    let mut cursor = Cursor::new(buf);
    let loaded = Document::from_stream(&mut cursor).unwrap();
    assert_eq!(loaded.custom_headers(), custom);
}

#[test]
fn progress_totals_are_monotonic_for_both_paths() {
    for compress in [true, false] {
        let mut doc = sample_document();
        let totals = Mutex::new(Vec::new());
        let progress = |n: u64| totals.lock().unwrap().push(n);

        let mut buf = Vec::new();
        let options = SaveOptions { compress };
        doc.save_to_stream_with(&mut buf, &options, Some(&progress))
            .unwrap();

        let totals = totals.into_inner().unwrap();
        assert!(!totals.is_empty(), "compress={}", compress);
        assert!(
            totals.windows(2).all(|w| w[0] <= w[1]),
            "compress={}",
            compress
        );
        // The total counts uncompressed body bytes, identical either way.
        let last = *totals.last().unwrap();
        assert!(last > (7 * 5 * 4) as u64, "compress={}", compress);
    }
}

#[test]
fn failed_load_leaves_no_document_and_save_state_intact() {
    let mut doc = sample_document();
    assert!(doc.is_dirty());

    // A failing save (broken sink) must not clear the dirty flag.
    struct FailingWriter;
    impl std::io::Write for FailingWriter {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "sink closed"))
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
    assert!(doc.save_to_stream(FailingWriter).is_err());
    assert!(doc.is_dirty());
    assert_eq!(doc.saved_with(), Version::default());
}
