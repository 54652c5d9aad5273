//! Blank-page removal and compression over small PDFs built with `lopdf`.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use scribd_fetch::pipeline::postprocess::{
    compress_with, is_blank_page, remove_blank_pages, Compressor, LopdfCompressor,
};
use scribd_fetch::Degradation;

// ── Fixtures ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
enum PageKind {
    Text(&'static str),
    Empty,
    Image,
    Line,
    FilledRect,
    FormWithImage,
}

fn text_ops(text: &str) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 24.into()]),
        Operation::new("Td", vec![100.into(), 700.into()]),
        Operation::new("Tj", vec![Object::string_literal(text)]),
        Operation::new("ET", vec![]),
    ]
}

fn image_stream() -> Stream {
    Stream::new(
        Dictionary::from_iter([
            ("Type", Object::Name(b"XObject".to_vec())),
            ("Subtype", Object::Name(b"Image".to_vec())),
            ("Width", Object::Integer(1)),
            ("Height", Object::Integer(1)),
            ("ColorSpace", Object::Name(b"DeviceGray".to_vec())),
            ("BitsPerComponent", Object::Integer(8)),
        ]),
        vec![0u8],
    )
}

fn draw_xobject(name: &str) -> Vec<Operation> {
    vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![100.into(), 0.into(), 0.into(), 100.into(), 50.into(), 50.into()],
        ),
        Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
        Operation::new("Q", vec![]),
    ]
}

/// Build a PDF with one page per entry. Every page gets a Helvetica `F1`
/// font resource so text extraction always has a font to work with.
fn build_pdf(pages: &[PageKind]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let page_tree_id = doc.new_object_id();

    let font_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica".to_vec())),
    ]));

    let mut kids = Vec::new();
    for kind in pages {
        let mut xobjects = Dictionary::new();
        let operations = match kind {
            PageKind::Text(t) => text_ops(t),
            PageKind::Empty => vec![],
            PageKind::Image => {
                let img = doc.add_object(image_stream());
                xobjects.set("Im1", Object::Reference(img));
                draw_xobject("Im1")
            }
            PageKind::Line => vec![
                Operation::new("m", vec![0.into(), 0.into()]),
                Operation::new("l", vec![200.into(), 200.into()]),
                Operation::new("S", vec![]),
            ],
            PageKind::FilledRect => vec![
                Operation::new("re", vec![0.into(), 0.into(), 100.into(), 100.into()]),
                Operation::new("f", vec![]),
            ],
            PageKind::FormWithImage => {
                let img = doc.add_object(image_stream());
                let form_content = Content {
                    operations: draw_xobject("Im1"),
                }
                .encode()
                .unwrap();
                let form = doc.add_object(Stream::new(
                    Dictionary::from_iter([
                        ("Type", Object::Name(b"XObject".to_vec())),
                        ("Subtype", Object::Name(b"Form".to_vec())),
                        (
                            "BBox",
                            Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]),
                        ),
                        (
                            "Resources",
                            Object::Dictionary(Dictionary::from_iter([(
                                "XObject",
                                Object::Dictionary(Dictionary::from_iter([(
                                    "Im1",
                                    Object::Reference(img),
                                )])),
                            )])),
                        ),
                    ]),
                    form_content,
                ));
                xobjects.set("Fm1", Object::Reference(form));
                draw_xobject("Fm1")
            }
        };

        let mut resources = Dictionary::from_iter([(
            "Font",
            Object::Dictionary(Dictionary::from_iter([("F1", Object::Reference(font_id))])),
        )]);
        if !xobjects.is_empty() {
            resources.set("XObject", Object::Dictionary(xobjects));
        }

        let content = Content { operations }.encode().unwrap();
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content));
        let page_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(page_tree_id)),
            ("Contents", Object::Reference(content_id)),
            ("Resources", Object::Dictionary(resources)),
            (
                "MediaBox",
                Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]),
            ),
        ]));
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        page_tree_id,
        Object::Dictionary(Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(kids)),
            ("Count", Object::Integer(count)),
        ])),
    );
    let catalog_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(page_tree_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

fn classify(kind: PageKind) -> bool {
    let bytes = build_pdf(&[kind]);
    let doc = Document::load_mem(&bytes).unwrap();
    let (&page_no, &page_id): (&u32, &ObjectId) = doc.get_pages().iter().next().unwrap();
    is_blank_page(&doc, page_no, page_id).unwrap()
}

fn page_texts(bytes: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .keys()
        .map(|&n| doc.extract_text(&[n]).unwrap().trim().to_string())
        .collect()
}

fn page_count(bytes: &[u8]) -> usize {
    Document::load_mem(bytes).unwrap().get_pages().len()
}

// ── Classification (a known approximation) ───────────────────────────────────

#[test]
fn test_empty_page_is_blank() {
    assert!(classify(PageKind::Empty));
}

#[test]
fn test_whitespace_only_text_is_blank() {
    assert!(classify(PageKind::Text("   ")));
}

#[test]
fn test_single_character_is_not_blank() {
    assert!(!classify(PageKind::Text("x")));
}

#[test]
fn test_single_image_is_not_blank() {
    assert!(!classify(PageKind::Image));
}

#[test]
fn test_image_inside_form_is_not_blank() {
    assert!(!classify(PageKind::FormWithImage));
}

#[test]
fn test_stroked_line_is_not_blank() {
    assert!(!classify(PageKind::Line));
}

#[test]
fn test_filled_rectangle_only_counts_as_blank() {
    // Rectangles are not line/curve primitives; the heuristic ignores them.
    assert!(classify(PageKind::FilledRect));
}

// ── Removal ──────────────────────────────────────────────────────────────────

#[test]
fn test_blank_pages_removed_and_order_kept() {
    let pdf = build_pdf(&[
        PageKind::Text("Alpha"),
        PageKind::Empty,
        PageKind::Image,
        PageKind::Text("  "),
        PageKind::Text("Omega"),
    ]);

    let cleaned = remove_blank_pages(pdf);

    assert_eq!(cleaned.removed, 2);
    assert!(cleaned.failure.is_none());
    assert_eq!(page_count(&cleaned.pdf), 3);
    let texts = page_texts(&cleaned.pdf);
    assert!(texts[0].contains("Alpha"), "got {texts:?}");
    assert!(texts[1].is_empty(), "image page should stay in place: {texts:?}");
    assert!(texts[2].contains("Omega"), "got {texts:?}");
}

#[test]
fn test_removal_is_idempotent() {
    let pdf = build_pdf(&[PageKind::Empty, PageKind::Text("Body"), PageKind::Empty]);

    let once = remove_blank_pages(pdf);
    assert_eq!(once.removed, 2);

    let twice = remove_blank_pages(once.pdf.clone());
    assert_eq!(twice.removed, 0);
    assert_eq!(twice.pdf, once.pdf);
    assert_eq!(page_count(&twice.pdf), 1);
}

#[test]
fn test_document_without_blank_pages_is_untouched() {
    let pdf = build_pdf(&[PageKind::Text("one"), PageKind::Line]);
    let cleaned = remove_blank_pages(pdf.clone());
    assert_eq!(cleaned.removed, 0);
    assert_eq!(cleaned.pdf, pdf);
}

#[test]
fn test_all_blank_document_is_returned_unchanged() {
    let pdf = build_pdf(&[PageKind::Empty, PageKind::Text(" "), PageKind::Empty]);
    let cleaned = remove_blank_pages(pdf.clone());
    assert_eq!(cleaned.removed, 0);
    assert_eq!(cleaned.pdf, pdf);
    assert!(cleaned.failure.is_none());
}

// ── Compression ──────────────────────────────────────────────────────────────

struct FailingCompressor;

impl Compressor for FailingCompressor {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn compress(&self, _pdf: &[u8]) -> Result<Vec<u8>, String> {
        Err("simulated crash".into())
    }
}

struct GarbageCompressor;

impl Compressor for GarbageCompressor {
    fn name(&self) -> &'static str {
        "garbage"
    }

    fn compress(&self, _pdf: &[u8]) -> Result<Vec<u8>, String> {
        Ok(b"definitely not a pdf".to_vec())
    }
}

#[test]
fn test_failing_compressor_returns_original_bytes() {
    let pdf = build_pdf(&[PageKind::Text("keep me")]);
    let out = compress_with(pdf.clone(), &FailingCompressor);

    assert_eq!(out.pdf, pdf);
    assert!(!out.applied);
    match out.failure {
        Some(Degradation::PostProcessFailed { stage, detail }) => {
            assert!(stage.contains("failing"));
            assert_eq!(detail, "simulated crash");
        }
        other => panic!("unexpected failure record: {other:?}"),
    }
}

#[test]
fn test_non_pdf_compressor_output_is_discarded() {
    let pdf = build_pdf(&[PageKind::Text("keep me")]);
    let out = compress_with(pdf.clone(), &GarbageCompressor);
    assert_eq!(out.pdf, pdf);
    assert!(!out.applied);
}

#[test]
fn test_lopdf_compression_keeps_pages() {
    let pdf = build_pdf(&[PageKind::Text("first"), PageKind::Image, PageKind::Text("last")]);
    let out = compress_with(pdf, &LopdfCompressor);

    assert!(out.applied);
    assert!(out.failure.is_none());
    assert!(out.pdf.starts_with(b"%PDF"));
    assert_eq!(page_count(&out.pdf), 3);
}
