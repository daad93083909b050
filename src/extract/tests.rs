use super::*;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

/// Build a PDF with one page per entry; `None` pages carry no text layer
fn build_pdf(pages: &[Option<&str>]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for page_text in pages {
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Resources" => resources_id,
        };
        if let Some(text) = page_text {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                content.encode().expect("content should encode"),
            ));
            page.set("Contents", content_id);
        }
        kids.push(doc.add_object(page).into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("pdf should save");
    bytes
}

#[test]
fn document_kind_from_extension() {
    assert_eq!(DocumentKind::from_extension("pdf"), Some(DocumentKind::Pdf));
    assert_eq!(DocumentKind::from_extension("PDF"), Some(DocumentKind::Pdf));
    assert_eq!(DocumentKind::from_extension("txt"), Some(DocumentKind::Text));
    assert_eq!(
        DocumentKind::from_extension("md"),
        Some(DocumentKind::Markdown)
    );
    assert_eq!(DocumentKind::from_extension("docx"), None);
    assert_eq!(
        DocumentKind::from_path(Path::new("notes/Week 1.Md")),
        Some(DocumentKind::Markdown)
    );
    assert_eq!(DocumentKind::from_path(Path::new("README")), None);
}

#[test]
fn pdf_text_is_extracted() {
    let pdf = build_pdf(&[Some("The sky is blue.")]);

    let extracted = extract_text("alpha.pdf", &pdf).expect("pdf should extract");
    assert!(extracted.text.contains("The sky is blue."));
    assert_eq!(extracted.pages, Some(1));
}

#[test]
fn pdf_pages_keep_their_order() {
    let pdf = build_pdf(&[Some("First page text"), Some("Second page text")]);

    let extracted = extract_pdf(&pdf).expect("pdf should extract");
    let first = extracted
        .text
        .find("First page text")
        .expect("first page present");
    let second = extracted
        .text
        .find("Second page text")
        .expect("second page present");
    assert!(first < second);
    assert_eq!(extracted.pages, Some(2));
}

#[test]
fn pdf_page_without_text_contributes_nothing() {
    let pdf = build_pdf(&[None, Some("Only this page has words")]);

    let extracted = extract_pdf(&pdf).expect("pdf with an image-only page still extracts");
    assert!(extracted.text.contains("Only this page has words"));
    assert_eq!(extracted.pages, Some(2));
}

#[test]
fn malformed_pdf_is_an_extraction_error() {
    let result = extract_text("broken.pdf", b"%PDF-1.4 this is not really a pdf");
    assert!(matches!(result, Err(RagError::Extraction(_))));

    let result = extract_text("empty.pdf", b"");
    assert!(matches!(result, Err(RagError::Extraction(_))));
}

#[test]
fn plain_text_is_decoded() {
    let extracted =
        extract_text("notes.txt", "\u{feff}Data science overview\n".as_bytes()).expect("txt");
    assert_eq!(extracted.text, "Data science overview\n");
    assert_eq!(extracted.pages, None);
}

#[test]
fn invalid_utf8_is_an_extraction_error() {
    let result = extract_text("latin1.txt", &[0x63, 0x61, 0x66, 0xE9]);
    assert!(matches!(result, Err(RagError::Extraction(_))));
}

#[test]
fn unsupported_extension_is_an_extraction_error() {
    let result = extract_text("slides.pptx", b"PK\x03\x04");
    assert!(matches!(result, Err(RagError::Extraction(_))));
}

#[test]
fn markdown_markup_is_dropped() {
    let markdown = "# Text Mining\n\nText mining finds **patterns** in `documents`.\n\n\
                    - tokenization\n- stemming\n\n```\ncount(words)\n```\n";

    let extracted = extract_text("lecture.md", markdown.as_bytes()).expect("markdown");
    assert_eq!(
        extracted.text,
        "Text Mining\nText mining finds patterns in documents.\ntokenization\nstemming\ncount(words)"
    );
}

#[test]
fn nested_list_items_get_their_own_lines() {
    assert_eq!(
        markdown_to_text("- alpha\n  - beta\n- gamma"),
        "alpha\nbeta\ngamma"
    );
    assert_eq!(
        markdown_to_text("1. Supervised\n   - regression\n   - classification\n2. Unsupervised"),
        "Supervised\nregression\nclassification\nUnsupervised"
    );
}

#[test]
fn markdown_soft_breaks_become_spaces() {
    assert_eq!(
        markdown_to_text("Generative AI models\nproduce new content."),
        "Generative AI models produce new content."
    );
}
