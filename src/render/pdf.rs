//! Fixed-layout PDF with the standard Helvetica faces, built on `lopdf`.
//!
//! Text is encoded as WinAnsi; characters outside that code page are
//! replaced. Lines are wrapped on an average glyph width, which is close
//! enough for Helvetica at body sizes.

use super::section_rows;
use crate::assembler::SdsDocument;
use crate::error::{Result, SdsError};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};

const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 50.0;
const AVG_GLYPH_WIDTH: f32 = 0.5;
const LINE_SPACING: f32 = 1.3;

const TITLE_SIZE: f32 = 16.0;
const HEADING_SIZE: f32 = 12.0;
const BODY_SIZE: f32 = 9.0;
const VALUE_INDENT: f32 = 14.0;

const DISCLAIMER: &str = "Generated automatically from public databases, structural rules and \
predictive models. Predicted and generated values are advisory and must be verified before use.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Face {
    Regular,
    Bold,
    Oblique,
}

impl Face {
    fn resource(&self) -> &'static str {
        match self {
            Face::Regular => "F1",
            Face::Bold => "F2",
            Face::Oblique => "F3",
        }
    }
}

const FONTS: [(&str, &str); 3] = [
    ("F1", "Helvetica"),
    ("F2", "Helvetica-Bold"),
    ("F3", "Helvetica-Oblique"),
];

/// One laid-out line before pagination.
#[derive(Debug, Clone)]
struct Line {
    face: Face,
    size: f32,
    indent: f32,
    text: String,
    /// Extra space above the line
    gap: f32,
}

/// Map to a WinAnsi byte, `None` when the character has no slot.
fn win_ansi(c: char) -> Option<u8> {
    let code = c as u32;
    match c {
        '\u{20}'..='\u{7e}' => Some(code as u8),
        '€' => Some(0x80),
        '…' => Some(0x85),
        '‘' => Some(0x91),
        '’' => Some(0x92),
        '“' => Some(0x93),
        '”' => Some(0x94),
        '•' => Some(0x95),
        '–' => Some(0x96),
        '—' => Some(0x97),
        '™' => Some(0x99),
        '\u{a0}'..='\u{ff}' => Some(code as u8),
        _ => None,
    }
}

/// WinAnsi bytes of a text operand; `lopdf` escapes them on write.
fn encode_text(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '≥' => out.extend_from_slice(b">="),
            '≤' => out.extend_from_slice(b"<="),
            '\t' => out.push(b' '),
            _ => out.push(win_ansi(c).unwrap_or(b'?')),
        }
    }
    out
}

/// Greedy word wrap to `max_chars`; words longer than a line are split.
fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines: Vec<String> = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                lines.push(word.drain(..max_chars).collect());
            }
            let word: String = word.into_iter().collect();
            let needed = current.chars().count() + usize::from(!current.is_empty()) + word.chars().count();
            if needed > max_chars && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&word);
        }
        lines.push(current);
    }
    lines
}

fn chars_per_line(size: f32, indent: f32) -> usize {
    let usable = PAGE_WIDTH - 2.0 * MARGIN - indent;
    (usable / (size * AVG_GLYPH_WIDTH)).floor() as usize
}

fn push_wrapped(lines: &mut Vec<Line>, text: &str, face: Face, size: f32, indent: f32, gap: f32) {
    for (i, chunk) in wrap(text, chars_per_line(size, indent)).into_iter().enumerate() {
        lines.push(Line {
            face,
            size,
            indent,
            text: chunk,
            gap: if i == 0 { gap } else { 0.0 },
        });
    }
}

fn layout(document: &SdsDocument) -> Vec<Line> {
    let mut lines = Vec::new();
    push_wrapped(&mut lines, "Safety Data Sheet", Face::Bold, TITLE_SIZE, 0.0, 0.0);
    push_wrapped(&mut lines, &document.compound_name, Face::Bold, HEADING_SIZE, 0.0, 4.0);
    push_wrapped(
        &mut lines,
        &format!(
            "SMILES: {}    Generated: {}",
            document.identifier,
            document.generated_at.format("%Y-%m-%d %H:%M UTC")
        ),
        Face::Regular,
        BODY_SIZE,
        0.0,
        4.0,
    );

    for section in &document.sections {
        push_wrapped(
            &mut lines,
            &format!("{}. {}", section.number, section.title),
            Face::Bold,
            HEADING_SIZE,
            0.0,
            14.0,
        );
        for row in section_rows(section) {
            push_wrapped(&mut lines, &row.field, Face::Bold, BODY_SIZE, 0.0, 3.0);
            push_wrapped(&mut lines, &row.value, Face::Regular, BODY_SIZE, VALUE_INDENT, 0.0);
        }
        if !section.data_sources.is_empty() {
            push_wrapped(
                &mut lines,
                &format!("Data sources: {}", section.data_sources.join(", ")),
                Face::Oblique,
                BODY_SIZE,
                0.0,
                4.0,
            );
        }
        for note in &section.notes {
            push_wrapped(&mut lines, &format!("Note: {}", note), Face::Oblique, BODY_SIZE, 0.0, 0.0);
        }
    }
    push_wrapped(&mut lines, DISCLAIMER, Face::Oblique, BODY_SIZE, 0.0, 14.0);
    lines
}

/// Text operations, one list per page.
fn paginate(lines: &[Line]) -> Vec<Vec<Operation>> {
    let mut pages = Vec::new();
    let mut ops = Vec::new();
    let mut y = PAGE_HEIGHT - MARGIN;

    for line in lines {
        let advance = line.size * LINE_SPACING + line.gap;
        if y - advance < MARGIN && !ops.is_empty() {
            pages.push(std::mem::take(&mut ops));
            y = PAGE_HEIGHT - MARGIN;
        }
        y -= advance;
        if line.text.is_empty() {
            continue;
        }
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new(
            "Tf",
            vec![Object::Name(line.face.resource().into()), line.size.into()],
        ));
        ops.push(Operation::new("Td", vec![(MARGIN + line.indent).into(), y.into()]));
        ops.push(Operation::new(
            "Tj",
            vec![Object::String(encode_text(&line.text), StringFormat::Literal)],
        ));
        ops.push(Operation::new("ET", vec![]));
    }
    if !ops.is_empty() || pages.is_empty() {
        pages.push(ops);
    }
    pages
}

fn pdf_error(err: impl std::fmt::Display) -> SdsError {
    SdsError::Render(format!("PDF encoding failed: {}", err))
}

pub fn render_pdf(document: &SdsDocument) -> Result<Vec<u8>> {
    let pages = paginate(&layout(document));

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut fonts = lopdf::Dictionary::new();
    for (resource, base) in FONTS {
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => base,
            "Encoding" => "WinAnsiEncoding",
        });
        fonts.set(resource, font_id);
    }
    let resources_id = doc.add_object(dictionary! { "Font" => fonts });

    let mut kids: Vec<ObjectId> = Vec::with_capacity(pages.len());
    for operations in pages {
        let content = Content { operations }.encode().map_err(pdf_error)?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        kids.push(doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        }));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids.into_iter().map(Object::from).collect::<Vec<_>>(),
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).map_err(pdf_error)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::test_support::sample_document;

    fn page_text(doc: &Document, page_id: ObjectId) -> Vec<u8> {
        let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
        let mut text = Vec::new();
        for operation in content.operations.iter().filter(|op| op.operator == "Tj") {
            if let Some(Object::String(bytes, _)) = operation.operands.first() {
                text.extend_from_slice(bytes);
                text.push(b'\n');
            }
        }
        text
    }

    #[test]
    fn test_pdf_structure() {
        let doc = sample_document("CCO");
        let bytes = render_pdf(&doc).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let parsed = Document::load_mem(&bytes).unwrap();
        // A full document does not fit on one page
        let pages = parsed.get_pages();
        assert!(pages.len() > 1, "{} pages", pages.len());

        let fonts: Vec<Vec<u8>> = parsed
            .objects
            .values()
            .filter_map(|object| object.as_dict().ok())
            .filter_map(|dict| dict.get(b"BaseFont").and_then(Object::as_name).ok())
            .map(<[u8]>::to_vec)
            .collect();
        assert!(fonts.contains(&b"Helvetica-Bold".to_vec()));
    }

    #[test]
    fn test_page_text_round_trips_through_content_stream() {
        let doc = sample_document("CCO");
        let parsed = Document::load_mem(&render_pdf(&doc).unwrap()).unwrap();
        let pages = parsed.get_pages();

        let first = pages.get(&1).copied().unwrap();
        let text = String::from_utf8_lossy(&page_text(&parsed, first)).into_owned();
        assert!(text.starts_with("Safety Data Sheet\n"), "{text}");
        assert!(text.contains("1. Chemical Product and Company Identification"), "{text}");

        let last = pages.values().last().copied().unwrap();
        let text = String::from_utf8_lossy(&page_text(&parsed, last)).into_owned();
        assert!(text.contains("must be verified before use"), "{text}");
    }

    #[test]
    fn test_encode_text() {
        assert_eq!(encode_text("a(b)"), b"a(b)".to_vec());
        assert_eq!(encode_text("20 °C"), vec![b'2', b'0', b' ', 0xB0, b'C']);
        assert_eq!(encode_text("≥95%"), b">=95%".to_vec());
        assert_eq!(encode_text("mg/m³"), vec![b'm', b'g', b'/', b'm', 0xB3]);
        assert_eq!(encode_text("α"), b"?".to_vec());
    }

    #[test]
    fn test_wrap() {
        let lines = wrap("one two three four", 9);
        assert_eq!(lines, vec!["one two", "three", "four"]);
        let lines = wrap("abcdefghij", 4);
        assert_eq!(lines, vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap("a\nb", 10), vec!["a", "b"]);
        assert!(wrap("", 10).iter().all(String::is_empty));
    }
}
