//! Minimal deterministic PDF writer.
//!
//! The forensic report must be byte-reproducible for a given verdict, so the
//! document is assembled by hand with a fixed object layout: catalog, page
//! tree, two standard Type 1 fonts, then one page object and one content
//! stream per page. No creation date, document id or any other volatile
//! metadata is emitted.

/// Text style of one rendered line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextStyle {
    Title,
    Heading,
    Body,
}

/// One line of report text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfLine {
    pub text: String,
    pub style: TextStyle,
}

impl PdfLine {
    #[must_use]
    pub fn title(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: TextStyle::Title,
        }
    }

    #[must_use]
    pub fn heading(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: TextStyle::Heading,
        }
    }

    #[must_use]
    pub fn body(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: TextStyle::Body,
        }
    }
}

// A4 in points
const PAGE_WIDTH: u32 = 595;
const PAGE_HEIGHT: u32 = 842;
const MARGIN_LEFT: u32 = 56;
const TOP_BASELINE: u32 = 800;
const LEADING: u32 = 14;
const LINES_PER_PAGE: usize = 50;

/// Render the lines into a complete PDF document.
#[must_use]
pub fn render_document(lines: &[PdfLine]) -> Vec<u8> {
    let pages: Vec<&[PdfLine]> = if lines.is_empty() {
        vec![&[]]
    } else {
        lines.chunks(LINES_PER_PAGE).collect()
    };
    let page_count = pages.len();

    // Objects: 1 catalog, 2 page tree, 3 regular font, 4 bold font,
    // then (page, content) pairs.
    let object_count = 4 + page_count * 2;

    let mut out: Vec<u8> = Vec::new();
    let mut offsets: Vec<usize> = Vec::with_capacity(object_count);

    out.extend_from_slice(b"%PDF-1.4\n");

    let kids: Vec<String> = (0..page_count)
        .map(|k| format!("{} 0 R", 5 + 2 * k))
        .collect();

    push_object(
        &mut out,
        &mut offsets,
        1,
        "<< /Type /Catalog /Pages 2 0 R >>",
    );
    push_object(
        &mut out,
        &mut offsets,
        2,
        &format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            page_count
        ),
    );
    push_object(
        &mut out,
        &mut offsets,
        3,
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>",
    );
    push_object(
        &mut out,
        &mut offsets,
        4,
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold >>",
    );

    for (k, page_lines) in pages.iter().enumerate() {
        let page_num = 5 + 2 * k;
        let content_num = page_num + 1;
        push_object(
            &mut out,
            &mut offsets,
            page_num,
            &format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
                 /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {content_num} 0 R >>"
            ),
        );
        let stream = content_stream(page_lines);
        push_stream_object(&mut out, &mut offsets, content_num, &stream);
    }

    let xref_offset = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", object_count + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in &offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            object_count + 1,
            xref_offset
        )
        .as_bytes(),
    );

    out
}

fn push_object(out: &mut Vec<u8>, offsets: &mut Vec<usize>, num: usize, body: &str) {
    offsets.push(out.len());
    out.extend_from_slice(format!("{num} 0 obj\n{body}\nendobj\n").as_bytes());
}

fn push_stream_object(out: &mut Vec<u8>, offsets: &mut Vec<usize>, num: usize, stream: &[u8]) {
    offsets.push(out.len());
    out.extend_from_slice(format!("{num} 0 obj\n<< /Length {} >>\nstream\n", stream.len()).as_bytes());
    out.extend_from_slice(stream);
    out.extend_from_slice(b"\nendstream\nendobj\n");
}

fn content_stream(lines: &[PdfLine]) -> Vec<u8> {
    let mut stream: Vec<u8> = Vec::new();
    stream.extend_from_slice(b"BT\n");
    stream.extend_from_slice(format!("{LEADING} TL\n").as_bytes());
    stream.extend_from_slice(format!("{MARGIN_LEFT} {TOP_BASELINE} Td\n").as_bytes());
    for line in lines {
        let (font, size) = match line.style {
            TextStyle::Title => ("F2", 14),
            TextStyle::Heading => ("F2", 10),
            TextStyle::Body => ("F1", 10),
        };
        stream.extend_from_slice(format!("/{font} {size} Tf\n").as_bytes());
        stream.push(b'(');
        stream.extend_from_slice(&escape_text(&line.text));
        stream.extend_from_slice(b") Tj T*\n");
    }
    stream.extend_from_slice(b"ET");
    stream
}

/// Escape a line for a PDF literal string, mapping to Latin-1.
///
/// Characters outside Latin-1 are replaced with `?`; parentheses and
/// backslashes are escaped; control characters are dropped.
fn escape_text(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for ch in text.chars() {
        let code = ch as u32;
        match ch {
            '(' | ')' | '\\' => {
                out.push(b'\\');
                out.push(ch as u8);
            }
            '\n' | '\r' | '\t' => out.push(b' '),
            _ if (0x20..0x7f).contains(&code) || (0xa0..0x100).contains(&code) => {
                out.push(code as u8);
            }
            _ if code < 0x20 => {}
            _ => out.push(b'?'),
        }
    }
    out
}
