//! Tiny PDF writer for the report export: paginated Helvetica text lines,
//! nothing more. Keeping the fixed subset of the format here avoids pulling
//! a document toolkit in for a one-table export.

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 40.0;
const TITLE_SIZE: u32 = 16;
const BODY_SIZE: u32 = 10;
const LINE_STEP: f32 = 14.0;
const LINES_PER_PAGE: usize = 50;

/// Render `lines` under `title` as a paginated single-column PDF document.
pub fn render_text_document(title: &str, lines: &[String]) -> Vec<u8> {
    let pages: Vec<&[String]> = if lines.is_empty() {
        vec![&[]]
    } else {
        lines.chunks(LINES_PER_PAGE).collect()
    };

    // Object layout: 1 catalog, 2 page tree, 3 font, then for page i
    // (0-based) objects 4+2i (page) and 5+2i (content stream).
    let page_count = pages.len();
    let object_count = 3 + 2 * page_count;

    let mut out: Vec<u8> = Vec::new();
    let mut offsets: Vec<usize> = Vec::with_capacity(object_count + 1);
    out.extend_from_slice(b"%PDF-1.4\n");

    let kids: Vec<String> = (0..page_count)
        .map(|i| format!("{} 0 R", 4 + 2 * i))
        .collect();

    let push_object = |out: &mut Vec<u8>, offsets: &mut Vec<usize>, body: String| {
        offsets.push(out.len());
        out.extend_from_slice(body.as_bytes());
    };

    push_object(
        &mut out,
        &mut offsets,
        "1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n".to_string(),
    );
    push_object(
        &mut out,
        &mut offsets,
        format!(
            "2 0 obj\n<< /Type /Pages /Kids [{}] /Count {} >>\nendobj\n",
            kids.join(" "),
            page_count
        ),
    );
    push_object(
        &mut out,
        &mut offsets,
        "3 0 obj\n<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>\nendobj\n".to_string(),
    );

    for (i, page_lines) in pages.iter().enumerate() {
        let page_id = 4 + 2 * i;
        let content_id = page_id + 1;

        let mut content = String::new();
        content.push_str("BT\n");
        let top = PAGE_HEIGHT - MARGIN - TITLE_SIZE as f32;
        if i == 0 {
            content.push_str(&format!(
                "/F1 {TITLE_SIZE} Tf\n{MARGIN} {top} Td\n({}) Tj\n",
                escape_text(title)
            ));
            content.push_str(&format!("/F1 {BODY_SIZE} Tf\n0 {} Td\n", -2.0 * LINE_STEP));
        } else {
            content.push_str(&format!("/F1 {BODY_SIZE} Tf\n{MARGIN} {top} Td\n"));
        }
        for (n, line) in page_lines.iter().enumerate() {
            if n > 0 || i == 0 {
                content.push_str(&format!("0 {} Td\n", -LINE_STEP));
            }
            content.push_str(&format!("({}) Tj\n", escape_text(line)));
        }
        content.push_str("ET\n");

        push_object(
            &mut out,
            &mut offsets,
            format!(
                "{page_id} 0 obj\n<< /Type /Page /Parent 2 0 R \
                 /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
                 /Resources << /Font << /F1 3 0 R >> >> \
                 /Contents {content_id} 0 R >>\nendobj\n"
            ),
        );
        push_object(
            &mut out,
            &mut offsets,
            format!(
                "{content_id} 0 obj\n<< /Length {} >>\nstream\n{}endstream\nendobj\n",
                content.len(),
                content
            ),
        );
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

/// Escape the characters with meaning inside a PDF literal string.
fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '(' => escaped.push_str("\\("),
            ')' => escaped.push_str("\\)"),
            '\\' => escaped.push_str("\\\\"),
            // The built-in fonts are Latin-1 only; anything outside is
            // replaced rather than emitted as broken bytes.
            c if (c as u32) < 256 => escaped.push(c),
            _ => escaped.push('?'),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_header_and_trailer() {
        let doc = render_text_document("Sales Report", &["row one".to_string()]);
        let text = String::from_utf8_lossy(&doc);
        assert!(text.starts_with("%PDF-1.4"));
        assert!(text.trim_end().ends_with("%%EOF"));
        assert!(text.contains("/Count 1"));
        assert!(text.contains("(Sales Report) Tj"));
        assert!(text.contains("(row one) Tj"));
    }

    #[test]
    fn paginates_long_reports() {
        let lines: Vec<String> = (0..120).map(|i| format!("line {i}")).collect();
        let doc = render_text_document("Report", &lines);
        let text = String::from_utf8_lossy(&doc);
        assert!(text.contains("/Count 3"));
    }

    #[test]
    fn empty_report_still_yields_one_page() {
        let doc = render_text_document("Report", &[]);
        let text = String::from_utf8_lossy(&doc);
        assert!(text.contains("/Count 1"));
    }

    #[test]
    fn escapes_string_delimiters() {
        assert_eq!(escape_text("a(b)c\\"), "a\\(b\\)c\\\\");
    }

    #[test]
    fn xref_offsets_point_at_objects() {
        let doc = render_text_document("T", &["x".to_string()]);
        let text = String::from_utf8_lossy(&doc).to_string();
        let xref_at = text.find("xref\n").unwrap();
        let entries: Vec<&str> = text[xref_at..]
            .lines()
            .skip(2)
            .take_while(|l| l.ends_with("n ") || l.ends_with("f "))
            .collect();
        for entry in entries.iter().filter(|l| l.ends_with("n ")) {
            let offset: usize = entry[..10].parse().unwrap();
            assert!(text[offset..].chars().next().unwrap().is_ascii_digit());
        }
    }
}
