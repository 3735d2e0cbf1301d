//! Span-based source edits.
//!
//! Repairs never reprint the whole module. They collect `(start, end, text)`
//! replacements against the current source and splice them in, so formatting
//! outside the touched spans survives byte for byte.

use crate::validate::{validate_source, CompilerError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
}

impl TextEdit {
    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self {
            start: at,
            end: at,
            replacement: text.into(),
        }
    }

    pub fn replace(start: usize, end: usize, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            replacement: text.into(),
        }
    }

    pub fn delete(start: usize, end: usize) -> Self {
        Self::replace(start, end, String::new())
    }
}

/// Apply edits in reverse position order so earlier offsets stay valid.
/// Edits at the same offset keep their submission order in the output.
pub fn apply_edits(source: &str, edits: &[TextEdit]) -> String {
    let mut ordered: Vec<(usize, &TextEdit)> = edits.iter().enumerate().collect();
    ordered.sort_by(|(ia, a), (ib, b)| {
        b.start
            .cmp(&a.start)
            .then(b.end.cmp(&a.end))
            .then(ib.cmp(ia))
    });

    let mut result = source.to_string();
    for (_, edit) in ordered {
        let start = edit.start.min(result.len());
        let end = edit.end.clamp(start, result.len());
        result.replace_range(start..end, &edit.replacement);
    }
    result
}

/// Deletion covering a whole statement. When the statement is alone on its
/// line(s), the indentation before it and the line break after it go too.
pub fn remove_statement(source: &str, start: usize, end: usize) -> TextEdit {
    let bytes = source.as_bytes();

    let mut line_start = start;
    while line_start > 0 && matches!(bytes[line_start - 1], b' ' | b'\t') {
        line_start -= 1;
    }
    let owns_line_start = line_start == 0 || bytes[line_start - 1] == b'\n';

    let mut line_end = end;
    while line_end < bytes.len() && matches!(bytes[line_end], b' ' | b'\t') {
        line_end += 1;
    }
    let owns_line_end = line_end == bytes.len() || bytes[line_end] == b'\n' || bytes[line_end] == b'\r';

    if owns_line_start && owns_line_end {
        if line_end < bytes.len() && bytes[line_end] == b'\r' {
            line_end += 1;
        }
        if line_end < bytes.len() && bytes[line_end] == b'\n' {
            line_end += 1;
        }
        TextEdit::delete(line_start, line_end)
    } else {
        TextEdit::delete(start, end)
    }
}

/// Splice `edits` into `source` and require the result to re-parse.
/// On failure the caller keeps `source` unchanged.
pub fn apply_validated(
    source: &str,
    edits: &[TextEdit],
    filename: &str,
) -> Result<String, CompilerError> {
    let candidate = apply_edits(source, edits);
    validate_source(&candidate, filename)?;
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_edits_reverse_order() {
        let src = "let a = 1; let b = 2;";
        let edits = vec![
            TextEdit::replace(4, 5, "x"),
            TextEdit::replace(15, 16, "y"),
            TextEdit::insert(0, "// hi\n"),
        ];
        assert_eq!(apply_edits(src, &edits), "// hi\nlet x = 1; let y = 2;");
    }

    #[test]
    fn test_same_offset_inserts_keep_order() {
        let edits = vec![TextEdit::insert(0, "a"), TextEdit::insert(0, "b")];
        assert_eq!(apply_edits("!", &edits), "ab!");
    }

    #[test]
    fn test_remove_statement_swallows_line() {
        let src = "import a from 'a';\n  import b from 'b';\nconst c = 1;\n";
        let start = src.find("import b").unwrap();
        let end = start + "import b from 'b';".len();
        let edit = remove_statement(src, start, end);
        assert_eq!(
            apply_edits(src, &[edit]),
            "import a from 'a';\nconst c = 1;\n"
        );
    }

    #[test]
    fn test_apply_validated_rejects_breaking_edit() {
        let src = "const a = 1;\n";
        assert!(apply_validated(src, &[TextEdit::replace(10, 11, "")], "a.tsx").is_err());
        assert_eq!(
            apply_validated(src, &[TextEdit::replace(10, 11, "2")], "a.tsx").unwrap(),
            "const a = 2;\n"
        );
    }

    #[test]
    fn test_remove_statement_inline() {
        let src = "import a from 'a'; const c = 1;";
        let edit = remove_statement(src, 0, 18);
        assert_eq!(apply_edits(src, &[edit]), " const c = 1;");
    }
}
