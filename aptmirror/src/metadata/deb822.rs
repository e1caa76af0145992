//! Minimal parser for RFC-822 style control paragraphs.
//!
//! Release, Packages and Sources documents are all sequences of paragraphs
//! separated by blank lines. Each paragraph is a list of `Field: value`
//! lines, where lines starting with whitespace continue the previous field.

/// One control paragraph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Paragraph {
    fields: Vec<(String, String)>,
}

impl Paragraph {
    /// Look up a field by name, ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Iterate over the non-empty lines of a multi-line field.
    pub fn lines(&self, name: &str) -> impl Iterator<Item = &str> {
        self.get(name)
            .into_iter()
            .flat_map(str::lines)
            .map(str::trim)
            .filter(|line| !line.is_empty())
    }

    /// Returns true if the paragraph has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

/// A syntax error with its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub line: usize,
    pub reason: String,
}

impl std::fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.reason)
    }
}

impl std::error::Error for SyntaxError {}

/// Parse a document into paragraphs.
pub fn parse_paragraphs(content: &str) -> Result<Vec<Paragraph>, SyntaxError> {
    let mut paragraphs = Vec::new();
    let mut current = Paragraph::default();

    for (index, raw) in content.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim_end_matches('\r');

        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
            continue;
        }

        if line.starts_with('#') {
            continue;
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            let Some((_, value)) = current.fields.last_mut() else {
                return Err(SyntaxError {
                    line: line_no,
                    reason: "continuation line without a field".to_string(),
                });
            };
            if !value.is_empty() {
                value.push('\n');
            }
            value.push_str(line.trim());
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            return Err(SyntaxError {
                line: line_no,
                reason: format!("expected 'Field: value', found '{}'", line),
            });
        };
        let key = key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err(SyntaxError {
                line: line_no,
                reason: format!("invalid field name '{}'", key),
            });
        }
        current
            .fields
            .push((key.to_string(), value.trim().to_string()));
    }

    if !current.is_empty() {
        paragraphs.push(current);
    }

    Ok(paragraphs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_two_paragraphs() {
        let text = "Package: a\nVersion: 1\n\nPackage: b\nVersion: 2\n";
        let paragraphs = parse_paragraphs(text).unwrap();

        assert_eq!(paragraphs.len(), 2);
        assert_eq!(paragraphs[0].get("package"), Some("a"));
        assert_eq!(paragraphs[1].get("Version"), Some("2"));
    }

    #[test]
    fn test_continuation_lines() {
        let text = "SHA256:\n abc 10 main/a\n def 20 main/b\nDescription: short\n long text\n";
        let paragraphs = parse_paragraphs(text).unwrap();
        let p = &paragraphs[0];

        let lines: Vec<&str> = p.lines("SHA256").collect();
        assert_eq!(lines, vec!["abc 10 main/a", "def 20 main/b"]);
        assert_eq!(p.get("Description"), Some("short\nlong text"));
    }

    #[test]
    fn test_multiple_blank_lines_and_crlf() {
        let text = "A: 1\r\n\r\n\r\n\r\nB: 2\r\n";
        let paragraphs = parse_paragraphs(text).unwrap();
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(paragraphs[0].get("A"), Some("1"));
    }

    #[test]
    fn test_orphan_continuation_is_error() {
        let err = parse_paragraphs(" dangling\n").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_missing_colon_is_error() {
        let err = parse_paragraphs("Package: a\nnot a field\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_empty_document() {
        assert!(parse_paragraphs("\n\n").unwrap().is_empty());
    }
}
