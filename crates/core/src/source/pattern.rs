use regex_lite::Regex;

use super::SourceError;

/// Shell-style file name pattern: `*` matches any run of characters, `?`
/// exactly one. Everything else is literal and the whole name must match.
#[derive(Debug, Clone)]
pub struct FilePattern {
    raw: String,
    regex: Regex,
}

impl FilePattern {
    pub fn new(pattern: &str) -> Result<Self, SourceError> {
        let mut expr = String::with_capacity(pattern.len() + 8);
        expr.push('^');
        for c in pattern.chars() {
            match c {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                c => expr.push_str(&regex_lite::escape(&c.to_string())),
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|e| SourceError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            raw: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_and_question_mark() {
        let p = FilePattern::new("NGIN_DataFile_*.xml").unwrap();
        assert!(p.matches("NGIN_DataFile_20240101.xml"));
        assert!(p.matches("NGIN_DataFile_.xml"));
        assert!(!p.matches("NGIN_DataFile_20240101.xml.bak"));
        assert!(!p.matches("old_NGIN_DataFile_1.xml"));

        let p = FilePattern::new("file?.txt").unwrap();
        assert!(p.matches("file1.txt"));
        assert!(!p.matches("file12.txt"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let p = FilePattern::new("a.b+(c)*").unwrap();
        assert!(p.matches("a.b+(c)xyz"));
        assert!(!p.matches("axb+(c)"));
        assert_eq!(p.as_str(), "a.b+(c)*");
    }
}
