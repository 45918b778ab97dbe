//! Glossary parsing.
//! Turns free-form `source=target` lines into the term mapping sent with each
//! translation request.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Lines starting with this marker are ignored.
const COMMENT_MARKER: char = '#';

/// Source term → target term. Keys are unique; ordered for stable output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Glossary {
    entries: BTreeMap<String, String>,
}

impl Glossary {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, source: &str) -> Option<&str> {
        self.entries.get(source).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render back to `source=target` lines.
    pub fn to_text(&self) -> String {
        self.iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Parse glossary text. Returns `None` when no line yields a valid entry.
///
/// A line contributes only if, once trimmed, it is not a comment and splits
/// around exactly one `=` into two non-empty trimmed parts. Later lines win
/// on duplicate keys. `=` cannot be escaped.
pub fn parse_glossary(text: &str) -> Option<Glossary> {
    let mut entries = BTreeMap::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(COMMENT_MARKER) {
            continue;
        }

        let mut parts = line.split('=');
        let (Some(source), Some(target), None) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        let (source, target) = (source.trim(), target.trim());
        if source.is_empty() || target.is_empty() {
            continue;
        }
        entries.insert(source.to_string(), target.to_string());
    }

    if entries.is_empty() {
        None
    } else {
        Some(Glossary { entries })
    }
}

/// Non-blank lines in the raw text, valid or not.
pub fn count_glossary_lines(text: &str) -> usize {
    text.lines().filter(|l| !l.trim().is_empty()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pairs_and_skips_noise() {
        let text = "\
# company terms
computadora = computer

sistema operativo=operativsystem
   # indented comment
sin_igual
a=b=c
=vacío
vacío=
  Acme=Acme  ";
        let g = parse_glossary(text).unwrap();
        assert_eq!(g.len(), 3);
        assert_eq!(g.get("computadora"), Some("computer"));
        assert_eq!(g.get("sistema operativo"), Some("operativsystem"));
        assert_eq!(g.get("Acme"), Some("Acme"));
        assert_eq!(g.get("a"), None);
    }

    #[test]
    fn later_duplicate_wins() {
        let g = parse_glossary("hola=hej\nhola = goddag\n").unwrap();
        assert_eq!(g.len(), 1);
        assert_eq!(g.get("hola"), Some("goddag"));
    }

    #[test]
    fn empty_or_invalid_text_is_absent() {
        assert_eq!(parse_glossary(""), None);
        assert_eq!(parse_glossary("   \n\n# only comments\n"), None);
        assert_eq!(parse_glossary("x==y\nnope"), None);
    }

    #[test]
    fn handles_crlf_line_endings() {
        let g = parse_glossary("uno=en\r\ndos=to\r\n").unwrap();
        assert_eq!(g.get("uno"), Some("en"));
        assert_eq!(g.get("dos"), Some("to"));
    }

    #[test]
    fn rendering_reparses_to_the_same_mapping() {
        let inputs = [
            "b=2\na=1\n# c=3\na = 9",
            "  espacio  =  mellemrum  \nfin=slut",
            "ñandú=nandu\nçà=ça",
        ];
        for text in inputs {
            let parsed = parse_glossary(text).unwrap();
            let again = parse_glossary(&parsed.to_text()).unwrap();
            assert_eq!(parsed, again, "input: {text:?}");
        }
    }

    #[test]
    fn serializes_as_plain_object() {
        let g = parse_glossary("hola=hej").unwrap();
        assert_eq!(serde_json::to_value(&g).unwrap(), serde_json::json!({"hola": "hej"}));
    }

    #[test]
    fn counts_non_blank_lines() {
        assert_eq!(count_glossary_lines("a=b\n\n  \nbad line\n# c"), 3);
        assert_eq!(count_glossary_lines(""), 0);
    }
}
