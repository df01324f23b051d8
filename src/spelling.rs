//! Parameter-name spellings used to match action titles.
//!
//! Sensor parameters are configured in ASCII transliteration
//! (`duesendruck`) while alert titles use proper German spelling
//! (`Düsendruck zu hoch`). A parameter matches an action title when any of
//! its accepted spellings occurs in the title, case-insensitively.

// ---

/// Accepted spellings per canonical (transliterated, lowercase) key.
const SPELLINGS: &[(&str, &[&str])] = &[
    ("kabinentemperatur", &["kabinentemperatur"]),
    ("luftfeuchtigkeit", &["luftfeuchtigkeit"]),
    ("duesendruck", &["duesendruck", "düsendruck"]),
    ("energieverbrauch", &["energieverbrauch"]),
];

const TRANSLITERATIONS: &[(&str, &str)] = &[("ä", "ae"), ("ö", "oe"), ("ü", "ue"), ("ß", "ss")];

/// Lowercase and transliterate umlauts, e.g. `Düsendruck` -> `duesendruck`.
pub fn canonical_key(name: &str) -> String {
    // ---
    let mut key = name.trim().to_lowercase();
    for (umlaut, ascii) in TRANSLITERATIONS {
        key = key.replace(umlaut, ascii);
    }
    key
}

/// All spellings a title may use for `parameter`.
///
/// Parameters not in the table accept every mix of ASCII and umlaut
/// spelling derived from their canonical key, so `gruenflaeche` also
/// matches `Grünflaeche`. The all-ASCII form comes first.
pub fn spellings(parameter: &str) -> Vec<String> {
    // ---
    let key = canonical_key(parameter);
    if let Some((_, known)) = SPELLINGS.iter().find(|(k, _)| *k == key) {
        return known.iter().map(|s| s.to_string()).collect();
    }
    umlaut_variants(&key)
}

/// Expand each `ae`/`oe`/`ue` in `key` into both of its spellings.
fn umlaut_variants(key: &str) -> Vec<String> {
    // ---
    let mut variants = vec![String::new()];
    let mut rest = key;

    while let Some(ch) = rest.chars().next() {
        let pair = TRANSLITERATIONS
            .iter()
            .filter(|(u, _)| *u != "ß")
            .find(|(_, ascii)| rest.starts_with(ascii));

        match pair {
            Some((umlaut, ascii)) => {
                variants = variants
                    .into_iter()
                    .flat_map(|v| [format!("{v}{ascii}"), format!("{v}{umlaut}")])
                    .collect();
                rest = &rest[ascii.len()..];
            }
            None => {
                for v in &mut variants {
                    v.push(ch);
                }
                rest = &rest[ch.len_utf8()..];
            }
        }
    }
    variants
}

/// Regex alternation over `spellings`, valid for both the `regex` crate and
/// PostgreSQL's `~*` operator.
pub fn title_pattern(spellings: &[String]) -> String {
    // ---
    let alternatives: Vec<String> = spellings.iter().map(|s| regex::escape(s)).collect();
    format!("(?:{})", alternatives.join("|"))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use regex::RegexBuilder;

    fn matches(parameter: &str, title: &str) -> bool {
        let pattern = title_pattern(&spellings(parameter));
        RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .unwrap()
            .is_match(title)
    }

    #[test]
    fn canonical_key_transliterates() {
        assert_eq!(canonical_key("Düsendruck"), "duesendruck");
        assert_eq!(canonical_key(" Kabinentemperatur "), "kabinentemperatur");
        assert_eq!(canonical_key("Straße"), "strasse");
    }

    #[test]
    fn pressure_matches_ascii_and_umlaut_titles() {
        // ---
        assert!(matches("duesendruck", "Düsendruck zu hoch"));
        assert!(matches("duesendruck", "DUESENDRUCK zu niedrig"));
        assert!(matches("Düsendruck", "duesendruck zu hoch"));
        assert!(!matches("duesendruck", "Kabinentemperatur zu hoch"));
    }

    #[test]
    fn temperature_matches_case_insensitively() {
        assert!(matches("kabinentemperatur", "Kabinentemperatur zu niedrig"));
        assert!(!matches("kabinentemperatur", "Luftfeuchtigkeit zu hoch"));
    }

    #[test]
    fn unknown_parameter_derives_umlaut_spelling() {
        // ---
        assert_eq!(spellings("oelstand"), vec!["oelstand", "ölstand"]);
        assert_eq!(spellings("druck"), vec!["druck"]);
        assert!(matches("oelstand", "Ölstand zu niedrig"));
    }

    #[test]
    fn mixed_spellings_match_letter_by_letter() {
        // ---
        let forms = spellings("gruenflaeche");
        assert_eq!(forms.len(), 4);
        assert_eq!(forms[0], "gruenflaeche");
        assert_eq!(forms[3], "grünfläche");

        assert!(matches("gruenflaeche", "Grünflaeche zu trocken"));
        assert!(matches("gruenflaeche", "Gruenfläche zu trocken"));
        assert!(matches("gruenflaeche", "GRÜNFLÄCHE zu trocken"));
        assert!(!matches("gruenflaeche", "Grunflache zu trocken"));
    }

    #[test]
    fn pattern_escapes_metacharacters() {
        assert_eq!(title_pattern(&["a.b".to_string()]), r"(?:a\.b)");
    }
}
