//! Converts rendered EXTRACT popup markup into standoff annotations.
//!
//! The markup is scanned tag by tag; only the handful of elements that carry
//! the annotated text and the identifier table are interpreted.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::domain::char_slice;
use crate::error::StandoffError;
use crate::normalize::normalize_extract_id;
use crate::output::StandoffSink;
use crate::resolver::is_builtin_species;
use crate::standoff::{AnnotationGroup, IdSequence, Normalization, Textbound};

const CONTENT_CLASS: &str = "content";
const DATA_DIV_CLASS: &str = "ajax_table";
const MATCH_CLASS: &str = "extract_match";
const TYPE_CLASS: &str = "type";
const NAME_CLASS: &str = "name";
const ID_CLASS: &str = "identifier";
const ID_ROW_CLASSES: [&str; 2] = ["even", "odd"];

static MARKUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!--.*?-->|<(/?)([A-Za-z][A-Za-z0-9]*)([^>]*)>").expect("valid markup regex")
});

static CLASS_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bclass\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("valid class regex")
});

static CHAR_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[A-Za-z][A-Za-z0-9]*);").expect("valid entity regex")
});

/// Named references common in biomedical text: markup escapes, Greek
/// letters, and typographic and math symbols.
const NAMED_REFS: &[(&str, char)] = &[
    ("amp", '&'),
    ("lt", '<'),
    ("gt", '>'),
    ("quot", '"'),
    ("apos", '\''),
    ("nbsp", '\u{a0}'),
    ("Alpha", 'Α'),
    ("Beta", 'Β'),
    ("Gamma", 'Γ'),
    ("Delta", 'Δ'),
    ("Epsilon", 'Ε'),
    ("Zeta", 'Ζ'),
    ("Eta", 'Η'),
    ("Theta", 'Θ'),
    ("Iota", 'Ι'),
    ("Kappa", 'Κ'),
    ("Lambda", 'Λ'),
    ("Mu", 'Μ'),
    ("Nu", 'Ν'),
    ("Xi", 'Ξ'),
    ("Omicron", 'Ο'),
    ("Pi", 'Π'),
    ("Rho", 'Ρ'),
    ("Sigma", 'Σ'),
    ("Tau", 'Τ'),
    ("Upsilon", 'Υ'),
    ("Phi", 'Φ'),
    ("Chi", 'Χ'),
    ("Psi", 'Ψ'),
    ("Omega", 'Ω'),
    ("alpha", 'α'),
    ("beta", 'β'),
    ("gamma", 'γ'),
    ("delta", 'δ'),
    ("epsilon", 'ε'),
    ("epsiv", 'ϵ'),
    ("zeta", 'ζ'),
    ("eta", 'η'),
    ("theta", 'θ'),
    ("thetasym", 'ϑ'),
    ("iota", 'ι'),
    ("kappa", 'κ'),
    ("lambda", 'λ'),
    ("mu", 'μ'),
    ("nu", 'ν'),
    ("xi", 'ξ'),
    ("omicron", 'ο'),
    ("pi", 'π'),
    ("piv", 'ϖ'),
    ("rho", 'ρ'),
    ("sigmaf", 'ς'),
    ("sigma", 'σ'),
    ("tau", 'τ'),
    ("upsilon", 'υ'),
    ("upsih", 'ϒ'),
    ("phi", 'φ'),
    ("chi", 'χ'),
    ("psi", 'ψ'),
    ("omega", 'ω'),
    ("micro", 'µ'),
    ("deg", '°'),
    ("plusmn", '±'),
    ("times", '×'),
    ("divide", '÷'),
    ("middot", '·'),
    ("minus", '−'),
    ("le", '≤'),
    ("ge", '≥'),
    ("ne", '≠'),
    ("asymp", '≈'),
    ("infin", '∞'),
    ("prime", '′'),
    ("Prime", '″'),
    ("ndash", '–'),
    ("mdash", '—'),
    ("lsquo", '‘'),
    ("rsquo", '’'),
    ("ldquo", '“'),
    ("rdquo", '”'),
    ("hellip", '…'),
    ("bull", '•'),
    ("larr", '←'),
    ("rarr", '→'),
    ("harr", '↔'),
    ("uarr", '↑'),
    ("darr", '↓'),
    ("copy", '©'),
    ("reg", '®'),
    ("trade", '™'),
    ("sect", '§'),
    ("para", '¶'),
    ("sup1", '¹'),
    ("sup2", '²'),
    ("sup3", '³'),
    ("frac12", '½'),
    ("frac14", '¼'),
    ("frac34", '¾'),
    ("szlig", 'ß'),
    ("auml", 'ä'),
    ("ouml", 'ö'),
    ("uuml", 'ü'),
    ("Auml", 'Ä'),
    ("Ouml", 'Ö'),
    ("Uuml", 'Ü'),
    ("eacute", 'é'),
    ("egrave", 'è'),
    ("aacute", 'á'),
    ("iacute", 'í'),
    ("oacute", 'ó'),
    ("uacute", 'ú'),
    ("ccedil", 'ç'),
    ("ntilde", 'ñ'),
    ("aring", 'å'),
    ("oslash", 'ø'),
    ("Aring", 'Å'),
    ("Oslash", 'Ø'),
    ("aelig", 'æ'),
    ("AElig", 'Æ'),
];

/// A text range inside a match span, with the identifiers it is tagged with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSpan {
    pub start: usize,
    pub end: usize,
    pub ids: Vec<String>,
}

/// One row of the popup's identifier table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierRow {
    pub name: String,
    pub entity_type: String,
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractDocument {
    pub text: String,
    pub spans: Vec<MatchSpan>,
    pub identifiers: Vec<IdentifierRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cell {
    Name,
    Type,
    Identifier,
    Other,
}

#[derive(Debug, Default)]
struct Scanner {
    in_content_div: bool,
    in_data_div: bool,
    in_data_paragraph: bool,
    current_span: Option<MatchSpan>,
    in_id_row: bool,
    current_cell: Option<Cell>,
    current_row: IdentifierRow,
    offset: usize,
    document: ExtractDocument,
}

impl Scanner {
    fn reset_text_state(&mut self) {
        self.in_content_div = false;
        self.in_data_div = false;
        self.in_data_paragraph = false;
        self.close_span();
    }

    fn close_span(&mut self) {
        if let Some(span) = self.current_span.take() {
            if span.ids.is_empty() {
                tracing::warn!("missing ids for span {}-{}", span.start, span.end);
            }
            self.document.spans.push(span);
        }
    }

    fn start_tag(&mut self, tag: &str, classes: &[&str]) {
        let class_attr = classes.join(" ");
        match tag {
            "div" => {
                if class_attr == CONTENT_CLASS {
                    self.in_content_div = true;
                } else if self.in_content_div && class_attr == DATA_DIV_CLASS {
                    self.in_data_div = true;
                } else {
                    self.reset_text_state();
                }
            }
            "p" => {
                if self.in_data_div {
                    self.in_data_paragraph = true;
                } else {
                    self.in_data_paragraph = false;
                    self.close_span();
                }
            }
            "span" => {
                if self.in_data_paragraph && classes.contains(&MATCH_CLASS) {
                    self.close_span();
                    self.current_span = Some(MatchSpan {
                        start: self.offset,
                        end: self.offset,
                        ids: classes
                            .iter()
                            .filter(|class| **class != MATCH_CLASS)
                            .map(|class| class.to_string())
                            .collect(),
                    });
                }
            }
            "tr" => {
                self.in_id_row = classes.iter().any(|class| ID_ROW_CLASSES.contains(class));
                self.current_row = IdentifierRow::default();
            }
            "td" => {
                self.current_cell = Some(if classes.contains(&TYPE_CLASS) {
                    Cell::Type
                } else if classes.contains(&NAME_CLASS) {
                    Cell::Name
                } else if classes.contains(&ID_CLASS) {
                    Cell::Identifier
                } else {
                    Cell::Other
                });
            }
            _ => {}
        }
    }

    fn end_tag(&mut self, tag: &str) {
        match tag {
            "div" => self.reset_text_state(),
            "p" => {
                self.in_data_paragraph = false;
                self.close_span();
            }
            "span" => self.close_span(),
            "tr" => {
                if self.in_id_row {
                    let row = std::mem::take(&mut self.current_row);
                    self.document.identifiers.push(row);
                }
                self.in_id_row = false;
                self.current_row = IdentifierRow::default();
            }
            "td" => self.current_cell = None,
            _ => {}
        }
    }

    fn data(&mut self, raw: &str) {
        if raw.is_empty() {
            return;
        }
        let data = decode_char_refs(raw);
        if self.in_data_paragraph {
            let length = data.chars().count();
            if let Some(span) = self.current_span.as_mut() {
                span.end += length;
            }
            self.offset += length;
            self.document.text.push_str(&data);
        } else if let Some(cell) = self.current_cell {
            let target = match cell {
                Cell::Type => &mut self.current_row.entity_type,
                Cell::Name => &mut self.current_row.name,
                Cell::Identifier => &mut self.current_row.id,
                Cell::Other => return,
            };
            target.push_str(&data);
        }
    }
}

/// Decodes character references. Unknown named references are kept as is.
pub fn decode_char_refs(text: &str) -> String {
    CHAR_REF
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let body = &caps[1];
            let decoded = if let Some(hex) = body
                .strip_prefix("#x")
                .or_else(|| body.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                NAMED_REFS
                    .iter()
                    .find(|&&(name, _)| name == body)
                    .map(|&(_, ch)| ch)
            };
            match decoded {
                Some(ch) => ch.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn classes_of(attributes: &str) -> Vec<&str> {
    CLASS_ATTR
        .captures(attributes)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
        .map(|value| value.as_str().split(' ').filter(|c| !c.is_empty()).collect())
        .unwrap_or_default()
}

impl ExtractDocument {
    pub fn parse(markup: &str) -> Self {
        let mut scanner = Scanner::default();
        let mut last = 0;
        for caps in MARKUP.captures_iter(markup) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            scanner.data(&markup[last..whole.start()]);
            last = whole.end();
            let Some(tag) = caps.get(2) else {
                continue;
            };
            let tag = tag.as_str().to_ascii_lowercase();
            let closing = caps.get(1).is_some_and(|slash| !slash.as_str().is_empty());
            if closing {
                scanner.end_tag(&tag);
            } else {
                let attributes = caps.get(3).map(|m| m.as_str()).unwrap_or("");
                scanner.start_tag(&tag, &classes_of(attributes));
            }
        }
        scanner.data(&markup[last..]);
        scanner.close_span();
        scanner.document
    }

    pub fn load(path: &Path) -> Result<Self, StandoffError> {
        let markup = fs::read_to_string(path)
            .map_err(|err| StandoffError::Filesystem(format!("read {}: {err}", path.display())))?;
        Ok(Self::parse(&markup))
    }

    /// Identifier → (name, type). Conflicting rows are reported; the last
    /// one wins.
    pub fn id_map(&self) -> HashMap<&str, (&str, &str)> {
        let mut map: HashMap<&str, (&str, &str)> = HashMap::new();
        for row in &self.identifiers {
            let value = (row.name.as_str(), row.entity_type.as_str());
            if let Some(previous) = map.insert(row.id.as_str(), value) {
                if previous != value {
                    tracing::error!(
                        "conflicting data for {}: {previous:?} vs {value:?}",
                        row.id
                    );
                }
            }
        }
        map
    }

    /// One textbound per span and rewritten type, in span order; types keep
    /// the order in which a span's identifiers first mention them.
    pub fn to_groups(&self) -> Vec<AnnotationGroup> {
        let id_map = self.id_map();
        let mut sequence = IdSequence::default();
        let mut groups = Vec::new();
        for span in &self.spans {
            let reference = char_slice(&self.text, span.start, span.end);
            let mut by_type: Vec<(String, Vec<(&str, &str, &str)>)> = Vec::new();
            for id in &span.ids {
                let Some(&(name, original_type)) = id_map.get(id.as_str()) else {
                    tracing::error!("missing id: {id}");
                    continue;
                };
                let short_type = rewrite_type(original_type);
                let idx = match by_type.iter().position(|(t, _)| *t == short_type) {
                    Some(idx) => idx,
                    None => {
                        by_type.push((short_type, Vec::new()));
                        by_type.len() - 1
                    }
                };
                by_type[idx].1.push((name, id.as_str(), original_type));
            }

            for (entity_type, members) in by_type {
                let textbound = Textbound {
                    id: sequence.next_textbound(),
                    entity_type,
                    start: span.start,
                    end: span.end,
                    text: reference.to_string(),
                };
                let normalizations = members
                    .into_iter()
                    .map(|(name, id, original_type)| Normalization {
                        id: sequence.next_normalization(),
                        textbound_id: textbound.id.clone(),
                        norm_id: normalize_extract_id(id, original_type),
                        text: name.to_string(),
                    })
                    .collect();
                groups.push(AnnotationGroup {
                    textbound,
                    normalizations,
                });
            }
        }
        groups
    }
}

/// Converts one popup file, writing `<stem>.txt` / `<stem>.ann` through
/// `sink`. Returns the number of textbounds written.
pub fn convert_file(path: &Path, sink: &mut dyn StandoffSink) -> Result<usize, StandoffError> {
    let document = ExtractDocument::load(path)?;
    let groups = document.to_groups();
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .ok_or_else(|| StandoffError::Filesystem(format!("no file name in {}", path.display())))?;
    sink.write(&stem, &document.text, &groups)?;
    tracing::info!("{}: {} spans, {} textbounds", path.display(), document.spans.len(), groups.len());
    Ok(groups.len())
}

/// Gene types of the built-in model organisms collapse to `Gene`; spaces
/// become underscores.
pub fn rewrite_type(extract_type: &str) -> String {
    let is_species_gene = extract_type
        .strip_suffix(" gene")
        .is_some_and(is_builtin_species);
    let mapped = if is_species_gene { "Gene" } else { extract_type };
    mapped.replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::standoff::render;

    const POPUP: &str = r#"<html><body>
<div class="content"><div class="ajax_table">
<p>Human <span class="extract_match 9606 ENSP1">BRCA1</span> &amp; <span class="extract_match CIDs0042">caffeine</span></p>
<table>
<tr class="even"><td class="name">BRCA1</td><td class="type">Homo sapiens gene</td><td class="identifier">ENSP1</td></tr>
<tr class="odd"><td class="name">human</td><td class="type">Organism</td><td class="identifier">9606</td></tr>
<tr class="even"><td class="name">caffeine</td><td class="type">Chemical compound</td><td class="identifier">CIDs0042</td></tr>
</table>
</div></div>
</body></html>"#;

    #[test]
    fn parse_collects_text_spans_and_rows() {
        let document = ExtractDocument::parse(POPUP);
        assert_eq!(document.text, "Human BRCA1 & caffeine");
        assert_eq!(document.spans.len(), 2);
        assert_eq!(document.spans[0].start, 6);
        assert_eq!(document.spans[0].end, 11);
        assert_eq!(document.spans[0].ids, vec!["9606", "ENSP1"]);
        assert_eq!(document.spans[1].start, 14);
        assert_eq!(document.identifiers.len(), 3);
        assert_eq!(document.identifiers[0].entity_type, "Homo sapiens gene");
    }

    #[test]
    fn groups_split_span_by_type() {
        let groups = ExtractDocument::parse(POPUP).to_groups();
        assert_eq!(
            render(&groups),
            "T1\tOrganism 6 11\tBRCA1\n\
             N1\tReference T1 NCBITaxon:9606\thuman\n\
             T2\tGene 6 11\tBRCA1\n\
             N2\tReference T2 ENS:P1\tBRCA1\n\
             T3\tChemical_compound 14 22\tcaffeine\n\
             N3\tReference T3 CID:0042\tcaffeine\n"
        );
    }

    #[test]
    fn missing_ids_are_dropped() {
        let markup = r#"<div class="content"><div class="ajax_table"><p><span class="extract_match X1">a</span></p></div></div>"#;
        let groups = ExtractDocument::parse(markup).to_groups();
        assert!(groups.is_empty());
    }

    #[test]
    fn char_refs_decode() {
        assert_eq!(decode_char_refs("a &lt;b&gt; &#39;c&#x27; &foo;"), "a <b> 'c' &foo;");
    }

    #[test]
    fn greek_and_symbol_refs_decode() {
        assert_eq!(decode_char_refs("&alpha;-actin &beta;"), "α-actin β");
        assert_eq!(decode_char_refs("&Delta;G &plusmn; 5 &micro;M"), "ΔG ± 5 µM");
        assert_eq!(decode_char_refs("&frac12; &bogus;"), "½ &bogus;");
    }

    #[test]
    fn greek_refs_count_as_one_character() {
        let markup = r#"<div class="content"><div class="ajax_table"><p>&alpha;-<span class="extract_match 9606">x</span></p></div></div>"#;
        let document = ExtractDocument::parse(markup);
        assert_eq!(document.text, "α-x");
        assert_eq!(document.spans[0].start, 2);
    }

    #[test]
    fn text_outside_data_div_is_ignored() {
        let markup = r#"<div class="header"><p>skip</p></div><div class="content"><div class="ajax_table"><p>keep</p></div></div>"#;
        assert_eq!(ExtractDocument::parse(markup).text, "keep");
    }
}
