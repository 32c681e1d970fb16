use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StandoffError;
use crate::resolver::{TaxonLookup, TypeResolver};

const PMID_PREFIX: &str = "PMID:";

/// Semantic type of a tagger mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Chemical,
    Organism,
    Wikipedia,
    BiologicalProcess,
    CellularComponent,
    MolecularFunction,
    GoOther,
    Tissue,
    Disease,
    Environment,
    Phenotype,
    Behaviour,
    Gene,
}

impl EntityType {
    /// Maps a negative tagger type code to its type. Positive codes are
    /// taxonomy ids and are handled by the resolver.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -1 => Some(EntityType::Chemical),
            // -2 tags species, -3 tags species in protein context
            -2 | -3 => Some(EntityType::Organism),
            -11 => Some(EntityType::Wikipedia),
            -21 => Some(EntityType::BiologicalProcess),
            -22 => Some(EntityType::CellularComponent),
            -23 => Some(EntityType::MolecularFunction),
            -24 => Some(EntityType::GoOther),
            -25 => Some(EntityType::Tissue),
            -26 => Some(EntityType::Disease),
            -27 => Some(EntityType::Environment),
            // APO, FYPO, MPheno and mammalian phenotypes
            -28 | -29 | -30 | -36 => Some(EntityType::Phenotype),
            -31 => Some(EntityType::Behaviour),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Chemical => "Chemical",
            EntityType::Organism => "Organism",
            EntityType::Wikipedia => "Wikipedia",
            EntityType::BiologicalProcess => "Biological_process",
            EntityType::CellularComponent => "Cellular_component",
            EntityType::MolecularFunction => "Molecular_function",
            EntityType::GoOther => "GO_other",
            EntityType::Tissue => "Tissue",
            EntityType::Disease => "Disease",
            EntityType::Environment => "Environment",
            EntityType::Phenotype => "Phenotype",
            EntityType::Behaviour => "Behaviour",
            EntityType::Gene => "Gene",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub authors: String,
    pub journal: String,
    pub year: String,
    pub title: String,
    pub abstract_text: String,
}

impl Document {
    pub fn from_tsv(line: &str, line_number: usize, source: &str) -> Result<Self, StandoffError> {
        let mut fields: Vec<&str> = line.split('\t').collect();
        if fields.len() == 5 {
            tracing::info!(
                "line {line_number} in {source}: got 5 fields; assuming empty abstract"
            );
            fields.push("");
        }
        if fields.len() != 6 {
            return Err(StandoffError::format(
                source,
                line_number,
                6,
                fields.len(),
                line,
            ));
        }
        Ok(Self {
            id: fields[0].to_string(),
            authors: fields[1].to_string(),
            journal: fields[2].to_string(),
            year: fields[3].to_string(),
            title: fields[4].to_string(),
            abstract_text: fields[5].to_string(),
        })
    }

    /// Short id with the `PMID:` prefix stripped, if the id carries it.
    pub fn pmid(&self) -> Option<&str> {
        self.id.strip_prefix(PMID_PREFIX)
    }

    pub fn text(&self) -> String {
        format!("{}\n{}", self.title, self.abstract_text)
    }

    /// Base name used for per-document output files.
    pub fn file_stem(&self) -> &str {
        self.pmid().unwrap_or(&self.id)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n{}", self.title, self.abstract_text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    pub pmid: String,
    pub paragraph: u32,
    pub sentence: u32,
    pub start: usize,
    /// Exclusive end offset.
    pub end: usize,
    pub text: String,
    pub type_code: i64,
    pub serial: i64,
    pub entity_type: EntityType,
    pub species: Option<String>,
}

impl Mention {
    pub fn from_tsv<T: TaxonLookup>(
        line: &str,
        line_number: usize,
        source: &str,
        resolver: &mut TypeResolver<T>,
    ) -> Result<Self, StandoffError> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 8 {
            return Err(StandoffError::format(
                source,
                line_number,
                8,
                fields.len(),
                line,
            ));
        }
        let parse = |field: &'static str, value: &str| -> Result<i64, StandoffError> {
            value
                .trim()
                .parse::<i64>()
                .map_err(|_| StandoffError::InvalidField {
                    source_name: source.to_string(),
                    line: line_number,
                    field,
                    value: value.to_string(),
                })
        };
        let invalid = |field: &'static str, value: &str| StandoffError::InvalidField {
            source_name: source.to_string(),
            line: line_number,
            field,
            value: value.to_string(),
        };
        let unsigned = |field: &'static str, value: &str| -> Result<usize, StandoffError> {
            usize::try_from(parse(field, value)?).map_err(|_| invalid(field, value))
        };
        let index = |field: &'static str, value: &str| -> Result<u32, StandoffError> {
            u32::try_from(parse(field, value)?).map_err(|_| invalid(field, value))
        };

        let paragraph = index("paragraph", fields[1])?;
        let sentence = index("sentence", fields[2])?;
        let start = unsigned("start", fields[3])?;
        // input end offsets are inclusive
        let end = unsigned("end", fields[4])? + 1;
        let type_code = parse("type", fields[6])?;
        let serial = parse("serial", fields[7])?;
        let resolved = resolver.resolve(type_code)?;

        Ok(Self {
            pmid: fields[0].to_string(),
            paragraph,
            sentence,
            start,
            end,
            text: fields[5].to_string(),
            type_code,
            serial,
            entity_type: resolved.entity_type,
            species: resolved.species,
        })
    }

    pub fn type_name(&self) -> &'static str {
        self.entity_type.as_str()
    }

    /// Checks the mention text against the document text at its offsets.
    pub fn validate(&self, document_text: &str) -> Result<(), StandoffError> {
        let reference = char_slice(document_text, self.start, self.end);
        if reference != self.text {
            return Err(StandoffError::TextMismatch {
                pmid: self.pmid.clone(),
                mention: self.text.clone(),
                reference: reference.to_string(),
            });
        }
        Ok(())
    }
}

/// Slices `text` by character offsets, clamping out-of-range offsets.
pub fn char_slice(text: &str, start: usize, end: usize) -> &str {
    let mut offsets = text
        .char_indices()
        .map(|(idx, _)| idx)
        .chain(std::iter::once(text.len()));
    let begin = offsets.nth(start).unwrap_or(text.len());
    let finish = if end > start {
        offsets.nth(end - start - 1).unwrap_or(text.len())
    } else {
        begin
    };
    &text[begin..finish]
}
