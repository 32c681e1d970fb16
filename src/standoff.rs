//! brat-flavoured standoff records: assembly from tagger mentions and parsing
//! of existing `.ann` files.
//!
//! See <http://brat.nlplab.org/standoff.html>.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;

use crate::domain::Mention;
use crate::error::StandoffError;
use crate::lookup::{IdLookup, Memo, NameLookup};
use crate::normalize::normalize_id;

pub const NORMALIZATION_KIND: &str = "Reference";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Textbound {
    pub id: String,
    pub entity_type: String,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl fmt::Display for Textbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{} {} {}\t{}",
            self.id, self.entity_type, self.start, self.end, self.text
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Normalization {
    pub id: String,
    pub textbound_id: String,
    pub norm_id: String,
    pub text: String,
}

impl fmt::Display for Normalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{NORMALIZATION_KIND} {} {}\t{}",
            self.id, self.textbound_id, self.norm_id, self.text
        )
    }
}

/// A textbound together with the normalizations attached to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotationGroup {
    pub textbound: Textbound,
    pub normalizations: Vec<Normalization>,
}

impl AnnotationGroup {
    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(self.textbound.to_string())
            .chain(self.normalizations.iter().map(|n| n.to_string()))
    }
}

/// Renders groups as `.ann` file content, one record per line.
pub fn render(groups: &[AnnotationGroup]) -> String {
    let mut out = String::new();
    for line in groups.iter().flat_map(AnnotationGroup::lines) {
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Sequential `T`/`N` id allocation.
#[derive(Debug, Default)]
pub(crate) struct IdSequence {
    textbounds: usize,
    normalizations: usize,
}

impl IdSequence {
    pub(crate) fn next_textbound(&mut self) -> String {
        self.textbounds += 1;
        format!("T{}", self.textbounds)
    }

    pub(crate) fn next_normalization(&mut self) -> String {
        self.normalizations += 1;
        format!("N{}", self.normalizations)
    }
}

type GroupKey<'m> = (usize, usize, &'static str, &'m str);

/// Builds standoff annotations from validated mentions.
pub struct Assembler<N, I> {
    names: Memo<N>,
    ids: Memo<I>,
}

impl<N: NameLookup, I: IdLookup> Assembler<N, I> {
    pub fn new(names: N, ids: I) -> Self {
        Self {
            names: Memo::new(names),
            ids: Memo::new(ids),
        }
    }

    /// Groups mentions sharing span, type and text into one textbound each.
    /// Groups are ordered by that key and members by serial, so ids do not
    /// depend on mention order.
    pub fn assemble(&mut self, mentions: &[Mention]) -> Result<Vec<AnnotationGroup>, StandoffError> {
        let mut grouped: BTreeMap<GroupKey<'_>, Vec<&Mention>> = BTreeMap::new();
        for mention in mentions {
            grouped
                .entry((
                    mention.start,
                    mention.end,
                    mention.type_name(),
                    mention.text.as_str(),
                ))
                .or_default()
                .push(mention);
        }

        let mut sequence = IdSequence::default();
        let mut groups = Vec::with_capacity(grouped.len());
        for ((start, end, type_name, text), mut members) in grouped {
            members.sort_by_key(|mention| mention.serial);
            let textbound = Textbound {
                id: sequence.next_textbound(),
                entity_type: type_name.to_string(),
                start,
                end,
                text: text.to_string(),
            };
            let mut normalizations = Vec::with_capacity(members.len());
            for mention in members {
                normalizations.push(Normalization {
                    id: sequence.next_normalization(),
                    textbound_id: textbound.id.clone(),
                    norm_id: self.canonical_id(mention)?,
                    text: self.display_name(mention)?,
                });
            }
            groups.push(AnnotationGroup {
                textbound,
                normalizations,
            });
        }
        Ok(groups)
    }

    /// Looked-up name (or the mention text), with the species appended.
    pub fn display_name(&mut self, mention: &Mention) -> Result<String, StandoffError> {
        let name = self
            .names
            .name(mention.serial)?
            .unwrap_or_else(|| mention.text.clone());
        Ok(match &mention.species {
            Some(species) => format!("{name} ({species})"),
            None => name,
        })
    }

    /// Looked-up identifier (or `TAGGER:<serial>`), rewritten to its namespace.
    pub fn canonical_id(&mut self, mention: &Mention) -> Result<String, StandoffError> {
        let raw = self
            .ids
            .id(mention.serial)?
            .unwrap_or_else(|| format!("TAGGER:{}", mention.serial));
        Ok(normalize_id(
            &raw,
            mention.type_name(),
            mention.species.as_deref(),
        ))
    }
}

/// A parsed textbound with its attached normalizations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityRecord {
    pub id: String,
    pub entity_type: String,
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub normalizations: Vec<Normalization>,
}

impl fmt::Display for EntityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{} {} {}\t{}",
            self.id, self.entity_type, self.start, self.end, self.text
        )
    }
}

fn parse_textbound(line: &str, line_number: usize, source: &str) -> Result<EntityRecord, StandoffError> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != 3 {
        return Err(StandoffError::format(source, line_number, 3, fields.len(), line));
    }
    let invalid = |field: &'static str, value: &str| StandoffError::InvalidField {
        source_name: source.to_string(),
        line: line_number,
        field,
        value: value.to_string(),
    };
    let (entity_type, span) = fields[1]
        .split_once(' ')
        .ok_or_else(|| invalid("span", fields[1]))?;
    let (start, end) = span.split_once(' ').ok_or_else(|| invalid("span", span))?;
    let start = start.parse::<usize>().map_err(|_| invalid("start", start))?;
    let end = end.parse::<usize>().map_err(|_| invalid("end", end))?;
    Ok(EntityRecord {
        id: fields[0].to_string(),
        entity_type: entity_type.to_string(),
        start,
        end,
        text: fields[2].to_string(),
        normalizations: Vec::new(),
    })
}

fn parse_normalization(
    line: &str,
    line_number: usize,
    source: &str,
) -> Result<Normalization, StandoffError> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != 3 {
        return Err(StandoffError::format(source, line_number, 3, fields.len(), line));
    }
    let parts: Vec<&str> = fields[1].split(' ').collect();
    if parts.len() != 3 {
        return Err(StandoffError::InvalidField {
            source_name: source.to_string(),
            line: line_number,
            field: "reference",
            value: fields[1].to_string(),
        });
    }
    Ok(Normalization {
        id: fields[0].to_string(),
        textbound_id: parts[1].to_string(),
        norm_id: parts[2].to_string(),
        text: fields[2].to_string(),
    })
}

/// Parses `.ann` content into textbounds with their normalizations attached.
pub fn parse_standoff(content: &str, source: &str) -> Result<Vec<EntityRecord>, StandoffError> {
    let mut records = Vec::new();
    let mut normalizations = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line_number = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        match line.chars().next() {
            Some('T') => records.push(parse_textbound(line, line_number, source)?),
            Some('N') => normalizations.push(parse_normalization(line, line_number, source)?),
            Some('#') => {}
            _ => tracing::warn!("skipping line {line_number} in {source}: {line}"),
        }
    }

    let by_id: HashMap<String, usize> = records
        .iter()
        .enumerate()
        .map(|(idx, record)| (record.id.clone(), idx))
        .collect();
    for normalization in normalizations {
        match by_id.get(&normalization.textbound_id) {
            Some(&idx) => records[idx].normalizations.push(normalization),
            None => tracing::warn!(
                "{source}: {} references missing textbound {}",
                normalization.id,
                normalization.textbound_id
            ),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::lookup::NoLookup;
    use crate::resolver::{TaxonomyTable, TypeResolver};

    fn mention(line: &str) -> Mention {
        let mut resolver = TypeResolver::new(TaxonomyTable::builtin());
        Mention::from_tsv(line, 1, "tags", &mut resolver).unwrap()
    }

    #[test]
    fn display_matches_brat() {
        let tb = Textbound {
            id: "T1".to_string(),
            entity_type: "Chemical".to_string(),
            start: 0,
            end: 5,
            text: "Title".to_string(),
        };
        let norm = Normalization {
            id: "N1".to_string(),
            textbound_id: "T1".to_string(),
            norm_id: "TAGGER:55".to_string(),
            text: "Title".to_string(),
        };
        assert_eq!(tb.to_string(), "T1\tChemical 0 5\tTitle");
        assert_eq!(norm.to_string(), "N1\tReference T1 TAGGER:55\tTitle");
    }

    #[test]
    fn same_span_mentions_share_textbound() {
        let mentions = vec![
            mention("1\t0\t0\t0\t4\tBRCA1\t9606\t7"),
            mention("1\t0\t0\t0\t4\tBRCA1\t9606\t8"),
            mention("1\t0\t0\t0\t4\tBRCA1\t-1\t9"),
        ];
        let groups = Assembler::new(NoLookup, NoLookup).assemble(&mentions).unwrap();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].textbound.entity_type, "Chemical");
        assert_eq!(groups[1].textbound.entity_type, "Gene");
        assert_eq!(groups[1].normalizations.len(), 2);
        assert_eq!(groups[1].normalizations[0].id, "N2");
        assert_eq!(groups[1].normalizations[0].text, "BRCA1 (Homo sapiens)");
        assert_eq!(groups[1].normalizations[1].norm_id, "TAGGER:8");
    }

    #[test]
    fn normalization_ids_ignore_mention_order() {
        let a = mention("1\t0\t0\t0\t4\tBRCA1\t9606\t8");
        let b = mention("1\t0\t0\t0\t4\tBRCA1\t9606\t7");
        let forward = Assembler::new(NoLookup, NoLookup)
            .assemble(&[a.clone(), b.clone()])
            .unwrap();
        let backward = Assembler::new(NoLookup, NoLookup).assemble(&[b, a]).unwrap();
        assert_eq!(forward, backward);
        assert_eq!(forward[0].normalizations[0].norm_id, "TAGGER:7");
    }

    #[test]
    fn parse_attaches_normalizations() {
        let content = "T1\tChemical 0 5\tTitle\nN1\tReference T1 CID:1\tTitle\n\nX1\tjunk\nN2\tReference T9 CID:2\tx\n";
        let records = parse_standoff(content, "a.ann").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].normalizations.len(), 1);
        assert_eq!(records[0].normalizations[0].norm_id, "CID:1");
    }

    #[test]
    fn parse_rejects_discontinuous_spans() {
        let err = parse_standoff("T1\tGene 0 2;4 6\tab cd\n", "a.ann").unwrap_err();
        assert_matches!(err, StandoffError::InvalidField { .. });
    }

    #[test]
    fn render_round_trips_through_parser() {
        let mentions = vec![mention("1\t0\t0\t0\t4\tTitle\t-1\t55")];
        let groups = Assembler::new(NoLookup, NoLookup).assemble(&mentions).unwrap();
        let records = parse_standoff(&render(&groups), "x.ann").unwrap();
        assert_eq!(records[0].start, 0);
        assert_eq!(records[0].end, 5);
        assert_eq!(records[0].normalizations[0].norm_id, "TAGGER:55");
    }
}
