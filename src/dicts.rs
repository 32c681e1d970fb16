//! Combined dictionary: `serial<TAB>display name<TAB>canonical id`.

use std::collections::HashMap;
use std::fmt;
use std::io::{BufRead, Write};

use crate::domain::EntityType;
use crate::error::StandoffError;
use crate::fs_util::read_error;
use crate::lookup::{EntityTable, IdLookup, NameLookup, NameTable};
use crate::normalize::normalize_id;
use crate::resolver::UNKNOWN_TAXON;

/// Type code of organism entities; their ids are taxonomy ids.
const ORGANISM_TYPE: i64 = -2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictRow {
    pub serial: i64,
    pub name: String,
    pub id: String,
}

impl fmt::Display for DictRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.serial, self.name, self.id)
    }
}

/// Taxonomy id → organism name, from named organism entities.
pub fn organism_names(names: &NameTable, entities: &EntityTable) -> HashMap<String, String> {
    entities
        .rows()
        .iter()
        .filter(|row| row.type_code == ORGANISM_TYPE)
        .filter_map(|row| {
            names
                .get(row.serial)
                .map(|name| (row.raw_id.clone(), name.to_string()))
        })
        .collect()
}

/// Rows in entity-table order. Entities without a name were never tagged and
/// are left out.
pub fn combine(names: &NameTable, entities: &EntityTable) -> Vec<DictRow> {
    let organisms = organism_names(names, entities);
    let mut rows = Vec::new();
    for entity in entities.rows() {
        let Some(name) = names.get(entity.serial) else {
            continue;
        };
        let entity_type = if entity.type_code > 0 {
            EntityType::Gene
        } else if let Some(entity_type) = EntityType::from_code(entity.type_code) {
            entity_type
        } else {
            tracing::warn!(
                "unexpected type {} for serial {}, skipping",
                entity.type_code,
                entity.serial
            );
            continue;
        };

        let organism = (entity_type == EntityType::Gene).then(|| {
            organisms
                .get(&entity.type_code.to_string())
                .map(String::as_str)
                .unwrap_or(UNKNOWN_TAXON)
        });
        let name = match organism {
            Some(organism) => format!("{name} ({organism})"),
            None => name.to_string(),
        };
        rows.push(DictRow {
            serial: entity.serial,
            name,
            id: normalize_id(&entity.raw_id, entity_type.as_str(), organism),
        });
    }
    tracing::info!("combined {} of {} entities", rows.len(), entities.rows().len());
    rows
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapReport {
    pub mentions: usize,
    pub unmapped: usize,
}

fn type_name(code: i64) -> Result<&'static str, StandoffError> {
    if code > 0 {
        return Ok(EntityType::Gene.as_str());
    }
    EntityType::from_code(code)
        .map(|entity_type| entity_type.as_str())
        .ok_or(StandoffError::UnexpectedType(code))
}

/// Rewrites tagger output lines as
/// `pmid para sent start end text type name id`, taking name and id from a
/// combined dictionary. Serials missing from the dictionary get empty fields.
pub fn map_tagged<R, W, L>(
    reader: R,
    source: &str,
    dictionary: &L,
    out: &mut W,
) -> Result<MapReport, StandoffError>
where
    R: BufRead,
    W: Write,
    L: NameLookup + IdLookup,
{
    let mut report = MapReport::default();
    for (idx, line) in reader.lines().enumerate() {
        let line_number = idx + 1;
        let line = line.map_err(|err| read_error(source, err))?;
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 8 {
            return Err(StandoffError::format(source, line_number, 8, fields.len(), &line));
        }
        let invalid = |field: &'static str, value: &str| StandoffError::InvalidField {
            source_name: source.to_string(),
            line: line_number,
            field,
            value: value.to_string(),
        };
        let code = fields[6]
            .trim()
            .parse::<i64>()
            .map_err(|_| invalid("type", fields[6]))?;
        let serial = fields[7]
            .trim()
            .parse::<i64>()
            .map_err(|_| invalid("serial", fields[7]))?;
        let name = dictionary.lookup_name(serial)?;
        let id = dictionary.lookup_id(serial)?;
        if name.is_none() {
            tracing::warn!("line {line_number} in {source}: serial {serial} not in dictionary");
            report.unmapped += 1;
        }
        writeln!(
            out,
            "{}\t{}\t{}",
            fields[..6].join("\t"),
            type_name(code)?,
            [name.unwrap_or_default(), id.unwrap_or_default()].join("\t")
        )
        .map_err(|err| StandoffError::Filesystem(err.to_string()))?;
        report.mentions += 1;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assert_matches::assert_matches;

    use super::*;
    use crate::lookup::CombinedTable;

    fn tables(names: &str, entities: &str) -> (NameTable, EntityTable) {
        let mut table = NameTable::new();
        table
            .read_from(Cursor::new(names.as_bytes().to_vec()), "names")
            .unwrap();
        let (entities, _) =
            EntityTable::read_from(Cursor::new(entities.as_bytes().to_vec()), "entities").unwrap();
        (table, entities)
    }

    #[test]
    fn genes_get_organism_and_namespace() {
        let (names, entities) = tables(
            "1\tHomo sapiens\n2\tBRCA1\n3\taspirin\n4\tfoo\n",
            "1\t-2\t9606\n2\t9606\tENSP00000350283\n3\t-1\tCIDs00002244\n4\t7955\tzgc:1\n5\t-1\tCIDs1\n",
        );
        let rows = combine(&names, &entities);
        let rendered: Vec<String> = rows.iter().map(ToString::to_string).collect();

        assert_eq!(
            rendered,
            vec![
                "1\tHomo sapiens\tNCBITaxon:9606",
                "2\tBRCA1 (Homo sapiens)\tENS:P00000350283",
                "3\taspirin\tCID:00002244",
                "4\tfoo (<UNKNOWN>)\tzgc:1",
            ]
        );
    }

    #[test]
    fn combined_rows_map_tagged_lines() {
        let (names, entities) = tables(
            "1\tHomo sapiens\n2\tBRCA1\n",
            "1\t-2\t9606\n2\t9606\tENSP00000350283\n",
        );
        let written: String = combine(&names, &entities)
            .iter()
            .map(|row| format!("{row}\n"))
            .collect();
        let (dictionary, _) =
            CombinedTable::read_from(Cursor::new(written.into_bytes()), "dict").unwrap();

        let tagged = "PMID:1\t1\t1\t0\t4\tBRCA1\t9606\t2\nPMID:1\t1\t1\t9\t13\thuman\t-2\t7\n";
        let mut out = Vec::new();
        let report = map_tagged(Cursor::new(tagged), "tagged", &dictionary, &mut out).unwrap();

        assert_eq!(report, MapReport { mentions: 2, unmapped: 1 });
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "PMID:1\t1\t1\t0\t4\tBRCA1\tGene\tBRCA1 (Homo sapiens)\tENS:P00000350283\n\
             PMID:1\t1\t1\t9\t13\thuman\tOrganism\t\t\n"
        );
    }

    #[test]
    fn map_rejects_unknown_type_codes() {
        let (dictionary, _) =
            CombinedTable::read_from(Cursor::new(b"3\tx\ty\n".to_vec()), "dict").unwrap();
        let err = map_tagged(
            Cursor::new("1\t1\t1\t0\t0\tx\t-99\t3\n"),
            "tagged",
            &dictionary,
            &mut Vec::new(),
        )
        .unwrap_err();
        assert_matches!(err, StandoffError::UnexpectedType(-99));
    }

    #[test]
    fn unknown_type_codes_are_skipped() {
        let (names, entities) = tables("1\tthing\n2\tother\n", "1\t-99\tX\n2\t-3\tY\n");
        let rows = combine(&names, &entities);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].serial, 2);
    }
}
