use std::cell::OnceCell;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::domain::EntityType;
use crate::error::StandoffError;
use crate::fs_util;

pub const UNKNOWN_TAXON: &str = "<UNKNOWN>";
pub const DEFAULT_TAXNAMES_PATH: &str = "data/taxnames.tsv";

const BUILTIN_TAXA: &[(i64, &str)] = &[
    (3702, "Arabidopsis thaliana"),
    (4896, "Schizosaccharomyces pombe"),
    (4932, "Saccharomyces cerevisiae"),
    (6239, "Caenorhabditis elegans"),
    (7227, "Drosophila melanogaster"),
    (7955, "Danio rerio"),
    (9031, "Gallus gallus"),
    (9606, "Homo sapiens"),
    (9823, "Sus scrofa"),
    (9913, "Bos taurus"),
    (10090, "Mus musculus"),
    (10116, "Rattus norvegicus"),
];

/// Whether `name` is one of the built-in model organisms.
pub fn is_builtin_species(name: &str) -> bool {
    BUILTIN_TAXA.iter().any(|&(_, species)| species == name)
}

pub trait TaxonLookup {
    fn lookup_taxon_name(&self, taxid: i64) -> Option<String>;
}

#[derive(Debug, Clone, Default)]
pub struct TaxonomyTable {
    names: HashMap<i64, String>,
}

impl TaxonomyTable {
    pub fn builtin() -> Self {
        Self {
            names: BUILTIN_TAXA
                .iter()
                .map(|(taxid, name)| (*taxid, name.to_string()))
                .collect(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, StandoffError> {
        let source = path.display().to_string();
        let reader = fs_util::open_reader(path)?;
        let mut names = HashMap::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|err| StandoffError::Filesystem(format!("{source}: {err}")))?;
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != 2 {
                return Err(StandoffError::format(&source, idx + 1, 2, fields.len(), &line));
            }
            let taxid = fields[0]
                .parse::<i64>()
                .map_err(|_| StandoffError::InvalidField {
                    source_name: source.clone(),
                    line: idx + 1,
                    field: "taxid",
                    value: fields[0].to_string(),
                })?;
            names.insert(taxid, fields[1].to_string());
        }
        Ok(Self { names })
    }

    /// Loads the table from `path`, falling back to the built-in model
    /// organisms when the file cannot be read.
    pub fn load_or_builtin(path: &Path) -> Self {
        tracing::info!("loading taxid-name map from {}", path.display());
        match Self::load(path) {
            Ok(table) => {
                tracing::info!("loaded {} taxon names", table.len());
                table
            }
            Err(err) => {
                tracing::error!("failed to load {}: {err}", path.display());
                Self::builtin()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl TaxonLookup for TaxonomyTable {
    fn lookup_taxon_name(&self, taxid: i64) -> Option<String> {
        self.names.get(&taxid).cloned()
    }
}

/// Taxonomy table read from disk on the first gene lookup.
#[derive(Debug)]
pub struct LazyTaxonomy {
    path: PathBuf,
    table: OnceCell<TaxonomyTable>,
}

impl LazyTaxonomy {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            table: OnceCell::new(),
        }
    }
}

impl TaxonLookup for LazyTaxonomy {
    fn lookup_taxon_name(&self, taxid: i64) -> Option<String> {
        self.table
            .get_or_init(|| TaxonomyTable::load_or_builtin(&self.path))
            .lookup_taxon_name(taxid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub entity_type: EntityType,
    pub species: Option<String>,
}

/// Resolves raw tagger type codes, caching species names per taxid.
#[derive(Debug)]
pub struct TypeResolver<T> {
    taxonomy: T,
    species_cache: HashMap<i64, String>,
}

impl<T: TaxonLookup> TypeResolver<T> {
    pub fn new(taxonomy: T) -> Self {
        Self {
            taxonomy,
            species_cache: HashMap::new(),
        }
    }

    pub fn resolve(&mut self, code: i64) -> Result<Resolved, StandoffError> {
        if code > 0 {
            let taxonomy = &self.taxonomy;
            let species = self
                .species_cache
                .entry(code)
                .or_insert_with(|| {
                    taxonomy
                        .lookup_taxon_name(code)
                        .unwrap_or_else(|| UNKNOWN_TAXON.to_string())
                })
                .clone();
            return Ok(Resolved {
                entity_type: EntityType::Gene,
                species: Some(species),
            });
        }
        EntityType::from_code(code)
            .map(|entity_type| Resolved {
                entity_type,
                species: None,
            })
            .ok_or(StandoffError::UnexpectedType(code))
    }

    pub fn cached_taxa(&self) -> usize {
        self.species_cache.len()
    }
}
