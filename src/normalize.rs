//! Rewrites tagger identifiers into `NAMESPACE:ID` form.
//!
//! The rewrite depends only on the identifier text, the type name and the
//! species name. No lookup tables beyond the fixed rules below are consulted.

const PUBCHEM_MARKER: &str = "CIDs";

/// Species with a dedicated gene identifier namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneSpecies {
    ArabidopsisThaliana,
    DrosophilaMelanogaster,
    SchizosaccharomycesPombe,
    CaenorhabditisElegans,
    SaccharomycesCerevisiae,
}

impl GeneSpecies {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Arabidopsis thaliana" => Some(GeneSpecies::ArabidopsisThaliana),
            "Drosophila melanogaster" => Some(GeneSpecies::DrosophilaMelanogaster),
            "Schizosaccharomyces pombe" => Some(GeneSpecies::SchizosaccharomycesPombe),
            "Caenorhabditis elegans" => Some(GeneSpecies::CaenorhabditisElegans),
            "Saccharomyces cerevisiae" => Some(GeneSpecies::SaccharomycesCerevisiae),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    PubChem,
    NcbiTaxon,
    /// TAIR (A. thaliana)
    Tair,
    FlyBase,
    /// PomBase (S. pombe)
    PomBase,
    WormBase,
    /// SGD (S. cerevisiae)
    Sgd,
    Ensembl,
}

impl Namespace {
    /// Picks the rewrite rule for an identifier; first matching rule wins.
    pub fn rule_for(raw_id: &str, type_name: &str, species: Option<&str>) -> Option<Self> {
        if type_name.starts_with("Chemical") {
            return raw_id.starts_with(PUBCHEM_MARKER).then_some(Namespace::PubChem);
        }
        if type_name == "Organism" {
            let numeric = !raw_id.is_empty() && raw_id.chars().all(|ch| ch.is_ascii_digit());
            return numeric.then_some(Namespace::NcbiTaxon);
        }
        if type_name != "Gene" {
            return None;
        }

        let qualified = raw_id.contains(':');
        let species_rule = match species.and_then(GeneSpecies::from_name) {
            Some(GeneSpecies::ArabidopsisThaliana) if raw_id.starts_with("AT") => {
                Some(Namespace::Tair)
            }
            Some(GeneSpecies::DrosophilaMelanogaster) if raw_id.starts_with("FB") => {
                Some(Namespace::FlyBase)
            }
            Some(GeneSpecies::SchizosaccharomycesPombe) if raw_id.starts_with("SP") => {
                Some(Namespace::PomBase)
            }
            Some(GeneSpecies::CaenorhabditisElegans) if !qualified => Some(Namespace::WormBase),
            Some(GeneSpecies::SaccharomycesCerevisiae) if !qualified => Some(Namespace::Sgd),
            _ => None,
        };
        let rule = species_rule.or_else(|| raw_id.starts_with("ENS").then_some(Namespace::Ensembl));
        if rule.is_none() {
            tracing::debug!(
                "no gene namespace rule for {raw_id} ({})",
                species.unwrap_or("no species")
            );
        }
        rule
    }

    pub fn apply(self, raw_id: &str) -> String {
        match self {
            Namespace::PubChem => replace_prefix(raw_id, PUBCHEM_MARKER, "CID:"),
            Namespace::NcbiTaxon => format!("NCBITaxon:{raw_id}"),
            Namespace::Tair => replace_prefix(raw_id, "AT", "AT:"),
            Namespace::FlyBase => replace_prefix(raw_id, "FB", "FB:"),
            Namespace::PomBase => replace_prefix(raw_id, "SP", "SP:"),
            Namespace::WormBase => format!("WB:{raw_id}"),
            Namespace::Sgd => format!("SGD:{raw_id}"),
            Namespace::Ensembl => replace_prefix(raw_id, "ENS", "ENS:"),
        }
    }
}

fn replace_prefix(raw_id: &str, prefix: &str, replacement: &str) -> String {
    match raw_id.strip_prefix(prefix) {
        Some(rest) => format!("{replacement}{rest}"),
        None => raw_id.to_string(),
    }
}

pub fn normalize_id(raw_id: &str, type_name: &str, species: Option<&str>) -> String {
    match Namespace::rule_for(raw_id, type_name, species) {
        Some(rule) => rule.apply(raw_id),
        None => raw_id.to_string(),
    }
}

/// Variant for EXTRACT popup types, where gene types read
/// "<species> gene" instead of carrying a separate species.
pub fn normalize_extract_id(raw_id: &str, extract_type: &str) -> String {
    let is_gene = extract_type.ends_with("gene")
        && !extract_type.starts_with("Chemical")
        && extract_type != "Organism";
    if is_gene {
        normalize_id(raw_id, "Gene", extract_type.strip_suffix(" gene"))
    } else {
        normalize_id(raw_id, extract_type, None)
    }
}
