//! Agreement scoring between two sets of standoff annotations.
//!
//! Annotations match when their spans are identical and their types match.
//! Matching is a single greedy pass over the first set; it is not an optimal
//! assignment.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::StandoffError;
use crate::fs_util;
use crate::standoff::{EntityRecord, parse_standoff};

pub const DEFAULT_SUFFIX: &str = ".ann";

const DEFAULT_ALIASES: &[(&str, &str)] = &[
    // EVEX
    ("cel", "Cell"),
    ("che", "Chemical"),
    ("dis", "Disease"),
    ("ggp", "Gene"),
    ("org", "Organism"),
    // EXTRACT
    ("Chemical_compound", "Chemical"),
];

/// How a first-set annotation claims candidates from the second set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPolicy {
    /// Claim the first candidate not already matched.
    #[default]
    FirstUnmatched,
    /// Claim every candidate with the same span and a matching type.
    AllCandidates,
}

/// Many-to-one type alias table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeAliases {
    aliases: BTreeMap<String, String>,
}

impl Default for TypeAliases {
    fn default() -> Self {
        Self {
            aliases: DEFAULT_ALIASES
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
        }
    }
}

impl TypeAliases {
    pub fn extended(mut self, extra: BTreeMap<String, String>) -> Self {
        self.aliases.extend(extra);
        self
    }

    pub fn map<'a>(&'a self, entity_type: &'a str) -> &'a str {
        self.aliases
            .get(entity_type)
            .map(String::as_str)
            .unwrap_or(entity_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetypeRule {
    pub from: String,
    pub to: String,
    pub ids: HashSet<String>,
}

impl RetypeRule {
    /// Parses `FROM:TO:FILE[;FROM:TO:FILE ...]`, reading each id file.
    pub fn parse_list(value: &str) -> Result<Vec<Self>, StandoffError> {
        value
            .split(';')
            .filter(|part| !part.is_empty())
            .map(|part| {
                let fields: Vec<&str> = part.split(':').collect();
                let [from, to, path] = fields.as_slice() else {
                    return Err(StandoffError::InvalidRetype(part.to_string()));
                };
                Ok(Self {
                    from: from.to_string(),
                    to: to.to_string(),
                    ids: fs_util::read_id_set(Path::new(path))?,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct CompareOptions {
    pub filter_types: BTreeSet<String>,
    pub map_types: bool,
    pub force_map: bool,
    pub retype: Vec<RetypeRule>,
    pub suffix: String,
    pub policy: MatchPolicy,
    pub aliases: TypeAliases,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            filter_types: BTreeSet::new(),
            map_types: false,
            force_map: false,
            retype: Vec::new(),
            suffix: DEFAULT_SUFFIX.to_string(),
            policy: MatchPolicy::default(),
            aliases: TypeAliases::default(),
        }
    }
}

impl CompareOptions {
    pub fn types_match(&self, type_a: &str, type_b: &str) -> bool {
        if type_a == type_b {
            return true;
        }
        if !self.map_types {
            return false;
        }
        let mapped_a = self.aliases.map(type_a);
        let mapped_b = self.aliases.map(type_b);
        mapped_a == type_b || type_a == mapped_b || mapped_a == mapped_b
    }
}

/// Reclassifies annotations carrying a listed identifier.
pub fn retype_by_norm(annotations: &mut [EntityRecord], rules: &[RetypeRule]) {
    for annotation in annotations.iter_mut() {
        for rule in rules {
            let listed = annotation
                .normalizations
                .iter()
                .any(|norm| rule.ids.contains(&norm.norm_id));
            if annotation.entity_type == rule.from && listed {
                tracing::info!("retype to {}: {annotation}", rule.to);
                annotation.entity_type = rule.to.clone();
            }
        }
    }
}

pub fn filter_by_type(annotations: Vec<EntityRecord>, excluded: &BTreeSet<String>) -> Vec<EntityRecord> {
    annotations
        .into_iter()
        .filter(|annotation| !excluded.contains(&annotation.entity_type))
        .collect()
}

pub fn apply_type_mapping(annotations: &mut [EntityRecord], aliases: &TypeAliases) {
    for annotation in annotations.iter_mut() {
        let mapped = aliases.map(&annotation.entity_type).to_string();
        annotation.entity_type = mapped;
    }
}

/// Retype, then filter, then forced mapping.
pub fn preprocess(mut annotations: Vec<EntityRecord>, options: &CompareOptions) -> Vec<EntityRecord> {
    if !options.retype.is_empty() {
        retype_by_norm(&mut annotations, &options.retype);
    }
    if !options.filter_types.is_empty() {
        annotations = filter_by_type(annotations, &options.filter_types);
    }
    if options.force_map {
        apply_type_mapping(&mut annotations, &options.aliases);
    }
    annotations
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub tp: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl Metrics {
    /// `None` when any of the ratios has a zero denominator.
    pub fn from_counts(counts: &Counts) -> Option<Self> {
        let tp = counts.tp as f64;
        let predicted = counts.tp + counts.fp;
        let actual = counts.tp + counts.fn_;
        if predicted == 0 || actual == 0 {
            return None;
        }
        let precision = tp / predicted as f64;
        let recall = tp / actual as f64;
        if precision + recall == 0.0 {
            return None;
        }
        Some(Self {
            precision,
            recall,
            f1: 2.0 * precision * recall / (precision + recall),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocClass {
    MatchEmpty,
    MatchNonempty,
    Mismatch,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DocLevel {
    #[serde(rename = "match")]
    pub matched: usize,
    pub match_empty: usize,
    pub match_nonempty: usize,
    pub mismatch: usize,
    pub total: usize,
}

impl DocLevel {
    fn record(&mut self, class: DocClass) {
        match class {
            DocClass::MatchEmpty => {
                self.matched += 1;
                self.match_empty += 1;
            }
            DocClass::MatchNonempty => {
                self.matched += 1;
                self.match_nonempty += 1;
            }
            DocClass::Mismatch => self.mismatch += 1,
        }
        self.total += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchEvent {
    Match {
        text: String,
        type_a: String,
        type_b: String,
    },
    OnlyA {
        text: String,
        entity_type: String,
    },
    OnlyB {
        text: String,
        entity_type: String,
    },
}

impl fmt::Display for MatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchEvent::Match {
                text,
                type_a,
                type_b,
            } => write!(f, "MATCH: \"{text}\" ({type_a}/{type_b})"),
            MatchEvent::OnlyA { text, entity_type } => write!(f, "ONLY1: \"{text}\" ({entity_type})"),
            MatchEvent::OnlyB { text, entity_type } => write!(f, "ONLY2: \"{text}\" ({entity_type})"),
        }
    }
}

/// Result of comparing one pair of annotation sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub events: Vec<MatchEvent>,
    pub matched_a: usize,
    pub matched_b: usize,
    pub only_a: usize,
    pub only_b: usize,
    pub class: DocClass,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileScore {
    pub score: i64,
    pub path: String,
}

/// Aggregate counters for one comparison run.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub total: Counts,
    pub per_type: BTreeMap<String, Counts>,
    pub by_type: BTreeMap<String, usize>,
    pub doc_level: DocLevel,
    pub structural: Vec<String>,
    pub scores: Vec<FileScore>,
}

impl Stats {
    fn type_counts(&mut self, entity_type: &str) -> &mut Counts {
        self.per_type.entry(entity_type.to_string()).or_default()
    }

    fn tally(&mut self, label: &str, entity_type: &str) {
        *self.by_type.entry(format!("{label} {entity_type}")).or_default() += 1;
    }

    fn structural_mismatch(&mut self, message: String) {
        tracing::warn!("{message}");
        self.structural.push(message);
    }
}

fn candidates(
    a1: &EntityRecord,
    set_b: &[EntityRecord],
    matched_b: &[bool],
    options: &CompareOptions,
) -> Vec<usize> {
    let mut found = set_b
        .iter()
        .enumerate()
        .filter(|(_, a2)| a1.start == a2.start && a1.end == a2.end)
        .filter(|(_, a2)| {
            let matched = options.types_match(&a1.entity_type, &a2.entity_type);
            if matched {
                tracing::debug!("type match: {:?} vs {:?} ({:?})", a1.entity_type, a2.entity_type, a1.text);
            } else {
                tracing::debug!("type mismatch: {:?} vs {:?} ({:?})", a1.entity_type, a2.entity_type, a1.text);
            }
            matched
        })
        .map(|(idx, _)| idx);
    match options.policy {
        MatchPolicy::FirstUnmatched => found.find(|&idx| !matched_b[idx]).into_iter().collect(),
        MatchPolicy::AllCandidates => found.collect(),
    }
}

/// Matches `set_a` against `set_b` and accumulates counts into `stats`.
/// Annotations left in `set_a` are false negatives, those left in `set_b`
/// false positives.
pub fn compare_annotations(
    set_a: &[EntityRecord],
    set_b: &[EntityRecord],
    options: &CompareOptions,
    stats: &mut Stats,
) -> FileOutcome {
    let mut events = Vec::new();
    let mut matched_a = vec![false; set_a.len()];
    let mut matched_b = vec![false; set_b.len()];

    for (i, a1) in set_a.iter().enumerate() {
        let claimed = candidates(a1, set_b, &matched_b, options);
        if let Some(&first) = claimed.first() {
            events.push(MatchEvent::Match {
                text: a1.text.clone(),
                type_a: a1.entity_type.clone(),
                type_b: set_b[first].entity_type.clone(),
            });
            matched_a[i] = true;
            stats.total.tp += 1;
            stats.type_counts(&a1.entity_type).tp += 1;
            stats.tally("matched", &a1.entity_type);
            for idx in claimed {
                matched_b[idx] = true;
                stats.tally("matched", &set_b[idx].entity_type);
            }
        } else {
            events.push(MatchEvent::OnlyA {
                text: a1.text.clone(),
                entity_type: a1.entity_type.clone(),
            });
            stats.total.fn_ += 1;
            stats.type_counts(&a1.entity_type).fn_ += 1;
            stats.tally("missed", &a1.entity_type);
        }
    }
    for (a2, _) in set_b.iter().zip(&matched_b).filter(|(_, matched)| !**matched) {
        events.push(MatchEvent::OnlyB {
            text: a2.text.clone(),
            entity_type: a2.entity_type.clone(),
        });
        stats.total.fp += 1;
        stats.type_counts(&a2.entity_type).fp += 1;
        stats.tally("missed", &a2.entity_type);
    }

    let count_a = matched_a.iter().filter(|m| **m).count();
    let count_b = matched_b.iter().filter(|m| **m).count();
    let only_a = set_a.len() - count_a;
    let only_b = set_b.len() - count_b;
    let class = if only_a > 0 || only_b > 0 {
        DocClass::Mismatch
    } else if count_a > 0 && count_b > 0 {
        DocClass::MatchNonempty
    } else {
        DocClass::MatchEmpty
    };
    stats.doc_level.record(class);
    // rough per-document score, used for ranking only
    let score = match class {
        DocClass::Mismatch => -(only_a.max(only_b) as i64),
        _ => count_a.max(count_b) as i64,
    };

    FileOutcome {
        events,
        matched_a: count_a,
        matched_b: count_b,
        only_a,
        only_b,
        class,
        score,
    }
}

fn read_annotations(path: &Path) -> Result<Vec<EntityRecord>, StandoffError> {
    let content = fs::read_to_string(path)
        .map_err(|err| StandoffError::Filesystem(format!("read {}: {err}", path.display())))?;
    parse_standoff(&content, &path.display().to_string())
}

pub fn compare_files(
    path_a: &Path,
    path_b: &Path,
    options: &CompareOptions,
    stats: &mut Stats,
) -> Result<FileOutcome, StandoffError> {
    let set_a = preprocess(read_annotations(path_a)?, options);
    let set_b = preprocess(read_annotations(path_b)?, options);
    let outcome = compare_annotations(&set_a, &set_b, options, stats);
    stats.scores.push(FileScore {
        score: outcome.score,
        path: path_a.display().to_string(),
    });
    Ok(outcome)
}

/// Compares two files or two directory trees. `on_file` sees the outcome of
/// every compared file pair.
pub fn compare_paths<F>(
    path_a: &Path,
    path_b: &Path,
    options: &CompareOptions,
    stats: &mut Stats,
    on_file: &mut F,
) -> Result<(), StandoffError>
where
    F: FnMut(&Path, &FileOutcome),
{
    if path_a.is_file() {
        if path_b.is_file() {
            let outcome = compare_files(path_a, path_b, options, stats)?;
            on_file(path_a, &outcome);
        } else if !path_b.exists() {
            stats.structural_mismatch(format!("{} does not exist", path_b.display()));
        } else {
            stats.structural_mismatch(format!(
                "mismatch: {} is file, {} is not",
                path_a.display(),
                path_b.display()
            ));
        }
    } else if path_a.is_dir() {
        if path_b.is_dir() {
            compare_dirs(path_a, path_b, options, stats, on_file)?;
        } else if !path_b.exists() {
            stats.structural_mismatch(format!("{} does not exist", path_b.display()));
        } else {
            stats.structural_mismatch(format!(
                "mismatch: {} is directory, {} is not",
                path_a.display(),
                path_b.display()
            ));
        }
    } else {
        stats.structural_mismatch(format!("{} does not exist", path_a.display()));
    }
    Ok(())
}

fn compare_dirs<F>(
    dir_a: &Path,
    dir_b: &Path,
    options: &CompareOptions,
    stats: &mut Stats,
    on_file: &mut F,
) -> Result<(), StandoffError>
where
    F: FnMut(&Path, &FileOutcome),
{
    let list_a = fs_util::list_entries(dir_a)?;
    let list_b = fs_util::list_entries(dir_b)?;
    let wanted = |dir: &Path, name: &str| {
        dir.join(name).is_dir() || fs_util::has_suffix(name, &options.suffix)
    };

    for name in list_a.symmetric_difference(&list_b) {
        let (present, missing) = if list_a.contains(name) {
            (dir_a, dir_b)
        } else {
            (dir_b, dir_a)
        };
        if wanted(present, name.as_str()) {
            stats.structural_mismatch(format!(
                "{} has no counterpart in {}",
                present.join(name).display(),
                missing.display()
            ));
        }
    }

    for name in list_a.intersection(&list_b) {
        let entry_a = dir_a.join(name);
        if wanted(dir_a, name.as_str()) {
            compare_paths(&entry_a, &dir_b.join(name), options, stats, on_file)?;
        } else {
            tracing::debug!("skipping {name}");
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricRow {
    pub label: String,
    pub counts: Counts,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompareReport {
    pub generated_at: String,
    pub metrics: Vec<MetricRow>,
    /// Labels whose metrics have a zero denominator.
    pub undefined: Vec<String>,
    pub by_type: BTreeMap<String, usize>,
    pub doc_level: DocLevel,
    pub structural: Vec<String>,
    pub scores: Vec<FileScore>,
}

impl CompareReport {
    pub fn from_stats(stats: &Stats) -> Self {
        let mut labelled: Vec<(String, Counts)> = stats
            .per_type
            .iter()
            .map(|(entity_type, counts)| (format!("metrics {entity_type}"), *counts))
            .collect();
        labelled.push(("metrics total".to_string(), stats.total));
        labelled.sort_by(|a, b| a.0.cmp(&b.0));

        let mut metrics = Vec::new();
        let mut undefined = Vec::new();
        for (label, counts) in labelled {
            match Metrics::from_counts(&counts) {
                Some(values) => metrics.push(MetricRow {
                    label,
                    counts,
                    metrics: values,
                }),
                None => {
                    tracing::warn!("failed to get metrics for {label}: zero denominator");
                    undefined.push(label);
                }
            }
        }

        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            metrics,
            undefined,
            by_type: stats.by_type.clone(),
            doc_level: stats.doc_level,
            structural: stats.structural.clone(),
            scores: stats.scores.clone(),
        }
    }

    pub fn metric(&self, label: &str) -> Option<&MetricRow> {
        self.metrics.iter().find(|row| row.label == label)
    }

    pub fn render_text(&self) -> String {
        let rule = "-".repeat(78);
        let mut out = String::new();
        out.push_str(&rule);
        out.push('\n');
        for row in &self.metrics {
            out.push_str(&format!(
                "{}: f:{:.2}% (p:{:.2}% r:{:.2}%, tp:{} fp:{} fn:{})\n",
                row.label,
                row.metrics.f1 * 100.0,
                row.metrics.precision * 100.0,
                row.metrics.recall * 100.0,
                row.counts.tp,
                row.counts.fp,
                row.counts.fn_
            ));
        }
        for label in &self.undefined {
            out.push_str(&format!("ERROR: failed to get metrics for {label}: division by zero\n"));
        }
        out.push_str(&rule);
        out.push('\n');

        out.push_str("stats by type\n");
        for (key, value) in self.by_type.iter().rev() {
            out.push_str(&format!("{key}\t{value}\n"));
        }
        out.push_str(&"-".repeat(10));
        out.push('\n');

        out.push_str("stats doc-level\n");
        let level = &self.doc_level;
        for (key, value) in [
            ("mismatch", level.mismatch),
            ("match-nonempty", level.match_nonempty),
            ("match-empty", level.match_empty),
            ("match", level.matched),
            ("TOTAL", level.total),
        ] {
            out.push_str(&format!("{key}\t{value}\n"));
        }
        out.push_str(&"-".repeat(10));
        out.push('\n');

        if !self.structural.is_empty() {
            out.push_str("stats structural\n");
            for message in &self.structural {
                out.push_str(message);
                out.push('\n');
            }
            out.push_str(&"-".repeat(10));
            out.push('\n');
        }
        out
    }
}
