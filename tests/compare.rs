use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use tagger_standoff::compare::{
    CompareOptions, CompareReport, Counts, DocClass, MatchPolicy, RetypeRule, Stats,
    compare_annotations, compare_files, compare_paths, preprocess,
};
use tagger_standoff::error::StandoffError;
use tagger_standoff::standoff::parse_standoff;

const GOLD: &str = "T1\tChemical 0 7\tAspirin\n\
N1\tReference T1 CID:2244\taspirin\n\
T2\tggp 20 25\tBRCA1\n\
T3\tDisease 30 36\tcancer\n";

const PREDICTED: &str = "T1\tChemical 0 7\tAspirin\n\
T2\tGene 20 25\tBRCA1\n\
T3\tChemical 40 45\tsugar\n";

fn records(content: &str) -> Vec<tagger_standoff::standoff::EntityRecord> {
    parse_standoff(content, "test.ann").unwrap()
}

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

#[test]
fn self_comparison_is_perfect() {
    let set = records(GOLD);
    let mut stats = Stats::default();
    let outcome = compare_annotations(&set, &set, &CompareOptions::default(), &mut stats);

    assert_eq!(stats.total, Counts { tp: 3, fp: 0, fn_: 0 });
    assert_eq!(outcome.class, DocClass::MatchNonempty);
    let report = CompareReport::from_stats(&stats);
    assert!(report.undefined.is_empty());
    for row in &report.metrics {
        assert_eq!(row.metrics.precision, 1.0);
        assert_eq!(row.metrics.recall, 1.0);
        assert_eq!(row.metrics.f1, 1.0);
    }
}

#[test]
fn annotation_only_in_first_set_is_false_negative() {
    let base = records("T1\tChemical 0 7\tAspirin\n");
    let extended = records("T1\tChemical 0 7\tAspirin\nT2\tDisease 30 36\tcancer\n");

    let mut before = Stats::default();
    compare_annotations(&base, &base, &CompareOptions::default(), &mut before);
    let mut after = Stats::default();
    let outcome = compare_annotations(&extended, &base, &CompareOptions::default(), &mut after);

    assert_eq!(after.total.fn_, before.total.fn_ + 1);
    assert_eq!(after.total.fp, before.total.fp);
    assert_eq!(outcome.only_a, 1);
    assert_eq!(outcome.score, -1);
    assert_eq!(after.per_type["Disease"].fn_, 1);
}

#[test]
fn type_mapping_relaxes_matching() {
    let gold = records(GOLD);
    let predicted = records(PREDICTED);

    let mut strict = Stats::default();
    compare_annotations(&gold, &predicted, &CompareOptions::default(), &mut strict);

    let mapped_options = CompareOptions {
        map_types: true,
        ..CompareOptions::default()
    };
    let mut mapped = Stats::default();
    compare_annotations(&gold, &predicted, &mapped_options, &mut mapped);

    let forced_options = CompareOptions {
        force_map: true,
        ..CompareOptions::default()
    };
    let mut forced = Stats::default();
    let gold_forced = preprocess(gold.clone(), &forced_options);
    let predicted_forced = preprocess(predicted.clone(), &forced_options);
    compare_annotations(&gold_forced, &predicted_forced, &forced_options, &mut forced);

    assert_eq!(strict.total, Counts { tp: 1, fp: 2, fn_: 2 });
    assert_eq!(mapped.total, Counts { tp: 2, fp: 1, fn_: 1 });
    assert!(forced.total.tp >= strict.total.tp);
    assert_eq!(forced.per_type["Gene"].tp, 1);
    assert_eq!(mapped.by_type["matched ggp"], 1);
    assert_eq!(mapped.by_type["matched Gene"], 1);
}

#[test]
fn policies_differ_on_duplicate_candidates() {
    let gold = records("T1\tGene 0 5\tBRCA1\n");
    let predicted = records("T1\tGene 0 5\tBRCA1\nT2\tGene 0 5\tBRCA1\n");

    let mut first = Stats::default();
    compare_annotations(&gold, &predicted, &CompareOptions::default(), &mut first);
    assert_eq!(first.total, Counts { tp: 1, fp: 1, fn_: 0 });

    let options = CompareOptions {
        policy: MatchPolicy::AllCandidates,
        ..CompareOptions::default()
    };
    let mut all = Stats::default();
    compare_annotations(&gold, &predicted, &options, &mut all);
    assert_eq!(all.total, Counts { tp: 1, fp: 0, fn_: 0 });
}

#[test]
fn retype_uses_normalization_ids() {
    let temp = tempfile::tempdir().unwrap();
    let ids = temp.path().join("drugs.txt");
    fs::write(&ids, "CID:2244\nCID:3672\n").unwrap();

    let rules = RetypeRule::parse_list(&format!("Chemical:Drug:{}", ids.display())).unwrap();
    assert_eq!(rules.len(), 1);
    let options = CompareOptions {
        retype: rules,
        filter_types: BTreeSet::from(["Disease".to_string()]),
        ..CompareOptions::default()
    };
    let processed = preprocess(records(GOLD), &options);
    let types: Vec<&str> = processed.iter().map(|a| a.entity_type.as_str()).collect();
    assert_eq!(types, vec!["Drug", "ggp"]);

    let err = RetypeRule::parse_list("Chemical:Drug").unwrap_err();
    assert!(matches!(err, StandoffError::InvalidRetype(_)));
}

#[test]
fn directories_compare_shared_files_only() {
    let temp = tempfile::tempdir().unwrap();
    let dir_a = temp.path().join("gold");
    let dir_b = temp.path().join("pred");
    fs::create_dir_all(dir_a.join("sub")).unwrap();
    fs::create_dir_all(dir_b.join("sub")).unwrap();

    write(&dir_a, "1.ann", GOLD);
    write(&dir_b, "1.ann", PREDICTED);
    write(&dir_a.join("sub"), "2.ann", "");
    write(&dir_b.join("sub"), "2.ann", "");
    write(&dir_a, "3.ann", GOLD);
    write(&dir_a, "1.txt", "ignored");
    write(&dir_b, "1.txt", "ignored");

    let mut stats = Stats::default();
    let mut visited = Vec::new();
    compare_paths(
        &dir_a,
        &dir_b,
        &CompareOptions::default(),
        &mut stats,
        &mut |path: &Path, _outcome: &tagger_standoff::compare::FileOutcome| {
            visited.push(path.file_name().unwrap().to_string_lossy().into_owned())
        },
    )
    .unwrap();

    assert_eq!(visited, vec!["1.ann", "2.ann"]);
    assert_eq!(stats.structural.len(), 1);
    assert!(stats.structural[0].contains("3.ann"));
    assert_eq!(stats.doc_level.total, 2);
    assert_eq!(stats.doc_level.match_empty, 1);
    assert_eq!(stats.doc_level.mismatch, 1);
    assert_eq!(stats.scores.len(), 2);
}

#[test]
fn file_against_directory_is_structural() {
    let temp = tempfile::tempdir().unwrap();
    let file = temp.path().join("a.ann");
    fs::write(&file, GOLD).unwrap();

    let mut stats = Stats::default();
    compare_paths(
        &file,
        temp.path(),
        &CompareOptions::default(),
        &mut stats,
        &mut |_: &Path, _: &tagger_standoff::compare::FileOutcome| {},
    )
    .unwrap();
    assert_eq!(stats.structural.len(), 1);
    assert_eq!(stats.doc_level.total, 0);

    let outcome = compare_files(&file, &file, &CompareOptions::default(), &mut stats).unwrap();
    assert_eq!(outcome.matched_a, 3);
}

#[test]
fn report_serializes_to_json() {
    let mut stats = Stats::default();
    compare_annotations(
        &records(GOLD),
        &records(PREDICTED),
        &CompareOptions::default(),
        &mut stats,
    );
    let report = CompareReport::from_stats(&stats);
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["doc_level"]["mismatch"], 1);
    assert_eq!(json["doc_level"]["match"], 0);
    let total = report.metric("metrics total").unwrap();
    assert_eq!(total.counts.tp, 1);
    assert!(json["undefined"]
        .as_array()
        .unwrap()
        .iter()
        .any(|label| label == "metrics Disease"));
}
