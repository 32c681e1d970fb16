use std::fs;
use std::path::PathBuf;

use assert_matches::assert_matches;

use tagger_standoff::compare::MatchPolicy;
use tagger_standoff::config::ConfigLoader;
use tagger_standoff::error::StandoffError;

#[test]
fn resolve_reads_explicit_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("settings.json");
    fs::write(
        &path,
        r#"{
            "taxnames_path": "/srv/taxonomy/names.tsv",
            "shard_prefix_len": 3,
            "suffix": ".a1",
            "match_policy": "all-candidates",
            "type_aliases": {"protein": "Gene"}
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.schema_version, 1);
    assert_eq!(resolved.taxnames_path, PathBuf::from("/srv/taxonomy/names.tsv"));
    assert_eq!(resolved.shard_prefix_len, Some(3));
    assert_eq!(resolved.suffix, ".a1");
    assert_eq!(resolved.match_policy, MatchPolicy::AllCandidates);
    assert_eq!(resolved.type_aliases.map("protein"), "Gene");
    assert_eq!(resolved.type_aliases.map("org"), "Organism");
}

#[test]
fn explicit_missing_file_is_read_error() {
    let err = ConfigLoader::resolve(Some("/nonexistent/tagger-standoff.json")).unwrap_err();
    assert_matches!(err, StandoffError::ConfigRead(_));
}

#[test]
fn malformed_json_is_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("bad.json");
    fs::write(&path, "{ \"suffix\": ").unwrap();
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, StandoffError::ConfigParse(_));
}

#[test]
fn zero_shard_length_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("shard.json");
    fs::write(&path, r#"{"shard_prefix_len": 0}"#).unwrap();
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, StandoffError::ConfigParse(_));
}
