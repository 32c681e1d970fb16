use std::fs;
use std::io::Cursor;

use assert_matches::assert_matches;

use tagger_standoff::dicts;
use tagger_standoff::error::StandoffError;
use tagger_standoff::kvstore::KvStore;
use tagger_standoff::lookup::{
    CombinedTable, EntityTable, IdLookup, IdSource, NameLookup, NameSource, NameTable,
};

#[test]
fn built_store_serves_lookups() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("names.db");
    {
        let mut store = KvStore::open(&path).unwrap();
        let report = store
            .build_from_tsv(Cursor::new("55\taspirin\n56\tcaffeine\n55\tASA\n"), "names.tsv")
            .unwrap();
        assert_eq!(report.read, 3);
        assert_eq!(report.stored, 2);
    }

    let names = NameSource::open(Some(&path)).unwrap();
    assert_matches!(names, NameSource::Store(_));
    assert_eq!(names.lookup_name(55).unwrap().as_deref(), Some("aspirin"));
    assert_eq!(names.lookup_name(57).unwrap(), None);
}

#[test]
fn build_reports_bad_lines() {
    let mut store = KvStore::open_in_memory().unwrap();
    let err = store
        .build_from_tsv(Cursor::new("1\tok\n2\tbad\textra\n"), "dict.tsv")
        .unwrap_err();
    assert_matches!(
        err,
        StandoffError::Format { line: 2, expected: 2, found: 3, .. }
    );
    assert!(store.is_empty().unwrap());
}

#[test]
fn tsv_sources_are_loaded_by_extension() {
    let temp = tempfile::tempdir().unwrap();
    let entities = temp.path().join("entities.tsv");
    fs::write(&entities, "55\t-1\tCIDs00002244\n9\t9606\tENSP00000350283\n").unwrap();

    let ids = IdSource::open(Some(&entities)).unwrap();
    assert_matches!(ids, IdSource::Table(_));
    assert_eq!(ids.lookup_id(55).unwrap().as_deref(), Some("CIDs00002244"));

    let none = IdSource::open(None).unwrap();
    assert_eq!(none.lookup_id(55).unwrap(), None);
}

#[test]
fn missing_store_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let err = NameSource::open(Some(&temp.path().join("absent.db"))).unwrap_err();
    assert_matches!(err, StandoffError::Store(_));
}

#[test]
fn combined_dictionary_feeds_mapping() {
    let temp = tempfile::tempdir().unwrap();
    let names = temp.path().join("names.tsv");
    let entities = temp.path().join("entities.tsv");
    fs::write(&names, "1\tHomo sapiens\n2\tBRCA1\n3\taspirin\n").unwrap();
    fs::write(
        &entities,
        "1\t-2\t9606\n2\t9606\tENSP00000350283\n3\t-1\tCIDs00002244\n",
    )
    .unwrap();

    let names = NameTable::load(&names).unwrap();
    let entities = EntityTable::load(&entities).unwrap();
    let dict_path = temp.path().join("combined.tsv");
    let combined: String = dicts::combine(&names, &entities)
        .iter()
        .map(|row| format!("{row}\n"))
        .collect();
    fs::write(&dict_path, combined).unwrap();

    let dictionary = CombinedTable::load(&dict_path).unwrap();
    assert_eq!(dictionary.len(), 3);
    let tagged = "PMID:9\t1\t1\t0\t7\taspirin\t-1\t3\n";
    let mut out = Vec::new();
    let report = dicts::map_tagged(Cursor::new(tagged), "tagged", &dictionary, &mut out).unwrap();

    assert_eq!(report.unmapped, 0);
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "PMID:9\t1\t1\t0\t7\taspirin\tChemical\taspirin\tCID:00002244\n"
    );
}
