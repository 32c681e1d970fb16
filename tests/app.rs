use std::fs;
use std::io;

use camino::Utf8PathBuf;

use tagger_standoff::app::{App, Inputs, ProgressEvent, ProgressSink};
use tagger_standoff::kvstore::KvStore;
use tagger_standoff::lookup::{EntityTable, NameTable, NoLookup};
use tagger_standoff::output::{ConsoleSink, DirectorySink, KvSink};
use tagger_standoff::resolver::TaxonomyTable;

struct Quiet;

impl ProgressSink for Quiet {
    fn event(&self, _event: ProgressEvent) {}
}

fn lines(text: &str) -> std::vec::IntoIter<io::Result<String>> {
    text.lines()
        .map(|line| Ok(line.to_string()))
        .collect::<Vec<_>>()
        .into_iter()
}

const DOC: &str = "PMID:123\tA\tJ\t2020\tTitle\tAbstract text\n";
const TAG: &str = "123\t0\t0\t0\t4\tTitle\t-1\t55\n";

#[test]
fn end_to_end_without_lookups() {
    let mut app = App::new(NoLookup, NoLookup, TaxonomyTable::builtin());
    let mut sink = ConsoleSink::new(Vec::new());
    app.convert(
        Inputs::new(lines(DOC), "docs", lines(TAG), "tags"),
        &mut sink,
        &Quiet,
        None,
    )
    .unwrap();

    let out = String::from_utf8(sink.into_inner()).unwrap();
    assert_eq!(
        out,
        "Title\nAbstract text\nT1\tChemical 0 5\tTitle\nN1\tReference T1 TAGGER:55\tTitle\n"
    );
}

#[test]
fn end_to_end_with_pubchem_id() {
    let (entities, _) = EntityTable::read_from(
        io::Cursor::new(b"55\t-1\tCIDs00002244\n".to_vec()),
        "entities",
    )
    .unwrap();
    let mut names = NameTable::new();
    names
        .read_from(io::Cursor::new(b"55\taspirin\n".to_vec()), "names")
        .unwrap();
    let mut app = App::new(names, entities, TaxonomyTable::builtin());
    let mut sink = ConsoleSink::new(Vec::new());
    app.convert(
        Inputs::new(lines(DOC), "docs", lines(TAG), "tags"),
        &mut sink,
        &Quiet,
        None,
    )
    .unwrap();

    let out = String::from_utf8(sink.into_inner()).unwrap();
    assert!(out.ends_with("N1\tReference T1 CID:00002244\taspirin\n"));
}

#[test]
fn convert_writes_sharded_files() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let docs = format!("{DOC}PMID:124\tA\tJ\t2020\tNothing\there\n");
    let mut app = App::new(NoLookup, NoLookup, TaxonomyTable::builtin());
    let mut sink = DirectorySink::new(root.clone(), Some(2));
    let result = app
        .convert(
            Inputs::new(lines(&docs), "docs", lines(TAG), "tags"),
            &mut sink,
            &Quiet,
            None,
        )
        .unwrap();

    assert_eq!(result.documents, 2);
    assert_eq!(result.mentions, 1);
    let ann = fs::read_to_string(root.join("12/123.ann")).unwrap();
    assert_eq!(ann, "T1\tChemical 0 5\tTitle\nN1\tReference T1 TAGGER:55\tTitle\n");
    assert_eq!(fs::read_to_string(root.join("12/124.ann")).unwrap(), "");
    assert_eq!(
        fs::read_to_string(root.join("12/124.txt")).unwrap(),
        "Nothing\nhere\n"
    );
}

#[test]
fn convert_into_key_value_store() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("out.db");
    let mut app = App::new(NoLookup, NoLookup, TaxonomyTable::builtin());
    let mut sink = KvSink::new(KvStore::open(&path).unwrap());
    app.convert(
        Inputs::new(lines(DOC), "docs", lines(TAG), "tags"),
        &mut sink,
        &Quiet,
        None,
    )
    .unwrap();
    drop(sink);

    let store = KvStore::open_existing(&path).unwrap();
    assert_eq!(
        store.get("123.txt").unwrap().as_deref(),
        Some("Title\nAbstract text\n")
    );
    assert!(store.get("123.ann").unwrap().unwrap().starts_with("T1\tChemical"));
}

#[test]
fn gene_mentions_carry_species() {
    let docs = "PMID:7\tA\tJ\t2020\tBRCA1 binds\t\n";
    let tags = "7\t0\t0\t0\t4\tBRCA1\t9606\t9\n";
    let mut app = App::new(NoLookup, NoLookup, TaxonomyTable::builtin());
    let mut sink = ConsoleSink::new(Vec::new());
    app.convert(
        Inputs::new(lines(docs), "docs", lines(tags), "tags"),
        &mut sink,
        &Quiet,
        None,
    )
    .unwrap();

    let out = String::from_utf8(sink.into_inner()).unwrap();
    assert!(out.contains("T1\tGene 0 5\tBRCA1\n"));
    assert!(out.contains("N1\tReference T1 TAGGER:9\tBRCA1 (Homo sapiens)\n"));
    assert_eq!(app.resolver().cached_taxa(), 1);
}
