use super::*;

use crate::internal::*;
use crate::GFFBase;

use std::sync::atomic::AtomicBool;

//-----------------------------------------------------------------------------

const PLAIN_GFF3: &str = "\
chr1\ttest\tgene\t100\t900\t.\t+\t.\tID=gene1
chr1\ttest\tmRNA\t100\t900\t.\t+\t.\tID=mRNA1;Parent=gene1
chr1\ttest\texon\t100\t500\t.\t+\t.\tID=exon1;Parent=mRNA1
";

fn text_db(text: &str, params: IngestParams) -> std::path::PathBuf {
    create_db_from_text(text, params)
}

//-----------------------------------------------------------------------------

#[test]
fn empty_input() {
    let db_file = crate::utils::temp_file_name("gff-base");
    let result = GFFBase::create(Input::text(""), &db_file, IngestParams::default());
    assert!(matches!(result, Err(Error::EmptyInput)), "An empty input should be an error");

    // Directives alone are not features.
    let result = GFFBase::create(
        Input::text("##gff-version 3\n# comment\n"),
        &db_file,
        IngestParams::default(),
    );
    assert!(matches!(result, Err(Error::EmptyInput)), "A feature-less input should be an error");
}

#[test]
fn duplicate_id_strategies() {
    let text = "\
chr1\ttest\tgene\t100\t900\t.\t+\t.\tID=gene1;Alias=a
chr1\ttest\tgene\t100\t900\t.\t+\t.\tID=gene1;Alias=b
";

    // The default strategy fails.
    let db_file = crate::utils::temp_file_name("gff-base");
    let result = GFFBase::create(Input::text(text), &db_file, IngestParams::default());
    match result {
        Err(Error::DuplicateId(id)) => assert_eq!(id, "gene1", "Wrong duplicate id"),
        _ => panic!("Expected a duplicate id error"),
    }

    // Warning keeps the first feature.
    let params = IngestParams { merge_strategy: MergeStrategy::Warning, ..IngestParams::default() };
    let db_file = text_db(text, params);
    let database = open_db(&db_file);
    assert_eq!(database.features(), 1, "The duplicate should have been skipped");
    let mut interface = create_interface(&database);
    let gene = feature_by_id(&mut interface, "gene1");
    assert_eq!(gene.attributes.get("Alias").unwrap(), ["a"], "The first feature should win");
    drop(interface);
    drop(database);
    let _ = std::fs::remove_file(&db_file);

    // Replace keeps the last feature.
    let params = IngestParams { merge_strategy: MergeStrategy::Replace, ..IngestParams::default() };
    let db_file = text_db(text, params);
    let database = open_db(&db_file);
    let mut interface = create_interface(&database);
    let gene = feature_by_id(&mut interface, "gene1");
    assert_eq!(gene.attributes.get("Alias").unwrap(), ["b"], "The last feature should win");
    drop(interface);
    drop(database);
    let _ = std::fs::remove_file(&db_file);

    // Merge unions the attributes when the other fields agree.
    let params = IngestParams { merge_strategy: MergeStrategy::Merge, ..IngestParams::default() };
    let db_file = text_db(text, params);
    let database = open_db(&db_file);
    let mut interface = create_interface(&database);
    let gene = feature_by_id(&mut interface, "gene1");
    assert_eq!(gene.attributes.get("Alias").unwrap(), ["a", "b"], "The attributes should merge");
    drop(interface);
    drop(database);
    let _ = std::fs::remove_file(&db_file);
}

#[test]
fn merge_conflict_names_the_line() {
    let text = "\
chr1\ttest\tCDS\t100\t200\t.\t+\t0\tID=CDS:D1007.5a
chr1\ttest\tCDS\t300\t400\t.\t+\t0\tID=CDS:D1007.5a
";
    let db_file = crate::utils::temp_file_name("gff-base");
    let params = IngestParams { merge_strategy: MergeStrategy::Merge, ..IngestParams::default() };
    let result = GFFBase::create(Input::text(text), &db_file, params);
    match result {
        Err(Error::MergeConflict { id, line }) => {
            assert_eq!(id, "CDS:D1007.5a", "Wrong id in the conflict");
            assert_eq!(line, 2, "Wrong line in the conflict");
        }
        _ => panic!("Expected a merge conflict"),
    }
}

#[test]
fn create_unique_records_duplicates() {
    let text = "\
chr1\ttest\tCDS\t100\t200\t.\t+\t0\tID=CDS:D1007.5a
chr1\ttest\tCDS\t300\t400\t.\t+\t0\tID=CDS:D1007.5a
";
    let params = IngestParams { merge_strategy: MergeStrategy::CreateUnique, ..IngestParams::default() };
    let db_file = text_db(text, params);
    let database = open_db(&db_file);
    let mut interface = create_interface(&database);

    let original = feature_by_id(&mut interface, "CDS:D1007.5a");
    assert_eq!(original.start, Some(100), "The first feature should keep its key");
    let renamed = feature_by_id(&mut interface, "CDS:D1007.5a_1");
    assert_eq!(renamed.start, Some(300), "The second feature should be renamed");

    // The original key still finds the renamed feature.
    let renamed_ids = interface.ids_for("CDS:D1007.5a").unwrap();
    assert_eq!(renamed_ids, vec!["CDS:D1007.5a_1"], "Wrong duplicate bookkeeping");

    drop(interface);
    drop(database);
    let _ = std::fs::remove_file(&db_file);
}

#[test]
fn per_featuretype_merge_strategies() {
    // Duplicate genes merge while duplicate CDS features are renamed.
    let text = "\
chr1\ttest\tgene\t100\t900\t.\t+\t.\tID=gene1;Alias=a
chr1\ttest\tgene\t100\t900\t.\t+\t.\tID=gene1;Alias=b
chr1\ttest\tCDS\t100\t200\t.\t+\t0\tID=cds1
chr1\ttest\tCDS\t300\t400\t.\t+\t0\tID=cds1
";
    let mut strategies = HashMap::new();
    strategies.insert(String::from("gene"), MergeStrategy::Merge);
    let params = IngestParams {
        merge_strategy: MergeStrategy::CreateUnique,
        merge_strategies: strategies,
        ..IngestParams::default()
    };
    let db_file = text_db(text, params);
    let database = open_db(&db_file);
    let mut interface = create_interface(&database);

    let gene = feature_by_id(&mut interface, "gene1");
    assert_eq!(gene.attributes.get("Alias").unwrap(), ["a", "b"], "The genes should merge");
    assert_eq!(feature_by_id(&mut interface, "cds1").start, Some(100), "Wrong first CDS");
    assert_eq!(feature_by_id(&mut interface, "cds1_1").start, Some(300), "The second CDS should be renamed");

    drop(interface);
    drop(database);
    let _ = std::fs::remove_file(&db_file);
}

//-----------------------------------------------------------------------------

#[test]
fn transform_modifies_and_drops() {
    let params = IngestParams {
        transform: Some(Box::new(|mut feature: crate::Feature| {
            if feature.featuretype == "exon" {
                return None;
            }
            feature.attributes.set("touched", vec![String::from("yes")]);
            Some(feature)
        })),
        ..IngestParams::default()
    };
    let db_file = text_db(PLAIN_GFF3, params);
    let database = open_db(&db_file);
    assert_eq!(database.features(), 2, "The exon should have been dropped");
    let mut interface = create_interface(&database);
    let gene = feature_by_id(&mut interface, "gene1");
    assert_eq!(gene.attributes.first("touched"), Some("yes"), "The transform should apply");

    drop(interface);
    drop(database);
    let _ = std::fs::remove_file(&db_file);
}

#[test]
fn cancellation_rolls_back() {
    let cancel = Arc::new(AtomicBool::new(true));
    let params = IngestParams { cancel: Some(Arc::clone(&cancel)), ..IngestParams::default() };
    let db_file = crate::utils::temp_file_name("gff-base");
    let result = GFFBase::create(Input::text(PLAIN_GFF3), &db_file, params);
    assert!(matches!(result, Err(Error::Cancelled)), "A cancelled ingest should report it");
    assert!(!crate::utils::file_exists(&db_file), "A cancelled ingest should leave nothing behind");
}

#[test]
fn autoincrement_state_is_persisted() {
    let text = "\
chr1\ttest\tgene\t100\t900\t.\t+\t.\tName=first
chr1\ttest\tgene\t100\t900\t.\t+\t.\tName=second
";
    let db_file = text_db(text, IngestParams::default());
    let database = open_db(&db_file);
    let mut interface = create_interface(&database);

    // Both genes lack an ID, so they autoincrement by feature type.
    assert_eq!(feature_by_id(&mut interface, "gene_1").attributes.first("Name"), Some("first"));
    assert_eq!(feature_by_id(&mut interface, "gene_2").attributes.first("Name"), Some("second"));
    drop(interface);

    // The counter state is stored for later updates.
    let connection = rusqlite::Connection::open(&db_file).unwrap();
    let n: i64 = connection.query_row(
        "SELECT n FROM autoincrements WHERE base = 'gene'", (), |row| row.get(0)
    ).unwrap();
    assert_eq!(n, 2, "Wrong autoincrement state");

    drop(connection);
    drop(database);
    let _ = std::fs::remove_file(&db_file);
}

//-----------------------------------------------------------------------------

#[test]
fn transitive_closure() {
    let db_file = create_db_from_file("nested.gff3", IngestParams::default());
    let database = open_db(&db_file);
    let mut interface = create_interface(&database);

    // (g1, t1, 1) and (t1, e1, 1) give (g1, e1, 2); one more level gives
    // (g1, c1, 3).
    let level2 = children_of(&mut interface, "g1", Some(2), None);
    assert_eq!(ids_of(&level2), vec!["e1"], "Wrong level-2 children");
    let level3 = children_of(&mut interface, "g1", Some(3), None);
    assert_eq!(ids_of(&level3), vec!["c1"], "Wrong level-3 children");

    drop(interface);
    drop(database);
    let _ = std::fs::remove_file(&db_file);
}

#[test]
fn bounded_closure_level() {
    let params = IngestParams { max_relation_level: 2, ..IngestParams::default() };
    let db_file = create_db_from_file("nested.gff3", params);
    let database = open_db(&db_file);
    let mut interface = create_interface(&database);

    let level3 = children_of(&mut interface, "g1", Some(3), None);
    assert!(level3.is_empty(), "Level 3 should not be materialized");

    drop(interface);
    drop(database);
    let _ = std::fs::remove_file(&db_file);
}

#[test]
fn no_self_edges() {
    // A feature listing itself as a parent does not create an edge.
    let text = "chr1\ttest\tgene\t100\t900\t.\t+\t.\tID=gene1;Parent=gene1\n";
    let db_file = text_db(text, IngestParams::default());
    let database = open_db(&db_file);
    assert_eq!(database.relations(), 0, "A self-edge should not be staged");

    drop(database);
    let _ = std::fs::remove_file(&db_file);
}

//-----------------------------------------------------------------------------

#[test]
fn explicit_dialect_skips_inference() {
    let mut dialect = crate::Dialect::gtf();
    dialect.order_of_attribute_keys = vec![String::from("gene_id"), String::from("transcript_id")];
    let params = IngestParams { dialect: Some(dialect.clone()), ..IngestParams::default() };
    let db_file = create_db_from_file("simple.gtf", params);
    let database = open_db(&db_file);
    assert_eq!(database.dialect(), &dialect, "The explicit dialect should be stored");

    drop(database);
    let _ = std::fs::remove_file(&db_file);
}

#[test]
fn force_dialect_check_conflicts_with_explicit_dialect() {
    let params = IngestParams {
        dialect: Some(crate::Dialect::gff3()),
        force_dialect_check: true,
        ..IngestParams::default()
    };
    let db_file = crate::utils::temp_file_name("gff-base");
    let result = GFFBase::create(Input::text(PLAIN_GFF3), &db_file, params);
    assert!(result.is_err(), "The two dialect options should be mutually exclusive");
}

#[test]
fn force_gff_disables_inference() {
    let params = IngestParams { force_gff: true, ..IngestParams::default() };
    let db_file = create_db_from_file("simple.gtf", params);
    let database = open_db(&db_file);
    let mut interface = create_interface(&database);

    // No gene or transcript rows are synthesized.
    assert!(interface.features_of_type("transcript").unwrap().is_empty(), "No inferred transcripts");
    assert!(interface.features_of_type("gene").unwrap().is_empty(), "No inferred genes");

    drop(interface);
    drop(database);
    let _ = std::fs::remove_file(&db_file);
}

//-----------------------------------------------------------------------------
