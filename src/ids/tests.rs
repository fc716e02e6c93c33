use super::*;

use std::sync::Arc;

use crate::dialect::Dialect;

//-----------------------------------------------------------------------------

fn feature_from(line: &str) -> Feature {
    let dialect = Arc::new(Dialect::gff3());
    Feature::from_line(line, 1, Some(&dialect), true).unwrap()
}

fn gene(id_attr: Option<&str>) -> Feature {
    match id_attr {
        Some(id) => feature_from(&format!("chr1\ttest\tgene\t100\t200\t.\t+\t.\tID={}", id)),
        None => feature_from("chr1\ttest\tgene\t100\t200\t.\t+\t.\tName=unnamed"),
    }
}

//-----------------------------------------------------------------------------

#[test]
fn auto_spec() {
    let mut counters = Autoincrements::new();
    let spec = IdSpec::Auto;
    assert_eq!(spec.resolve(&gene(Some("g1")), &mut counters), "gene_1", "Wrong first key");
    assert_eq!(spec.resolve(&gene(Some("g2")), &mut counters), "gene_2", "Wrong second key");

    // Counters are per feature type.
    let exon = feature_from("chr1\ttest\texon\t100\t200\t.\t+\t.\tParent=g1");
    assert_eq!(spec.resolve(&exon, &mut counters), "exon_1", "Wrong key for another feature type");
}

#[test]
fn key_spec() {
    let mut counters = Autoincrements::new();
    let spec = IdSpec::Key(String::from("ID"));
    assert_eq!(spec.resolve(&gene(Some("g1")), &mut counters), "g1", "Wrong key from an attribute");

    // A missing attribute falls back to autoincrement.
    assert_eq!(spec.resolve(&gene(None), &mut counters), "gene_1", "Wrong fallback key");
}

#[test]
fn key_list_spec() {
    let mut counters = Autoincrements::new();
    let spec = IdSpec::Keys(vec![String::from("ID"), String::from("Name")]);
    assert_eq!(spec.resolve(&gene(Some("g1")), &mut counters), "g1", "The first key should win");
    assert_eq!(spec.resolve(&gene(None), &mut counters), "unnamed", "The second key should be tried");

    let bare = feature_from("chr1\ttest\tgene\t100\t200\t.\t+\t.\tAlias=x");
    assert_eq!(spec.resolve(&bare, &mut counters), "gene_1", "Wrong fallback key");
}

#[test]
fn by_featuretype_spec() {
    let mut counters = Autoincrements::new();
    let spec = IdSpec::default_gtf();

    let transcript = feature_from("chr1\ttest\ttranscript\t100\t200\t.\t+\t.\ttranscript_id=t1");
    assert_eq!(spec.resolve(&transcript, &mut counters), "t1", "Wrong transcript key");

    // Feature types without a spec autoincrement.
    let exon = feature_from("chr1\ttest\texon\t100\t200\t.\t+\t.\ttranscript_id=t1");
    assert_eq!(spec.resolve(&exon, &mut counters), "exon_1", "Wrong key for an unlisted type");
    assert_eq!(spec.resolve(&exon, &mut counters), "exon_2", "Wrong second key for an unlisted type");
}

#[test]
fn special_field_spec() {
    let mut counters = Autoincrements::new();
    let spec = IdSpec::Key(String::from(":seqid:"));
    assert_eq!(spec.resolve(&gene(Some("g1")), &mut counters), "chr1", "Wrong key from a field");

    let spec = IdSpec::Keys(vec![String::from(":start:")]);
    assert_eq!(spec.resolve(&gene(Some("g1")), &mut counters), "100", "Wrong key from a coordinate");
}

#[test]
fn callable_spec() {
    let mut counters = Autoincrements::new();
    let spec = IdSpec::Func(Box::new(|feature: &Feature| {
        match feature.attributes.first("ID") {
            Some(id) => Some(IdAssignment::Id(format!("{}-custom", id))),
            None => Some(IdAssignment::Autoincrement(String::from("anonymous"))),
        }
    }));
    assert_eq!(spec.resolve(&gene(Some("g1")), &mut counters), "g1-custom", "Wrong callable key");
    assert_eq!(spec.resolve(&gene(None), &mut counters), "anonymous_1", "Wrong sentinel key");
    assert_eq!(spec.resolve(&gene(None), &mut counters), "anonymous_2", "Wrong second sentinel key");
}

#[test]
fn autoincrement_fallback_sequence() {
    // If the id spec never hits, the k-th feature of a type gets key
    // `type_k`, starting from 1.
    let mut counters = Autoincrements::new();
    let spec = IdSpec::Key(String::from("no_such_key"));
    for k in 1..=5 {
        let id = spec.resolve(&gene(Some("g")), &mut counters);
        assert_eq!(id, format!("gene_{}", k), "Wrong fallback key for feature {}", k);
    }
}

#[test]
fn persisted_counters() {
    let mut counters = Autoincrements::from_rows(vec![(String::from("gene"), 7)]);
    assert_eq!(counters.next("gene"), "gene_8", "Numbering should resume after loading");
    let pairs: Vec<(&str, i64)> = counters.iter().collect();
    assert_eq!(pairs, vec![("gene", 8)], "Wrong persisted state");
}

//-----------------------------------------------------------------------------

#[test]
fn merge_strategy_names() {
    for strategy in [
        MergeStrategy::Error,
        MergeStrategy::Warning,
        MergeStrategy::Merge,
        MergeStrategy::CreateUnique,
        MergeStrategy::Replace,
    ] {
        let parsed: MergeStrategy = strategy.to_string().parse().unwrap();
        assert_eq!(parsed, strategy, "Strategy name did not round trip");
    }
    assert!("invalid".parse::<MergeStrategy>().is_err(), "An invalid name should not parse");
}

#[test]
fn gff_field_comparison() {
    let a = feature_from("chr1\ttest\tCDS\t100\t200\t.\t+\t0\tID=c1");
    let b = feature_from("chr1\ttest\tCDS\t100\t200\t.\t+\t0\tID=c1;Note=other");
    assert!(same_gff_fields(&a, &b), "Attribute differences should not matter");

    let c = feature_from("chr1\ttest\tCDS\t150\t200\t.\t+\t0\tID=c1");
    assert!(!same_gff_fields(&a, &c), "A different start should matter");
}

#[test]
fn attribute_merging() {
    let a = feature_from("chr1\ttest\tgene\t100\t200\t.\t+\t.\tID=g1;Alias=x");
    let b = feature_from("chr1\ttest\tgene\t100\t200\t.\t+\t.\tID=g1;Alias=y,x;Note=kept");

    let mut merged = a.attributes.clone();
    merge_attributes(&mut merged, &b.attributes);

    // First occurrence order, new values appended, duplicates dropped.
    let keys: Vec<&str> = merged.keys().collect();
    assert_eq!(keys, vec!["ID", "Alias", "Note"], "Wrong key order after a merge");
    assert_eq!(merged.get("ID").unwrap(), ["g1"], "Duplicate values should be dropped");
    assert_eq!(merged.get("Alias").unwrap(), ["x", "y"], "Wrong merged value order");
    assert_eq!(merged.get("Note").unwrap(), ["kept"], "New keys should be appended");
}

#[test]
fn merge_is_idempotent() {
    let a = feature_from("chr1\ttest\tgene\t100\t200\t.\t+\t.\tID=g1;Alias=x,y");

    // Merging a feature with itself is a no-op.
    let mut merged = a.attributes.clone();
    merge_attributes(&mut merged, &a.attributes);
    assert_eq!(merged, a.attributes, "Self-merge should be a no-op");

    // Merging the same feature again changes nothing further.
    let b = feature_from("chr1\ttest\tgene\t100\t200\t.\t+\t.\tID=g1;Alias=z");
    let mut once = a.attributes.clone();
    merge_attributes(&mut once, &b.attributes);
    let mut twice = once.clone();
    merge_attributes(&mut twice, &b.attributes);
    assert_eq!(twice, once, "Repeated merges should be stable");
}

//-----------------------------------------------------------------------------
