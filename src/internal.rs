use crate::{FeatureInterface, GFFBase, IngestParams, Input};
use crate::utils;

use std::path::{Path, PathBuf};

//-----------------------------------------------------------------------------

// Test utilities shared by the database and pipeline tests.

pub(crate) fn create_db_from_file(filename: &'static str, params: IngestParams) -> PathBuf {
    let gff_file = utils::get_test_data(filename);
    let db_file = utils::temp_file_name("gff-base");
    assert!(!utils::file_exists(&db_file), "Database {} already exists", db_file.display());
    let result = GFFBase::create_from_file(&gff_file, &db_file, params);
    assert!(result.is_ok(), "Failed to create a database from {}: {}", filename, result.unwrap_err());
    db_file
}

pub(crate) fn create_db_from_text(text: &str, params: IngestParams) -> PathBuf {
    let db_file = utils::temp_file_name("gff-base");
    assert!(!utils::file_exists(&db_file), "Database {} already exists", db_file.display());
    let result = GFFBase::create(Input::text(text), &db_file, params);
    assert!(result.is_ok(), "Failed to create a database from text: {}", result.unwrap_err());
    db_file
}

pub(crate) fn open_db(filename: &Path) -> GFFBase {
    let database = GFFBase::open(filename);
    assert!(database.is_ok(), "Failed to open database: {}", database.unwrap_err());
    database.unwrap()
}

pub(crate) fn create_interface(database: &GFFBase) -> FeatureInterface<'_> {
    let interface = FeatureInterface::new(database);
    assert!(interface.is_ok(), "Failed to create a feature interface: {}", interface.unwrap_err());
    interface.unwrap()
}

//-----------------------------------------------------------------------------

// Queries with assertions on the error paths.

pub(crate) fn feature_by_id(interface: &mut FeatureInterface, id: &str) -> crate::Feature {
    let feature = interface.feature(id);
    assert!(feature.is_ok(), "Failed to get feature {}: {}", id, feature.unwrap_err());
    let feature = feature.unwrap();
    assert!(feature.is_some(), "Missing feature {}", id);
    feature.unwrap()
}

pub(crate) fn children_of(
    interface: &mut FeatureInterface,
    id: &str,
    level: Option<u32>,
    featuretype: Option<&str>,
) -> Vec<crate::Feature> {
    let children = interface.children(id, level, featuretype);
    assert!(children.is_ok(), "Failed to get children of {}: {}", id, children.unwrap_err());
    children.unwrap()
}

pub(crate) fn ids_of(features: &[crate::Feature]) -> Vec<&str> {
    features.iter().map(|feature| feature.id.as_deref().unwrap()).collect()
}

//-----------------------------------------------------------------------------
