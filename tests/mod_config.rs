use docmap::config::{CONFIG_ENV, OdmConfig};
use docmap::{Model, OdmError};
use std::io::Write;
use std::path::PathBuf;

const SAMPLE: &str = r#"
[logging]
dir = "logs"
level = "debug"
retention = 3

[models.User]
collection = "people"
database = "main"
field_map = { fake = "real", x = "location.x" }
map_id = false
auto_timestamp = false
write_concern = 0
sort = ["name", "-email"]
required_fields = ["name"]
"#;

fn write_temp(contents: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    f
}

#[test]
fn parses_every_model_option() {
    let cfg = OdmConfig::from_toml_str(SAMPLE).unwrap();
    assert_eq!(cfg.logging.dir, Some(PathBuf::from("logs")));
    assert_eq!(cfg.logging.level.as_deref(), Some("debug"));
    assert_eq!(cfg.logging.retention, Some(3));

    let user = cfg.model("User");
    assert_eq!(user.collection_name(), "people");
    assert_eq!(user.database, "main");
    assert!(!user.map_id);
    assert!(user.effective_field_map().get("id").is_none());
    assert_eq!(user.effective_field_map().get("x"), Some("location.x"));
    assert!(!user.auto_timestamp);
    assert_eq!(user.write_concern, 0);
    assert_eq!(user.sort, vec!["name", "-email"]);
    assert_eq!(user.required_fields, vec!["name"]);
}

#[test]
fn missing_tables_fall_back_to_defaults() {
    let cfg = OdmConfig::from_toml_str("").unwrap();
    assert!(cfg.models.is_empty());
    let m = cfg.model("Post");
    assert_eq!(m.collection_name(), "posts");
    assert_eq!(m.database, "default");
    assert!(m.auto_timestamp);
}

#[test]
fn from_path_and_explicit_discovery() {
    let f = write_temp(SAMPLE);
    let a = OdmConfig::from_path(f.path()).unwrap();
    let b = OdmConfig::discover(Some(f.path())).unwrap();
    assert_eq!(a, b);
    assert!(b.models.contains_key("User"));
}

#[test]
fn explicit_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");
    assert!(matches!(OdmConfig::discover(Some(missing.as_path())), Err(OdmError::Config(_))));
    assert!(matches!(OdmConfig::from_path(&missing), Err(OdmError::Io(_))));
}

#[test]
fn bad_toml_is_reported() {
    let f = write_temp("[models.User]\nwrite_concern = \"high\"\n");
    assert!(matches!(OdmConfig::from_path(f.path()), Err(OdmError::Toml(_))));
}

#[test]
fn environment_variable_is_searched_after_explicit_path() {
    let f = write_temp("[models.Env]\ncollection = \"from_env\"\n");
    // SAFETY: no other test in this binary reads or writes this variable.
    unsafe { std::env::set_var(CONFIG_ENV, f.path()) };
    let paths = OdmConfig::search_paths(None);
    assert_eq!(paths.first().map(PathBuf::as_path), Some(f.path()));
    let cfg = OdmConfig::discover(None).unwrap();
    assert_eq!(cfg.model("Env").collection_name(), "from_env");
    unsafe { std::env::remove_var(CONFIG_ENV) };
}

#[test]
fn configured_model_translates_with_its_map() {
    let cfg = OdmConfig::from_toml_str(SAMPLE).unwrap();
    let m = Model::new(cfg.model("User"), std::sync::Arc::new(docmap::MemoryCollection::new("people")));
    let q = m.query_builder().build(&docmap::Fields::new().with("x__gt", 1)).unwrap();
    assert_eq!(q.into_document(), bson::doc! { "location.x": { "$gt": 1 } });
}
