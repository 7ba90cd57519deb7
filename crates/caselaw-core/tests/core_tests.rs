use std::fs;
use tempfile::TempDir;

use caselaw_core::config::{Config, FingerprintMode, Settings};
use caselaw_core::store::DocumentStore;
use caselaw_core::types::{Query, SourceTag, Turn};
use caselaw_core::Error;
use figment::providers::{Format, Toml};
use figment::Figment;

fn write_sources(dir: &std::path::Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let a = dir.join("rulings.json");
    let b = dir.join("precedents.json");
    fs::write(&a, r#"[
        {"사건번호": "대전지법2023구합208027", "선고일자\n(종결일자)": "2024-12-19", "판결이유": "수입신고 가격 누락", "결과": "국가승"},
        {"사건번호": "인천지법2023구합58668", "판결주문": "원고의 청구를 기각한다", "처분청": null}
    ]"#).unwrap();
    fs::write(&b, r#"[
        {"제목": "관세법위반", "판례번호": "[대법원 2025. 2. 13. 선고 2023도1907 판결]", "판결요지": "밀수입 행위"},
        {"제목": "관세등부과처분취소", "선고일자": 20240416}
    ]"#).unwrap();
    (a, b)
}

#[test]
fn load_orders_source_a_before_source_b() {
    let tmp = TempDir::new().unwrap();
    let (a, b) = write_sources(tmp.path());
    let corpus = DocumentStore::new().load(&a, &b).expect("load");

    assert_eq!(corpus.len(), 4);
    assert_eq!(corpus.boundary(), 2);
    assert_eq!(corpus.source_range(SourceTag::Precedents), 2..4);
    assert_eq!(corpus.get(0).unwrap().source, SourceTag::Rulings);
    assert_eq!(corpus.get(3).unwrap().source, SourceTag::Precedents);
    assert_eq!(corpus.get(0).unwrap().id.as_deref(), Some("대전지법2023구합208027"));
    // null values are dropped, numbers are stringified, file order is kept
    let second = corpus.get(1).unwrap();
    assert!(second.field("처분청").is_none());
    assert_eq!(corpus.get(3).unwrap().field("선고일자"), Some("20240416"));
    let keys: Vec<&str> = corpus.get(0).unwrap().fields.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["사건번호", "선고일자\n(종결일자)", "판결이유", "결과"]);
    // non-indexing fields stay out of raw_text
    assert!(!corpus.get(0).unwrap().raw_text.contains("국가승"));
    assert!(corpus.get(0).unwrap().raw_text.contains("수입신고 가격 누락"));
}

#[test]
fn missing_source_file_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let (a, _) = write_sources(tmp.path());
    let err = DocumentStore::new().load(&a, &tmp.path().join("nope.json")).unwrap_err();
    assert!(matches!(err, Error::DataFileMissing(p) if p.ends_with("nope.json")));
}

#[test]
fn non_array_source_is_invalid_data() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("bad.json");
    fs::write(&path, r#"{"not": "an array"}"#).unwrap();
    let err = DocumentStore::new().load_source(&path, SourceTag::Rulings).unwrap_err();
    assert!(matches!(err, Error::InvalidData { .. }));
}

#[test]
fn query_keeps_most_recent_turns() {
    let turns: Vec<Turn> = (0..7).map(|i| Turn { user: format!("q{i}"), assistant: format!("a{i}") }).collect();
    let q = Query::new("next", turns, 3);
    assert_eq!(q.context.len(), 3);
    assert_eq!(q.context[0].user, "q4");
    assert_eq!(q.context[2].user, "q6");
    assert!(q.history().starts_with("User: q4\n\nAssistant: a4"));
}

#[test]
fn settings_defaults_and_overrides() {
    let tmp = TempDir::new().unwrap();
    let figment = Figment::new().merge(Toml::string(
        r#"
        [retrieval]
        top_k = 8
        [index]
        fingerprint = "content"
        [data]
        cache_path = "cache/idx.bin.zst"
        "#,
    ));
    let config = Config::from_figment(figment, tmp.path());
    let settings = config.settings().expect("settings");
    assert_eq!(settings.retrieval.top_k, 8);
    assert_eq!(config.get::<usize>("retrieval.top_k").unwrap(), 8);
    assert_eq!(settings.index.fingerprint, FingerprintMode::Content);
    assert_eq!(settings.index.ngram_min, 2);
    assert_eq!(settings.planner.source_b_workers, 4);
    assert_eq!(settings.data.cache(config.base_dir()), tmp.path().join("cache/idx.bin.zst"));
    settings.validate().expect("valid");
}

#[test]
fn settings_validation_rejects_bad_values() {
    let mut s = Settings::default();
    s.index.max_df = 0.0;
    assert!(matches!(s.validate(), Err(Error::InvalidConfig(_))));
    let mut s = Settings::default();
    s.index.ngram_min = 5;
    assert!(s.validate().is_err());
    let mut s = Settings::default();
    s.retrieval.top_k = 0;
    assert!(s.validate().is_err());
    let mut s = Settings::default();
    s.lookup.min_score = 120.0;
    assert!(s.validate().is_err());
    assert_eq!(Settings::default().lookup.min_score, 30.0);
}

#[test]
fn load_from_reads_config_file_and_validates() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("config.toml"), "[planner]\nsource_a_workers = 3\n").unwrap();
    let config = Config::load_from(tmp.path()).expect("config");
    assert_eq!(config.settings().unwrap().planner.source_a_workers, 3);

    fs::write(tmp.path().join("config.toml"), "[retrieval]\ntop_k = 0\n").unwrap();
    assert!(Config::load_from(tmp.path()).is_err());
}
