use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use caselaw_core::config::FingerprintMode;
use caselaw_core::store::build_record;
use caselaw_core::types::{Corpus, Partition, SourceTag};
use caselaw_core::Error;
use caselaw_index::cache::{self, CacheMiss};
use caselaw_index::lookup;
use caselaw_index::{fit, load_or_build, search, AnalyzerParams, Fingerprint, LookupHit, MatchedField, PrecedentLookup, Provenance};

const REASONS: &[&str] = &[
    "수입신고 시 과세가격을 낮게 신고하여 관세를 포탈",
    "원산지 표시를 허위로 기재한 물품의 통관",
    "보세구역 반출 신고 누락에 따른 가산세 부과",
    "관세 환급 신청 서류 위조 사건",
    "customs declaration violation on undervalued imports",
    "smuggling of tobacco through the bonded warehouse",
    "tariff classification dispute for machine parts",
    "penalty tax assessed after late payment of duties",
    "refund claim denied for re-exported goods",
    "origin certificate forged for preferential tariff",
];

fn ruling(id: &str, reason: &str) -> caselaw_core::types::Record {
    build_record(SourceTag::Rulings, vec![
        ("사건번호".to_string(), id.to_string()),
        ("판결이유".to_string(), reason.to_string()),
    ])
}

fn precedent(id: &str, body: &str) -> caselaw_core::types::Record {
    build_record(SourceTag::Precedents, vec![
        ("판례번호".to_string(), id.to_string()),
        ("내용".to_string(), body.to_string()),
    ])
}

fn ten_docs() -> Corpus {
    let rulings = REASONS[..4].iter().enumerate().map(|(i, r)| ruling(&format!("A{i}"), r)).collect();
    let precedents = REASONS[4..].iter().enumerate().map(|(i, r)| precedent(&format!("B{i}"), r)).collect();
    Corpus::new(rulings, precedents)
}

fn whole(corpus: &Corpus) -> Partition {
    Partition { worker_id: 1, source: SourceTag::Rulings, start: 0, end: corpus.len() }
}

fn write_sources(dir: &Path) -> (PathBuf, PathBuf) {
    let a = dir.join("rulings.json");
    let b = dir.join("precedents.json");
    fs::write(&a, r#"[{"사건번호": "A0", "판결이유": "관세 포탈"}]"#).unwrap();
    fs::write(&b, r#"[{"판례번호": "B0", "내용": "밀수입"}]"#).unwrap();
    (a, b)
}

#[test]
fn own_text_is_the_best_match() {
    let corpus = ten_docs();
    let index = fit(&corpus, &AnalyzerParams::default(), Fingerprint("t".into()));
    assert_eq!(index.len(), 10);

    for i in 0..corpus.len() {
        let query = index.transform(&corpus.get(i).unwrap().raw_text);
        let hits = search(&index, &query, &whole(&corpus), 3).unwrap();
        assert_eq!(hits[0].doc, i, "doc {i} should rank itself first");
        assert!((hits[0].score - 1.0).abs() < 1e-4, "self score was {}", hits[0].score);
    }
}

#[test]
fn retrieval_is_deterministic() {
    let corpus = ten_docs();
    let params = AnalyzerParams::default();
    let a = fit(&corpus, &params, Fingerprint("t".into()));
    let b = fit(&corpus, &params, Fingerprint("t".into()));
    assert_eq!(a, b);

    let q = a.transform("customs declaration violation");
    let first = search(&a, &q, &whole(&corpus), 5).unwrap();
    let second = search(&b, &b.transform("customs declaration violation"), &whole(&corpus), 5).unwrap();
    assert_eq!(first, second);
    assert_eq!(first[0].doc, 4);
}

#[test]
fn hits_stay_inside_the_partition() {
    let corpus = ten_docs();
    let index = fit(&corpus, &AnalyzerParams::default(), Fingerprint("t".into()));
    let q = index.transform("customs declaration violation");
    let part = Partition { worker_id: 2, source: SourceTag::Rulings, start: 0, end: 4 };

    let hits = search(&index, &q, &part, 10).unwrap();
    assert!(hits.iter().all(|h| h.doc < 4));
    assert!(hits.iter().all(|h| h.score > 0.0));
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn equal_scores_order_by_index() {
    let twin = Corpus::new(
        vec![ruling("X", "duplicate reasoning text"), ruling("X", "duplicate reasoning text")],
        vec![],
    );
    // every n-gram appears in both documents, so nothing may be pruned
    let params = AnalyzerParams { max_df: 1.0, ..AnalyzerParams::default() };
    let index = fit(&twin, &params, Fingerprint("t".into()));
    let q = index.transform("duplicate reasoning");
    let hits = search(&index, &q, &whole(&twin), 2).unwrap();
    assert_eq!(hits.iter().map(|h| h.doc).collect::<Vec<_>>(), vec![0, 1]);
    assert_eq!(hits[0].score, hits[1].score);

    assert!(search(&index, &q, &whole(&twin), 0).unwrap().is_empty());
}

#[test]
fn unknown_query_returns_nothing() {
    let corpus = ten_docs();
    let index = fit(&corpus, &AnalyzerParams::default(), Fingerprint("t".into()));
    let q = index.transform("ㅋㅋ");
    assert!(q.is_zero());
    assert!(search(&index, &q, &whole(&corpus), 5).unwrap().is_empty());
}

#[test]
fn out_of_range_partition_is_rejected() {
    let corpus = ten_docs();
    let index = fit(&corpus, &AnalyzerParams::default(), Fingerprint("t".into()));
    let bad = Partition { worker_id: 1, source: SourceTag::Precedents, start: 8, end: 12 };
    let err = search(&index, &index.transform("tariff"), &bad, 5).unwrap_err();
    assert!(matches!(err, Error::InvalidPartition { start: 8, end: 12, len: 10 }));
}

#[test]
fn max_features_keeps_most_frequent() {
    let corpus = ten_docs();
    let params = AnalyzerParams { max_features: 16, ..AnalyzerParams::default() };
    let index = fit(&corpus, &params, Fingerprint("t".into()));
    assert_eq!(index.n_features(), 16);
    assert_eq!(index.idf.len(), 16);
    let mut ids: Vec<u32> = index.vocabulary.values().copied().collect();
    ids.sort_unstable();
    assert_eq!(ids, (0..16).collect::<Vec<u32>>());
}

#[test]
fn max_df_keeps_terms_at_the_boundary() {
    let rulings = (0..10)
        .map(|i| {
            let body = if i < 9 { format!("zq xw doc{i}") } else { format!("xw doc{i}") };
            ruling(&format!("A{i}"), &body)
        })
        .collect();
    let corpus = Corpus::new(rulings, vec![]);
    let index = fit(&corpus, &AnalyzerParams::default(), Fingerprint("t".into()));
    // 9 of 10 documents is exactly 0.9 and stays; 10 of 10 is above it
    assert!(index.vocabulary.contains_key("zq"));
    assert!(!index.vocabulary.contains_key("xw"));
}

#[test]
fn fingerprint_follows_file_changes() {
    let tmp = tempfile::tempdir().unwrap();
    let (a, b) = write_sources(tmp.path());
    let forward = [a.as_path(), b.as_path()];
    let reversed = [b.as_path(), a.as_path()];
    for mode in [FingerprintMode::Metadata, FingerprintMode::Content] {
        let first = cache::fingerprint(&forward, mode).unwrap();
        assert_eq!(first, cache::fingerprint(&forward, mode).unwrap());
        assert_ne!(first, cache::fingerprint(&reversed, mode).unwrap());
    }

    let before = cache::fingerprint(&forward, FingerprintMode::Metadata).unwrap();
    fs::write(&a, r#"[{"사건번호": "A0", "판결이유": "관세 포탈 사건 추가"}]"#).unwrap();
    assert_ne!(before, cache::fingerprint(&forward, FingerprintMode::Metadata).unwrap());

    let missing = tmp.path().join("gone.json");
    assert!(matches!(
        cache::fingerprint(&[a.as_path(), missing.as_path()], FingerprintMode::Metadata),
        Err(Error::DataFileMissing(_))
    ));
}

fn touch(path: &Path, secs: u64) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs)).unwrap();
}

#[test]
fn metadata_fingerprint_sees_mtime_and_size_separately() {
    let tmp = tempfile::tempdir().unwrap();
    let (a, b) = write_sources(tmp.path());
    let sources = [a.as_path(), b.as_path()];

    touch(&a, 1_700_000_000);
    let original = cache::fingerprint(&sources, FingerprintMode::Metadata).unwrap();

    // same length, later mtime
    let len = fs::metadata(&a).unwrap().len();
    fs::write(&a, r#"[{"사건번호": "A1", "판결이유": "관세 포탈"}]"#).unwrap();
    assert_eq!(fs::metadata(&a).unwrap().len(), len);
    touch(&a, 1_700_000_100);
    let mtime_only = cache::fingerprint(&sources, FingerprintMode::Metadata).unwrap();
    assert_ne!(original, mtime_only);

    // different length, same mtime
    fs::write(&a, r#"[{"사건번호": "A1", "판결이유": "관세 포탈 재심"}]"#).unwrap();
    touch(&a, 1_700_000_100);
    let size_only = cache::fingerprint(&sources, FingerprintMode::Metadata).unwrap();
    assert_ne!(mtime_only, size_only);
}

#[test]
fn cache_round_trip_and_misses() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("cache").join("index.bin.zst");
    let params = AnalyzerParams::default();
    let fp = Fingerprint("abc".into());

    assert_eq!(cache::load(&path, &fp, &params).unwrap_err(), CacheMiss::Absent);

    let index = fit(&ten_docs(), &params, fp.clone());
    cache::save(&path, &index).unwrap();
    assert_eq!(cache::load(&path, &fp, &params).unwrap(), index);

    let other = Fingerprint("def".into());
    assert!(matches!(cache::load(&path, &other, &params), Err(CacheMiss::Stale(_))));

    let narrower = AnalyzerParams { ngram_max: 3, ..params.clone() };
    assert!(matches!(cache::load(&path, &fp, &narrower), Err(CacheMiss::Stale(_))));

    fs::write(&path, b"not an index").unwrap();
    assert!(matches!(cache::load(&path, &fp, &params), Err(CacheMiss::Corrupt(_))));

    let mut truncated = b"CLIX".to_vec();
    truncated.extend_from_slice(&2u32.to_le_bytes());
    truncated.extend_from_slice(&[0x28, 0xb5, 0x2f]);
    fs::write(&path, truncated).unwrap();
    assert!(matches!(cache::load(&path, &fp, &params), Err(CacheMiss::Corrupt(_))));
}

#[test]
fn load_or_build_reuses_then_rebuilds() {
    let tmp = tempfile::tempdir().unwrap();
    let (a, b) = write_sources(tmp.path());
    let cache_path = tmp.path().join("index.bin.zst");
    let corpus = ten_docs();
    let params = AnalyzerParams::default();
    let sources = [a.as_path(), b.as_path()];

    let (built, how) = load_or_build(&corpus, &sources, &cache_path, FingerprintMode::Content, &params).unwrap();
    assert_eq!(how, Provenance::Built(CacheMiss::Absent));
    assert!(cache_path.exists());

    let (cached, how) = load_or_build(&corpus, &sources, &cache_path, FingerprintMode::Content, &params).unwrap();
    assert_eq!(how, Provenance::Cache);
    assert_eq!(cached, built);

    fs::write(&b, r#"[{"판례번호": "B0", "내용": "밀수입 및 관세 포탈"}]"#).unwrap();
    let (_, how) = load_or_build(&corpus, &sources, &cache_path, FingerprintMode::Content, &params).unwrap();
    assert!(matches!(how, Provenance::Built(CacheMiss::Stale(_))));

    let smaller = Corpus::new(vec![ruling("A0", REASONS[0])], vec![]);
    let (rebuilt, how) = load_or_build(&smaller, &sources, &cache_path, FingerprintMode::Content, &params).unwrap();
    assert!(matches!(how, Provenance::Built(CacheMiss::Stale(_))));
    assert_eq!(rebuilt.len(), 1);
}

fn fields(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
}

fn lookup_corpus() -> Corpus {
    let rulings = vec![
        build_record(SourceTag::Rulings, fields(&[
            ("사건명", "경정청구거부처분취소"),
            ("사건번호", "대전지법2023구합208027"),
            ("선고일자\n(종결일자)", "2024-12-19"),
            ("결과", "국가승"),
            ("처분청", "대전세관"),
        ])),
        build_record(SourceTag::Rulings, fields(&[
            ("사건명", "관세등경정거부처분취소"),
            ("사건번호", "인천지법2023구합58668"),
            ("선고일자\n(종결일자)", "2024-12-12"),
            ("결과", "국가승"),
            ("처분청", "인천공항세관"),
        ])),
    ];
    let precedents = vec![
        build_record(SourceTag::Precedents, fields(&[
            ("제목", "관세법위반·의료기기법위반"),
            ("판례번호", "[대법원 2025. 2. 13. 선고 2023도1907 판결]"),
            ("선고일자", "2025-02-13"),
            ("법원명", "대법원"),
            ("사건유형", "관세법위반"),
        ])),
        build_record(SourceTag::Precedents, fields(&[
            ("제목", "관세등부과처분취소"),
            ("판례번호", "[대법원 2024. 4. 16. 선고 2021두36196 판결]"),
            ("선고일자", "2024-04-16"),
            ("법원명", "대법원"),
            ("사건유형", "관세등부과처분취소"),
        ])),
    ];
    Corpus::new(rulings, precedents)
}

fn source_of(corpus: &Corpus, hit: &LookupHit) -> SourceTag { corpus.get(hit.doc).unwrap().source }

#[test]
fn lookup_by_identifier() {
    let corpus = lookup_corpus();
    let lookup = PrecedentLookup::new().unwrap();
    let find = |q: &str| lookup.find(q, &corpus, 20, 30.0);

    let by_case = find("2023구합208027");
    assert_eq!(by_case[0].doc, 0);
    assert!(by_case[0].score >= 85.0);
    assert_eq!(by_case[0].matched, vec![(MatchedField::CaseNumber, 85.0)]);

    let by_precedent = find("2023도1907");
    assert_eq!(source_of(&corpus, &by_precedent[0]), SourceTag::Precedents);
    assert!(by_precedent[0].score >= 90.0);

    let by_customs = find("인천공항세관");
    assert_eq!(by_customs.iter().map(|h| h.doc).collect::<Vec<_>>(), vec![1]);
    assert_eq!(by_customs[0].matched, vec![(MatchedField::Customs, 100.0)]);

    let by_court = find("대법원");
    assert!(!by_court.is_empty());
    assert!(by_court.iter().all(|h| source_of(&corpus, h) == SourceTag::Precedents));
}

#[test]
fn lookup_by_date_ranks_exact_first() {
    let corpus = lookup_corpus();
    let lookup = PrecedentLookup::new().unwrap();
    let hits = lookup.find("2024-12-19", &corpus, 20, 30.0);
    let ranked: Vec<(usize, f64)> = hits.iter().map(|h| (h.doc, h.score)).collect();
    assert_eq!(ranked, vec![(0, 100.0), (1, 70.0), (3, 40.0)]);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));

    let strict = lookup.find("2024-12-19", &corpus, 20, 50.0);
    assert!(strict.iter().all(|h| h.score >= 50.0));
    assert_eq!(strict.len(), 2);
    assert_eq!(lookup.find("2024-12-19", &corpus, 1, 30.0).len(), 1);
}

#[test]
fn several_matching_fields_add_a_bonus() {
    let corpus = lookup_corpus();
    let lookup = PrecedentLookup::new().unwrap();
    let hits = lookup.find("대법원 2023도1907 2025-02-13", &corpus, 20, 30.0);
    assert_eq!(hits[0].doc, 2);
    assert_eq!(hits[0].score, 100.0);
    let fields: Vec<MatchedField> = hits[0].matched.iter().map(|(f, _)| *f).collect();
    assert_eq!(fields, vec![MatchedField::PrecedentNumber, MatchedField::Date, MatchedField::Court]);
}

#[test]
fn lookup_without_identifiers_finds_nothing() {
    let corpus = lookup_corpus();
    let lookup = PrecedentLookup::new().unwrap();
    assert!(lookup.find("xyz123abc", &corpus, 20, 30.0).is_empty());
    assert!(lookup.find("2024", &corpus, 20, 0.0).is_empty());
}

#[test]
fn lookup_titles() {
    let corpus = lookup_corpus();
    let ruling = lookup::title(corpus.get(0).unwrap());
    assert!(ruling.contains("대전지법2023구합208027") && ruling.contains("경정청구거부처분취소"));
    let precedent = lookup::title(corpus.get(2).unwrap());
    assert_eq!(precedent, "[대법원 2025. 2. 13. 선고 2023도1907 판결] 관세법위반·의료기기법위반");
}
