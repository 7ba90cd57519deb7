//! Identifier lookup: find records by case number, precedent number, decision
//! date, court or customs office named in the query.
//!
//! Each identifying field of a record is scored 0..=100 against the query.
//! A record's score is the weighted mean of its non-zero field scores plus a
//! bonus when several fields match, capped at 100.

use chrono::NaiveDate;
use regex::{Captures, Regex};
use std::fmt;
use tracing::debug;

use caselaw_core::error::{Error, Result};
use caselaw_core::types::{Corpus, Record, SourceTag};

const CASE_NUMBER: &str = r"([가-힣]+(?:지법|고법|대법원))?([0-9]{4})([가-힣]+)([0-9]+)";
const PRECEDENT_FULL: &str =
    r"\[([가-힣]+)\s+([0-9]{4})\.\s*([0-9]{1,2})\.\s*([0-9]{1,2})\.\s*선고\s+([0-9]{4}[가-힣]+[0-9]+)\s*판결\]";
const CASE_ID: &str = r"([0-9]{4})([가-힣]+)([0-9]+)";
const DATES: &[&str] = &[
    r"([0-9]{4})-([0-9]{1,2})-([0-9]{1,2})",
    r"([0-9]{4})\.([0-9]{1,2})\.([0-9]{1,2})",
    r"([0-9]{4})\s+([0-9]{1,2})\.\s*([0-9]{1,2})",
    r"([0-9]{4})년\s*([0-9]{1,2})월\s*([0-9]{1,2})일",
    r"([0-9]{4})([0-9]{2})([0-9]{2})",
];

/// Canonical court name followed by every spelling that maps to it. The first
/// entry whose spelling occurs in the text wins.
const COURTS: &[(&str, &[&str])] = &[
    ("대법원", &["대법원"]),
    ("서울고법", &["서울고등법원", "서울고법"]),
    ("서울고등법원", &["서울고등법원", "서울고법"]),
    ("부산고법", &["부산고등법원", "부산고법"]),
    ("부산고등법원", &["부산고등법원", "부산고법"]),
    ("대구고법", &["대구고등법원", "대구고법"]),
    ("대구고등법원", &["대구고등법원", "대구고법"]),
    ("광주고법", &["광주고등법원", "광주고법"]),
    ("광주고등법원", &["광주고등법원", "광주고법"]),
    ("대전고법", &["대전고등법원", "대전고법"]),
    ("대전고등법원", &["대전고등법원", "대전고법"]),
    ("서울중앙지법", &["서울중앙지방법원", "서울중앙지법"]),
    ("서울지법", &["서울중앙지방법원", "서울지법"]),
    ("인천지법", &["인천지방법원", "인천지법"]),
    ("인천지방법원", &["인천지방법원", "인천지법"]),
    ("수원지법", &["수원지방법원", "수원지법"]),
    ("수원지방법원", &["수원지방법원", "수원지법"]),
    ("부산지법", &["부산지방법원", "부산지법"]),
    ("부산지방법원", &["부산지방법원", "부산지법"]),
    ("대구지법", &["대구지방법원", "대구지법"]),
    ("대구지방법원", &["대구지방법원", "대구지법"]),
    ("대전지법", &["대전지방법원", "대전지법"]),
    ("대전지방법원", &["대전지방법원", "대전지법"]),
    ("광주지법", &["광주지방법원", "광주지법"]),
    ("광주지방법원", &["광주지방법원", "광주지법"]),
    ("울산지법", &["울산지방법원", "울산지법"]),
    ("울산지방법원", &["울산지방법원", "울산지법"]),
    ("창원지법", &["창원지방법원", "창원지법"]),
    ("창원지방법원", &["창원지방법원", "창원지법"]),
    ("의정부지법", &["의정부지방법원", "의정부지법"]),
    ("의정부지방법원", &["의정부지방법원", "의정부지법"]),
];

const CUSTOMS_OFFICES: &[(&str, &[&str])] = &[
    ("인천공항세관", &["인천공항세관", "인천공항"]),
    ("인천세관", &["인천세관"]),
    ("서울세관", &["서울세관", "서울본부세관"]),
    ("부산세관", &["부산세관", "부산본부세관"]),
    ("대전세관", &["대전세관"]),
    ("대구세관", &["대구세관"]),
    ("광주세관", &["광주세관"]),
    ("평택세관", &["평택세관"]),
    ("천안세관", &["천안세관"]),
];

const RULING_DATE_FIELD: &str = "선고일자\n(종결일자)";
const PRECEDENT_DATE_FIELD: &str = "선고일자";
const COURT_FIELD: &str = "법원명";
const CUSTOMS_FIELD: &str = "처분청";

const ID_WEIGHT: f64 = 0.6;
const SIDE_WEIGHT: f64 = 0.2;

/// `대전지법2023구합208027`: optional court prefix, year, case kind, serial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseNumber {
    pub court: String,
    pub year: String,
    pub kind: String,
    pub number: String,
}

impl CaseNumber {
    pub fn full(&self) -> String { format!("{}{}", self.court, self.core()) }

    /// Year, kind and serial without the court.
    pub fn core(&self) -> String { format!("{}{}{}", self.year, self.kind, self.number) }
}

/// `[대법원 2025. 2. 13. 선고 2023도1907 판결]`, or a bare `2023도1907`
/// (then `court` and `date` are empty).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecedentNumber {
    pub court: String,
    pub date: String,
    pub case_id: String,
    pub full: String,
}

/// A court or customs office recognized in free text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedEntity {
    /// The spelling that matched, or the whole text for a partial match.
    pub input: String,
    pub canonical: &'static str,
    pub is_alias: bool,
}

/// Identifying field of a record that contributed to a lookup score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedField {
    CaseNumber,
    PrecedentNumber,
    Date,
    Court,
    Customs,
}

impl MatchedField {
    fn weight(self) -> f64 {
        match self {
            MatchedField::CaseNumber | MatchedField::PrecedentNumber => ID_WEIGHT,
            MatchedField::Date | MatchedField::Court | MatchedField::Customs => SIDE_WEIGHT,
        }
    }
}

impl fmt::Display for MatchedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchedField::CaseNumber => "사건번호",
            MatchedField::PrecedentNumber => "판례번호",
            MatchedField::Date => "선고일자",
            MatchedField::Court => "법원명",
            MatchedField::Customs => "처분청",
        })
    }
}

/// One record found by `PrecedentLookup::find`.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupHit {
    pub doc: usize,
    pub score: f64,
    pub matched: Vec<(MatchedField, f64)>,
}

/// Compiled detectors. Build once and share.
pub struct PrecedentLookup {
    case_number: Regex,
    precedent_full: Regex,
    case_id: Regex,
    dates: Vec<Regex>,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::Operation(format!("lookup pattern: {e}")))
}

impl PrecedentLookup {
    pub fn new() -> Result<Self> {
        Ok(Self {
            case_number: compile(CASE_NUMBER)?,
            precedent_full: compile(PRECEDENT_FULL)?,
            case_id: compile(CASE_ID)?,
            dates: DATES.iter().map(|p| compile(p)).collect::<Result<_>>()?,
        })
    }

    pub fn detect_case_number(&self, text: &str) -> Option<CaseNumber> {
        let caps = self.case_number.captures(text)?;
        Some(CaseNumber {
            court: group(&caps, 1),
            year: group(&caps, 2),
            kind: group(&caps, 3),
            number: group(&caps, 4),
        })
    }

    pub fn detect_precedent_number(&self, text: &str) -> Option<PrecedentNumber> {
        if let Some(caps) = self.precedent_full.captures(text) {
            return Some(PrecedentNumber {
                court: group(&caps, 1),
                date: format!("{}-{:0>2}-{:0>2}", group(&caps, 2), group(&caps, 3), group(&caps, 4)),
                case_id: group(&caps, 5),
                full: group(&caps, 0),
            });
        }
        let id = self.case_id.find(text)?.as_str().to_string();
        Some(PrecedentNumber { court: String::new(), date: String::new(), case_id: id.clone(), full: id })
    }

    /// Every valid calendar date in `text` as `YYYY-MM-DD`, first occurrence
    /// order, without duplicates.
    pub fn detect_dates(&self, text: &str) -> Vec<String> {
        let mut found = Vec::new();
        for re in &self.dates {
            for caps in re.captures_iter(text) {
                let (y, m, d) = (group(&caps, 1), group(&caps, 2), group(&caps, 3));
                let valid = match (y.parse::<i32>(), m.parse::<u32>(), d.parse::<u32>()) {
                    (Ok(y), Ok(m), Ok(d)) => NaiveDate::from_ymd_opt(y, m, d).is_some(),
                    _ => false,
                };
                let date = format!("{y}-{m:0>2}-{d:0>2}");
                if valid && !found.contains(&date) { found.push(date); }
            }
        }
        found
    }

    pub fn case_number_score(&self, query: &str, target: &str) -> f64 {
        let (Some(q), Some(t)) = (self.detect_case_number(query), self.detect_case_number(target)) else { return 0.0 };
        if q.full() == t.full() { return 100.0; }
        let (qc, tc) = (q.core(), t.core());
        if qc == tc { return if q.court.is_empty() { 85.0 } else { 90.0 }; }
        if qc.contains(&tc) || tc.contains(&qc) { return 70.0; }
        if q.number == t.number { return 50.0; }
        0.0
    }

    pub fn precedent_number_score(&self, query: &str, target: &str) -> f64 {
        let (Some(q), Some(t)) = (self.detect_precedent_number(query), self.detect_precedent_number(target)) else {
            return 0.0;
        };
        if compact(query) == compact(target) { return 100.0; }
        if q.case_id == t.case_id { return 90.0; }
        let same_year = q.case_id.get(..4) == t.case_id.get(..4);
        let same_kind = case_kind(&q.case_id).is_some() && case_kind(&q.case_id) == case_kind(&t.case_id);
        if same_year && same_kind { 60.0 } else { 0.0 }
    }

    fn record_fields(&self, query: &str, record: &Record) -> Vec<(MatchedField, f64)> {
        let mut matched = Vec::new();
        let mut push = |field: MatchedField, score: f64| {
            if score > 0.0 { matched.push((field, score)); }
        };
        let (date_field, side_field) = match record.source {
            SourceTag::Rulings => {
                if let Some(id) = record.field(SourceTag::Rulings.id_field()) {
                    push(MatchedField::CaseNumber, self.case_number_score(query, id));
                }
                (RULING_DATE_FIELD, CUSTOMS_FIELD)
            }
            SourceTag::Precedents => {
                if let Some(id) = record.field(SourceTag::Precedents.id_field()) {
                    push(MatchedField::PrecedentNumber, self.precedent_number_score(query, id));
                }
                (PRECEDENT_DATE_FIELD, COURT_FIELD)
            }
        };
        if let Some(target) = record.field(date_field) {
            let best = self.detect_dates(query).iter().map(|d| date_score(d, target)).fold(0.0, f64::max);
            push(MatchedField::Date, best);
        }
        if let Some(target) = record.field(side_field) {
            match record.source {
                SourceTag::Rulings if detect_customs(query).is_some() => {
                    push(MatchedField::Customs, name_score(query, target, CUSTOMS_OFFICES));
                }
                SourceTag::Precedents if detect_court(query).is_some() => {
                    push(MatchedField::Court, name_score(query, target, COURTS));
                }
                _ => {}
            }
        }
        matched
    }

    /// Score one record against `query`; fields that scored zero are omitted.
    pub fn score(&self, query: &str, record: &Record) -> (f64, Vec<(MatchedField, f64)>) {
        let matched = self.record_fields(query, record);
        if matched.is_empty() { return (0.0, matched); }
        let weight: f64 = matched.iter().map(|(f, _)| f.weight()).sum();
        let base = matched.iter().map(|(f, s)| s * f.weight()).sum::<f64>() / weight;
        let bonus = match matched.len() {
            1 => 0.0,
            2 => 5.0,
            _ => 10.0,
        };
        ((base + bonus).min(100.0), matched)
    }

    /// Records scoring at least `min_score`, best first; equal scores keep
    /// corpus order. At most `top_k` are returned.
    pub fn find(&self, query: &str, corpus: &Corpus, top_k: usize, min_score: f64) -> Vec<LookupHit> {
        let mut hits: Vec<LookupHit> = corpus
            .records()
            .iter()
            .enumerate()
            .filter_map(|(doc, record)| {
                let (score, matched) = self.score(query, record);
                (score > 0.0 && score >= min_score).then_some(LookupHit { doc, score, matched })
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        debug!(query, hits = hits.len(), "identifier lookup");
        hits
    }
}

fn group(caps: &Captures<'_>, i: usize) -> String {
    caps.get(i).map(|m| m.as_str().to_string()).unwrap_or_default()
}

/// Lowercased text with everything but letters, digits and `_` removed.
pub fn compact(text: &str) -> String {
    text.chars().filter(|c| c.is_alphanumeric() || *c == '_').flat_map(char::to_lowercase).collect()
}

fn case_kind(case_id: &str) -> Option<String> {
    let kind: String = case_id.chars().skip_while(char::is_ascii_digit).take_while(|c| !c.is_ascii_digit()).collect();
    (!kind.is_empty()).then_some(kind)
}

/// Score a normalized `YYYY-MM-DD` (or shorter `YYYY-MM`, `YYYY`) query date
/// against a stored date: exact 100, same month 70, same year 40.
pub fn date_score(query_date: &str, target: &str) -> f64 {
    if query_date.is_empty() || target.is_empty() { return 0.0; }
    if compact(query_date) == compact(target) { return 100.0; }
    let q: Vec<&str> = query_date.split('-').collect();
    let t: Vec<&str> = if target.contains('-') { target.split('-').collect() } else { target.split('.').collect() };
    if q[0] != t[0] { return 0.0; }
    match (q.get(1), t.get(1)) {
        (Some(qm), Some(tm)) if format!("{qm:0>2}") == format!("{tm:0>2}") => 70.0,
        _ => 40.0,
    }
}

fn detect_name(text: &str, table: &'static [(&'static str, &'static [&'static str])]) -> Option<NamedEntity> {
    if text.is_empty() { return None; }
    for &(canonical, spellings) in table {
        if let Some(&hit) = spellings.iter().find(|s| text.contains(**s)) {
            return Some(NamedEntity { input: hit.to_string(), canonical, is_alias: hit != canonical });
        }
    }
    let lower = text.to_lowercase();
    table
        .iter()
        .find(|(_, spellings)| spellings.iter().any(|s| lower.contains(*s) || s.contains(lower.as_str())))
        .map(|&(canonical, _)| NamedEntity { input: text.to_string(), canonical, is_alias: true })
}

pub fn detect_court(text: &str) -> Option<NamedEntity> { detect_name(text, COURTS) }

pub fn detect_customs(text: &str) -> Option<NamedEntity> { detect_name(text, CUSTOMS_OFFICES) }

fn name_score(query: &str, target: &str, table: &'static [(&'static str, &'static [&'static str])]) -> f64 {
    if query.is_empty() || target.is_empty() { return 0.0; }
    let (Some(q), Some(t)) = (detect_name(query, table), detect_name(target, table)) else {
        let (q, t) = (compact(query), compact(target));
        if q == t { return 100.0; }
        return if t.contains(&q) { 70.0 } else { 0.0 };
    };
    if q.canonical == t.canonical {
        return if !q.is_alias && !t.is_alias { 100.0 } else { 95.0 };
    }
    if q.canonical.contains(t.canonical) || t.canonical.contains(q.canonical) { 70.0 } else { 0.0 }
}

pub fn court_score(query: &str, target: &str) -> f64 { name_score(query, target, COURTS) }

pub fn customs_score(query: &str, target: &str) -> f64 { name_score(query, target, CUSTOMS_OFFICES) }

/// One-line heading for a record: `[id] name (date)` for rulings,
/// `[precedent number] title` for precedents.
pub fn title(record: &Record) -> String {
    let get = |name: &str| record.field(name).unwrap_or("N/A");
    match record.source {
        SourceTag::Rulings => format!("[{}] {} ({})", get("사건번호"), get("사건명"), get(RULING_DATE_FIELD)),
        SourceTag::Precedents => {
            let number = get("판례번호");
            let number = number.strip_prefix('[').and_then(|n| n.strip_suffix(']')).unwrap_or(number);
            format!("[{}] {}", number, get("제목"))
        }
    }
}
