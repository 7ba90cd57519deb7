//! Prompt builders for the worker and head generation calls.
//!
//! Both builders are pure: the same inputs always render the same prompt.

use std::fmt::Write as _;

use caselaw_core::types::{Partition, Query, Record, WorkerId};

const WORKER_ROLE: &str = "\
# Role
- You are a law professor specialising in customs law.
- You understand the reasoning of judgments and the intent of the court, and you analyse complex legal questions.
- Answer the user's question in detail using only the documents provided below.
- Cover, where relevant:
    1. A summary of the key content of each judgment
    2. The main legal issues
    3. The court's holding and its grounds
    4. The statutes and precedents the court relied on
- Lead with the conclusion.
- Always cite the precedents you used, formatted as:
    - [case number] title (decision date)
    - e.g. [조심2023관0123] 수입물품 과세가격 결정 관련 (2023.05.15)
- Answer from the documents. If they do not cover the question, say you do not know.
- Answer in the language of the question.
";

const HEAD_ROLE: &str = "\
# Role
- You are a law professor specialising in customs law who consolidates several research reports into one answer.
- Analyse the reports below and produce the single answer that best fits the user's question:
    1. Compare reports built from different sources
    2. Select the most relevant findings
    3. Merge them into one consistent line of argument
    4. Drop duplicated material and emphasise the key points
    5. Stay consistent with the earlier conversation
- Lead with the conclusion.
- Finish with a \"Cited precedents\" section listing every source the reports cite.
- Answer in the language of the question.
";

const HEAD_CLOSING: &str = "\
Combine the worker reports above into the final answer to the question. \
Keep it consistent with the earlier conversation.";

/// Origin label that identifies a worker inside its own prompt.
pub fn origin_label(partition: &Partition) -> String {
    format!("Worker {} ({}, records {}..{})", partition.worker_id, partition.source, partition.start, partition.end)
}

/// Render a worker prompt. `documents` pairs each retrieved record with its
/// corpus index and similarity score, best first.
pub fn worker_prompt(query: &Query, partition: &Partition, documents: &[(usize, &Record, f32)]) -> String {
    let mut out = String::from(WORKER_ROLE);
    push_history(&mut out, query);

    out.push_str("\n# Documents\n");
    for (index, record, score) in documents {
        let _ = writeln!(out, "\n## [{}] score {:.4}", record.display_id(*index), score);
        for (key, value) in &record.fields {
            let _ = writeln!(out, "- {}: {}", key.replace('\n', " "), value);
        }
    }

    let _ = write!(out, "\n# Question\n{}\n\n# Origin\n{}\n", query.text, origin_label(partition));
    out
}

/// Render the head prompt from the successful worker outputs, ordered by id.
pub fn head_prompt(query: &Query, outputs: &[(WorkerId, String)]) -> String {
    let mut out = String::from(HEAD_ROLE);
    push_history(&mut out, query);

    out.push_str("\n# Worker reports\n");
    for (worker_id, text) in outputs {
        let _ = write!(out, "\n## Worker {worker_id}\n{text}\n");
    }

    let _ = write!(out, "\n# Question\n{}\n\n# Instructions\n{}\n", query.text, HEAD_CLOSING);
    out
}

fn push_history(out: &mut String, query: &Query) {
    if query.context.is_empty() { return; }
    out.push_str("\n# Earlier conversation\n");
    out.push_str(query.history().trim_end());
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use caselaw_core::store::build_record;
    use caselaw_core::types::{SourceTag, Turn};

    #[test]
    fn worker_prompt_labels_documents_and_origin() {
        let record = build_record(SourceTag::Precedents, vec![
            ("판례번호".into(), "2023도1907".into()),
            ("판결요지".into(), "밀수입".into()),
        ]);
        let part = Partition { worker_id: 3, source: SourceTag::Precedents, start: 423, end: 545 };
        let query = Query::new("What counts as smuggling?", vec![Turn { user: "hi".into(), assistant: "hello".into() }], 5);

        let prompt = worker_prompt(&query, &part, &[(430, &record, 0.5)]);
        assert!(prompt.contains("## [2023도1907] score 0.5000"));
        assert!(prompt.contains("- 판결요지: 밀수입"));
        assert!(prompt.contains("User: hi"));
        assert!(prompt.contains("Worker 3 (precedents, records 423..545)"));
        assert!(prompt.contains("What counts as smuggling?"));
    }

    #[test]
    fn head_prompt_keeps_worker_order_and_skips_empty_history() {
        let query = Query::without_context("q");
        let prompt = head_prompt(&query, &[(1, "first".into()), (4, "fourth".into())]);
        assert!(!prompt.contains("Earlier conversation"));
        let first = prompt.find("## Worker 1").unwrap();
        let fourth = prompt.find("## Worker 4").unwrap();
        assert!(first < fourth);
        assert!(prompt.ends_with(&format!("{HEAD_CLOSING}\n")));
    }
}
