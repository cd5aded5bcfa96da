//! Prompt templates for multiple-choice answering.

use crate::eval::Options;

/// Collection of prompts used by the answering agents.
pub struct Prompts;

impl Prompts {
    /// Grounded prompt: reference passages, then the question and its options.
    pub fn grounded() -> &'static str {
        r#"You are an expert in criminal law. Use the reference passages below, which are excerpts from court judgments, to answer the multiple-choice question.

[Reference passages]
{context}

[Question]
{question}

A. {A}
B. {B}
C. {C}
D. {D}

Respond with exactly one letter (A, B, C or D) and nothing else."#
    }

    /// Closed-book prompt: question and options only.
    pub fn closed_book() -> &'static str {
        r#"You are an expert in criminal law. Answer the multiple-choice question.

[Question]
{question}

A. {A}
B. {B}
C. {C}
D. {D}

Respond with exactly one letter (A, B, C or D) and nothing else."#
    }

    /// Fill a template in one pass; substituted text is never scanned again.
    ///
    /// Unknown `{...}` sequences are copied unchanged.
    pub fn render(template: &str, question: &str, options: &Options, context: &str) -> String {
        let mut out = String::with_capacity(template.len() + question.len() + context.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let tail = &rest[open..];
            let value = tail.find('}').and_then(|close| {
                let value = match &tail[1..close] {
                    "question" => question,
                    "context" => context,
                    "A" => options.a.as_str(),
                    "B" => options.b.as_str(),
                    "C" => options.c.as_str(),
                    "D" => options.d.as_str(),
                    _ => return None,
                };
                Some((value, close))
            });

            match value {
                Some((value, close)) => {
                    out.push_str(value);
                    rest = &tail[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = &tail[1..];
                }
            }
        }
        out.push_str(rest);
        out
    }
}
