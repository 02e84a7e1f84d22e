//! Prompt templates for file summaries, commit summaries, and answers.

use crate::models::FileReference;

/// Separator between per-file blocks in the answer context.
pub const CONTEXT_DELIMITER: &str = "\n\n---\n\n";

/// Placed in the context slot when retrieval found nothing.
pub const EMPTY_CONTEXT_NOTICE: &str =
    "(No indexed files matched this question. The repository may not be indexed yet.)";

/// Diff text beyond this many characters is cut before summarization.
const MAX_DIFF_CHARS: usize = 12_000;

pub fn file_summary_prompt(file_name: &str, content: &str) -> String {
    format!(
        "You are a senior software engineer onboarding a new teammate.\n\
         Explain the purpose of the file `{file_name}` in no more than 100 words.\n\
         Focus on what it does and how it fits into the project, not on syntax.\n\n\
         ---\n{content}\n---"
    )
}

pub fn commit_summary_prompt(diff: &str) -> String {
    let diff = truncate_chars(diff, MAX_DIFF_CHARS);
    format!(
        "You are an expert programmer summarizing a git diff.\n\
         Lines starting with `+` were added, lines starting with `-` were removed,\n\
         other lines are context.\n\
         Write at most five short bullet points describing the change.\n\
         Mention file names in brackets when it helps, e.g. [src/lib.rs].\n\n\
         {diff}"
    )
}

/// Answer prompt: restrict the model to the supplied context and ask it to
/// cite file names.
pub fn answer_prompt(question: &str, context: &str) -> String {
    format!(
        "You are an AI code assistant answering questions about a codebase.\n\
         Answer ONLY from the context below. If the context does not contain the\n\
         answer, say that you don't know rather than guessing.\n\
         Cite file names when they are relevant to the answer.\n\n\
         START CONTEXT BLOCK\n{context}\nEND OF CONTEXT BLOCK\n\n\
         START QUESTION\n{question}\nEND OF QUESTION"
    )
}

/// Concatenate retrieval hits into the context block, highest similarity
/// first. Source code is cut to `preview_chars` characters.
pub fn build_context(sources: &[FileReference], preview_chars: usize) -> String {
    if sources.is_empty() {
        return EMPTY_CONTEXT_NOTICE.to_string();
    }

    sources
        .iter()
        .map(|s| {
            format!(
                "File: {}\nSummary: {}\nCode:\n{}",
                s.file_name,
                s.summary,
                truncate_chars(&s.source_code, preview_chars)
            )
        })
        .collect::<Vec<_>>()
        .join(CONTEXT_DELIMITER)
}

/// Cut `text` to at most `max` characters without splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(name: &str, code: &str) -> FileReference {
        FileReference {
            file_name: name.to_string(),
            summary: format!("summary of {name}"),
            source_code: code.to_string(),
            similarity: 0.5,
        }
    }

    #[test]
    fn test_context_preserves_order_and_format() {
        let ctx = build_context(&[reference("a.ts", "A"), reference("b.ts", "B")], 100);
        assert_eq!(
            ctx,
            "File: a.ts\nSummary: summary of a.ts\nCode:\nA\n\n---\n\nFile: b.ts\nSummary: summary of b.ts\nCode:\nB"
        );
    }

    #[test]
    fn test_context_empty_uses_notice() {
        assert_eq!(build_context(&[], 100), EMPTY_CONTEXT_NOTICE);
    }

    #[test]
    fn test_context_truncates_code_only() {
        let ctx = build_context(&[reference("a.ts", "abcdefgh")], 3);
        assert!(ctx.ends_with("Code:\nabc"));
        assert!(ctx.contains("summary of a.ts"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }

    #[test]
    fn test_answer_prompt_contains_question_and_context() {
        let p = answer_prompt("what does add do?", "File: a.ts");
        assert!(p.contains("what does add do?"));
        assert!(p.contains("File: a.ts"));
        assert!(p.contains("ONLY from the context"));
    }
}
