//! Deterministic summaries used when the model is unavailable.
//!
//! Document summaries name the file, its language, size, and the first few
//! top-level declarations. Commit summaries classify the first line of the
//! commit message by keyword and prefix it with a category marker.

use crate::models::file_name_of;

const MAX_DECLARATIONS: usize = 5;

/// Language label for a path, by extension.
pub fn language_of(path: &str) -> &'static str {
    let ext = file_name_of(path)
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "rs" => "Rust",
        "ts" | "tsx" => "TypeScript",
        "js" | "jsx" | "mjs" | "cjs" => "JavaScript",
        "py" => "Python",
        "go" => "Go",
        "java" => "Java",
        "kt" => "Kotlin",
        "rb" => "Ruby",
        "php" => "PHP",
        "c" | "h" => "C",
        "cpp" | "cc" | "hpp" => "C++",
        "cs" => "C#",
        "swift" => "Swift",
        "md" => "Markdown",
        "json" => "JSON",
        "toml" => "TOML",
        "yaml" | "yml" => "YAML",
        "sql" => "SQL",
        "sh" => "shell",
        "css" | "scss" => "stylesheet",
        "html" => "HTML",
        _ => "source",
    }
}

/// Summary built from the file name, language, and declared names.
pub fn document_summary(path: &str, content: &str) -> String {
    let name = file_name_of(path);
    let lines = content.lines().count();
    let decls = declarations(content);

    let mut out = format!(
        "{} is a {} file with {} line{}.",
        name,
        language_of(path),
        lines,
        if lines == 1 { "" } else { "s" }
    );
    if decls.is_empty() {
        out.push_str(" No top-level declarations were detected.");
    } else {
        out.push_str(&format!(" Declares: {}.", decls.join(", ")));
    }
    out
}

/// Names introduced by function, type, and constant declarations, in file
/// order, at most [`MAX_DECLARATIONS`] and without duplicates.
fn declarations(content: &str) -> Vec<String> {
    const PREFIXES: &[&str] = &[
        "export default function ",
        "export async function ",
        "export function ",
        "export class ",
        "export interface ",
        "export const ",
        "export type ",
        "async function ",
        "function ",
        "pub async fn ",
        "pub(crate) fn ",
        "pub fn ",
        "async fn ",
        "fn ",
        "pub struct ",
        "struct ",
        "pub enum ",
        "enum ",
        "pub trait ",
        "trait ",
        "async def ",
        "def ",
        "class ",
        "interface ",
        "func ",
        "const ",
    ];

    let mut found: Vec<String> = Vec::new();
    for line in content.lines() {
        let line = line.trim_start();
        let Some(rest) = PREFIXES.iter().find_map(|p| line.strip_prefix(p)) else {
            continue;
        };
        let ident: String = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '$')
            .collect();
        if ident.is_empty() || found.contains(&ident) {
            continue;
        }
        found.push(ident);
        if found.len() == MAX_DECLARATIONS {
            break;
        }
    }
    found
}

/// Keyword summary of a commit message.
///
/// Categories are tested in a fixed order and the first match wins; merge
/// commits are recognized before anything else.
pub fn commit_summary(message: &str) -> String {
    let first_line = message.lines().next().unwrap_or("").trim();
    let subject = if first_line.is_empty() {
        "(no commit message)"
    } else {
        first_line
    };

    let lower = first_line.to_lowercase();
    if lower.starts_with("merge") {
        return format!("🔀 Merge: {subject}");
    }

    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let has = |keys: &[&str]| words.iter().any(|w| keys.contains(w));

    let label = if has(&["fix", "fixes", "fixed", "bug", "bugfix", "hotfix", "patch"]) {
        "🐛 Bug fix"
    } else if has(&["feat", "feature", "add", "adds", "added", "implement", "introduce"]) {
        "✨ Feature"
    } else if has(&["refactor", "refactored", "cleanup", "restructure"]) {
        "♻️ Refactor"
    } else if has(&["docs", "doc", "readme", "documentation"]) {
        "📝 Docs"
    } else if has(&["test", "tests", "testing", "spec"]) {
        "✅ Tests"
    } else if has(&["style", "format", "fmt", "lint"]) {
        "💄 Style"
    } else if has(&["perf", "performance", "optimize", "speed"]) {
        "⚡ Performance"
    } else if has(&["deps", "dependency", "dependencies", "bump", "upgrade"]) {
        "📦 Dependencies"
    } else if has(&["chore", "ci", "build", "release"]) {
        "🔧 Chore"
    } else {
        "📌 Update"
    };

    format!("{label}: {subject}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_summary_lists_declarations() {
        let content = "import x from 'y'\n\nexport function add(a, b) {}\nexport class Calc {}\n";
        let s = document_summary("src/math.ts", content);
        assert!(s.starts_with("math.ts is a TypeScript file with 4 lines."));
        assert!(s.contains("Declares: add, Calc."));
    }

    #[test]
    fn test_document_summary_without_declarations() {
        let s = document_summary("README.md", "# Title");
        assert_eq!(
            s,
            "README.md is a Markdown file with 1 line. No top-level declarations were detected."
        );
    }

    #[test]
    fn test_declarations_capped_and_deduplicated() {
        let content = "fn a() {}\nfn a() {}\nfn b() {}\nfn c() {}\nfn d() {}\nfn e() {}\nfn f() {}";
        assert_eq!(declarations(content), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_commit_categories() {
        assert_eq!(commit_summary("fix: crash on start"), "🐛 Bug fix: fix: crash on start");
        assert!(commit_summary("Add login page").starts_with("✨ Feature"));
        assert!(commit_summary("Bump serde to 1.0.200").starts_with("📦 Dependencies"));
        assert!(commit_summary("whatever").starts_with("📌 Update"));
    }

    #[test]
    fn test_merge_checked_first() {
        assert!(commit_summary("Merge pull request #4 from fix/bug").starts_with("🔀 Merge"));
    }

    #[test]
    fn test_keywords_match_whole_words() {
        // "prefix" contains "fix" but is not the word "fix".
        assert!(commit_summary("rename prefix option").starts_with("📌 Update"));
    }

    #[test]
    fn test_uses_first_line_only() {
        assert_eq!(
            commit_summary("docs: update readme\n\nlong body with fix"),
            "📝 Docs: docs: update readme"
        );
    }

    #[test]
    fn test_empty_message() {
        assert_eq!(commit_summary(""), "📌 Update: (no commit message)");
    }
}
