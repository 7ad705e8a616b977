//! Fenced code block extraction.
//!
//! Every rule family below is evaluated first-match-wins in the order it is
//! declared. Reordering changes results: component detection must beat an
//! explicit tag, and a named function must beat a class.

use std::sync::LazyLock;

use agentgate_core::{Artifact, ArtifactKind};
use regex_lite::Regex;

use crate::compile_all;

/// Language label for component-style UI code.
pub const UI_COMPONENT_LABEL: &str = "React/JSX";

const FALLBACK_TITLE: &str = "Code Artifact";
const MAX_FALLBACK_TITLE_CHARS: usize = 50;

/// Opening fence with optional tag, body, closing fence.
static FENCE: LazyLock<Vec<Regex>> = LazyLock::new(|| compile_all(&[r"(?s)```[ \t]*([^\n`]*)\n(.*?)```"]));

static UI_COMPONENT: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        // import of a UI framework
        r#"import\s+[^;]*?from\s+['"](react|react-dom|preact|solid-js)['"]"#,
        r"\bimport\s+React\b",
        // named function whose body returns markup
        r"(?s)function\s+[A-Za-z_$][\w$]*\s*\([^)]*\)\s*\{.*?return\s*\(?\s*<[A-Za-z>]",
        // arrow function returning markup directly
        r"=>\s*\(?\s*<[A-Za-z>]",
        // arrow function with a block body returning markup
        r"(?s)=>\s*\{.*?return\s*\(?\s*<[A-Za-z>]",
    ])
});

static TITLE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"\bfunction\s+([A-Za-z_$][\w$]*)",
        r"\bconst\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\s*)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*=>",
        r"\bexport\s+default\s+(?:function\s+)?([A-Za-z_$][\w$]*)",
        r"\bclass\s+([A-Za-z_$][\w$]*)",
        r"\bdef\s+([A-Za-z_]\w*)",
    ])
});

/// Extract one artifact per non-empty fenced block, in document order.
pub fn extract_artifacts(text: &str) -> Vec<Artifact> {
    let Some(fence) = FENCE.first() else {
        return Vec::new();
    };

    fence
        .captures_iter(text)
        .filter_map(|caps| {
            let tag = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
            let content = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            if content.trim().is_empty() {
                return None;
            }
            let content = content.trim_end_matches('\n').to_string();

            let tag = (!tag.is_empty()).then_some(tag);
            let language = detect_language(&content, tag);
            let title = extract_title(&content, &language);
            let kind = classify_kind(&language);

            Some(Artifact {
                content,
                language,
                title,
                kind,
            })
        })
        .collect()
}

/// Normalize an explicit fence tag through the alias table.
///
/// Unknown tags pass through trimmed and lower-cased.
pub fn resolve_language(tag: &str) -> String {
    let tag = tag.trim().to_lowercase();
    let alias = match tag.as_str() {
        "javascript" => "js",
        "typescript" => "ts",
        "python" | "python3" => "py",
        "c++" => "cpp",
        "shell" | "sh" | "zsh" => "bash",
        "ruby" => "rb",
        "markdown" => "md",
        "yml" => "yaml",
        "golang" => "go",
        "csharp" | "c#" => "cs",
        "rust" => "rs",
        _ => return tag,
    };
    alias.to_string()
}

/// Decide the language of a block's content.
///
/// Component-style UI code wins over everything, including an explicit tag.
/// Otherwise an explicit tag is resolved through the alias table, and an
/// untagged block falls through textual heuristics.
pub fn detect_language(content: &str, tag: Option<&str>) -> String {
    if is_ui_component(content) {
        return UI_COMPONENT_LABEL.to_string();
    }

    if let Some(tag) = tag.filter(|t| !t.trim().is_empty()) {
        return resolve_language(tag);
    }

    let label = if content.contains("def ") && content.contains(':') && !content.contains("import") {
        "python"
    } else if content.contains("function")
        || content.contains("=>")
        || content.contains("let ")
        || content.contains("const ")
    {
        "javascript"
    } else if content.contains("public class") || content.contains("System.out.println") {
        "java"
    } else if content.contains("#include") || content.contains("std::") {
        "cpp"
    } else if content.contains("package") && content.contains("func") {
        "go"
    } else {
        "code"
    };
    label.to_string()
}

fn is_ui_component(content: &str) -> bool {
    UI_COMPONENT.iter().any(|re| re.is_match(content))
}

/// Infer a human-readable title for a block.
pub fn extract_title(content: &str, language: &str) -> String {
    let captured = TITLE
        .iter()
        .find_map(|re| re.captures(content).and_then(|c| c.get(1)))
        .map(|m| m.as_str().to_string());

    if let Some(name) = captured {
        if language == UI_COMPONENT_LABEL {
            return capitalize(&name);
        }
        return name;
    }

    first_line_title(content).unwrap_or_else(|| FALLBACK_TITLE.to_string())
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_lowercase() => first.to_uppercase().chain(chars).collect(),
        _ => name.to_string(),
    }
}

fn first_line_title(content: &str) -> Option<String> {
    let line = content.lines().find(|l| !l.trim().is_empty())?.trim();

    let line = ["<!--", "/*", "//", "--", "#", "*", ";"]
        .iter()
        .find_map(|marker| line.strip_prefix(marker))
        .unwrap_or(line);
    let line = ["-->", "*/"]
        .iter()
        .find_map(|marker| line.strip_suffix(marker))
        .unwrap_or(line)
        .trim();

    (!line.is_empty() && line.chars().count() < MAX_FALLBACK_TITLE_CHARS).then(|| line.to_string())
}

/// Map a resolved language to an artifact kind. Total over all strings.
pub fn classify_kind(language: &str) -> ArtifactKind {
    match language.trim().to_lowercase().as_str() {
        "html" | "htm" => ArtifactKind::Html,
        "svg" => ArtifactKind::Svg,
        "mermaid" => ArtifactKind::Mermaid,
        "latex" | "tex" => ArtifactKind::Latex,
        _ => ArtifactKind::Code,
    }
}
