//! Display normalisation for streamed answers
//!
//! The model answers in markdown; the chat bubble shows plain text. Every
//! rewrite below only removes characters, so applying the whole pass until
//! nothing changes terminates and makes `clean` idempotent.

use regex::Regex;
use std::sync::OnceLock;

struct Rules {
    fences: Regex,
    links: Regex,
    headings: Regex,
    strong: Regex,
    em_star: Regex,
    em_underscore: Regex,
    blank_lines: Regex,
    spaces: Regex,
}

fn rules() -> &'static Rules {
    static RULES: OnceLock<Rules> = OnceLock::new();
    RULES.get_or_init(|| Rules {
        fences: compile(r"```[A-Za-z0-9_+-]*"),
        links: compile(r"\[([^\]\n]*)\]\([^)\n]*\)"),
        headings: compile(r"(?m)^[ \t]*#{1,6}[ \t]+"),
        strong: compile(r"\*\*|__"),
        em_star: compile(r"\*([^*\n]+)\*"),
        em_underscore: compile(r"(^|[\s(])_([^_\n]+)_"),
        blank_lines: compile(r"\n{3,}"),
        spaces: compile(r" {2,}"),
    })
}

fn compile(pattern: &str) -> Regex {
    // Patterns are literals above; a failure here is a programming error
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid clean pattern {pattern}: {e}"))
}

/// Strip markdown decoration and collapse whitespace for display
pub fn clean(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = clean_pass(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn clean_pass(text: &str) -> String {
    let r = rules();
    let out = r.fences.replace_all(text, "");
    let out = r.links.replace_all(&out, "$1");
    let out = r.headings.replace_all(&out, "");
    let out = r.strong.replace_all(&out, "");
    let out = r.em_star.replace_all(&out, "$1");
    let out = r.em_underscore.replace_all(&out, "$1$2");
    let out = r.blank_lines.replace_all(&out, "\n\n");
    let out = r.spaces.replace_all(&out, " ");
    out.trim().to_string()
}
