use regex::Regex;
use std::sync::OnceLock;

fn fence_re() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+#.-]*)[^\n]*\n(.*?)```").ok())
        .as_ref()
}

/// Pulls candidate code out of a model reply.
///
/// Prefers the first fenced block tagged with `language` (or a common alias),
/// then the first fenced block of any tag, then the trimmed reply. A fence that is
/// opened but never closed (truncated reply) contributes everything after its
/// opening line.
pub fn extract_code(reply: &str, language: &str) -> String {
    let Some(re) = fence_re() else {
        return unclosed_fence_body(reply);
    };

    let mut first_any: Option<&str> = None;
    for cap in re.captures_iter(reply) {
        let tag = cap.get(1).map(|m| m.as_str()).unwrap_or("");
        let body = cap.get(2).map(|m| m.as_str()).unwrap_or("");
        if language_matches(tag, language) {
            return body.trim_end().to_string();
        }
        first_any.get_or_insert(body);
    }
    match first_any {
        Some(body) => body.trim_end().to_string(),
        None => unclosed_fence_body(reply),
    }
}

fn unclosed_fence_body(reply: &str) -> String {
    let Some(open) = reply.find("```") else {
        return reply.trim().to_string();
    };
    let after = &reply[open..];
    match after.find('\n') {
        Some(nl) => after[nl + 1..].trim().to_string(),
        None => String::new(),
    }
}

fn language_matches(tag: &str, language: &str) -> bool {
    if tag.is_empty() {
        return false;
    }
    let tag = tag.to_ascii_lowercase();
    let language = language.to_ascii_lowercase();
    if tag == language {
        return true;
    }
    let alias = match language.as_str() {
        "python" => &["py", "python3"][..],
        "typescript" => &["ts", "tsx"][..],
        "javascript" => &["js", "jsx", "node"][..],
        "golang" | "go" => &["go", "golang"][..],
        "rust" => &["rs"][..],
        "csharp" | "dotnet" => &["cs", "c#", "csharp"][..],
        "java" => &["java"][..],
        "ruby" => &["rb"][..],
        "php" => &["php"][..],
        _ => &[][..],
    };
    alias.contains(&tag.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfenced_reply_is_trimmed() {
        assert_eq!(extract_code("\n  x = 1\n", "python"), "x = 1");
    }

    #[test]
    fn first_fenced_block_is_used() {
        let reply = "Sure!\n```\nprint(1)\n```\nand also\n```\nprint(2)\n```";
        assert_eq!(extract_code(reply, "python"), "print(1)");
    }

    #[test]
    fn language_tagged_block_wins() {
        let reply = "```bash\npip install sdk\n```\n\n```py\n@workflow.defn\nclass W: ...\n```";
        assert_eq!(extract_code(reply, "python"), "@workflow.defn\nclass W: ...");
    }

    #[test]
    fn unterminated_fence_drops_the_opening_line() {
        let reply = "Here you go:\n```go\npackage main\n\nfunc Run() {}\n";
        assert_eq!(extract_code(reply, "go"), "package main\n\nfunc Run() {}");
    }

    #[test]
    fn bare_opening_fence_is_empty() {
        assert_eq!(extract_code("```python", "python"), "");
    }
}
