//! Command-template token substitution.
//!
//! Three forms are honored: `{NAME}`, `${NAME}`, and bare `$NAME`.

use std::collections::HashMap;

/// Replace every occurrence of each form for each key in `tokens` within
/// `template`.
pub fn render(template: &str, tokens: &HashMap<&str, String>) -> String {
    let mut out = template.to_string();
    for (name, value) in tokens {
        out = out.replace(&format!("{{{name}}}"), value);
        out = out.replace(&format!("${{{name}}}"), value);
        out = replace_bare(&out, name, value);
    }
    out
}

/// Replace a bare `$NAME` reference, refusing to swallow a following
/// identifier character so `$TASK_ID` isn't eaten by a substitution meant
/// for `$TASK`.
fn replace_bare(input: &str, name: &str, value: &str) -> String {
    let pattern = format!("${name}");
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(idx) = rest.find(&pattern) {
        let (before, after_match) = rest.split_at(idx);
        let after = &after_match[pattern.len()..];
        out.push_str(before);
        let next_is_ident = after.chars().next().is_some_and(|c| c.is_alphanumeric() || c == '_');
        if next_is_ident {
            out.push_str(&pattern);
        } else {
            out.push_str(value);
        }
        rest = after;
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_brace_and_dollar_brace_forms() {
        let mut tokens = HashMap::new();
        tokens.insert("ROLE", "developer".to_string());
        assert_eq!(render("do {ROLE} work", &tokens), "do developer work");
        assert_eq!(render("do ${ROLE} work", &tokens), "do developer work");
    }

    #[test]
    fn renders_bare_dollar_form_without_swallowing_longer_token() {
        let mut tokens = HashMap::new();
        tokens.insert("TASK", "fix-bug".to_string());
        tokens.insert("TASK_ID", "t-42".to_string());
        let rendered = render("$TASK ($TASK_ID)", &tokens);
        assert_eq!(rendered, "fix-bug (t-42)");
    }

    #[test]
    fn leaves_unknown_tokens_untouched() {
        let tokens = HashMap::new();
        assert_eq!(render("echo {UNKNOWN}", &tokens), "echo {UNKNOWN}");
    }
}
