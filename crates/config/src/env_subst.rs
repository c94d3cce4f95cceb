/// Expand `${NAME}` placeholders in raw config text.
///
/// A variable that isn't set stays in place, so the parse error (or the
/// loaded value) points at exactly what was missing.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

/// Expansion with an injectable lookup, so tests don't have to mutate
/// the process environment.
fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 2..];
        let Some(end) = tail.find('}') else {
            // Unclosed placeholder: keep the remainder verbatim.
            out.push_str(&rest[start..]);
            return out;
        };

        let name = &tail[..end];
        match lookup(name) {
            Some(value) if !name.is_empty() => out.push_str(&value),
            _ => {
                out.push_str("${");
                out.push_str(name);
                out.push('}');
            },
        }
        rest = &tail[end + 1..];
    }

    out.push_str(rest);
    out
}
