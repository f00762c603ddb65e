//! Shell escaping and quoting utilities.

/// Escape a value for use inside single quotes.
/// Replaces `'` with `'\''` (end quote, escaped quote, start quote).
pub fn escape_single_quote_content(value: &str) -> String {
    value.replace('\'', "'\\''")
}

/// Quote a single argument for shell execution.
/// - Empty strings become `''`
/// - Strings with shell metacharacters are wrapped in single quotes
/// - Embedded single quotes are escaped
pub fn quote_arg(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }

    // Characters that require quoting
    const SHELL_META: &[char] = &[
        ' ', '\t', '\n', '\'', '"', '\\', '$', '`', '!', '*', '?', '[', ']', '(', ')', '{', '}',
        '<', '>', '|', '&', ';', '#', '~',
    ];

    if !arg.contains(SHELL_META) {
        return arg.to_string();
    }

    format!("'{}'", escape_single_quote_content(arg))
}

/// Quote and join multiple arguments for shell execution.
pub fn quote_args(args: &[String]) -> String {
    args.iter()
        .map(|a| quote_arg(a))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Quote a path for shell execution (always quotes).
pub fn quote_path(path: &str) -> String {
    format!("'{}'", escape_single_quote_content(path))
}

/// Escape a literal for the pattern side of a sed `s/pattern/.../` expression.
/// Characters: \ ^ $ . * [ ] and the delimiter /
pub fn escape_sed_pattern(pattern: &str) -> String {
    let mut escaped = String::new();
    for c in pattern.chars() {
        match c {
            '\\' | '^' | '$' | '.' | '*' | '[' | ']' | '/' => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Escape a literal for the replacement side of a sed `s/.../replacement/` expression.
/// Characters: \ & the delimiter / and embedded newlines.
pub fn escape_sed_replacement(replacement: &str) -> String {
    let mut escaped = String::new();
    for c in replacement.chars() {
        match c {
            '\\' | '&' | '/' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_arg_simple() {
        assert_eq!(quote_arg("updatedb"), "updatedb");
        assert_eq!(quote_arg("/var/www/app"), "/var/www/app");
    }

    #[test]
    fn quote_arg_with_spaces() {
        assert_eq!(quote_arg("Deployed by Jane Doe"), "'Deployed by Jane Doe'");
    }

    #[test]
    fn quote_arg_with_single_quote() {
        assert_eq!(quote_arg("it's"), "'it'\\''s'");
    }

    #[test]
    fn quote_arg_empty() {
        assert_eq!(quote_arg(""), "''");
    }

    #[test]
    fn quote_arg_neutralizes_command_substitution() {
        assert_eq!(quote_arg("$(rm -rf /)"), "'$(rm -rf /)'");
        assert_eq!(quote_arg("a;b"), "'a;b'");
    }

    #[test]
    fn quote_args_mixed() {
        let args = vec!["-m".to_string(), "Deployed by O'Brien".to_string()];
        assert_eq!(quote_args(&args), "-m 'Deployed by O'\\''Brien'");
    }

    #[test]
    fn quote_path_with_quote() {
        assert_eq!(quote_path("/var/www/it's"), "'/var/www/it'\\''s'");
    }

    #[test]
    fn escape_sed_pattern_leaves_tokens_alone() {
        assert_eq!(escape_sed_pattern("%db"), "%db");
        assert_eq!(escape_sed_pattern("%password"), "%password");
    }

    #[test]
    fn escape_sed_pattern_special_chars() {
        assert_eq!(escape_sed_pattern("a.b*"), "a\\.b\\*");
        assert_eq!(escape_sed_pattern("[x]"), "\\[x\\]");
        assert_eq!(escape_sed_pattern("/var"), "\\/var");
    }

    #[test]
    fn escape_sed_replacement_special_chars() {
        assert_eq!(escape_sed_replacement("p&ss/w\\rd"), "p\\&ss\\/w\\\\rd");
        assert_eq!(escape_sed_replacement("plain_value"), "plain_value");
    }
}
