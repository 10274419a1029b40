use std::collections::BTreeMap;

/// Where `$NAME` lookups are resolved: shell variables shadow the process
/// environment.
pub struct Scope<'a> {
    pub variables: &'a BTreeMap<String, String>,
    pub last_exit_code: i32,
}

impl Scope<'_> {
    fn lookup(&self, name: &str) -> String {
        self.variables
            .get(name)
            .cloned()
            .or_else(|| std::env::var(name).ok())
            .unwrap_or_default()
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Replace `$NAME`, `${NAME}`, `$?` and `$$` in one left-to-right pass.
///
/// Runs on the raw line before any parsing, so quotes do not protect a
/// reference and a substituted value containing `|` or `>` is later parsed
/// structurally. Substituted text is never re-scanned.
pub fn substitute(input: &str, scope: &Scope) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }

        match chars.peek() {
            Some(&'?') => {
                chars.next();
                result.push_str(&scope.last_exit_code.to_string());
            }
            Some(&'$') => {
                chars.next();
                result.push_str(&std::process::id().to_string());
            }
            Some(&'{') => {
                let braced: String = chars.clone().skip(1).take_while(|c| *c != '}').collect();
                let closed = chars.clone().nth(1 + braced.chars().count()) == Some('}');
                if closed && !braced.is_empty() {
                    // Skip `{`, the name and `}`.
                    for _ in 0..braced.chars().count() + 2 {
                        chars.next();
                    }
                    result.push_str(&scope.lookup(&braced));
                } else {
                    result.push('$');
                }
            }
            Some(&c) if is_name_start(c) => {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if !is_name_char(c) {
                        break;
                    }
                    name.push(c);
                    chars.next();
                }
                result.push_str(&scope.lookup(&name));
            }
            // Trailing `$` or `$` before a non-name character stays literal.
            _ => result.push('$'),
        }
    }

    result
}

// ── Tilde Expansion ──

/// Replace a leading `~` (alone or followed by a path separator) with the
/// home directory. `~user` is left untouched.
pub fn expand_home(token: &str) -> String {
    if token == "~" {
        return home_dir();
    }
    if token.starts_with("~/") || token.starts_with("~\\") {
        return format!("{}{}", home_dir(), &token[1..]);
    }
    token.to_string()
}

pub fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()
        .or_else(|| dirs::home_dir().map(|path| path.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "~".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand(input: &str, vars: &[(&str, &str)], last_exit_code: i32) -> String {
        let variables = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        substitute(input, &Scope { variables: &variables, last_exit_code })
    }

    #[test]
    fn tilde_alone() {
        let expanded = expand_home("~");
        assert!(!expanded.is_empty());
        assert_ne!(expanded, "~");
    }

    #[test]
    fn tilde_with_path() {
        let expanded = expand_home("~/projects");
        assert!(expanded.ends_with("/projects"));
        assert!(!expanded.starts_with('~'));
    }

    #[test]
    fn tilde_in_middle_not_expanded() {
        assert_eq!(expand_home("foo~bar"), "foo~bar");
        assert_eq!(expand_home("~other"), "~other");
    }

    #[test]
    fn shell_variable_simple_and_braced() {
        let vars = [("NAME", "world")];
        assert_eq!(expand("hello $NAME", &vars, 0), "hello world");
        assert_eq!(expand("${NAME}!", &vars, 0), "world!");
        assert_eq!(expand("$NAME_x", &vars, 0), "");
    }

    #[test]
    fn shell_variable_shadows_environment() {
        unsafe { std::env::set_var("JSHELL_SHADOW_TEST", "from-env") };
        assert_eq!(expand("$JSHELL_SHADOW_TEST", &[], 0), "from-env");
        assert_eq!(
            expand("$JSHELL_SHADOW_TEST", &[("JSHELL_SHADOW_TEST", "from-shell")], 0),
            "from-shell"
        );
        unsafe { std::env::remove_var("JSHELL_SHADOW_TEST") };
    }

    #[test]
    fn undefined_is_empty() {
        assert_eq!(expand("[$DEFINITELY_NOT_SET_XYZ123]", &[], 0), "[]");
    }

    #[test]
    fn no_recursive_expansion() {
        let vars = [("A", "$B"), ("B", "nope")];
        assert_eq!(expand("$A", &vars, 0), "$B");
    }

    #[test]
    fn value_with_pipe_is_left_for_the_parser() {
        let vars = [("P", "ls | wc")];
        assert_eq!(expand("$P -l", &vars, 0), "ls | wc -l");
    }

    #[test]
    fn quotes_do_not_protect_references() {
        assert_eq!(expand("'$X'", &[("X", "1")], 0), "'1'");
    }

    #[test]
    fn exit_code_and_pid() {
        assert_eq!(expand("$?", &[], 42), "42");
        let pid: u32 = expand("$$", &[], 0).parse().expect("$$ should be a number");
        assert!(pid > 0);
    }

    #[test]
    fn literal_dollars() {
        assert_eq!(expand("price$", &[], 0), "price$");
        assert_eq!(expand("$+foo", &[], 0), "$+foo");
        assert_eq!(expand("$1", &[], 0), "$1");
        assert_eq!(expand("${unterminated", &[], 0), "${unterminated");
        assert_eq!(expand("${}", &[], 0), "${}");
    }
}
