/// A file a standard stream is redirected to or from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub path: String,
    /// `>>` / `2>>`: open for append instead of truncating. Always false for
    /// input redirection.
    pub append: bool,
}

impl Redirect {
    pub fn truncate(path: impl Into<String>) -> Self {
        Self { path: path.into(), append: false }
    }

    pub fn append(path: impl Into<String>) -> Self {
        Self { path: path.into(), append: true }
    }
}

/// One command within a pipeline.
///
/// `args[0]` is the command name. The background flag is only ever set on
/// the final stage of a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stage {
    pub args: Vec<String>,
    pub input: Option<Redirect>,
    pub output: Option<Redirect>,
    pub error: Option<Redirect>,
    pub background: bool,
}

impl Stage {
    pub fn program(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    /// The stage's words joined for display, quoting any argument that
    /// contains whitespace. Used as a job's command text.
    pub fn command_line(&self) -> String {
        self.args
            .iter()
            .map(|arg| {
                if arg.chars().any(char::is_whitespace) {
                    format!("\"{arg}\"")
                } else {
                    arg.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// The stages produced from one input line, in order. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
}

impl Pipeline {
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Whether the line ended in `&`. Only the last stage is authoritative.
    pub fn background(&self) -> bool {
        self.stages.last().is_some_and(|stage| stage.background)
    }
}
