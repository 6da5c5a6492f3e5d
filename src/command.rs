//! User command parsing

/// Simple prefix command parser.
///
/// This is useful when you want to extract a command and some arguments from a users message. A
/// command may be known under several prefixes.
///
/// # Example
///
/// ```rust
/// use bitbucket_snarfer::command::Command;
/// let command = Command::new(".pullrequests").alias(".prs");
/// assert_eq!(command.parse(".pullrequests"), Some(""));
/// assert_eq!(command.parse(".prs open"), Some("open"));
/// assert_eq!(command.parse(".pullrequestsfoo"), None);
/// assert_eq!(command.parse("pull request #5"), None);
/// ```
#[derive(Debug, Clone)]
pub struct Command {
    /// The prefixes to match against, the primary one first.
    prefixes: Vec<String>,
}

impl Command {
    /// Creates a new prefix command parser that expects the given prefix.
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            prefixes: vec![prefix.to_string()],
        }
    }

    /// Adds an alternative prefix the command also answers to.
    #[must_use]
    pub fn alias(mut self, prefix: &str) -> Self {
        self.prefixes.push(prefix.to_string());
        self
    }

    /// Returns the primary prefix.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.prefixes[0]
    }

    /// Checks if the supplied input starts with one of the command prefixes, and if so, returns a
    /// string slice that makes up the arguments, if any.
    #[must_use]
    pub fn parse<'a>(&self, input: &'a str) -> Option<&'a str> {
        self.prefixes
            .iter()
            .find_map(|prefix| Self::strip(prefix, input))
    }

    fn strip<'a>(prefix: &str, input: &'a str) -> Option<&'a str> {
        let suffix = input.strip_prefix(prefix)?;

        match suffix.chars().next() {
            // Skip the separating whitespace.
            Some(' ') => Some(&suffix[1..]),
            // Part of a longer word.
            Some(_) => None,
            None => Some(""),
        }
    }
}
