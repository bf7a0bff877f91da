use common::{Error, Result};
use regex::Regex;

/// Directory name Hive uses for a null partition value.
pub const DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// Glob over object keys. `*` and `?` never cross a `/`, `**` matches any depth.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    pattern: String,
    prefix: String,
    regex: Regex,
}

impl GlobPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = pattern.trim_matches('/');
        if pattern.is_empty() {
            return Err(Error::InvalidInput("Glob pattern must not be empty".to_string()));
        }

        // Listing prefix: the leading segments without wildcards.
        let prefix = pattern
            .split('/')
            .take_while(|segment| !segment.contains(['*', '?']))
            .collect::<Vec<_>>()
            .join("/");

        let mut expr = String::from("^");
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' if chars.peek() == Some(&'*') => {
                    chars.next();
                    // `**/` may also stand for no directory at all
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        expr.push_str("(?:.*/)?");
                    } else {
                        expr.push_str(".*");
                    }
                }
                '*' => expr.push_str("[^/]*"),
                '?' => expr.push_str("[^/]"),
                other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr)
            .map_err(|e| Error::InvalidInput(format!("Invalid glob pattern '{}': {}", pattern, e)))?;

        Ok(Self {
            pattern: pattern.to_string(),
            prefix,
            regex,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key.trim_start_matches('/'))
    }
}

/// Builds object keys below an output table directory.
pub struct PathBuilder {
    table: String,
    partitions: Vec<(String, String)>,
}

impl PathBuilder {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            partitions: Vec::new(),
        }
    }

    /// Adds a `column=value` level; `None` maps to the Hive default partition.
    pub fn with_partition(mut self, column: &str, value: Option<&str>) -> Self {
        let value = match value {
            Some(v) => escape_partition_value(v),
            None => DEFAULT_PARTITION.to_string(),
        };
        self.partitions.push((column.to_string(), value));
        self
    }

    pub fn build_storage_path(&self) -> String {
        let mut path = self.table.clone();
        for (column, value) in &self.partitions {
            path.push('/');
            path.push_str(column);
            path.push('=');
            path.push_str(value);
        }
        path
    }

    pub fn build_file_path(&self, filename: &str) -> String {
        format!("{}/{}", self.build_storage_path(), filename)
    }
}

/// Percent-encodes the characters Hive escapes in partition directory names.
pub fn escape_partition_value(value: &str) -> String {
    if value.is_empty() {
        return DEFAULT_PARTITION.to_string();
    }

    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        let needs_escape = c.is_ascii_control()
            || matches!(
                c,
                '"' | '#' | '%' | '\'' | '*' | '/' | ':' | '=' | '?' | '\\' | '{' | '[' | ']' | '^'
            );
        if needs_escape {
            escaped.push_str(&format!("%{:02X}", c as u32));
        } else {
            escaped.push(c);
        }
    }
    escaped
}
