//! Build constraint evaluation
//!
//! A file is built for the configured target when both its name
//! (`_GOOS`, `_GOARCH`, `_GOOS_GOARCH` suffixes) and its header constraint
//! comments (`//go:build` or legacy `// +build`) match.

use crate::header::BOM;
use gorules_config::Toolchain;
use std::collections::BTreeSet;

pub const KNOWN_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "js", "linux",
    "nacl", "netbsd", "openbsd", "plan9", "solaris", "wasip1", "windows", "zos",
];

pub const KNOWN_ARCH: &[&str] = &[
    "386", "amd64", "amd64p32", "arm", "armbe", "arm64", "arm64be", "loong64", "mips", "mipsle",
    "mips64", "mips64le", "mips64p32", "mips64p32le", "ppc", "ppc64", "ppc64le", "riscv",
    "riscv64", "s390", "s390x", "sparc", "sparc64", "wasm",
];

const UNIX_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "linux",
    "netbsd", "openbsd", "solaris",
];

/// The set of build tags satisfied by a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSet {
    tags: BTreeSet<String>,
}

impl TagSet {
    /// Tags satisfied by the toolchain's target
    pub fn for_toolchain(toolchain: &Toolchain) -> Self {
        let mut tags = BTreeSet::new();
        let goos = toolchain.goos.as_str();

        tags.insert(goos.to_string());
        tags.insert(toolchain.goarch.clone());
        tags.insert("gc".to_string());
        match goos {
            "android" => {
                tags.insert("linux".to_string());
            }
            "illumos" => {
                tags.insert("solaris".to_string());
            }
            "ios" => {
                tags.insert("darwin".to_string());
            }
            _ => {}
        }
        if UNIX_OS.contains(&goos) {
            tags.insert("unix".to_string());
        }
        if toolchain.cgo_enabled {
            tags.insert("cgo".to_string());
        }
        tags.extend(toolchain.release_tags.iter().cloned());
        tags.extend(toolchain.tags.iter().cloned());

        Self { tags }
    }

    /// Whether a single tag is satisfied
    pub fn matches(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Whether a file name's OS/architecture suffixes match
    pub fn matches_file_name(&self, file_name: &str) -> bool {
        let stem = file_name.split('.').next().unwrap_or(file_name);
        let Some(underscore) = stem.find('_') else {
            return true;
        };
        let mut parts: Vec<&str> = stem[underscore..].split('_').collect();
        if parts.last() == Some(&"test") {
            parts.pop();
        }

        let n = parts.len();
        if n >= 2 && KNOWN_OS.contains(&parts[n - 2]) && KNOWN_ARCH.contains(&parts[n - 1]) {
            return self.matches(parts[n - 2]) && self.matches(parts[n - 1]);
        }
        if n >= 1 && (KNOWN_OS.contains(&parts[n - 1]) || KNOWN_ARCH.contains(&parts[n - 1])) {
            return self.matches(parts[n - 1]);
        }
        true
    }

    /// Whether the constraint comments leading `content` match
    pub fn matches_header(&self, content: &str) -> Result<bool, String> {
        let header = ConstraintHeader::parse(content)?;
        if let Some(expr) = header.go_build {
            return self.eval_expr(expr);
        }
        Ok(header
            .plus_build
            .iter()
            .all(|line| self.eval_plus_build(line)))
    }

    fn eval_plus_build(&self, line: &str) -> bool {
        line.split_whitespace().any(|option| {
            option.split(',').all(|term| match term.strip_prefix('!') {
                Some(negated) if negated.starts_with('!') => false,
                Some(negated) => !negated.is_empty() && !self.matches(negated),
                None => self.matches(term),
            })
        })
    }

    /// Evaluate a `//go:build` expression
    pub fn eval_expr(&self, expr: &str) -> Result<bool, String> {
        let tokens = tokenize(expr)?;
        let mut parser = ExprParser {
            tokens: &tokens,
            pos: 0,
            tags: self,
        };
        let value = parser.or()?;
        if parser.pos != tokens.len() {
            return Err(format!("unexpected token in //go:build {}", expr));
        }
        Ok(value)
    }
}

/// Constraint comments found before the first non-comment text of a file
#[derive(Debug, Default, PartialEq, Eq)]
struct ConstraintHeader<'a> {
    /// Expression of the `//go:build` line, if any
    go_build: Option<&'a str>,
    /// Arguments of `// +build` lines
    plus_build: Vec<&'a str>,
}

impl<'a> ConstraintHeader<'a> {
    /// `//go:build` may follow `/* */` comments; `// +build` lines only
    /// count up to the last blank line before the first line that is not a
    /// `//` comment.
    fn parse(content: &'a str) -> Result<Self, String> {
        let content = content.strip_prefix(BOM).unwrap_or(content);
        let mut header = Self::default();
        let mut legacy_end = 0;
        let mut ended = false;
        let mut in_block = false;

        'lines: for (i, line) in content.lines().map(str::trim).enumerate() {
            if line.is_empty() && !ended {
                legacy_end = i + 1;
                continue;
            }
            if !line.starts_with("//") {
                ended = true;
            }
            if !in_block {
                if let Some(expr) = go_build_expr(line) {
                    if header.go_build.replace(expr).is_some() {
                        return Err("multiple //go:build comments".to_string());
                    }
                }
            }

            let mut rest = line;
            while !rest.is_empty() {
                if in_block {
                    match rest.find("*/") {
                        Some(close) => {
                            in_block = false;
                            rest = rest[close + 2..].trim_start();
                            continue;
                        }
                        None => continue 'lines,
                    }
                }
                if rest.starts_with("//") {
                    continue 'lines;
                }
                match rest.strip_prefix("/*") {
                    Some(after) => {
                        in_block = true;
                        rest = after.trim_start();
                    }
                    None => break 'lines,
                }
            }
        }

        header.plus_build = content
            .lines()
            .take(legacy_end)
            .filter_map(|line| {
                let rest = line.trim().strip_prefix("//")?.trim_start();
                rest.strip_prefix("+build")
                    .filter(|r| r.is_empty() || r.starts_with(char::is_whitespace))
            })
            .collect();
        Ok(header)
    }
}

fn go_build_expr(line: &str) -> Option<&str> {
    line.strip_prefix("//go:build")
        .filter(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
        .map(str::trim)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Tag(String),
    Not,
    And,
    Or,
    Open,
    Close,
}

fn tokenize(expr: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = expr.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '!' => tokens.push(Token::Not),
            '(' => tokens.push(Token::Open),
            ')' => tokens.push(Token::Close),
            '&' | '|' => {
                if chars.next().map(|(_, n)| n) != Some(c) {
                    return Err(format!("invalid operator at {} in //go:build {}", i, expr));
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
            }
            c if c.is_alphanumeric() || c == '_' || c == '.' => {
                let mut tag = c.to_string();
                while let Some(&(_, n)) = chars.peek() {
                    if n.is_alphanumeric() || n == '_' || n == '.' {
                        tag.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Tag(tag));
            }
            other => {
                return Err(format!("invalid character '{}' in //go:build {}", other, expr))
            }
        }
    }
    if tokens.is_empty() {
        return Err("empty //go:build expression".to_string());
    }
    Ok(tokens)
}

struct ExprParser<'a> {
    tokens: &'a [Token],
    pos: usize,
    tags: &'a TagSet,
}

impl ExprParser<'_> {
    fn next_is(&self, token: &Token) -> bool {
        self.tokens.get(self.pos) == Some(token)
    }

    fn or(&mut self) -> Result<bool, String> {
        let mut value = self.and()?;
        while self.next_is(&Token::Or) {
            self.pos += 1;
            let rhs = self.and()?;
            value = value || rhs;
        }
        Ok(value)
    }

    fn and(&mut self) -> Result<bool, String> {
        let mut value = self.not()?;
        while self.next_is(&Token::And) {
            self.pos += 1;
            let rhs = self.not()?;
            value = value && rhs;
        }
        Ok(value)
    }

    fn not(&mut self) -> Result<bool, String> {
        if self.next_is(&Token::Not) {
            self.pos += 1;
            return Ok(!self.not()?);
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<bool, String> {
        match self.tokens.get(self.pos) {
            Some(Token::Open) => {
                self.pos += 1;
                let value = self.or()?;
                if !self.next_is(&Token::Close) {
                    return Err("missing ) in //go:build expression".to_string());
                }
                self.pos += 1;
                Ok(value)
            }
            Some(Token::Tag(tag)) => {
                self.pos += 1;
                Ok(self.tags.matches(tag))
            }
            _ => Err("expected build tag in //go:build expression".to_string()),
        }
    }
}
