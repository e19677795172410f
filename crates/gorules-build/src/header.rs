//! Go source header scanning
//!
//! Reads just enough of a Go file to learn its package name and imports:
//! the package clause followed by import declarations. Scanning stops at the
//! first top-level declaration that is not an import.

use std::fmt;

/// Byte order mark accepted at the very start of a file
pub const BOM: char = '\u{feff}';

/// Package clause and imports of a Go source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoHeader {
    /// Declared package name
    pub package: String,
    /// Byte offset just past the package name
    pub package_end: usize,
    /// Import declarations in source order
    pub imports: Vec<ImportSpec>,
}

/// A single import spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    /// Local name (`_`, `.`, or an identifier), if given
    pub alias: Option<String>,
    /// Imported path
    pub path: String,
}

impl GoHeader {
    /// Imported paths in source order
    pub fn import_paths(&self) -> impl Iterator<Item = &str> {
        self.imports.iter().map(|i| i.path.as_str())
    }
}

/// Header scanning failure with the byte offset it occurred at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderError {
    pub offset: usize,
    pub message: String,
}

impl fmt::Display for HeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "offset {}: {}", self.offset, self.message)
    }
}

impl std::error::Error for HeaderError {}

/// Scan the package clause and imports of `src`
pub fn scan(src: &str) -> Result<GoHeader, HeaderError> {
    let mut scanner = Scanner::new(src);

    scanner.skip_trivia(true)?;
    scanner.expect_keyword("package")?;
    scanner.skip_trivia(false)?;
    let package = scanner
        .ident()
        .ok_or_else(|| scanner.error("expected package name"))?;
    let package_end = scanner.pos;

    let mut imports = Vec::new();
    loop {
        scanner.skip_trivia(true)?;
        while scanner.eat(b';') {
            scanner.skip_trivia(true)?;
        }
        if !scanner.at_keyword("import") {
            break;
        }
        scanner.expect_keyword("import")?;
        scanner.skip_trivia(true)?;
        if scanner.eat(b'(') {
            loop {
                scanner.skip_trivia(true)?;
                while scanner.eat(b';') {
                    scanner.skip_trivia(true)?;
                }
                if scanner.eat(b')') {
                    break;
                }
                if scanner.at_end() {
                    return Err(scanner.error("unterminated import group"));
                }
                imports.push(scanner.import_spec()?);
            }
        } else {
            imports.push(scanner.import_spec()?);
        }
    }

    Ok(GoHeader {
        package,
        package_end,
        imports,
    })
}

struct Scanner<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: if src.starts_with(BOM) { BOM.len_utf8() } else { 0 },
        }
    }

    fn error(&self, message: impl Into<String>) -> HeaderError {
        HeaderError {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Skip whitespace and comments; newlines only when `newlines` is set
    fn skip_trivia(&mut self, newlines: bool) -> Result<(), HeaderError> {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r') => self.pos += 1,
                Some(b'\n') if newlines => self.pos += 1,
                Some(b'/') if self.src.get(self.pos + 1) == Some(&b'/') => {
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.pos += 1;
                    }
                }
                Some(b'/') if self.src.get(self.pos + 1) == Some(&b'*') => {
                    let start = self.pos;
                    self.pos += 2;
                    loop {
                        match self.peek() {
                            None => {
                                self.pos = start;
                                return Err(self.error("unterminated comment"));
                            }
                            Some(b'*') if self.src.get(self.pos + 1) == Some(&b'/') => {
                                self.pos += 2;
                                break;
                            }
                            Some(_) => self.pos += 1,
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        let end = self.pos + keyword.len();
        self.src.get(self.pos..end) == Some(keyword.as_bytes())
            && !self.src.get(end).copied().map_or(false, is_ident_byte)
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), HeaderError> {
        if !self.at_keyword(keyword) {
            return Err(self.error(format!("expected '{}'", keyword)));
        }
        self.pos += keyword.len();
        Ok(())
    }

    fn ident(&mut self) -> Option<String> {
        let start = self.pos;
        match self.peek() {
            Some(b) if is_ident_byte(b) && !b.is_ascii_digit() => {}
            _ => return None,
        }
        while self.peek().map_or(false, is_ident_byte) {
            self.pos += 1;
        }
        Some(String::from_utf8_lossy(&self.src[start..self.pos]).into_owned())
    }

    fn import_spec(&mut self) -> Result<ImportSpec, HeaderError> {
        let alias = if self.eat(b'.') {
            Some(".".to_string())
        } else {
            self.ident()
        };
        if alias.is_some() {
            self.skip_trivia(false)?;
        }
        let path = self.string_lit()?;
        if path.is_empty() {
            return Err(self.error("empty import path"));
        }
        Ok(ImportSpec { alias, path })
    }

    fn string_lit(&mut self) -> Result<String, HeaderError> {
        match self.peek() {
            Some(b'`') => {
                self.pos += 1;
                let start = self.pos;
                while !matches!(self.peek(), None | Some(b'`')) {
                    self.pos += 1;
                }
                if self.at_end() {
                    return Err(self.error("unterminated raw string"));
                }
                let value = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
                self.pos += 1;
                Ok(value)
            }
            Some(b'"') => {
                self.pos += 1;
                let mut value = Vec::new();
                loop {
                    match self.peek() {
                        None | Some(b'\n') => return Err(self.error("unterminated string")),
                        Some(b'"') => {
                            self.pos += 1;
                            break;
                        }
                        Some(b'\\') => {
                            let escaped = self
                                .src
                                .get(self.pos + 1)
                                .copied()
                                .ok_or_else(|| self.error("unterminated string"))?;
                            value.push(escaped);
                            self.pos += 2;
                        }
                        Some(b) => {
                            value.push(b);
                            self.pos += 1;
                        }
                    }
                }
                Ok(String::from_utf8_lossy(&value).into_owned())
            }
            _ => Err(self.error("expected import path")),
        }
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}
