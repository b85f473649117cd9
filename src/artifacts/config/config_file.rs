//! Parsing and serialization of a single git-config file
//!
//! Comments are dropped when a file is rewritten; section order and the
//! order of variables inside each section are kept.

use crate::artifacts::config::config_key::ConfigKey;
use crate::errors::{Error, Result};
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    name: String,
    subsection: Option<String>,
    variables: Vec<(String, String)>,
}

impl Section {
    fn matches(&self, key: &ConfigKey) -> bool {
        self.name == key.section() && self.subsection.as_deref() == key.subsection()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    sections: Vec<Section>,
}

impl ConfigFile {
    pub fn parse(content: &str) -> Result<Self> {
        Parser::new(content).parse()
    }

    pub fn serialize(&self) -> String {
        let mut content = String::new();

        for section in &self.sections {
            match &section.subsection {
                Some(subsection) => content.push_str(&format!(
                    "[{} \"{}\"]\n",
                    section.name,
                    subsection.replace('\\', "\\\\").replace('"', "\\\"")
                )),
                None => content.push_str(&format!("[{}]\n", section.name)),
            }

            for (name, value) in &section.variables {
                content.push_str(&format!("\t{name} = {}\n", quote_value(value)));
            }
        }

        content
    }

    /// The last value set for `key`
    pub fn get(&self, key: &ConfigKey) -> Option<&str> {
        self.get_all(key).pop()
    }

    /// Every value of a multi-valued key, in file order
    pub fn get_all(&self, key: &ConfigKey) -> Vec<&str> {
        self.sections
            .iter()
            .filter(|section| section.matches(key))
            .flat_map(|section| &section.variables)
            .filter(|(name, _)| name == key.name())
            .map(|(_, value)| value.as_str())
            .collect()
    }

    /// Replace every value of `key` with a single `value`
    pub fn set(&mut self, key: &ConfigKey, value: impl Into<String>) {
        let value = value.into();

        let last_section = self
            .sections
            .iter()
            .rposition(|section| {
                section.matches(key) && section.variables.iter().any(|(name, _)| name == key.name())
            })
            .or_else(|| self.sections.iter().rposition(|section| section.matches(key)));

        let Some(last_section) = last_section else {
            self.sections.push(Section {
                name: key.section().to_string(),
                subsection: key.subsection().map(str::to_string),
                variables: vec![(key.name().to_string(), value)],
            });
            return;
        };

        // Earlier occurrences go; the last one is overwritten in place
        for (index, section) in self.sections.iter_mut().enumerate() {
            if !section.matches(key) {
                continue;
            }
            let keep_last = index == last_section;
            let last_position = section.variables.iter().rposition(|(name, _)| name == key.name());
            let mut position = 0;
            section.variables.retain(|(name, _)| {
                let current = position;
                position += 1;
                name != key.name() || (keep_last && Some(current) == last_position)
            });
        }

        let section = &mut self.sections[last_section];
        match section.variables.iter_mut().find(|(name, _)| name == key.name()) {
            Some((_, existing)) => *existing = value,
            None => section.variables.push((key.name().to_string(), value)),
        }
    }

    /// Remove every value of `key`, reporting whether any existed
    pub fn remove(&mut self, key: &ConfigKey) -> bool {
        let mut removed = false;
        for section in self.sections.iter_mut().filter(|section| section.matches(key)) {
            let before = section.variables.len();
            section.variables.retain(|(name, _)| name != key.name());
            removed |= section.variables.len() != before;
        }

        self.sections
            .retain(|section| !(section.matches(key) && section.variables.is_empty()));
        removed
    }

    /// Every `(key, value)` pair in file order
    pub fn entries(&self) -> impl Iterator<Item = (ConfigKey, &str)> {
        self.sections.iter().flat_map(|section| {
            section.variables.iter().filter_map(move |(name, value)| {
                ConfigKey::new(&section.name, section.subsection.as_deref(), name)
                    .ok()
                    .map(|key| (key, value.as_str()))
            })
        })
    }

    pub fn is_empty(&self) -> bool {
        self.sections.iter().all(|section| section.variables.is_empty())
    }
}

fn quote_value(value: &str) -> String {
    let needs_quotes = value.starts_with(char::is_whitespace)
        || value.ends_with(char::is_whitespace)
        || value.contains(['#', ';']);

    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\t', "\\t");

    if needs_quotes {
        format!("\"{escaped}\"")
    } else {
        escaped
    }
}

struct Parser<'c> {
    chars: Peekable<Chars<'c>>,
    line: usize,
}

impl<'c> Parser<'c> {
    fn new(content: &'c str) -> Self {
        Self {
            chars: content.chars().peekable(),
            line: 1,
        }
    }

    fn error(&self, what: &str) -> Error {
        Error::corrupt(format!("config line {}: {what}", self.line))
    }

    fn next(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c == Some('\n') {
            self.line += 1;
        }
        c
    }

    fn skip_blanks(&mut self) {
        while self.chars.next_if(|&c| c == ' ' || c == '\t' || c == '\r').is_some() {}
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.next() {
            if c == '\n' {
                break;
            }
        }
    }

    fn parse(mut self) -> Result<ConfigFile> {
        let mut file = ConfigFile::default();

        loop {
            self.skip_blanks();
            match self.chars.peek().copied() {
                None => break,
                Some('\n') => {
                    self.next();
                }
                Some('#' | ';') => self.skip_line(),
                Some('[') => {
                    self.next();
                    let section = self.parse_section_header()?;
                    file.sections.push(section);
                }
                Some(_) => {
                    let (name, value) = self.parse_variable()?;
                    let section = file
                        .sections
                        .last_mut()
                        .ok_or_else(|| self.error("variable outside of a section"))?;
                    section.variables.push((name, value));
                }
            }
        }

        Ok(file)
    }

    fn parse_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.chars.next_if(|&c| c.is_ascii_alphanumeric() || c == '-' || c == '.') {
            name.push(c);
        }
        name
    }

    fn parse_section_header(&mut self) -> Result<Section> {
        let name = self.parse_name();
        if name.is_empty() {
            return Err(self.error("empty section name"));
        }

        self.skip_blanks();
        let (name, subsection) = match self.next() {
            Some(']') => match name.split_once('.') {
                // Deprecated `[section.subsection]` form
                Some((section, subsection)) => (
                    section.to_string(),
                    Some(subsection.to_ascii_lowercase()),
                ),
                None => (name, None),
            },
            Some('"') if !name.contains('.') => {
                let subsection = self.parse_subsection()?;
                if self.next() != Some(']') {
                    return Err(self.error("expected ']' after subsection"));
                }
                (name, Some(subsection))
            }
            _ => return Err(self.error("malformed section header")),
        };

        ConfigKey::new(&name, subsection.as_deref(), "x")
            .map_err(|_| self.error("invalid section name"))?;

        Ok(Section {
            name: name.to_ascii_lowercase(),
            subsection,
            variables: Vec::new(),
        })
    }

    fn parse_subsection(&mut self) -> Result<String> {
        let mut subsection = String::new();
        loop {
            match self.next() {
                Some('"') => return Ok(subsection),
                Some('\\') => match self.next() {
                    Some(c) if c != '\n' => subsection.push(c),
                    _ => return Err(self.error("unterminated subsection")),
                },
                Some('\n') | None => return Err(self.error("unterminated subsection")),
                Some(c) => subsection.push(c),
            }
        }
    }

    fn parse_variable(&mut self) -> Result<(String, String)> {
        let name = self.parse_name();
        if name.is_empty() || name.contains('.') || !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return Err(self.error("invalid variable name"));
        }
        let name = name.to_ascii_lowercase();

        self.skip_blanks();
        match self.chars.peek().copied() {
            // Bare variables are boolean true
            None | Some('\n') => {
                self.next();
                Ok((name, String::from("true")))
            }
            Some('#' | ';') => {
                self.skip_line();
                Ok((name, String::from("true")))
            }
            Some('=') => {
                self.next();
                let value = self.parse_value()?;
                Ok((name, value))
            }
            Some(_) => Err(self.error("expected '=' after variable name")),
        }
    }

    fn parse_value(&mut self) -> Result<String> {
        let mut value = String::new();
        // Length of `value` up to its last quoted or non-blank character
        let mut kept = 0;
        let mut quoted = false;

        self.skip_blanks();
        loop {
            match self.next() {
                None | Some('\n') if quoted => return Err(self.error("unterminated quoted value")),
                None | Some('\n') => break,
                Some('#' | ';') if !quoted => {
                    self.skip_line();
                    break;
                }
                Some('"') => quoted = !quoted,
                Some('\\') => {
                    let escaped = match self.next() {
                        // Line continuation
                        Some('\n') => continue,
                        Some('\r') if self.chars.peek() == Some(&'\n') => {
                            self.next();
                            continue;
                        }
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('b') => '\u{8}',
                        Some(c @ ('"' | '\\')) => c,
                        _ => return Err(self.error("invalid escape sequence")),
                    };
                    value.push(escaped);
                    kept = value.len();
                }
                Some(c) => {
                    value.push(c);
                    if quoted || !c.is_whitespace() {
                        kept = value.len();
                    }
                }
            }
        }

        value.truncate(kept);
        Ok(value)
    }
}
