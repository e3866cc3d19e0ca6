//! Object identifiers and the generator that mints fresh ones.
//!
//! Identifiers are opaque fixed-width tokens (24 uppercase hex characters in
//! Xcode projects). Fresh identifiers are drawn from the OS entropy source.

use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::config::IdentifierConfig;
use crate::error::{Error, Result};

/// Primary key of an object in the document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Wrap a token without checking it against a format.
    pub fn new_unchecked(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Width and alphabet of identifier tokens.
#[derive(Debug, Clone)]
pub struct IdFormat {
    width: usize,
    alphabet: Vec<u8>,
    max_attempts: usize,
    pattern: Regex,
}

impl IdFormat {
    pub fn new(width: usize, alphabet: &str, max_attempts: usize) -> Result<Self> {
        let mut symbols: Vec<u8> = alphabet.bytes().collect();
        symbols.sort_unstable();
        symbols.dedup();

        if width == 0 || symbols.is_empty() || !symbols.iter().all(u8::is_ascii_alphanumeric) {
            return Err(Error::config_invalid_value(
                "identifier",
                Some(format!("width={} alphabet={}", width, alphabet)),
                "Identifiers need a positive width and an alphanumeric alphabet",
            ));
        }

        let class: String = symbols.iter().map(|b| *b as char).collect();
        let pattern = Regex::new(&format!(r"\b[{}]{{{}}}\b", class, width))
            .map_err(|e| Error::internal_unexpected(format!("identifier pattern: {}", e)))?;

        Ok(Self {
            width,
            alphabet: symbols,
            max_attempts: max_attempts.max(1),
            pattern,
        })
    }

    pub fn from_config(config: &IdentifierConfig) -> Result<Self> {
        Self::new(config.width, &config.alphabet, config.max_attempts)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn alphabet(&self) -> String {
        self.alphabet.iter().map(|b| *b as char).collect()
    }

    /// Word-bounded regex matching one token.
    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    /// Validate a token against this format.
    pub fn parse(&self, token: &str) -> Option<ObjectId> {
        let valid = token.len() == self.width
            && token.bytes().all(|b| self.alphabet.binary_search(&b).is_ok());
        valid.then(|| ObjectId(token.to_string()))
    }
}

/// Mints identifiers that are absent from a caller-supplied set.
pub struct IdGenerator<R = OsRng> {
    format: IdFormat,
    rng: R,
}

impl IdGenerator<OsRng> {
    pub fn new(format: IdFormat) -> Self {
        Self { format, rng: OsRng }
    }
}

impl<R: RngCore> IdGenerator<R> {
    pub fn with_rng(format: IdFormat, rng: R) -> Self {
        Self { format, rng }
    }

    fn draw(&mut self) -> ObjectId {
        let alphabet = &self.format.alphabet;
        let token: String = (0..self.format.width)
            .map(|_| alphabet[self.rng.gen_range(0..alphabet.len())] as char)
            .collect();
        ObjectId(token)
    }

    /// Return an identifier not contained in `existing`.
    pub fn mint(&mut self, existing: &HashSet<ObjectId>) -> Result<ObjectId> {
        for _ in 0..self.format.max_attempts {
            let candidate = self.draw();
            if !existing.contains(&candidate) {
                return Ok(candidate);
            }
        }

        Err(Error::identifier_exhausted(
            self.format.width,
            self.format.alphabet(),
            self.format.max_attempts,
        ))
    }

    /// Return `n` distinct identifiers. Each one is added to `existing`
    /// before the next is drawn.
    pub fn mint_n(&mut self, n: usize, existing: &mut HashSet<ObjectId>) -> Result<Vec<ObjectId>> {
        let mut minted = Vec::with_capacity(n);
        for _ in 0..n {
            let id = self.mint(existing)?;
            existing.insert(id.clone());
            minted.push(id);
        }
        Ok(minted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn xcode_format() -> IdFormat {
        IdFormat::from_config(&IdentifierConfig::default()).unwrap()
    }

    fn seeded(format: IdFormat) -> IdGenerator<StdRng> {
        IdGenerator::with_rng(format, StdRng::seed_from_u64(7))
    }

    #[test]
    fn minted_ids_match_format() {
        let format = xcode_format();
        let mut generator = IdGenerator::new(format.clone());
        let id = generator.mint(&HashSet::new()).unwrap();

        assert_eq!(id.as_str().len(), 24);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert!(format.parse(id.as_str()).is_some());
    }

    #[test]
    fn mint_n_is_pairwise_distinct_and_grows_existing() {
        // 2^3 = 8 possible tokens.
        let format = IdFormat::new(3, "AB", 10_000).unwrap();
        let mut generator = seeded(format);
        let mut existing: HashSet<ObjectId> = ["AAA", "BBB"]
            .iter()
            .map(|s| ObjectId::new_unchecked(*s))
            .collect();

        let minted = generator.mint_n(6, &mut existing).unwrap();

        let unique: HashSet<_> = minted.iter().collect();
        assert_eq!(unique.len(), 6);
        assert!(!minted.contains(&ObjectId::new_unchecked("AAA")));
        assert!(!minted.contains(&ObjectId::new_unchecked("BBB")));
        assert_eq!(existing.len(), 8);
    }

    #[test]
    fn exhausted_space_fails_with_exhaustion() {
        let format = IdFormat::new(1, "A", 50).unwrap();
        let mut generator = seeded(format);
        let existing: HashSet<ObjectId> = [ObjectId::new_unchecked("A")].into_iter().collect();

        let err = generator.mint(&existing).unwrap_err();
        assert_eq!(err.code.as_str(), "identifier.exhausted");
    }

    #[test]
    fn parse_rejects_wrong_width_and_symbols() {
        let format = xcode_format();
        assert!(format.parse("A1000001000000000000001A").is_some());
        assert!(format.parse("A1000001000000000000001").is_none());
        assert!(format.parse("a1000001000000000000001a").is_none());
        assert!(format.parse("G1000001000000000000001A").is_none());
    }

    #[test]
    fn pattern_is_word_bounded() {
        let format = xcode_format();
        let text = "A1000001000000000000001A A1000001000000000000001AFF";
        let hits: Vec<&str> = format.pattern().find_iter(text).map(|m| m.as_str()).collect();
        assert_eq!(hits, vec!["A1000001000000000000001A"]);
    }

    #[test]
    fn new_rejects_empty_alphabet() {
        assert!(IdFormat::new(24, "", 10).is_err());
        assert!(IdFormat::new(0, "AB", 10).is_err());
    }
}
