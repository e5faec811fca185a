#![deny(missing_docs)]

//! # Canonical Addresses
//!
//! A `CanonicalAddress` is an absolute URL whose fragment is a JSON pointer in
//! one fixed spelling. It is the key space of the schema registry and of every
//! model record.
//!
//! Pointer keys are escaped with `~0` / `~1` first and percent-encoded second.
//! When parsing, each `/`-separated piece is percent-decoded on its own, so an
//! encoded `%2F` stays a literal slash inside its key instead of starting a new
//! pointer level.

use crate::error::{AppError, AppResult};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Characters percent-encoded inside a canonical pointer segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Normalized absolute locator of one document node.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalAddress(Url);

impl CanonicalAddress {
    /// Parses and normalizes an absolute location.
    ///
    /// A location without a fragment addresses the document root.
    pub fn parse(location: &str) -> AppResult<Self> {
        let url = Url::parse(location).map_err(|e| {
            AppError::Address(format!("Malformed location '{}': {}", location, e))
        })?;
        Self::from_url(url)
    }

    /// Normalizes an already parsed URL.
    pub fn from_url(mut url: Url) -> AppResult<Self> {
        let segments = match url.fragment() {
            None | Some("") => Vec::new(),
            Some(fragment) => decode_pointer(fragment)?,
        };
        url.set_fragment(Some(&encode_pointer(&segments)));
        Ok(Self(url))
    }

    /// Builds an address from a base location and a sequence of pointer keys.
    ///
    /// Keys are appended below any pointer the base already carries.
    pub fn from_parts<S: AsRef<str>>(base: &str, pointer: &[S]) -> AppResult<Self> {
        Ok(Self::parse(base)?.append(pointer))
    }

    /// Returns the address of the document root containing this node.
    pub fn document(&self) -> Self {
        let mut url = self.0.clone();
        url.set_fragment(Some(""));
        Self(url)
    }

    /// Returns the document URL without any fragment.
    pub fn document_url(&self) -> Url {
        let mut url = self.0.clone();
        url.set_fragment(None);
        url
    }

    /// Appends pointer keys, escaping each one.
    pub fn append<I, S>(&self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut pointer = self.pointer().to_string();
        for key in keys {
            pointer.push('/');
            pointer.push_str(&encode_segment(key.as_ref()));
        }
        let mut url = self.0.clone();
        url.set_fragment(Some(&pointer));
        Self(url)
    }

    /// Returns the decoded pointer keys, root first.
    pub fn segments(&self) -> Vec<String> {
        // The fragment is always written by `encode_pointer`, so decoding cannot fail.
        decode_pointer(self.pointer()).unwrap_or_default()
    }

    /// Returns the encoded pointer (the fragment without `#`).
    pub fn pointer(&self) -> &str {
        self.0.fragment().unwrap_or("")
    }

    /// True when this address points at a document root.
    pub fn is_document_root(&self) -> bool {
        self.pointer().is_empty()
    }

    /// Resolves a (possibly relative) reference against this address.
    pub fn join(&self, reference: &str) -> AppResult<Url> {
        self.0.join(reference).map_err(|e| {
            AppError::Address(format!(
                "Cannot resolve '{}' against '{}': {}",
                reference, self, e
            ))
        })
    }

    /// The normalized address as a string.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// The normalized address as a URL.
    pub fn as_url(&self) -> &Url {
        &self.0
    }
}

impl fmt::Display for CanonicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl fmt::Debug for CanonicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CanonicalAddress({:?})", self.0.as_str())
    }
}

impl FromStr for CanonicalAddress {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for CanonicalAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CanonicalAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Escapes one pointer key (`~` -> `~0`, `/` -> `~1`).
pub fn escape_segment(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

/// Reverses `escape_segment`, rejecting dangling or unknown `~` escapes.
pub fn unescape_segment(segment: &str) -> AppResult<String> {
    let mut out = String::with_capacity(segment.len());
    let mut chars = segment.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            other => {
                return Err(AppError::Address(format!(
                    "Invalid pointer escape '~{}' in segment '{}'",
                    other.map(String::from).unwrap_or_default(),
                    segment
                )))
            }
        }
    }
    Ok(out)
}

/// Navigates a JSON tree by decoded pointer keys.
pub fn resolve_pointer<'a, S: AsRef<str>>(root: &'a Value, segments: &[S]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(root, |node, key| match node {
            Value::Object(map) => map.get(key.as_ref()),
            Value::Array(items) => key.as_ref().parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn encode_segment(key: &str) -> String {
    utf8_percent_encode(&escape_segment(key), SEGMENT).to_string()
}

fn encode_pointer(segments: &[String]) -> String {
    segments
        .iter()
        .map(|key| format!("/{}", encode_segment(key)))
        .collect()
}

fn decode_pointer(fragment: &str) -> AppResult<Vec<String>> {
    let Some(rest) = fragment.strip_prefix('/') else {
        return Err(AppError::Address(format!(
            "Fragment '#{}' is not a JSON pointer",
            fragment
        )));
    };
    rest.split('/')
        .map(|piece| {
            let decoded = percent_decode_str(piece).decode_utf8().map_err(|e| {
                AppError::Address(format!("Invalid UTF-8 in pointer segment '{}': {}", piece, e))
            })?;
            unescape_segment(&decoded)
        })
        .collect()
}
