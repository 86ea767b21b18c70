// Field encoding for form-encoded request bodies.
//
// The server parses different fields with different decoders: ordinary
// form fields, secrets, and SSH key blobs (which are decoded twice). Each
// `EncodeProfile` is a distinct safe/unsafe partition of printable ASCII.
// Alphanumerics and `-_.~` are always literal; controls and bytes >= 0x80
// are always `%XX`.

use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode, percent_encode};

/// Bytes escaped by every profile: everything except `A-Z a-z 0-9 - _ . ~`.
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const GENERIC_SET: &AsciiSet = UNRESERVED;

const TOKEN_SECRET_SET: &AsciiSet = &UNRESERVED
    .remove(b'!')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*');

const KEY_BLOB_SET: &AsciiSet = &UNRESERVED.remove(b'$').remove(b'&');

/// Escaping profile required by the field a value occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EncodeProfile {
    /// Ordinary form fields and path segments. A value whose only unsafe
    /// bytes are spaces encodes them as `+`.
    #[default]
    Generic,
    /// Passwords and token secrets. Keeps `! ' ( ) *` literal.
    TokenSecret,
    /// SSH public keys. Keeps `$ &` literal; written into a form body
    /// doubly encoded because the server decodes the blob a second time.
    KeyBlob,
}

impl EncodeProfile {
    fn set(self) -> &'static AsciiSet {
        match self {
            Self::Generic => GENERIC_SET,
            Self::TokenSecret => TOKEN_SECRET_SET,
            Self::KeyBlob => KEY_BLOB_SET,
        }
    }
}

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~')
}

/// Encode a byte sequence under the given profile.
pub fn encode(value: &[u8], profile: EncodeProfile) -> String {
    if profile == EncodeProfile::Generic
        && value.contains(&b' ')
        && value.iter().all(|&b| b == b' ' || is_unreserved(b))
    {
        return value
            .iter()
            .map(|&b| if b == b' ' { '+' } else { char::from(b) })
            .collect();
    }
    percent_encode(value, profile.set()).to_string()
}

/// Encode a string under the given profile.
pub fn encode_str(value: &str, profile: EncodeProfile) -> String {
    encode(value.as_bytes(), profile)
}

/// Reverse [`encode`].
pub fn decode(encoded: &str, profile: EncodeProfile) -> Vec<u8> {
    match profile {
        EncodeProfile::Generic => {
            let plus_as_space: Vec<u8> = encoded
                .bytes()
                .map(|b| if b == b'+' { b' ' } else { b })
                .collect();
            percent_decode(&plus_as_space).collect()
        }
        EncodeProfile::TokenSecret | EncodeProfile::KeyBlob => {
            percent_decode(encoded.as_bytes()).collect()
        }
    }
}

// ── WireValue ───────────────────────────────────────────────────────

/// A field value plus the profile its field requires.
#[derive(Clone, PartialEq, Eq)]
pub struct WireValue {
    value: String,
    profile: EncodeProfile,
}

impl WireValue {
    pub fn new(value: impl Into<String>, profile: EncodeProfile) -> Self {
        Self {
            value: value.into(),
            profile,
        }
    }

    pub fn generic(value: impl Into<String>) -> Self {
        Self::new(value, EncodeProfile::Generic)
    }

    pub fn secret(value: impl Into<String>) -> Self {
        Self::new(value, EncodeProfile::TokenSecret)
    }

    pub fn key_blob(value: impl Into<String>) -> Self {
        Self::new(value, EncodeProfile::KeyBlob)
    }

    /// The raw, unencoded value.
    pub fn raw(&self) -> &str {
        &self.value
    }

    pub fn profile(&self) -> EncodeProfile {
        self.profile
    }

    /// The value as it appears on the right-hand side of `key=` in a form body.
    pub fn form_encoded(&self) -> String {
        match self.profile {
            EncodeProfile::KeyBlob => encode_str(
                &encode_str(&self.value, EncodeProfile::KeyBlob),
                EncodeProfile::Generic,
            ),
            profile => encode_str(&self.value, profile),
        }
    }
}

impl fmt::Debug for WireValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.profile {
            EncodeProfile::TokenSecret => f.write_str("WireValue(<redacted>)"),
            profile => write!(f, "WireValue({:?}, {profile:?})", self.value),
        }
    }
}

// ── FormBody ────────────────────────────────────────────────────────

/// Ordered `application/x-www-form-urlencoded` request body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormBody {
    fields: Vec<(String, WireValue)>,
}

impl FormBody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field, replacing an earlier field with the same key.
    pub fn push(&mut self, key: impl Into<String>, value: WireValue) -> &mut Self {
        let key = key.into();
        if let Some(slot) = self.fields.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.fields.push((key, value));
        }
        self
    }

    /// Builder-style [`push`](Self::push) for a generic field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, WireValue::generic(value));
        self
    }

    /// Builder-style [`push`](Self::push) with an explicit profile.
    pub fn with_value(mut self, key: impl Into<String>, value: WireValue) -> Self {
        self.push(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&WireValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &WireValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Render the body for the wire.
    pub fn to_urlencoded(&self) -> String {
        self.fields
            .iter()
            .map(|(k, v)| {
                format!(
                    "{}={}",
                    encode_str(k, EncodeProfile::Generic),
                    v.form_encoded()
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl FromIterator<(String, WireValue)> for FormBody {
    fn from_iter<I: IntoIterator<Item = (String, WireValue)>>(iter: I) -> Self {
        let mut body = Self::new();
        for (k, v) in iter {
            body.push(k, v);
        }
        body
    }
}
