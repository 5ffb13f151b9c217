use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Write as _};

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

pub const TEXT_FIELD: &str = "text";
pub const LANGUAGE_CODE_FIELD: &str = "languageCode";
pub const SENTIMENT_FIELD: &str = "sentiment";
pub const TRANSLATION_QUALITY_FIELD: &str = "isGoodTranslation";

/// Length of a rendered [`RecordIdentity`] (128 bits as lowercase hex).
pub const IDENTITY_HEX_LEN: usize = 32;

const ROOT_FIELD: &str = "<root>";

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum KernelError {
    #[error("unrepresentable value for field `{field}`: {reason}")]
    UnrepresentableValue { field: String, reason: String },
    #[error("invalid record identity: {0}")]
    InvalidIdentity(String),
}

impl KernelError {
    fn unrepresentable(field: &str, reason: impl Into<String>) -> Self {
        Self::UnrepresentableValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A single field value of a [`Record`].
///
/// Only scalars are representable. Numbers are backed by [`serde_json::Number`], which cannot
/// hold `NaN` or infinities, so every value has a stable textual form.
#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Number(Number),
    Text(String),
}

impl ScalarValue {
    /// Build a numeric value from a float.
    ///
    /// # Errors
    /// Returns [`KernelError::UnrepresentableValue`] when `value` is `NaN` or infinite.
    pub fn from_f64(field: &str, value: f64) -> Result<Self, KernelError> {
        Number::from_f64(value).map(Self::Number).ok_or_else(|| {
            KernelError::unrepresentable(field, format!("non-finite number {value}"))
        })
    }

    /// Convert one untyped JSON value into a scalar.
    ///
    /// # Errors
    /// Returns [`KernelError::UnrepresentableValue`] for `null`, arrays and objects.
    pub fn from_json(field: &str, value: &Value) -> Result<Self, KernelError> {
        match value {
            Value::Bool(flag) => Ok(Self::Bool(*flag)),
            Value::Number(number) => Ok(Self::Number(number.clone())),
            Value::String(text) => Ok(Self::Text(text.clone())),
            other => Err(KernelError::unrepresentable(
                field,
                format!("{} is not a scalar value", json_kind(other)),
            )),
        }
    }

    fn write_canonical(&self, out: &mut String) {
        match self {
            Self::Bool(true) => out.push_str("true"),
            Self::Bool(false) => out.push_str("false"),
            Self::Number(number) => match number.as_f64() {
                Some(float) if number.is_f64() => write_float(out, float),
                _ => {
                    let _ = write!(out, "{number}");
                }
            },
            Self::Text(text) => write_json_string(out, text),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<u64> for ScalarValue {
    fn from(value: u64) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// A flat mapping of field names to scalar values.
///
/// Fields are kept sorted by key, so two records built from the same pairs in a different
/// order compare equal and share one [`RecordIdentity`].
#[derive(Debug, Clone, Default, Serialize, Eq, PartialEq)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, ScalarValue>);

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter; the last value for a repeated key wins.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Convert an untyped JSON value into a record.
    ///
    /// # Errors
    /// Returns [`KernelError::UnrepresentableValue`] when the root is not an object or any field
    /// holds a non-scalar value.
    pub fn from_json(value: &Value) -> Result<Self, KernelError> {
        match value {
            Value::Object(object) => Self::from_json_object(object),
            other => Err(KernelError::unrepresentable(
                ROOT_FIELD,
                format!("record must be an object, got {}", json_kind(other)),
            )),
        }
    }

    /// Convert a JSON object into a record, failing on the first non-scalar field.
    ///
    /// # Errors
    /// Returns [`KernelError::UnrepresentableValue`] naming the offending field.
    pub fn from_json_object(object: &Map<String, Value>) -> Result<Self, KernelError> {
        object
            .iter()
            .map(|(key, value)| Ok((key.clone(), ScalarValue::from_json(key, value)?)))
            .collect::<Result<BTreeMap<_, _>, KernelError>>()
            .map(Self)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ScalarValue> {
        self.0.get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScalarValue)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Canonical text form used both for hashing and as the stored payload.
    ///
    /// Keys are sorted by code point, entries are separated by `", "` and keys from values by
    /// `": "`. Strings are escaped so the output is pure printable ASCII: anything outside
    /// `' '..='~'` becomes a lowercase `\uXXXX` escape (surrogate pairs above the BMP).
    #[must_use]
    pub fn canonical_json(&self) -> String {
        let mut out = String::with_capacity(2 + self.0.len() * 24);
        out.push('{');
        for (index, (key, value)) in self.0.iter().enumerate() {
            if index > 0 {
                out.push_str(", ");
            }
            write_json_string(&mut out, key);
            out.push_str(": ");
            value.write_canonical(&mut out);
        }
        out.push('}');
        out
    }

    #[must_use]
    pub fn identity(&self) -> RecordIdentity {
        RecordIdentity::of(self)
    }
}

impl FromIterator<(String, ScalarValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, ScalarValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn write_json_string(out: &mut String, value: &str) {
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            ' '..='~' => out.push(ch),
            _ => {
                let mut units = [0_u16; 2];
                for unit in ch.encode_utf16(&mut units).iter() {
                    let _ = write!(out, "\\u{unit:04x}");
                }
            }
        }
    }
    out.push('"');
}

fn zeros(count: i32) -> String {
    "0".repeat(usize::try_from(count).unwrap_or_default())
}

/// Shortest round-trip digits of `value`, laid out like Python's float repr: positional for
/// decimal exponents in `-4..16`, otherwise `d.ddde+XX` with a signed two-digit exponent.
fn write_float(out: &mut String, value: f64) {
    if value.is_sign_negative() {
        out.push('-');
    }
    let scientific = format!("{:e}", value.abs());
    let (mantissa, exponent) = scientific
        .split_once('e')
        .unwrap_or((scientific.as_str(), "0"));
    let exponent = exponent.parse::<i32>().unwrap_or_default();
    let digits = mantissa.replace('.', "");

    if !(-4..16).contains(&exponent) {
        let (lead, rest) = digits.split_at(1);
        out.push_str(lead);
        if !rest.is_empty() {
            out.push('.');
            out.push_str(rest);
        }
        let sign = if exponent < 0 { '-' } else { '+' };
        let _ = write!(out, "e{sign}{:02}", exponent.unsigned_abs());
    } else if exponent < 0 {
        out.push_str("0.");
        out.push_str(&zeros(-exponent - 1));
        out.push_str(&digits);
    } else {
        let point = usize::try_from(exponent + 1).unwrap_or_default();
        if digits.len() > point {
            out.push_str(&digits[..point]);
            out.push('.');
            out.push_str(&digits[point..]);
        } else {
            out.push_str(&digits);
            out.push_str(&"0".repeat(point - digits.len()));
            out.push_str(".0");
        }
    }
}

/// Deterministic 128-bit content fingerprint of a [`Record`], rendered as lowercase hex.
///
/// The digest is MD5 over the UTF-8 bytes of [`Record::canonical_json`]. It is used for
/// accidental-collision avoidance only, not as a security boundary.
#[derive(Debug, Clone, Serialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct RecordIdentity(String);

impl RecordIdentity {
    #[must_use]
    pub fn of(record: &Record) -> Self {
        Self::of_canonical(&record.canonical_json())
    }

    fn of_canonical(canonical: &str) -> Self {
        Self(format!("{:x}", Md5::digest(canonical.as_bytes())))
    }

    /// Parse a rendered identity, e.g. a slot file stem.
    ///
    /// # Errors
    /// Returns [`KernelError::InvalidIdentity`] unless `raw` is exactly 32 lowercase hex digits.
    pub fn parse(raw: &str) -> Result<Self, KernelError> {
        let well_formed = raw.len() == IDENTITY_HEX_LEN
            && raw.bytes().all(|byte| matches!(byte, b'0'..=b'9' | b'a'..=b'f'));
        if well_formed {
            Ok(Self(raw.to_string()))
        } else {
            Err(KernelError::InvalidIdentity(format!(
                "expected {IDENTITY_HEX_LEN} lowercase hex characters, got `{raw}`"
            )))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RecordIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of an untyped JSON object, failing explicitly on non-scalar content.
///
/// # Errors
/// Returns [`KernelError::UnrepresentableValue`] when `value` cannot be converted to a
/// [`Record`].
pub fn identity_of_json(value: &Value) -> Result<RecordIdentity, KernelError> {
    Record::from_json(value).map(|record| record.identity())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub const ALL: [Self; 3] = [Self::Positive, Self::Neutral, Self::Negative];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "positive" => Some(Self::Positive),
            "neutral" => Some(Self::Neutral),
            "negative" => Some(Self::Negative),
            _ => None,
        }
    }
}

impl Display for Sentiment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
    Missing,
    ObjectType,
    StringType,
    BoolType,
    Enum,
    Unrepresentable,
}

/// One field-level validation failure. `loc` is the field path; it is empty when the input
/// as a whole has the wrong shape.
#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct FieldError {
    pub loc: Vec<String>,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: FieldErrorKind,
}

impl FieldError {
    fn new(loc: Vec<String>, msg: impl Into<String>, kind: FieldErrorKind) -> Self {
        Self {
            loc,
            msg: msg.into(),
            kind,
        }
    }

    fn at(field: &str, msg: impl Into<String>, kind: FieldErrorKind) -> Self {
        Self::new(vec![field.to_string()], msg, kind)
    }

    /// Field-level error for a value the identity function refused.
    #[must_use]
    pub fn from_kernel_error(err: &KernelError) -> Self {
        match err {
            KernelError::UnrepresentableValue { field, .. } if field != ROOT_FIELD => {
                Self::at(field, err.to_string(), FieldErrorKind::Unrepresentable)
            }
            _ => Self::new(Vec::new(), err.to_string(), FieldErrorKind::Unrepresentable),
        }
    }

    /// Top-level field name this error refers to.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        self.loc.first().map(String::as_str)
    }
}

impl Display for FieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.loc.is_empty() {
            write!(f, "{}", self.msg)
        } else {
            write!(f, "{}: {}", self.loc.join("."), self.msg)
        }
    }
}

/// Outcome of parsing untrusted input into a typed request.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Validated<T> {
    Valid(T),
    Invalid(Vec<FieldError>),
}

impl<T> Validated<T> {
    /// # Errors
    /// Returns the collected field errors when validation failed.
    pub fn into_result(self) -> Result<T, Vec<FieldError>> {
        match self {
            Self::Valid(value) => Ok(value),
            Self::Invalid(errors) => Err(errors),
        }
    }
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct RatingRequest {
    pub text: String,
    #[serde(rename = "languageCode")]
    pub language_code: String,
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct SaveRatingRequest {
    pub text: String,
    #[serde(rename = "languageCode")]
    pub language_code: String,
    pub sentiment: Sentiment,
    #[serde(rename = "isGoodTranslation")]
    pub is_good_translation: bool,
}

impl SaveRatingRequest {
    /// The record persisted for this labelling result, keyed by wire field names.
    #[must_use]
    pub fn to_record(&self) -> Record {
        Record::new()
            .with(TEXT_FIELD, self.text.as_str())
            .with(LANGUAGE_CODE_FIELD, self.language_code.as_str())
            .with(SENTIMENT_FIELD, self.sentiment.as_str())
            .with(TRANSLATION_QUALITY_FIELD, self.is_good_translation)
    }
}

struct FieldReader<'a> {
    object: &'a Map<String, Value>,
    errors: Vec<FieldError>,
}

impl<'a> FieldReader<'a> {
    fn new(object: &'a Map<String, Value>) -> Self {
        Self {
            object,
            errors: Vec::new(),
        }
    }

    fn required(&mut self, field: &str) -> Option<&'a Value> {
        let value = self.object.get(field);
        if value.is_none() {
            self.errors.push(FieldError::at(
                field,
                "field required",
                FieldErrorKind::Missing,
            ));
        }
        value
    }

    fn string(&mut self, field: &str) -> Option<String> {
        match self.required(field)? {
            Value::String(text) => Some(text.clone()),
            other => {
                self.errors.push(FieldError::at(
                    field,
                    format!("expected a string, got {}", json_kind(other)),
                    FieldErrorKind::StringType,
                ));
                None
            }
        }
    }

    fn boolean(&mut self, field: &str) -> Option<bool> {
        match self.required(field)? {
            Value::Bool(flag) => Some(*flag),
            other => {
                self.errors.push(FieldError::at(
                    field,
                    format!("expected a boolean, got {}", json_kind(other)),
                    FieldErrorKind::BoolType,
                ));
                None
            }
        }
    }

    fn sentiment(&mut self, field: &str) -> Option<Sentiment> {
        let value = self.required(field)?;
        let parsed = value.as_str().and_then(Sentiment::parse);
        if parsed.is_none() {
            let allowed = Sentiment::ALL
                .iter()
                .map(|label| format!("'{label}'"))
                .collect::<Vec<_>>();
            self.errors.push(FieldError::at(
                field,
                format!(
                    "value is not a valid enumeration member; permitted: {}",
                    allowed.join(", ")
                ),
                FieldErrorKind::Enum,
            ));
        }
        parsed
    }
}

fn not_an_object(input: &Value) -> FieldError {
    FieldError::new(
        Vec::new(),
        format!("request body must be an object, got {}", json_kind(input)),
        FieldErrorKind::ObjectType,
    )
}

/// Parse a "rate this text" request. Unknown fields are ignored; every missing or mistyped
/// required field yields one error.
#[must_use]
pub fn validate_rating_request(input: &Value) -> Validated<RatingRequest> {
    let Some(object) = input.as_object() else {
        return Validated::Invalid(vec![not_an_object(input)]);
    };

    let mut reader = FieldReader::new(object);
    let text = reader.string(TEXT_FIELD);
    let language_code = reader.string(LANGUAGE_CODE_FIELD);

    match (text, language_code) {
        (Some(text), Some(language_code)) => Validated::Valid(RatingRequest {
            text,
            language_code,
        }),
        _ => Validated::Invalid(reader.errors),
    }
}

/// Parse a "save this labelled result" request: the rating shape plus `sentiment` and
/// `isGoodTranslation`.
#[must_use]
pub fn validate_save_request(input: &Value) -> Validated<SaveRatingRequest> {
    let Some(object) = input.as_object() else {
        return Validated::Invalid(vec![not_an_object(input)]);
    };

    let mut reader = FieldReader::new(object);
    let text = reader.string(TEXT_FIELD);
    let language_code = reader.string(LANGUAGE_CODE_FIELD);
    let sentiment = reader.sentiment(SENTIMENT_FIELD);
    let is_good_translation = reader.boolean(TRANSLATION_QUALITY_FIELD);

    match (text, language_code, sentiment, is_good_translation) {
        (Some(text), Some(language_code), Some(sentiment), Some(is_good_translation)) => {
            Validated::Valid(SaveRatingRequest {
                text,
                language_code,
                sentiment,
                is_good_translation,
            })
        }
        _ => Validated::Invalid(reader.errors),
    }
}
