//! Purpose: Bind the facade to one JSON engine for the life of the process.
//! Exports: `Backend`, `BackendKind`, `ParseFailureCategory`, `init`, `active`, `get`.
//! Role: Parser/encoder boundary that centralizes simd-json and serde_json usage details.
//! Invariants: Selection happens at most once (`OnceLock`); the choice never changes after.
//! Invariants: simd-json is preferred when compiled in; serde_json is always available.
//! Invariants: Both backends accept and reject the same documents; simd-json defers to
//! serde_json whenever it rejects input.
//! Notes: Input buffers are copied once to satisfy the simd-json mutable-slice API.
//! Notes: Deserializers run under `serde_stacker`, so depth is bounded by the facade ceiling
//! rather than by the calling thread's stack.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::error::{Error, ErrorKind};

/// Environment variable read by `active()`: `simd`, `serde`, or `auto`.
pub const BACKEND_ENV: &str = "JSON_FACADE_BACKEND";

/// serde_json's built-in recursion ceiling.
const SERDE_NATIVE_MAX_NESTING: usize = 128;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BackendKind {
    Simd,
    Serde,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Simd => "simd",
            BackendKind::Serde => "serde",
        }
    }

    pub fn is_available(self) -> bool {
        get(self).is_some()
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "simd" | "simd-json" => Ok(BackendKind::Simd),
            "serde" | "serde_json" | "serde-json" => Ok(BackendKind::Serde),
            other => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unknown json backend `{other}`"))
                .with_hint("Use `simd` or `serde`.")),
        }
    }
}

/// One JSON engine. Every backend honors the same decode/encode contract.
pub trait Backend: fmt::Debug + Send + Sync {
    fn kind(&self) -> BackendKind;

    /// The engine's own recursion ceiling, if it has one.
    fn native_max_nesting(&self) -> Option<usize>;

    fn parse(&self, input: &str) -> Result<Value, Error>;

    fn generate(&self, value: &Value, pretty: bool) -> Result<String, Error>;
}

#[derive(Debug)]
pub struct SerdeBackend;

impl Backend for SerdeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Serde
    }

    fn native_max_nesting(&self) -> Option<usize> {
        Some(SERDE_NATIVE_MAX_NESTING)
    }

    // Native ceiling off: depth is bounded by the pre-scan in `nesting`.
    fn parse(&self, input: &str) -> Result<Value, Error> {
        let mut de = serde_json::Deserializer::from_str(input);
        de.disable_recursion_limit();
        let value = Value::deserialize(serde_stacker::Deserializer::new(&mut de))
            .map_err(serde_parse_error)?;
        de.end().map_err(serde_parse_error)?;
        Ok(value)
    }

    fn generate(&self, value: &Value, pretty: bool) -> Result<String, Error> {
        let encoded = if pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        encoded.map_err(|err| encode_error(BackendKind::Serde, err))
    }
}

#[cfg(feature = "simd")]
#[derive(Debug)]
pub struct SimdBackend;

#[cfg(feature = "simd")]
impl Backend for SimdBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Simd
    }

    fn native_max_nesting(&self) -> Option<usize> {
        None
    }

    // simd-json rejects some valid documents (integers beyond 64 bits), so
    // any rejection is settled by serde_json, which also supplies the error.
    fn parse(&self, input: &str) -> Result<Value, Error> {
        let mut bytes = input.as_bytes().to_vec();
        let parsed = simd_json::Deserializer::from_slice(&mut bytes)
            .and_then(|mut de| Value::deserialize(serde_stacker::Deserializer::new(&mut de)));
        parsed.or_else(|err| {
            debug!(error = %err, "simd-json rejected input; deferring to serde_json");
            SERDE.parse(input)
        })
    }

    fn generate(&self, value: &Value, pretty: bool) -> Result<String, Error> {
        let encoded = if pretty {
            simd_json::serde::to_string_pretty(value)
        } else {
            simd_json::serde::to_string(value)
        };
        encoded.map_err(|err| encode_error(BackendKind::Simd, err))
    }
}

static SERDE: SerdeBackend = SerdeBackend;
#[cfg(feature = "simd")]
static SIMD: SimdBackend = SimdBackend;

static ACTIVE: OnceLock<&'static dyn Backend> = OnceLock::new();

/// The backend for `kind`, if it is compiled into this build.
pub fn get(kind: BackendKind) -> Option<&'static dyn Backend> {
    match kind {
        #[cfg(feature = "simd")]
        BackendKind::Simd => Some(&SIMD),
        #[cfg(not(feature = "simd"))]
        BackendKind::Simd => None,
        BackendKind::Serde => Some(&SERDE),
    }
}

pub fn available() -> Vec<BackendKind> {
    [BackendKind::Simd, BackendKind::Serde]
        .into_iter()
        .filter(|kind| kind.is_available())
        .collect()
}

/// The backend chosen when the caller expresses no preference.
pub fn preferred() -> BackendKind {
    if BackendKind::Simd.is_available() {
        BackendKind::Simd
    } else {
        BackendKind::Serde
    }
}

/// Resolve a preference to a backend, falling back to serde_json when the
/// requested engine is not compiled in.
pub fn select(preference: Option<BackendKind>) -> &'static dyn Backend {
    let wanted = preference.unwrap_or_else(preferred);
    match get(wanted) {
        Some(backend) => {
            debug!(backend = wanted.as_str(), "selected json backend");
            backend
        }
        None => {
            warn!(
                requested = wanted.as_str(),
                fallback = BackendKind::Serde.as_str(),
                "json backend unavailable; falling back"
            );
            &SERDE
        }
    }
}

/// Fix the process-wide backend. The first call (or `active()`) wins; later
/// calls return the backend already chosen.
pub fn init(preference: Option<BackendKind>) -> &'static dyn Backend {
    *ACTIVE.get_or_init(|| select(preference))
}

/// The process-wide backend, selected on first use from `JSON_FACADE_BACKEND`.
pub fn active() -> &'static dyn Backend {
    *ACTIVE.get_or_init(|| select(env_preference()))
}

fn env_preference() -> Option<BackendKind> {
    let raw = std::env::var(BACKEND_ENV).ok()?;
    if raw.trim().is_empty() || raw.trim().eq_ignore_ascii_case("auto") {
        return None;
    }
    match raw.parse() {
        Ok(kind) => Some(kind),
        Err(_) => {
            warn!(value = %raw, env = BACKEND_ENV, "ignoring unknown json backend");
            None
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParseFailureCategory {
    Syntax,
    Eof,
    NumericRange,
    Utf8,
    DepthLimit,
    Unknown,
}

impl ParseFailureCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ParseFailureCategory::Syntax => "syntax",
            ParseFailureCategory::Eof => "eof",
            ParseFailureCategory::NumericRange => "numeric-range",
            ParseFailureCategory::Utf8 => "utf8",
            ParseFailureCategory::DepthLimit => "depth-limit",
            ParseFailureCategory::Unknown => "unknown",
        }
    }
}

/// Classify a backend parse error message. Order matters: depth and encoding
/// problems are often also reported as "invalid".
pub fn categorize_message(message: &str) -> ParseFailureCategory {
    let lower = message.to_ascii_lowercase();
    if lower.contains("recursion limit") || lower.contains("depth") {
        return ParseFailureCategory::DepthLimit;
    }
    if lower.contains("utf") || lower.contains("surrogate") {
        return ParseFailureCategory::Utf8;
    }
    if lower.contains("out of range")
        || lower.contains("overflow")
        || lower.contains("invalidnumber")
        || lower.contains("invalid number")
        || lower.contains("invalidexponent")
    {
        return ParseFailureCategory::NumericRange;
    }
    if lower.contains("eof") || lower.contains("end of") {
        return ParseFailureCategory::Eof;
    }
    if ["expected", "syntax", "invalid", "trailing", "unexpected", "key must"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        return ParseFailureCategory::Syntax;
    }
    ParseFailureCategory::Unknown
}

fn serde_parse_error(err: serde_json::Error) -> Error {
    use serde_json::error::Category;

    let category = match err.classify() {
        Category::Eof => ParseFailureCategory::Eof,
        Category::Io => ParseFailureCategory::Unknown,
        Category::Syntax | Category::Data => match categorize_message(&err.to_string()) {
            ParseFailureCategory::Unknown => ParseFailureCategory::Syntax,
            category => category,
        },
    };
    parse_error(category, err)
}

fn parse_error(
    category: ParseFailureCategory,
    err: impl std::error::Error + Send + Sync + 'static,
) -> Error {
    Error::new(ErrorKind::Parse)
        .with_message(err.to_string())
        .with_hint(format!("parse category: {}", category.as_str()))
        .with_source(err)
}

fn encode_error(kind: BackendKind, err: impl std::error::Error + Send + Sync + 'static) -> Error {
    Error::new(ErrorKind::Encode)
        .with_message(format!("{kind} backend failed to encode: {err}"))
        .with_source(err)
}
