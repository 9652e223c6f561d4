//! Path parameter converters.
//!
//! A converter is a pair: the regex fragment a placeholder matches, and the
//! coercion applied to what it captured.
//!
//! | tag | matches | yields |
//! |---|---|---|
//! | `str` (default) | `[^/]+` | [`Value::Str`] |
//! | `int` | `[0-9]+` | [`Value::Int`] |
//! | `float` | `[0-9]+(\.[0-9]+)?` | [`Value::Float`] |
//! | `path` | `.*` | [`Value::Str`], may contain `/` |
//! | `uuid` | `8-4-4-4-12` hex | [`Value::Uuid`] |
//!
//! Any other tag is taken as a regex fragment verbatim and yields the
//! captured string unchanged, e.g. `{code:[A-Z]{3}}`.

use std::borrow::Cow;

use uuid::Uuid;

use crate::params::Value;

const UUID_PATTERN: &str =
    "[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}";

/// A placeholder type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Converter {
    Str,
    Int,
    Float,
    Path,
    Uuid,
    /// Caller-supplied regex fragment with identity coercion.
    Custom(String),
}

impl Converter {
    /// Looks up a type tag. Unknown tags become [`Converter::Custom`].
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "str"  => Self::Str,
            "int"  => Self::Int,
            "float" => Self::Float,
            "path" => Self::Path,
            "uuid" => Self::Uuid,
            other  => Self::Custom(other.to_owned()),
        }
    }

    /// The regex fragment placed inside the named capture group.
    pub fn pattern(&self) -> &str {
        match self {
            Self::Str   => "[^/]+",
            Self::Int   => "[0-9]+",
            Self::Float => r"[0-9]+(\.[0-9]+)?",
            Self::Path  => ".*",
            Self::Uuid  => UUID_PATTERN,
            Self::Custom(pattern) => pattern,
        }
    }

    /// Percent-decodes a captured value, then coerces it.
    ///
    /// `None` when the capture matched the pattern but does not fit the
    /// target type (an integer that overflows `i64`). The route is then
    /// treated as not matching.
    pub fn convert(&self, raw: &str) -> Option<Value> {
        let decoded = percent_decode(raw);
        match self {
            Self::Str | Self::Path | Self::Custom(_) => Some(Value::Str(decoded.into_owned())),
            Self::Int   => decoded.parse().ok().map(Value::Int),
            Self::Float => decoded.parse().ok().map(Value::Float),
            Self::Uuid  => Uuid::parse_str(&decoded).ok().map(Value::Uuid),
        }
    }
}

/// Lossy percent-decoding: `%XX` escapes are decoded, `+` is left alone,
/// and invalid UTF-8 becomes U+FFFD.
pub(crate) fn percent_decode(raw: &str) -> Cow<'_, str> {
    if !raw.contains('%') {
        return Cow::Borrowed(raw);
    }
    let bytes = urlencoding::decode_binary(raw.as_bytes());
    Cow::Owned(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tags() {
        assert_eq!(Converter::from_tag("int"), Converter::Int);
        assert_eq!(Converter::from_tag("uuid"), Converter::Uuid);
        assert_eq!(
            Converter::from_tag("[a-z]+"),
            Converter::Custom("[a-z]+".to_owned())
        );
    }

    #[test]
    fn coercions() {
        assert_eq!(Converter::Int.convert("42"), Some(Value::Int(42)));
        assert_eq!(Converter::Float.convert("25.5"), Some(Value::Float(25.5)));
        assert_eq!(Converter::Int.convert("99999999999999999999"), None);

        let id = "EC38DF32-CEDA-4CFA-9B4A-1AEB94AD551A";
        assert_eq!(
            Converter::Uuid.convert(id),
            Some(Value::Uuid(Uuid::parse_str(&id.to_lowercase()).unwrap()))
        );
    }

    #[test]
    fn decodes_before_coercing() {
        assert_eq!(
            Converter::Str.convert("hello%20world"),
            Some(Value::Str("hello world".to_owned()))
        );
        assert_eq!(
            Converter::Path.convert("a%2Fb/c+d"),
            Some(Value::Str("a/b/c+d".to_owned()))
        );
        assert_eq!(Converter::Int.convert("%34%32"), Some(Value::Int(42)));
    }
}
