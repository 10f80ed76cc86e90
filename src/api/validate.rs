//! Input validation shared by the human and agent routes.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Deserializer};
use url::Url;

use super::ApiError;

pub const TITLE_MAX: usize = 500;
pub const NAME_MAX: usize = 200;

/// Trims `value` and checks it is non-empty and at most `max` characters.
pub fn required_text(field: &'static str, value: &str, max: usize) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::invalid(field, format!("{} is required", field)));
    }
    if value.chars().count() > max {
        return Err(ApiError::invalid(
            field,
            format!("{} must be at most {} characters", field, max),
        ));
    }
    Ok(value.to_string())
}

/// Treats an empty string the same as an absent value.
pub fn empty_to_none(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// An optional http(s) URL. The empty string means "no URL".
pub fn optional_url(field: &'static str, value: Option<String>) -> Result<Option<String>, ApiError> {
    let Some(value) = empty_to_none(value) else {
        return Ok(None);
    };
    let value = value.trim();
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Some(value.to_string())),
        _ => Err(ApiError::invalid(field, format!("{} must be a valid URL", field))),
    }
}

/// Like [`optional_url`] for partial updates, where the outer `Option` marks
/// presence.
pub fn patch_url(
    field: &'static str,
    value: Option<Option<String>>,
) -> Result<Option<Option<String>>, ApiError> {
    value.map(|v| optional_url(field, v)).transpose()
}

pub fn patch_text(value: Option<Option<String>>) -> Option<Option<String>> {
    value.map(empty_to_none)
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp, keeping the date.
pub fn optional_date(field: &'static str, value: Option<String>) -> Result<Option<NaiveDate>, ApiError> {
    let Some(value) = empty_to_none(value) else {
        return Ok(None);
    };
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(value).map(|dt| dt.date_naive()))
        .map(Some)
        .map_err(|_| ApiError::invalid(field, format!("{} must be a date (YYYY-MM-DD)", field)))
}

pub fn patch_date(
    field: &'static str,
    value: Option<Option<String>>,
) -> Result<Option<Option<NaiveDate>>, ApiError> {
    value.map(|v| optional_date(field, v)).transpose()
}

/// Parses an enum value with `parse`, naming `field` on failure.
pub fn enum_value<T>(
    field: &'static str,
    raw: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, ApiError> {
    parse(raw).ok_or_else(|| ApiError::invalid(field, format!("invalid {} '{}'", field, raw)))
}

pub fn optional_enum<T>(
    field: &'static str,
    raw: Option<&str>,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>, ApiError> {
    raw.map(|raw| enum_value(field, raw, parse)).transpose()
}

/// Deserializer for nullable fields in partial updates: a missing key stays
/// `None` (with `#[serde(default)]`), an explicit `null` becomes `Some(None)`.
pub fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmboard_core::models::FeatureStatus;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "double_option")]
        spec: Option<Option<String>>,
    }

    #[test]
    fn double_option_distinguishes_missing_from_null() {
        let missing: Patch = serde_json::from_str("{}").unwrap();
        let null: Patch = serde_json::from_str(r#"{"spec": null}"#).unwrap();
        let set: Patch = serde_json::from_str(r#"{"spec": "x"}"#).unwrap();

        assert_eq!(missing.spec, None);
        assert_eq!(null.spec, Some(None));
        assert_eq!(set.spec, Some(Some("x".into())));
    }

    #[test]
    fn titles_are_trimmed_and_bounded() {
        assert_eq!(required_text("title", "  Login  ", TITLE_MAX).unwrap(), "Login");
        assert!(required_text("title", "   ", TITLE_MAX).is_err());
        assert!(required_text("name", &"x".repeat(NAME_MAX + 1), NAME_MAX).is_err());
    }

    #[test]
    fn urls_accept_empty_and_reject_garbage() {
        assert_eq!(optional_url("repo_url", Some("".into())).unwrap(), None);
        assert_eq!(
            optional_url("repo_url", Some("https://github.com/org/repo".into())).unwrap(),
            Some("https://github.com/org/repo".into())
        );
        let err = optional_url("repo_url", Some("not a url".into())).unwrap_err();
        assert!(matches!(err, ApiError::Validation { field: Some("repo_url"), .. }));
        assert!(optional_url("repo_url", Some("ftp://example.com".into())).is_err());
    }

    #[test]
    fn dates_accept_plain_and_timestamp_forms() {
        let expected = NaiveDate::from_ymd_opt(2025, 6, 30);
        assert_eq!(optional_date("target_date", Some("2025-06-30".into())).unwrap(), expected);
        assert_eq!(
            optional_date("target_date", Some("2025-06-30T00:00:00.000Z".into())).unwrap(),
            expected
        );
        assert!(optional_date("target_date", Some("June".into())).is_err());
    }

    #[test]
    fn enum_errors_name_the_field() {
        let err = enum_value("status", "in progress", FeatureStatus::from_str).unwrap_err();
        assert!(matches!(err, ApiError::Validation { field: Some("status"), .. }));
        assert_eq!(
            enum_value("status", "in progress", FeatureStatus::parse_lenient).unwrap(),
            FeatureStatus::InProgress
        );
    }
}
