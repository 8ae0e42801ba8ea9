use chrono::{DateTime, Local, TimeZone, Utc};
use lazy_regex::regex;
use std::fmt::Display;

/// Derives a version string for a release. The first dotted version number in the release title
/// wins. Titles without one (like "Nightly Build") fall back to the asset's last-modified date in
/// local time, formatted as `YYYY-MM-DD`.
#[must_use]
pub fn extract_version(release_title: &str, asset_updated_at: &DateTime<Utc>) -> String {
    extract_version_in(release_title, &asset_updated_at.with_timezone(&Local))
}

/// Like [`extract_version`], but the fallback date is formatted in the timezone of
/// `asset_updated_at` instead of local time.
#[must_use]
pub fn extract_version_in<Tz>(release_title: &str, asset_updated_at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    if let Some(m) = regex!(r"\d+(?:\.\d+)+").find(release_title) {
        return m.as_str().to_string();
    }

    asset_updated_at.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::plain("Release 2.3.1", "2.3.1")]
    #[case::tag_style("v1.0", "1.0")]
    #[case::first_wins("NooDS 0.1 (built with 1.2.3)", "0.1")]
    #[case::long("Build 10.0.19041.1", "10.0.19041.1")]
    fn title_with_version(#[case] title: &str, #[case] expect: &str) {
        let at = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        assert_eq!(extract_version_in(title, &at), expect);
    }

    #[rstest]
    #[case::nightly("Nightly")]
    #[case::number_without_dot("Build 42")]
    #[case::empty("")]
    fn title_without_version_uses_the_asset_date(#[case] title: &str) {
        let at = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        assert_eq!(extract_version_in(title, &at), "2024-03-15");
    }

    #[test]
    fn fallback_uses_local_time() {
        let at = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        let expect = at.with_timezone(&Local).format("%Y-%m-%d").to_string();
        assert_eq!(extract_version("Nightly", &at), expect);
    }
}
