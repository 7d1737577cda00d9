use chrono::SecondsFormat;
use mongodb::bson::DateTime;

pub mod membership;
pub mod org;
pub mod user;

#[cfg(all(test, feature = "e2e"))]
mod store_tests;

/// Wire format of stored timestamps, e.g. `2024-01-31T09:30:00.000Z`.
pub(crate) fn rfc3339(dt: DateTime) -> String {
    chrono::DateTime::from_timestamp_millis(dt.timestamp_millis())
        .map(|d| d.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc3339() {
        assert_eq!(rfc3339(DateTime::from_millis(0)), "1970-01-01T00:00:00.000Z");
        assert_eq!(
            rfc3339(DateTime::from_millis(1_706_693_400_250)),
            "2024-01-31T09:30:00.250Z"
        );
    }
}
