use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Append a timestamp suffix to `prefix` in a format accepted by the serving platform
/// for resource names: `prefix-YYYY-MM-DD-HH-MM-SS-xxxx`.
///
/// The trailing four hex characters keep names created within the same second distinct.
pub fn append_timestamp(prefix: &str, now: DateTime<Utc>) -> String {
    let nonce = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", prefix, now.format("%Y-%m-%d-%H-%M-%S"), &nonce[..4])
}

/// Derive a resource name that is stable for one `scope`: `prefix-<12 hex of scope>`.
///
/// Repeated calls with the same scope yield the same name, so a retried create can find
/// what an earlier attempt left behind.
pub fn scoped_name(prefix: &str, scope: Uuid) -> String {
    let scope = scope.simple().to_string();
    format!("{}-{}", prefix, &scope[..12])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_append_timestamp_format() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let name = append_timestamp("fc-endpoint-target", now);
        assert!(name.starts_with("fc-endpoint-target-2024-03-09-14-05-07-"));
        assert_eq!(name.len(), "fc-endpoint-target-2024-03-09-14-05-07-".len() + 4);
    }

    #[test]
    fn test_same_second_names_differ() {
        let now = Utc::now();
        assert_ne!(append_timestamp("ep", now), append_timestamp("ep", now));
    }

    #[test]
    fn test_scoped_name_is_stable_per_scope() {
        let scope = Uuid::new_v4();
        let name = scoped_name("churn-target", scope);
        assert_eq!(name, scoped_name("churn-target", scope));
        assert_eq!(name.len(), "churn-target-".len() + 12);
        assert_ne!(name, scoped_name("churn-target", Uuid::new_v4()));
    }
}
