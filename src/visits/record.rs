//! Building the visit record for an allowed page view

use reqwest::Url;

use crate::models::{VisitContext, VisitRecord};
use crate::visits::anonymize::anonymize;
use crate::visits::geoip::{locate, GeoIpService};

const UNKNOWN: &str = "unknown";

pub fn build_record(ctx: &VisitContext, now: i64, geoip: Option<&GeoIpService>) -> VisitRecord {
    let user_agent = ctx
        .user_agent
        .as_deref()
        .map(str::trim)
        .filter(|ua| !ua.is_empty())
        .unwrap_or(UNKNOWN)
        .to_string();

    let referer = ctx
        .referer
        .as_deref()
        .and_then(valid_referer)
        .unwrap_or_else(|| UNKNOWN.to_string());

    let anonymized_ip = ctx.raw_ip.as_deref().and_then(anonymize);
    let found = anonymized_ip
        .as_deref()
        .map(|ip| locate(geoip, ip))
        .unwrap_or_default();

    VisitRecord {
        timestamp: now,
        user_agent,
        referer,
        anonymized_ip,
        location: found.location,
        timezone: found.timezone,
    }
}

/// Absolute URLs with a host only
fn valid_referer(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    url.has_host().then(|| raw.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TargetId;

    #[test]
    fn test_defaults_for_missing_fields() {
        let ctx = VisitContext::singular(TargetId::post(1));
        let record = build_record(&ctx, 42, None);

        assert_eq!(record.timestamp, 42);
        assert_eq!(record.user_agent, "unknown");
        assert_eq!(record.referer, "unknown");
        assert_eq!(record.anonymized_ip, None);
        assert_eq!(record.location, None);
    }

    #[test]
    fn test_referer_validation() {
        let mut ctx = VisitContext::singular(TargetId::post(1));

        ctx.referer = Some("https://news.example.org/item?id=1".to_string());
        assert_eq!(
            build_record(&ctx, 0, None).referer,
            "https://news.example.org/item?id=1"
        );

        ctx.referer = Some("not a url".to_string());
        assert_eq!(build_record(&ctx, 0, None).referer, "unknown");

        ctx.referer = Some("mailto:someone@example.org".to_string());
        assert_eq!(build_record(&ctx, 0, None).referer, "unknown");
    }

    #[test]
    fn test_ip_is_stored_anonymized() {
        let ctx = VisitContext::singular(TargetId::post(1)).with_ip("198.51.100.23");
        assert_eq!(
            build_record(&ctx, 0, None).anonymized_ip.as_deref(),
            Some("198.51.100.0")
        );

        let ctx = VisitContext::singular(TargetId::post(1)).with_ip("bogus");
        assert_eq!(build_record(&ctx, 0, None).anonymized_ip, None);
    }
}
