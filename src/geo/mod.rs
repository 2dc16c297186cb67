/// Whether a rider registered in `rider_zone` may collect from a vendor in `vendor_zone`.
///
/// A missing or blank zone on either side imposes no constraint. Otherwise the
/// labels must match exactly: no case folding, trimming or substring matching.
pub fn eligible(rider_zone: Option<&str>, vendor_zone: Option<&str>) -> bool {
    match (non_blank(rider_zone), non_blank(vendor_zone)) {
        (Some(rider), Some(vendor)) => rider == vendor,
        _ => true,
    }
}

/// Zones of `vendor_zones` the rider may not serve, in input order.
pub fn mismatched_zones<'a, I>(rider_zone: Option<&str>, vendor_zones: I) -> Vec<&'a str>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    vendor_zones
        .into_iter()
        .filter_map(|zone| match zone {
            Some(zone) if !eligible(rider_zone, Some(zone)) => Some(zone),
            _ => None,
        })
        .collect()
}

fn non_blank(zone: Option<&str>) -> Option<&str> {
    zone.filter(|z| !z.is_empty())
}

#[cfg(test)]
mod tests {
    use super::{eligible, mismatched_zones};

    #[test]
    fn unrestricted_rider_matches_any_vendor() {
        assert!(eligible(None, Some("Lagos")));
        assert!(eligible(Some(""), Some("Lagos")));
    }

    #[test]
    fn vendor_without_zone_imposes_nothing() {
        assert!(eligible(Some("Lagos"), None));
        assert!(eligible(Some("Lagos"), Some("")));
    }

    #[test]
    fn zones_compare_exactly() {
        assert!(eligible(Some("Lagos"), Some("Lagos")));
        assert!(!eligible(Some("Lagos"), Some("Abuja")));
        assert!(!eligible(Some("Lagos"), Some("lagos")));
        assert!(!eligible(Some("Lagos"), Some("Lagos State")));
    }

    #[test]
    fn collects_every_conflicting_zone() {
        let zones = [Some("Lagos"), None, Some("Abuja"), Some("Kano")];
        assert_eq!(
            mismatched_zones(Some("Lagos"), zones),
            vec!["Abuja", "Kano"]
        );
        assert!(mismatched_zones(None, zones).is_empty());
    }
}
