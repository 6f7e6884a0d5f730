//! Maps a measurement name to the labels of its `power` series.
//!
//! Rules are applied in order and several may match one name; a later rule
//! overwrites keys set by an earlier one. `type` falls back to `Circuit`
//! when no rule set it.

use crate::model::labels::LabelSet;

pub const METRIC_NAME: &str = "power";
pub const SOURCE: &str = "iotawatt";

struct LabelRule {
    prefixes: &'static [&'static str],
    patch: &'static [(&'static str, &'static str)],
}

impl LabelRule {
    fn matches(&self, measurement: &str) -> bool {
        self.prefixes.iter().any(|p| measurement.starts_with(p))
    }
}

const RULES: &[LabelRule] = &[
    LabelRule {
        prefixes: &["Mains"],
        patch: &[("pair", "Mains"), ("type", "Trunk")],
    },
    LabelRule {
        prefixes: &["SolarA"],
        patch: &[("pair", "SolarA"), ("type", "Trunk")],
    },
    LabelRule {
        prefixes: &["SolarB"],
        patch: &[("pair", "SolarB"), ("type", "Trunk")],
    },
    LabelRule {
        prefixes: &["Solar"],
        patch: &[("solar", "Both")],
    },
    LabelRule {
        prefixes: &["Garage"],
        patch: &[("pair", "Garage"), ("type", "Trunk")],
    },
    LabelRule {
        prefixes: &["Minisplit"],
        patch: &[("hvac", "True"), ("minisplit", "True")],
    },
    LabelRule {
        prefixes: &["OfficeHeat", "BathroomHeat", "Furnace"],
        patch: &[("hvac", "True")],
    },
];

pub fn derive_labels(host: &str, measurement: &str) -> LabelSet {
    let mut labels = LabelSet::new();
    labels.insert("__name__", METRIC_NAME);
    labels.insert("location", measurement);
    labels.insert("source", SOURCE);
    labels.insert("device", host);

    for rule in RULES.iter().filter(|r| r.matches(measurement)) {
        for (key, value) in rule.patch {
            labels.insert(*key, *value);
        }
    }

    if !labels.contains("type") {
        labels.insert("type", "Circuit");
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(labels: &LabelSet) -> Vec<(String, String)> {
        labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn expected(extra: &[(&str, &str)], host: &str, measurement: &str) -> Vec<(String, String)> {
        let mut all: LabelSet = extra.iter().copied().collect();
        all.insert("__name__", "power");
        all.insert("location", measurement);
        all.insert("source", "iotawatt");
        all.insert("device", host);
        pairs(&all)
    }

    #[test]
    fn mains_is_a_trunk_pair() {
        let labels = derive_labels("iwatt5", "Mains_1");
        assert_eq!(
            pairs(&labels),
            expected(&[("pair", "Mains"), ("type", "Trunk")], "iwatt5", "Mains_1")
        );
    }

    #[test]
    fn solar_legs_get_both_pair_and_solar_tags() {
        let a = derive_labels("iwatt5", "SolarA_2");
        assert_eq!(
            pairs(&a),
            expected(
                &[("pair", "SolarA"), ("type", "Trunk"), ("solar", "Both")],
                "iwatt5",
                "SolarA_2"
            )
        );
        let b = derive_labels("iwatt5", "SolarB_1");
        assert_eq!(b.get("pair"), Some("SolarB"));
        assert_eq!(b.get("solar"), Some("Both"));
    }

    #[test]
    fn bare_solar_prefix_is_still_a_circuit() {
        let labels = derive_labels("iwatt5", "SolarWater");
        assert_eq!(labels.get("solar"), Some("Both"));
        assert_eq!(labels.get("type"), Some("Circuit"));
        assert_eq!(labels.get("pair"), None);
    }

    #[test]
    fn garage_is_a_trunk_pair() {
        let labels = derive_labels("iwatt5", "Garage_2");
        assert_eq!(labels.get("pair"), Some("Garage"));
        assert_eq!(labels.get("type"), Some("Trunk"));
    }

    #[test]
    fn minisplit_is_hvac() {
        let labels = derive_labels("iwatt5", "MinisplitGreatAndBlue");
        assert_eq!(
            pairs(&labels),
            expected(
                &[("hvac", "True"), ("minisplit", "True"), ("type", "Circuit")],
                "iwatt5",
                "MinisplitGreatAndBlue"
            )
        );
    }

    #[test]
    fn heaters_and_furnace_are_hvac_circuits() {
        for name in ["OfficeHeat", "BathroomHeat", "Furnace"] {
            let labels = derive_labels("iwatt6", name);
            assert_eq!(labels.get("hvac"), Some("True"), "{name}");
            assert_eq!(labels.get("type"), Some("Circuit"), "{name}");
            assert_eq!(labels.get("minisplit"), None, "{name}");
        }
    }

    #[test]
    fn unmatched_names_default_to_circuit() {
        let labels = derive_labels("iwatt6", "Dishwasher");
        assert_eq!(
            pairs(&labels),
            expected(&[("type", "Circuit")], "iwatt6", "Dishwasher")
        );
    }

    #[test]
    fn prefix_match_is_case_sensitive() {
        let labels = derive_labels("iwatt6", "mains_1");
        assert_eq!(labels.get("type"), Some("Circuit"));
        assert_eq!(labels.get("pair"), None);
    }

    #[test]
    fn derivation_is_stable() {
        assert_eq!(
            derive_labels("iwatt5", "SolarA_1"),
            derive_labels("iwatt5", "SolarA_1")
        );
    }
}
