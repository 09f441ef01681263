use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftSeverity {
    None,
    /// Adapters were added, none disappeared.
    Low,
    /// Some known adapters disappeared.
    Medium,
    /// Every known adapter was replaced.
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HardwareDrift {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub severity: DriftSeverity,
}

/// Compares the MAC list last seen for a license with the current one.
/// A license that has never reported MACs cannot drift.
pub fn compare(stored: &[String], current: &[String]) -> HardwareDrift {
    let added: Vec<String> = current
        .iter()
        .filter(|mac| !stored.contains(mac))
        .cloned()
        .collect();
    let removed: Vec<String> = stored
        .iter()
        .filter(|mac| !current.contains(mac))
        .cloned()
        .collect();

    let severity = if stored.is_empty() || (added.is_empty() && removed.is_empty()) {
        DriftSeverity::None
    } else if removed.len() == stored.len() && !added.is_empty() {
        DriftSeverity::High
    } else if !removed.is_empty() {
        DriftSeverity::Medium
    } else {
        DriftSeverity::Low
    };

    HardwareDrift {
        added,
        removed,
        severity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn macs(list: &[&str]) -> Vec<String> {
        list.iter().map(|m| m.to_string()).collect()
    }

    #[test]
    fn unchanged_or_first_report_is_none() {
        let stored = macs(&["AA:AA:AA:AA:AA:01"]);
        assert_eq!(compare(&stored, &stored).severity, DriftSeverity::None);
        assert_eq!(compare(&[], &stored).severity, DriftSeverity::None);
    }

    #[test]
    fn added_adapter_is_low() {
        let drift = compare(
            &macs(&["AA:AA:AA:AA:AA:01"]),
            &macs(&["AA:AA:AA:AA:AA:01", "AA:AA:AA:AA:AA:02"]),
        );
        assert_eq!(drift.severity, DriftSeverity::Low);
        assert_eq!(drift.added, macs(&["AA:AA:AA:AA:AA:02"]));
    }

    #[test]
    fn partial_removal_is_medium() {
        let drift = compare(
            &macs(&["AA:AA:AA:AA:AA:01", "AA:AA:AA:AA:AA:02"]),
            &macs(&["AA:AA:AA:AA:AA:01", "AA:AA:AA:AA:AA:03"]),
        );
        assert_eq!(drift.severity, DriftSeverity::Medium);
    }

    #[test]
    fn empty_report_is_medium_not_high() {
        let drift = compare(&macs(&["AA:AA:AA:AA:AA:01"]), &[]);
        assert_eq!(drift.severity, DriftSeverity::Medium);
    }

    #[test]
    fn full_replacement_is_high() {
        let drift = compare(
            &macs(&["AA:AA:AA:AA:AA:01", "AA:AA:AA:AA:AA:02"]),
            &macs(&["BB:BB:BB:BB:BB:01"]),
        );
        assert_eq!(drift.severity, DriftSeverity::High);
        assert_eq!(drift.removed.len(), 2);
    }
}
