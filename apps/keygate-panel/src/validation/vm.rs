//! Heuristic virtual-machine detection.
//!
//! Scoring: a hypervisor MAC vendor prefix adds 3, a VM-looking machine name
//! adds 2, a hypervisor processor string adds 2. A score of 5 or more is a
//! high-confidence match, 3-4 medium, 1-2 low.

use serde::Serialize;

const VM_MAC_PREFIXES: [(&str, &str); 10] = [
    ("00:05:69", "VMware"),
    ("00:0C:29", "VMware"),
    ("00:1C:14", "VMware"),
    ("00:50:56", "VMware"),
    ("08:00:27", "VirtualBox"),
    ("0A:00:27", "VirtualBox"),
    ("00:15:5D", "Hyper-V"),
    ("00:1C:42", "Parallels"),
    ("00:16:3E", "Xen"),
    ("52:54:00", "QEMU/KVM"),
];

const VM_NAME_MARKERS: [&str; 7] = ["vbox", "vmware", "virtual", "qemu", "kvm", "hyper-v", "sandbox"];

const VM_CPU_MARKERS: [&str; 7] = [
    "qemu",
    "kvm",
    "vmware",
    "virtualbox",
    "hypervisor",
    "virtual cpu",
    "xen",
];

const MAC_SCORE: u8 = 3;
const NAME_SCORE: u8 = 2;
const CPU_SCORE: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VmConfidence {
    None,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VmReport {
    pub score: u8,
    pub indicators: Vec<String>,
}

impl VmReport {
    pub fn confidence(&self) -> VmConfidence {
        match self.score {
            0 => VmConfidence::None,
            1..=2 => VmConfidence::Low,
            3..=4 => VmConfidence::Medium,
            _ => VmConfidence::High,
        }
    }

    /// Medium and high confidence matches are blocked when the product
    /// forbids virtual machines.
    pub fn should_block(&self) -> bool {
        self.confidence() >= VmConfidence::Medium
    }
}

/// `mac_addresses` must already be normalised to uppercase colon form.
pub fn assess(mac_addresses: &[String], computer_name: &str, processor: Option<&str>) -> VmReport {
    let mut report = VmReport::default();

    let vendor = mac_addresses.iter().find_map(|mac| {
        VM_MAC_PREFIXES
            .iter()
            .find(|(prefix, _)| mac.starts_with(prefix))
            .map(|(_, vendor)| (mac, *vendor))
    });
    if let Some((mac, vendor)) = vendor {
        report.score += MAC_SCORE;
        report.indicators.push(format!("mac:{} ({})", mac, vendor));
    }

    let name = computer_name.to_lowercase();
    if let Some(marker) = VM_NAME_MARKERS.iter().find(|m| name.contains(*m)) {
        report.score += NAME_SCORE;
        report.indicators.push(format!("computer_name:{}", marker));
    } else if name.starts_with("vm-") {
        report.score += NAME_SCORE;
        report.indicators.push("computer_name:vm-".to_string());
    }

    if let Some(cpu) = processor.map(str::to_lowercase) {
        if let Some(marker) = VM_CPU_MARKERS.iter().find(|m| cpu.contains(*m)) {
            report.score += CPU_SCORE;
            report.indicators.push(format!("processor:{}", marker));
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_metal_scores_zero() {
        let report = assess(
            &["3C:22:FB:10:20:30".to_string()],
            "JANE-LAPTOP",
            Some("Intel(R) Core(TM) i7-1165G7"),
        );
        assert_eq!(report.score, 0);
        assert_eq!(report.confidence(), VmConfidence::None);
        assert!(report.indicators.is_empty());
    }

    #[test]
    fn name_alone_is_low_and_allowed() {
        let report = assess(&[], "vm-build-01", None);
        assert_eq!(report.confidence(), VmConfidence::Low);
        assert!(!report.should_block());
    }

    #[test]
    fn mac_prefix_is_medium() {
        let report = assess(&["08:00:27:12:34:56".to_string()], "office-pc", None);
        assert_eq!(report.score, 3);
        assert_eq!(report.confidence(), VmConfidence::Medium);
        assert!(report.should_block());
        assert_eq!(report.indicators, vec!["mac:08:00:27:12:34:56 (VirtualBox)"]);
    }

    #[test]
    fn all_signals_are_high() {
        let report = assess(
            &["00:0C:29:AA:BB:CC".to_string(), "00:50:56:AA:BB:CC".to_string()],
            "VMWARE-WIN10",
            Some("QEMU Virtual CPU version 2.5+"),
        );
        assert_eq!(report.score, 7);
        assert_eq!(report.confidence(), VmConfidence::High);
        assert_eq!(report.indicators.len(), 3);
    }
}
