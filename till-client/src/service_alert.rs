//! Waiter-call alerting
//!
//! Tables raise `needs_service` from the public menu. Staff are alerted
//! once per transition into the flagged state, not on every refresh that
//! still sees the flag.

use std::collections::HashSet;
use std::io::Write;

use shared::models::DiningTable;

/// Diffs consecutive table snapshots for newly flagged tables
#[derive(Debug, Default)]
pub struct ServiceCallDetector {
    flagged: HashSet<String>,
}

impl ServiceCallDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables flagged now that were not flagged in the previous snapshot
    ///
    /// The first observation compares against an empty snapshot, so tables
    /// already waiting when the till starts are reported once.
    pub fn observe(&mut self, tables: &[DiningTable]) -> Vec<DiningTable> {
        let current: HashSet<String> = tables
            .iter()
            .filter(|t| t.needs_service)
            .map(|t| t.id.clone())
            .collect();

        let newly_flagged = tables
            .iter()
            .filter(|t| t.needs_service && !self.flagged.contains(&t.id))
            .cloned()
            .collect();

        self.flagged = current;
        newly_flagged
    }

    pub fn is_flagged(&self, table_id: &str) -> bool {
        self.flagged.contains(table_id)
    }
}

/// Where waiter-call alerts go
pub trait AlertSink: Send + Sync {
    fn service_requested(&self, table: &DiningTable);
}

/// Terminal bell plus a log line
#[derive(Debug, Default, Clone, Copy)]
pub struct BellAlert;

impl AlertSink for BellAlert {
    fn service_requested(&self, table: &DiningTable) {
        tracing::info!(table_id = %table.id, table = %table.name, "Waiter called");
        let mut stdout = std::io::stdout();
        if let Err(e) = stdout.write_all(b"\x07").and_then(|_| stdout.flush()) {
            tracing::debug!(error = %e, "Terminal bell failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(flagged: bool) -> DiningTable {
        DiningTable {
            needs_service: flagged,
            ..DiningTable::new("t3", "Table 3")
        }
    }

    #[test]
    fn test_alert_once_per_transition() {
        let mut detector = ServiceCallDetector::new();
        let fired: Vec<usize> = [false, false, true, true]
            .into_iter()
            .map(|flag| detector.observe(&[table(flag)]).len())
            .collect();
        assert_eq!(fired, vec![0, 0, 1, 0]);
    }

    #[test]
    fn test_clear_then_raise_alerts_again() {
        let mut detector = ServiceCallDetector::new();
        assert_eq!(detector.observe(&[table(true)]).len(), 1);
        assert!(detector.is_flagged("t3"));
        assert!(detector.observe(&[table(false)]).is_empty());
        assert!(!detector.is_flagged("t3"));
        assert_eq!(detector.observe(&[table(true)]).len(), 1);
    }

    #[test]
    fn test_only_new_tables_reported() {
        let mut detector = ServiceCallDetector::new();
        let mut other = DiningTable::new("t4", "Table 4");
        detector.observe(&[table(true), other.clone()]);
        other.needs_service = true;
        let fired = detector.observe(&[table(true), other]);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].id, "t4");
    }
}
