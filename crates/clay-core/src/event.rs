//! Player-facing event log.
//!
//! This is persisted game history shown in the UI, not diagnostics;
//! diagnostics go through `tracing`. Entries are stored newest first and
//! the log is capped, dropping the oldest entry on overflow.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventCategory {
    System,
    Construction,
    Project,
    Era,
    Contract,
    Dispatch,
    Decision,
    Market,
    Diplomacy,
    Discovery,
    Infrastructure,
    Raid,
    Domain,
    Achievement,
    Metahuman,
    Prestige,
    Policy,
    Narrative,
}

impl EventCategory {
    /// Category for a random event authored with a free-form category name.
    pub fn from_label(label: &str) -> Self {
        match label {
            "market" => Self::Market,
            "diplomacy" => Self::Diplomacy,
            "discovery" => Self::Discovery,
            "infrastructure" => Self::Infrastructure,
            "raid" => Self::Raid,
            "system" => Self::System,
            _ => Self::Narrative,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: u64,
    /// Simulated seconds at which the entry was written.
    pub timestamp: f64,
    pub category: EventCategory,
    pub title: String,
    pub message: String,
    pub severity: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    entries: Vec<EventLogEntry>,
    cap: usize,
    /// Total entries ever written, including evicted ones.
    written: u64,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_cap(200)
    }
}

impl EventLog {
    pub fn with_cap(cap: usize) -> Self {
        Self {
            entries: Vec::new(),
            cap: cap.max(1),
            written: 0,
        }
    }

    pub fn push(&mut self, entry: EventLogEntry) {
        self.entries.insert(0, entry);
        self.entries.truncate(self.cap);
        self.written += 1;
    }

    /// Entries, newest first.
    pub fn entries(&self) -> &[EventLogEntry] {
        &self.entries
    }

    pub fn latest(&self) -> Option<&EventLogEntry> {
        self.entries.first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn contains_title(&self, title: &str) -> bool {
        self.entries.iter().any(|e| e.title == title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u64) -> EventLogEntry {
        EventLogEntry {
            id,
            timestamp: id as f64,
            category: EventCategory::System,
            title: format!("entry {id}"),
            message: String::new(),
            severity: 1,
        }
    }

    #[test]
    fn newest_first() {
        let mut log = EventLog::default();
        log.push(entry(1));
        log.push(entry(2));
        assert_eq!(log.latest().unwrap().id, 2);
        assert_eq!(log.entries()[1].id, 1);
    }

    #[test]
    fn capped_drops_oldest() {
        let mut log = EventLog::with_cap(3);
        for i in 0..5 {
            log.push(entry(i));
        }
        assert_eq!(log.len(), 3);
        let ids: Vec<_> = log.entries().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![4, 3, 2]);
        assert_eq!(log.written(), 5);
    }

    #[test]
    fn category_labels() {
        assert_eq!(EventCategory::from_label("raid"), EventCategory::Raid);
        assert_eq!(EventCategory::from_label("lore"), EventCategory::Narrative);
    }
}
