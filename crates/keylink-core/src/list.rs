//! Accumulation of multi-frame list responses.
//!
//! Enumeration requests (log entries, keypad codes, authorization and time
//! control entries) answer with one count frame plus zero or more entry
//! frames, in no guaranteed order. The accumulator keys entries by their
//! id prefix so duplicates replace rather than double-count, and reports
//! completion once the announced number of distinct entries has arrived.

use crate::codec::CommandFrame;
use crate::commands::Command;

/// The frame pair that answers one enumeration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListKind {
    pub entry: Command,
    pub count: Command,
    /// Leading payload bytes that identify an entry.
    pub id_len: usize,
}

impl ListKind {
    /// Look up the list shape for a request command, if it is one.
    pub fn for_request(request: Command) -> Option<Self> {
        match request {
            Command::RequestAuthorizationEntries => Some(Self {
                entry: Command::AuthorizationEntry,
                count: Command::AuthorizationEntryCount,
                id_len: 4,
            }),
            Command::RequestLogEntries => Some(Self {
                entry: Command::LogEntry,
                count: Command::LogEntryCount,
                id_len: 4,
            }),
            Command::RequestKeypadCodes => Some(Self {
                entry: Command::KeypadCode,
                count: Command::KeypadCodeCount,
                id_len: 2,
            }),
            Command::RequestTimeControlEntries => Some(Self {
                entry: Command::TimeControlEntry,
                count: Command::TimeControlEntryCount,
                id_len: 4,
            }),
            _ => None,
        }
    }
}

/// Collects list frames until the announced count is reached.
#[derive(Debug)]
pub struct ListAccumulator {
    kind: ListKind,
    expected: Option<usize>,
    entries: Vec<(Vec<u8>, CommandFrame)>,
}

impl ListAccumulator {
    pub fn new(kind: ListKind) -> Self {
        Self {
            kind,
            expected: None,
            entries: Vec::new(),
        }
    }

    pub fn kind(&self) -> ListKind {
        self.kind
    }

    /// Record the announced entry count from the count frame.
    pub fn set_expected(&mut self, count: usize) {
        self.expected = Some(count);
    }

    /// Store an entry frame. A repeated entry id replaces the earlier
    /// frame in place.
    pub fn push_entry(&mut self, frame: CommandFrame) {
        let id_len = self.kind.id_len.min(frame.payload.len());
        let key = frame.payload[..id_len].to_vec();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = frame;
        } else {
            self.entries.push((key, frame));
        }
    }

    /// Complete once the count is known and that many distinct entries
    /// have arrived. A count of zero completes immediately.
    pub fn is_complete(&self) -> bool {
        match self.expected {
            Some(expected) => self.entries.len() >= expected,
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The collected entries, in arrival order of first sighting.
    pub fn into_frames(self) -> Vec<CommandFrame> {
        self.entries.into_iter().map(|(_, frame)| frame).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypad_list() -> ListAccumulator {
        ListAccumulator::new(ListKind::for_request(Command::RequestKeypadCodes).unwrap())
    }

    fn code_frame(id: u16, body: &[u8]) -> CommandFrame {
        let mut payload = id.to_le_bytes().to_vec();
        payload.extend_from_slice(body);
        CommandFrame::new(Command::KeypadCode, payload)
    }

    #[test]
    fn test_count_before_entries() {
        let mut acc = keypad_list();
        acc.set_expected(2);
        assert!(!acc.is_complete());
        acc.push_entry(code_frame(1, b"a"));
        assert!(!acc.is_complete());
        acc.push_entry(code_frame(2, b"b"));
        assert!(acc.is_complete());
    }

    #[test]
    fn test_count_after_entries() {
        let mut acc = keypad_list();
        acc.push_entry(code_frame(1, b"a"));
        acc.push_entry(code_frame(2, b"b"));
        assert!(!acc.is_complete());
        acc.set_expected(2);
        assert!(acc.is_complete());
    }

    #[test]
    fn test_zero_count_completes_immediately() {
        let mut acc = keypad_list();
        acc.set_expected(0);
        assert!(acc.is_complete());
        assert!(acc.into_frames().is_empty());
    }

    #[test]
    fn test_duplicate_entry_replaces() {
        let mut acc = keypad_list();
        acc.set_expected(2);
        acc.push_entry(code_frame(1, b"old"));
        acc.push_entry(code_frame(1, b"new"));
        assert_eq!(acc.len(), 1);
        assert!(!acc.is_complete());
        acc.push_entry(code_frame(2, b"x"));
        assert!(acc.is_complete());
        let frames = acc.into_frames();
        assert_eq!(&frames[0].payload[2..], b"new");
    }

    #[test]
    fn test_short_payload_keys_whole_payload() {
        let mut acc = ListAccumulator::new(
            ListKind::for_request(Command::RequestLogEntries).unwrap(),
        );
        acc.set_expected(1);
        acc.push_entry(CommandFrame::new(Command::LogEntry, vec![0x01]));
        assert!(acc.is_complete());
    }

    #[test]
    fn test_request_mapping() {
        assert!(ListKind::for_request(Command::RequestLogEntries).is_some());
        assert!(ListKind::for_request(Command::LockAction).is_none());
    }
}
