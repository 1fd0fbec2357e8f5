//! Session grouping: one time-ordered connection history per source host.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::record::FlowRecord;

/// All records sharing one source address, sorted ascending by timestamp.
///
/// Records without a timestamp are kept (they count towards the event total)
/// and sort after every timestamped record.
#[derive(Debug, Clone)]
pub struct Session<'a> {
    pub source_address: &'a str,
    pub records: Vec<&'a FlowRecord>,
}

impl<'a> Session<'a> {
    /// Number of records in the session, including those without a timestamp.
    pub fn total_events(&self) -> usize {
        self.records.len()
    }

    /// Valid timestamps in ascending order.
    pub fn timestamps(&self) -> Vec<NaiveDateTime> {
        self.records.iter().filter_map(|r| r.timestamp).collect()
    }

    /// Representative record for asset/user metadata.
    pub fn first_record(&self) -> Option<&'a FlowRecord> {
        self.records.first().copied()
    }

    pub fn start_time(&self) -> Option<NaiveDateTime> {
        self.records.iter().filter_map(|r| r.timestamp).min()
    }

    pub fn end_time(&self) -> Option<NaiveDateTime> {
        self.records.iter().filter_map(|r| r.timestamp).max()
    }

    /// Timestamps of every connection from this source to `destination`.
    pub fn timestamps_for(&self, destination: &str) -> Vec<NaiveDateTime> {
        self.records
            .iter()
            .filter(|r| r.destination_address.as_deref() == Some(destination))
            .filter_map(|r| r.timestamp)
            .collect()
    }
}

/// Partitions records by source address.
///
/// Sessions come back ordered by source address so that a run over the same
/// input always yields the same sequence. Within a session the sort is
/// stable, so records with equal timestamps keep their input order.
pub fn group_sessions(records: &[FlowRecord]) -> Vec<Session<'_>> {
    let mut groups: BTreeMap<&str, Vec<&FlowRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry(record.source_address.as_str())
            .or_default()
            .push(record);
    }

    groups
        .into_iter()
        .map(|(source_address, mut records)| {
            // None sorts last
            records.sort_by_key(|r| (r.timestamp.is_none(), r.timestamp));
            Session {
                source_address,
                records,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(secs: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + chrono::Duration::seconds(secs as i64)
    }

    #[test]
    fn test_group_by_source() {
        let records = vec![
            FlowRecord::new("10.0.0.2").with_timestamp(at(5)),
            FlowRecord::new("10.0.0.1").with_timestamp(at(1)),
            FlowRecord::new("10.0.0.2").with_timestamp(at(2)),
        ];

        let sessions = group_sessions(&records);

        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].source_address, "10.0.0.1");
        assert_eq!(sessions[1].source_address, "10.0.0.2");
        assert_eq!(sessions[1].total_events(), 2);
        assert!(sessions
            .iter()
            .all(|s| s.records.iter().all(|r| r.source_address == s.source_address)));
    }

    #[test]
    fn test_sorted_by_timestamp() {
        let records = vec![
            FlowRecord::new("h").with_timestamp(at(30)),
            FlowRecord::new("h").with_timestamp(at(10)),
            FlowRecord::new("h").with_timestamp(at(20)),
        ];

        let sessions = group_sessions(&records);

        assert_eq!(sessions[0].timestamps(), vec![at(10), at(20), at(30)]);
        assert_eq!(sessions[0].start_time(), Some(at(10)));
        assert_eq!(sessions[0].end_time(), Some(at(30)));
    }

    #[test]
    fn test_missing_timestamps_retained() {
        let records = vec![
            FlowRecord::new("h"),
            FlowRecord::new("h").with_timestamp(at(10)),
            FlowRecord::new("h"),
        ];

        let sessions = group_sessions(&records);

        assert_eq!(sessions[0].total_events(), 3);
        assert_eq!(sessions[0].timestamps(), vec![at(10)]);
        assert_eq!(sessions[0].records[0].timestamp, Some(at(10)));
    }

    #[test]
    fn test_no_valid_timestamps() {
        let records = vec![FlowRecord::new("h"), FlowRecord::new("h")];
        let sessions = group_sessions(&records);

        assert_eq!(sessions.len(), 1);
        assert!(sessions[0].timestamps().is_empty());
        assert!(sessions[0].start_time().is_none());
    }

    #[test]
    fn test_timestamps_for_destination() {
        let records = vec![
            FlowRecord::new("h").with_destination("1.1.1.1").with_timestamp(at(20)),
            FlowRecord::new("h").with_destination("2.2.2.2").with_timestamp(at(15)),
            FlowRecord::new("h").with_destination("1.1.1.1").with_timestamp(at(5)),
            FlowRecord::new("h").with_destination("1.1.1.1"),
        ];

        let sessions = group_sessions(&records);

        assert_eq!(sessions[0].timestamps_for("1.1.1.1"), vec![at(5), at(20)]);
        assert!(sessions[0].timestamps_for("3.3.3.3").is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(group_sessions(&[]).is_empty());
    }
}
