//! Pairs DNS queries with their replies across UDP datagrams and
//! reassembled TCP streams (§4.7). Keyed on (5-tuple hash, transaction id).
//!
//! "Now" for the timeout sweep is the latest packet timestamp observed, not
//! wall-clock time — §5 requires this so `xact_timeout` eviction is
//! deterministic when replaying a capture file.

use std::collections::{HashMap, VecDeque};

use crate::host_matcher::Direction;
use crate::packet::Timestamp;

use super::record::{DnsRecord, MessageDirection};

const DEFAULT_XACT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_MAX_PENDING: usize = 100_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TransactionKey {
    pub flow_hash: u64,
    pub transaction_id: u16,
}

pub struct PendingQuery {
    pub record: DnsRecord,
    pub arrived_at: Timestamp,
}

pub struct CompletedTransaction {
    pub query: DnsRecord,
    pub reply: DnsRecord,
    pub latency_ms: f64,
}

pub enum MatchEvent {
    Completed(CompletedTransaction),
    Orphan { reply: DnsRecord },
    Duplicate { replaced: DnsRecord, new_query: DnsRecord },
    TimedOut { query: DnsRecord },
}

pub struct MatcherConfig {
    pub xact_timeout_secs: u64,
    pub max_pending: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        MatcherConfig {
            xact_timeout_secs: DEFAULT_XACT_TIMEOUT_SECS,
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

pub struct DnsTransactionMatcher {
    config: MatcherConfig,
    pending: HashMap<TransactionKey, PendingQuery>,
    insertion_order: VecDeque<TransactionKey>,
    now: Timestamp,
}

impl DnsTransactionMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        DnsTransactionMatcher {
            config,
            pending: HashMap::new(),
            insertion_order: VecDeque::new(),
            now: Timestamp::from_secs_nanos(0, 0),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Feeds one DNS record into the matcher. Returns zero or more events:
    /// the record's own match/orphan/duplicate outcome, plus any
    /// timed-out entries the amortized sweep evicts along the way.
    pub fn ingest(&mut self, key: TransactionKey, record: DnsRecord) -> Vec<MatchEvent> {
        let ts = record.packet.timestamp;
        if ts > self.now {
            self.now = ts;
        }

        let mut events = self.sweep_timed_out();

        match record.message_direction {
            MessageDirection::Query => {
                if let Some(existing) = self.pending.remove(&key) {
                    self.pending.insert(
                        key,
                        PendingQuery {
                            record,
                            arrived_at: ts,
                        },
                    );
                    let new_query = self.pending.get(&key).unwrap();
                    events.push(MatchEvent::Duplicate {
                        replaced: existing.record,
                        new_query: clone_record_for_event(&new_query.record),
                    });
                } else {
                    self.evict_if_over_capacity(&mut events);
                    self.pending.insert(
                        key,
                        PendingQuery {
                            record,
                            arrived_at: ts,
                        },
                    );
                    self.insertion_order.push_back(key);
                }
            }
            MessageDirection::Response => {
                if let Some(pending) = self.pending.remove(&key) {
                    self.insertion_order.retain(|k| *k != key);
                    let latency_ms = record.packet.timestamp.millis_since(&pending.arrived_at);
                    events.push(MatchEvent::Completed(CompletedTransaction {
                        query: pending.record,
                        reply: record,
                        latency_ms,
                    }));
                } else {
                    events.push(MatchEvent::Orphan { reply: record });
                }
            }
        }

        events
    }

    fn evict_if_over_capacity(&mut self, events: &mut Vec<MatchEvent>) {
        while self.pending.len() >= self.config.max_pending {
            if let Some(oldest_key) = self.insertion_order.pop_front() {
                if let Some(evicted) = self.pending.remove(&oldest_key) {
                    events.push(MatchEvent::TimedOut {
                        query: evicted.record,
                    });
                }
            } else {
                break;
            }
        }
    }

    fn sweep_timed_out(&mut self) -> Vec<MatchEvent> {
        let timeout_secs = self.config.xact_timeout_secs;
        let mut events = Vec::new();

        while let Some(&oldest_key) = self.insertion_order.front() {
            let Some(pending) = self.pending.get(&oldest_key) else {
                self.insertion_order.pop_front();
                continue;
            };
            let age_ms = self.now.millis_since(&pending.arrived_at);
            if age_ms < (timeout_secs * 1000) as f64 {
                break;
            }
            self.insertion_order.pop_front();
            if let Some(evicted) = self.pending.remove(&oldest_key) {
                events.push(MatchEvent::TimedOut {
                    query: evicted.record,
                });
            }
        }

        events
    }

    /// Direction of a transaction is the direction of its query (§4.7).
    pub fn transaction_direction(query: &DnsRecord) -> Direction {
        query.packet.direction
    }
}

fn clone_record_for_event(record: &DnsRecord) -> DnsRecord {
    DnsRecord {
        message_direction: record.message_direction,
        rcode: record.rcode,
        rcode_name: record.rcode_name,
        opcode: record.opcode,
        truncated: record.truncated,
        transaction_id: record.transaction_id,
        question: record.question.clone(),
        answer_count: record.answer_count,
        authority_count: record.authority_count,
        additional_count: record.additional_count,
        packet: record.packet.clone(),
        normalized_qname: record.normalized_qname.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host_matcher::Direction;
    use crate::packet::{L3Protocol, L4Protocol, PacketEvent};
    use std::net::IpAddr;

    fn record(direction: MessageDirection, secs: u64) -> DnsRecord {
        let packet = PacketEvent::new(
            Vec::new(),
            L3Protocol::IPv4,
            L4Protocol::Udp,
            Direction::ToHost,
            "1.2.3.4".parse::<IpAddr>().unwrap(),
            "5.6.7.8".parse::<IpAddr>().unwrap(),
            5353,
            53,
            Timestamp::from_secs_nanos(secs, 0),
        );
        DnsRecord {
            message_direction: direction,
            rcode: 0,
            rcode_name: Some("NoError"),
            opcode: 0,
            truncated: false,
            transaction_id: 1,
            question: None,
            answer_count: 0,
            authority_count: 0,
            additional_count: 0,
            packet,
            normalized_qname: Some("example.com.".to_string()),
        }
    }

    fn key() -> TransactionKey {
        TransactionKey {
            flow_hash: 42,
            transaction_id: 1,
        }
    }

    #[test]
    fn query_then_reply_completes_with_latency() {
        let mut matcher = DnsTransactionMatcher::new(MatcherConfig::default());
        matcher.ingest(key(), record(MessageDirection::Query, 0));
        let events = matcher.ingest(key(), record(MessageDirection::Response, 1));
        assert_eq!(events.len(), 1);
        match &events[0] {
            MatchEvent::Completed(c) => assert_eq!(c.latency_ms, 1000.0),
            _ => panic!("expected Completed"),
        }
        assert_eq!(matcher.pending_count(), 0);
    }

    #[test]
    fn reply_with_no_matching_query_is_orphan() {
        let mut matcher = DnsTransactionMatcher::new(MatcherConfig::default());
        let events = matcher.ingest(key(), record(MessageDirection::Response, 0));
        assert!(matches!(events[0], MatchEvent::Orphan { .. }));
    }

    #[test]
    fn duplicate_query_replaces_and_emits_event() {
        let mut matcher = DnsTransactionMatcher::new(MatcherConfig::default());
        matcher.ingest(key(), record(MessageDirection::Query, 0));
        let events = matcher.ingest(key(), record(MessageDirection::Query, 1));
        assert!(matches!(events[0], MatchEvent::Duplicate { .. }));
        assert_eq!(matcher.pending_count(), 1);
    }

    #[test]
    fn stale_query_times_out_on_later_sweep() {
        let mut config = MatcherConfig::default();
        config.xact_timeout_secs = 5;
        let mut matcher = DnsTransactionMatcher::new(config);
        matcher.ingest(key(), record(MessageDirection::Query, 0));

        let later_key = TransactionKey {
            flow_hash: 99,
            transaction_id: 2,
        };
        let events = matcher.ingest(later_key, record(MessageDirection::Query, 10));
        assert!(events.iter().any(|e| matches!(e, MatchEvent::TimedOut { .. })));
        assert_eq!(matcher.pending_count(), 1);
    }

    #[test]
    fn capacity_cap_evicts_oldest_as_timed_out() {
        let mut config = MatcherConfig::default();
        config.max_pending = 2;
        config.xact_timeout_secs = 10_000; // disable the normal sweep for this test
        let mut matcher = DnsTransactionMatcher::new(config);

        for id in 0..3u16 {
            let k = TransactionKey {
                flow_hash: id as u64,
                transaction_id: id,
            };
            matcher.ingest(k, record(MessageDirection::Query, 0));
        }
        assert_eq!(matcher.pending_count(), 2);
    }
}
