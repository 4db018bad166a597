//! One period's counters and sketches for a handler (§3, §4.9/§4.10).

use serde_json::{json, Value};

use crate::packet::Timestamp;
use crate::sketches::{ExactCounter, HyperLogLog, QuantileDigest, SpaceSaving};

#[derive(Default)]
pub struct Counters {
    pub queries: ExactCounter,
    pub replies: ExactCounter,
    pub noerror: ExactCounter,
    pub nx: ExactCounter,
    pub refused: ExactCounter,
    pub srvfail: ExactCounter,
    pub udp: ExactCounter,
    pub tcp: ExactCounter,
    pub ipv4: ExactCounter,
    pub ipv6: ExactCounter,
    pub other_l4: ExactCounter,
    pub filtered: ExactCounter,
    pub xacts_total: ExactCounter,
    pub xacts_in: ExactCounter,
    pub xacts_out: ExactCounter,
    pub xacts_timed_out: ExactCounter,
    pub total_in: ExactCounter,
    pub total_out: ExactCounter,
}

impl Counters {
    fn merge(&mut self, other: &Counters) {
        self.queries.merge(&other.queries);
        self.replies.merge(&other.replies);
        self.noerror.merge(&other.noerror);
        self.nx.merge(&other.nx);
        self.refused.merge(&other.refused);
        self.srvfail.merge(&other.srvfail);
        self.udp.merge(&other.udp);
        self.tcp.merge(&other.tcp);
        self.ipv4.merge(&other.ipv4);
        self.ipv6.merge(&other.ipv6);
        self.other_l4.merge(&other.other_l4);
        self.filtered.merge(&other.filtered);
        self.xacts_total.merge(&other.xacts_total);
        self.xacts_in.merge(&other.xacts_in);
        self.xacts_out.merge(&other.xacts_out);
        self.xacts_timed_out.merge(&other.xacts_timed_out);
        self.total_in.merge(&other.total_in);
        self.total_out.merge(&other.total_out);
    }

    /// Key casing here is the stable external contract (spec.md §6) — not
    /// idiomatic JSON snake_case. `UDP`/`TCP`/`IPv4`/`IPv6`/`NOERROR`/`NX`/
    /// `REFUSED`/`SRVFAIL` must stay exactly as documented; callers rely on
    /// this shape for monitoring dashboards built against it.
    fn to_json(&self) -> Value {
        json!({
            "queries": self.queries.to_json(),
            "replies": self.replies.to_json(),
            "NOERROR": self.noerror.to_json(),
            "NX": self.nx.to_json(),
            "REFUSED": self.refused.to_json(),
            "SRVFAIL": self.srvfail.to_json(),
            "UDP": self.udp.to_json(),
            "TCP": self.tcp.to_json(),
            "IPv4": self.ipv4.to_json(),
            "IPv6": self.ipv6.to_json(),
            "other_l4": self.other_l4.to_json(),
            "filtered": self.filtered.to_json(),
            "total_in": self.total_in.to_json(),
            "total_out": self.total_out.to_json(),
        })
    }
}

#[derive(Default)]
pub struct Cardinality {
    pub qname: HyperLogLog,
    pub src_ips_in: HyperLogLog,
    pub dst_ips_out: HyperLogLog,
}

impl Cardinality {
    fn merge(&mut self, other: &Cardinality) {
        self.qname.merge(&other.qname);
        self.src_ips_in.merge(&other.src_ips_in);
        self.dst_ips_out.merge(&other.dst_ips_out);
    }

    fn to_json(&self) -> Value {
        json!({
            "qname": self.qname.to_json(),
            "src_ips_in": self.src_ips_in.to_json(),
            "dst_ips_out": self.dst_ips_out.to_json(),
        })
    }
}

pub struct TopK {
    pub top_qname2: SpaceSaving,
    pub top_qtype: SpaceSaving,
    pub top_rcode: SpaceSaving,
    pub top_udp_ports: SpaceSaving,
    pub top_ipv4: SpaceSaving,
    pub top_ipv6: SpaceSaving,
}

impl Default for TopK {
    fn default() -> Self {
        TopK {
            top_qname2: SpaceSaving::default(),
            top_qtype: SpaceSaving::default(),
            top_rcode: SpaceSaving::default(),
            top_udp_ports: SpaceSaving::default(),
            top_ipv4: SpaceSaving::default(),
            top_ipv6: SpaceSaving::default(),
        }
    }
}

impl TopK {
    fn merge(&mut self, other: &TopK) {
        self.top_qname2.merge(&other.top_qname2);
        self.top_qtype.merge(&other.top_qtype);
        self.top_rcode.merge(&other.top_rcode);
        self.top_udp_ports.merge(&other.top_udp_ports);
        self.top_ipv4.merge(&other.top_ipv4);
        self.top_ipv6.merge(&other.top_ipv6);
    }
}

#[derive(Default)]
pub struct XactLatency {
    pub digest: QuantileDigest,
}

impl XactLatency {
    fn merge(&mut self, other: &XactLatency) {
        self.digest.merge(&other.digest);
    }

    fn to_json(&self) -> Value {
        self.digest.to_json()
    }
}

pub struct MetricBucket {
    pub start_ts: Timestamp,
    pub end_ts: Timestamp,
    pub counters: Counters,
    pub cardinality: Cardinality,
    pub topk: TopK,
    pub xact_latency: XactLatency,
}

impl MetricBucket {
    pub fn new(start_ts: Timestamp) -> Self {
        MetricBucket {
            start_ts,
            end_ts: start_ts,
            counters: Counters::default(),
            cardinality: Cardinality::default(),
            topk: TopK::default(),
            xact_latency: XactLatency::default(),
        }
    }

    pub fn touch(&mut self, ts: Timestamp) {
        if ts > self.end_ts {
            self.end_ts = ts;
        }
    }

    pub fn period_length_ms(&self) -> f64 {
        self.end_ts.millis_since(&self.start_ts)
    }

    pub fn merge(&mut self, other: &MetricBucket) {
        self.counters.merge(&other.counters);
        self.cardinality.merge(&other.cardinality);
        self.topk.merge(&other.topk);
        self.xact_latency.merge(&other.xact_latency);
        if other.end_ts > self.end_ts {
            self.end_ts = other.end_ts;
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "start_ts": self.start_ts.secs,
            "end_ts": self.end_ts.secs,
            "wire_packets": self.counters.to_json(),
            "cardinality": self.cardinality.to_json(),
            "top_qname2": self.topk.top_qname2.to_json(),
            "top_rcode": self.topk.top_rcode.to_json(),
            "top_qtype": self.topk.top_qtype.to_json(),
            "top_udp_ports": self.topk.top_udp_ports.to_json(),
            "top_ipv4": self.topk.top_ipv4.to_json(),
            "top_ipv6": self.topk.top_ipv6.to_json(),
            "xact": {
                "latency": self.xact_latency.to_json(),
                "counts": {
                    "total": self.counters.xacts_total.value(),
                    "in": self.counters.xacts_in.value(),
                    "out": self.counters.xacts_out.value(),
                    "timed_out": self.counters.xacts_timed_out.value(),
                },
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_bucket_starts_with_zeroed_counters() {
        let bucket = MetricBucket::new(Timestamp::from_secs_nanos(100, 0));
        assert_eq!(bucket.counters.queries.value(), 0);
        assert_eq!(bucket.period_length_ms(), 0.0);
    }

    #[test]
    fn touch_extends_end_ts_monotonically() {
        let mut bucket = MetricBucket::new(Timestamp::from_secs_nanos(100, 0));
        bucket.touch(Timestamp::from_secs_nanos(160, 0));
        assert_eq!(bucket.period_length_ms(), 60_000.0);
        bucket.touch(Timestamp::from_secs_nanos(120, 0));
        assert_eq!(bucket.period_length_ms(), 60_000.0, "touch must not move end_ts backward");
    }

    #[test]
    fn merge_sums_counters_from_both_buckets() {
        let mut a = MetricBucket::new(Timestamp::from_secs_nanos(0, 0));
        a.counters.queries.incr();
        let mut b = MetricBucket::new(Timestamp::from_secs_nanos(0, 0));
        b.counters.queries.incr();
        a.merge(&b);
        assert_eq!(a.counters.queries.value(), 2);
    }

    #[test]
    fn json_output_is_stable_shape() {
        let bucket = MetricBucket::new(Timestamp::from_secs_nanos(0, 0));
        let json = bucket.to_json();
        assert!(json.get("wire_packets").is_some());
        assert!(json.get("top_qname2").is_some());
        assert!(json.get("xact").is_some());
    }

    #[test]
    fn wire_packets_keys_match_the_documented_external_casing() {
        let bucket = MetricBucket::new(Timestamp::from_secs_nanos(0, 0));
        let wire_packets = bucket.to_json()["wire_packets"].clone();
        for key in ["UDP", "TCP", "IPv4", "IPv6", "queries", "replies", "filtered", "NOERROR", "NX", "REFUSED", "SRVFAIL"] {
            assert!(wire_packets.get(key).is_some(), "missing documented key {key}");
        }
    }
}
