//! Conjunctive predicate chain applied to DNS records before they reach a
//! handler's metrics bucket (§4.8). Composition follows a sequence of
//! independent checks short-circuiting on first failure, the same shape as
//! a layered-heuristics enrichment pass.

use crate::dns::DnsRecord;

/// Pluggable GeoIP/ASN lookup. The real database is out of scope (§1); the
/// default implementation always reports "not found" so `geoloc_notfound`/
/// `asn_notfound` stay satisfiable without it.
pub trait GeoLookup: Send + Sync {
    fn locate(&self, ip: std::net::IpAddr) -> Option<String>;
    fn asn(&self, ip: std::net::IpAddr) -> Option<u32>;
}

#[derive(Default)]
pub struct NoGeoLookup;

impl GeoLookup for NoGeoLookup {
    fn locate(&self, _ip: std::net::IpAddr) -> Option<String> {
        None
    }

    fn asn(&self, _ip: std::net::IpAddr) -> Option<u32> {
        None
    }
}

#[derive(Clone, Debug, Default)]
pub struct FilterConfig {
    pub exclude_noerror: bool,
    pub only_rcode: Option<u64>,
    pub only_qname_suffix: Vec<String>,
    pub only_qtype: Vec<String>,
    pub answer_count: Option<u64>,
    pub geoloc_notfound: bool,
    pub asn_notfound: bool,
}

pub struct FilterChain {
    config: FilterConfig,
    geo: Box<dyn GeoLookup>,
}

impl FilterChain {
    pub fn new(config: FilterConfig) -> Self {
        FilterChain {
            config,
            geo: Box::new(NoGeoLookup),
        }
    }

    pub fn with_geo_lookup(config: FilterConfig, geo: Box<dyn GeoLookup>) -> Self {
        FilterChain { config, geo }
    }

    /// Returns true if `record` survives every configured predicate.
    pub fn accepts(&self, record: &DnsRecord) -> bool {
        if self.config.exclude_noerror && record.rcode == 0 {
            return false;
        }

        if let Some(only_rcode) = self.config.only_rcode {
            if record.rcode as u64 != only_rcode {
                return false;
            }
        }

        if !self.config.only_qname_suffix.is_empty() {
            let Some(qname) = record.normalized_qname.as_deref() else {
                return false;
            };
            let qname = qname.trim_end_matches('.');
            let matches = self.config.only_qname_suffix.iter().any(|suffix| {
                let suffix = suffix.trim_end_matches('.').to_lowercase();
                qname.ends_with(&suffix)
            });
            if !matches {
                return false;
            }
        }

        if !self.config.only_qtype.is_empty() {
            let Some(question) = record.question.as_ref() else {
                return false;
            };
            let Some(qtype) = question.qtype.as_deref() else {
                return false;
            };
            if !self
                .config
                .only_qtype
                .iter()
                .any(|t| t.eq_ignore_ascii_case(qtype))
            {
                return false;
            }
        }

        if let Some(answer_count) = self.config.answer_count {
            if record.answer_count as u64 != answer_count {
                return false;
            }
        }

        if self.config.geoloc_notfound && self.geo.locate(record.packet.src_ip).is_some() {
            return false;
        }

        if self.config.asn_notfound && self.geo.asn(record.packet.src_ip).is_some() {
            return false;
        }

        true
    }
}
