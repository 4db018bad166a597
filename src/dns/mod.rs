//! DNS message parsing, the record data model, and query/reply transaction
//! matching (§3, §4.6, §4.7).

pub mod matcher;
pub mod parser;
pub mod record;

pub use matcher::{DnsTransactionMatcher, MatchEvent, MatcherConfig, TransactionKey};
pub use record::{DnsRecord, MessageDirection, Question};
