// In-memory history table shared by the store backends.
//
// Rows are grouped by `(domain, owner)` and kept sorted by `first_seen`,
// oldest first. At most one row per pair carries `current = true`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::traits::HistoryEntry;

type PairKey = (String, String);

#[derive(Debug, Clone, Default)]
pub(crate) struct HistoryTable {
    pairs: BTreeMap<PairKey, Vec<HistoryEntry>>,
}

/// Serialized group of rows for one pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PairRows {
    pub domain: String,
    pub owner: String,
    pub ips: Vec<IpRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct IpRow {
    pub ip: IpAddr,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub current: bool,
}

fn key(domain: &str, owner: &str) -> PairKey {
    (domain.to_string(), owner.to_string())
}

impl HistoryTable {
    pub fn record_new_ip(&mut self, domain: &str, owner: &str, ip: IpAddr, now: DateTime<Utc>) {
        let rows = self.pairs.entry(key(domain, owner)).or_default();
        for row in rows.iter_mut() {
            row.current = false;
        }
        rows.push(HistoryEntry {
            domain: domain.to_string(),
            owner: owner.to_string(),
            ip,
            first_seen: now,
            last_seen: now,
            current: true,
        });
    }

    /// Returns whether a row was touched
    pub fn touch_current(&mut self, domain: &str, owner: &str, ip: IpAddr, now: DateTime<Utc>) -> bool {
        let Some(rows) = self.pairs.get_mut(&key(domain, owner)) else {
            return false;
        };
        match rows.iter_mut().find(|row| row.current && row.ip == ip) {
            Some(row) => {
                if now > row.last_seen {
                    row.last_seen = now;
                }
                true
            }
            None => false,
        }
    }

    pub fn entries(&self, domain: &str, owner: &str) -> Vec<HistoryEntry> {
        self.pairs
            .get(&key(domain, owner))
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.pairs.values().map(Vec::len).sum()
    }

    pub fn to_pairs(&self) -> Vec<PairRows> {
        self.pairs
            .iter()
            .map(|((domain, owner), rows)| PairRows {
                domain: domain.clone(),
                owner: owner.clone(),
                ips: rows
                    .iter()
                    .map(|row| IpRow {
                        ip: row.ip,
                        first_seen: row.first_seen,
                        last_seen: row.last_seen,
                        current: row.current,
                    })
                    .collect(),
            })
            .collect()
    }

    /// Rebuild from serialized pairs, repairing what can be repaired
    ///
    /// Pairs with an empty domain or owner are dropped. Rows are sorted by
    /// `first_seen`, and only the newest current flag is kept.
    pub fn from_pairs(pairs: Vec<PairRows>) -> Self {
        let mut table = Self::default();
        for pair in pairs {
            if pair.domain.is_empty() || pair.owner.is_empty() {
                tracing::warn!(
                    domain = %pair.domain,
                    owner = %pair.owner,
                    "Dropping history rows with an empty domain or owner"
                );
                continue;
            }
            let rows = table.pairs.entry(key(&pair.domain, &pair.owner)).or_default();
            rows.extend(pair.ips.into_iter().map(|row| HistoryEntry {
                domain: pair.domain.clone(),
                owner: pair.owner.clone(),
                ip: row.ip,
                first_seen: row.first_seen,
                last_seen: row.last_seen,
                current: row.current,
            }));
        }

        for ((domain, owner), rows) in table.pairs.iter_mut() {
            rows.sort_by_key(|row| row.first_seen);
            let mut seen_current = false;
            for row in rows.iter_mut().rev() {
                if row.current && seen_current {
                    tracing::warn!(%domain, %owner, ip = %row.ip, "Clearing duplicate current flag");
                    row.current = false;
                }
                seen_current |= row.current;
            }
        }

        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn new_ip_flips_previous_current() {
        let mut table = HistoryTable::default();
        table.record_new_ip("example.com", "@", "203.0.113.1".parse().unwrap(), at(10));
        table.record_new_ip("example.com", "@", "203.0.113.2".parse().unwrap(), at(20));

        let rows = table.entries("example.com", "@");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.iter().filter(|r| r.current).count(), 1);
        assert!(rows[1].current);
    }

    #[test]
    fn touch_only_matches_the_current_ip() {
        let mut table = HistoryTable::default();
        let ip = "203.0.113.1".parse().unwrap();
        table.record_new_ip("example.com", "@", ip, at(10));

        assert!(!table.touch_current("example.com", "@", "203.0.113.9".parse().unwrap(), at(20)));
        assert!(!table.touch_current("other.com", "@", ip, at(20)));
        assert!(table.touch_current("example.com", "@", ip, at(20)));
        assert_eq!(table.entries("example.com", "@")[0].last_seen, at(20));
    }

    #[test]
    fn loading_repairs_order_and_duplicate_current_flags() {
        let pairs = vec![
            PairRows {
                domain: "example.com".to_string(),
                owner: "@".to_string(),
                ips: vec![
                    IpRow {
                        ip: "203.0.113.2".parse().unwrap(),
                        first_seen: at(20),
                        last_seen: at(25),
                        current: true,
                    },
                    IpRow {
                        ip: "203.0.113.1".parse().unwrap(),
                        first_seen: at(10),
                        last_seen: at(15),
                        current: true,
                    },
                ],
            },
            PairRows {
                domain: String::new(),
                owner: "@".to_string(),
                ips: vec![],
            },
        ];
        let table = HistoryTable::from_pairs(pairs);
        let rows = table.entries("example.com", "@");
        assert_eq!(rows[0].first_seen, at(10));
        assert!(!rows[0].current);
        assert!(rows[1].current);
        assert_eq!(table.len(), 2);
    }
}
