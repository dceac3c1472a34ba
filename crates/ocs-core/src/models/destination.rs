//! Destinations and destination matching
//!
//! A destination is a named group of dialed-number prefixes. Balances restrict
//! themselves to destinations through a mask of destination IDs, each flagged
//! include (`true`) or exclude (`false`).

use crate::constants::META_ANY;
use crate::traits::DestinationIndex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named group of dialed-number prefixes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Destination {
    #[serde(rename = "Id")]
    pub id: String,
    pub prefixes: Vec<String>,
}

impl Destination {
    pub fn new(id: impl Into<String>, prefixes: &[&str]) -> Self {
        Self {
            id: id.into(),
            prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Longest prefix of this destination that starts `number`
    pub fn longest_match(&self, number: &str) -> Option<&str> {
        self.prefixes
            .iter()
            .filter(|p| number.starts_with(p.as_str()))
            .max_by_key(|p| p.len())
            .map(String::as_str)
    }
}

/// Prefixes of `number`, longest first, no shorter than `min_len`
pub fn split_prefix(number: &str, min_len: usize) -> Vec<String> {
    let min_len = min_len.max(1);
    let mut prefixes: Vec<String> = number
        .char_indices()
        .map(|(i, c)| &number[..i + c.len_utf8()])
        .filter(|p| p.chars().count() >= min_len)
        .map(str::to_string)
        .collect();
    prefixes.reverse();
    prefixes
}

/// Result of matching a dialed number against the destination index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationMatch {
    pub prefix: String,
    pub destination_ids: Vec<String>,
}

/// Longest prefix of `number` known to any destination, with the IDs containing it
pub fn match_destination(
    index: &dyn DestinationIndex,
    number: &str,
    min_len: usize,
) -> Option<DestinationMatch> {
    split_prefix(number, min_len).into_iter().find_map(|prefix| {
        let destination_ids = index.destination_ids_for_prefix(&prefix);
        if destination_ids.is_empty() {
            None
        } else {
            Some(DestinationMatch {
                prefix,
                destination_ids,
            })
        }
    })
}

/// Every destination ID containing some prefix of `number`
pub fn destination_ids_for_number(
    index: &dyn DestinationIndex,
    number: &str,
    min_len: usize,
) -> Vec<String> {
    let mut ids: Vec<String> = split_prefix(number, min_len)
        .iter()
        .flat_map(|p| index.destination_ids_for_prefix(p))
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

/// Outcome of applying a balance destination mask to a dialed number
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaskDecision {
    /// The balance may pay for this number
    Included {
        /// Length of the prefix that decided, 0 for all-purpose balances
        precision: usize,
        prefix: String,
        destination_id: Option<String>,
    },
    /// The balance must not pay for this number
    Excluded,
}

impl MaskDecision {
    fn all_purpose() -> Self {
        MaskDecision::Included {
            precision: 0,
            prefix: String::new(),
            destination_id: None,
        }
    }

    pub fn is_included(&self) -> bool {
        matches!(self, MaskDecision::Included { .. })
    }
}

/// Apply an include/exclude destination mask to `number`
///
/// An empty mask, or one listing `*any`, matches everything. Otherwise the
/// longest prefix of `number` for which the mask has an opinion decides: the
/// balance qualifies only if every mask entry matching that prefix is an
/// include. A mask made solely of excludes qualifies for numbers it does not
/// mention.
pub fn evaluate_mask(
    mask: &BTreeMap<String, bool>,
    number: &str,
    index: &dyn DestinationIndex,
    min_len: usize,
) -> MaskDecision {
    if mask.is_empty() || mask.contains_key(META_ANY) {
        return MaskDecision::all_purpose();
    }
    let all_exclude = mask.values().all(|include| !include);

    for prefix in split_prefix(number, min_len) {
        let ids = index.destination_ids_for_prefix(&prefix);
        if ids.is_empty() {
            continue;
        }
        let mut found = false;
        let mut all_include = true;
        let mut matched_id = None;
        for id in &ids {
            if let Some(&include) = mask.get(id) {
                found = true;
                all_include &= include;
                if include && matched_id.is_none() {
                    matched_id = Some(id.clone());
                }
            }
        }
        if found || all_exclude {
            if !all_include {
                return MaskDecision::Excluded;
            }
            return MaskDecision::Included {
                precision: prefix.len(),
                prefix,
                destination_id: matched_id,
            };
        }
    }

    if all_exclude {
        MaskDecision::all_purpose()
    } else {
        MaskDecision::Excluded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct StaticIndex(HashMap<String, Vec<String>>);

    impl StaticIndex {
        fn standard() -> Self {
            let destinations = [
                Destination::new("NAT", &["0257", "0256", "0723"]),
                Destination::new("RET", &["0723", "0724"]),
                Destination::new("EXOTIC", &["999"]),
            ];
            let mut reverse: HashMap<String, Vec<String>> = HashMap::new();
            for d in &destinations {
                for p in &d.prefixes {
                    reverse.entry(p.clone()).or_default().push(d.id.clone());
                }
            }
            StaticIndex(reverse)
        }
    }

    impl DestinationIndex for StaticIndex {
        fn destination_ids_for_prefix(&self, prefix: &str) -> Vec<String> {
            self.0.get(prefix).cloned().unwrap_or_default()
        }
    }

    fn mask(entries: &[(&str, bool)]) -> BTreeMap<String, bool> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_split_prefix_longest_first() {
        assert_eq!(split_prefix("0723", 1), vec!["0723", "072", "07", "0"]);
        assert_eq!(split_prefix("0723", 3), vec!["0723", "072"]);
        assert!(split_prefix("", 1).is_empty());
    }

    #[test]
    fn test_match_destination_longest_prefix() {
        let index = StaticIndex::standard();
        let m = match_destination(&index, "0723045326", 1).unwrap();
        assert_eq!(m.prefix, "0723");
        assert_eq!(m.destination_ids, vec!["NAT", "RET"]);
        assert!(match_destination(&index, "4412", 1).is_none());
    }

    #[test]
    fn test_mixed_mask_without_matching_include_is_excluded() {
        let index = StaticIndex::standard();
        let decision = evaluate_mask(&mask(&[("NAT", true), ("RET", false)]), "999123", &index, 1);
        assert_eq!(decision, MaskDecision::Excluded);
    }

    #[test]
    fn test_all_exclude_mask_qualifies() {
        let index = StaticIndex::standard();
        let decision =
            evaluate_mask(&mask(&[("NAT", false), ("RET", false)]), "999123", &index, 1);
        assert!(decision.is_included());
    }

    #[test]
    fn test_mixed_mask_with_matching_include_qualifies() {
        let index = StaticIndex::standard();
        let decision = evaluate_mask(
            &mask(&[("NAT", true), ("RET", false), ("EXOTIC", true)]),
            "999123",
            &index,
            1,
        );
        assert_eq!(
            decision,
            MaskDecision::Included {
                precision: 3,
                prefix: "999".to_string(),
                destination_id: Some("EXOTIC".to_string()),
            }
        );
    }

    #[test]
    fn test_mixed_mask_with_matching_exclude_is_excluded() {
        let index = StaticIndex::standard();
        let decision = evaluate_mask(
            &mask(&[("NAT", true), ("RET", false), ("EXOTIC", false)]),
            "999123",
            &index,
            1,
        );
        assert_eq!(decision, MaskDecision::Excluded);
    }

    #[test]
    fn test_exclude_wins_on_shared_prefix() {
        let index = StaticIndex::standard();
        let decision = evaluate_mask(&mask(&[("NAT", true), ("RET", false)]), "0723", &index, 1);
        assert_eq!(decision, MaskDecision::Excluded);
    }

    #[test]
    fn test_any_and_empty_masks_match_everything() {
        let index = StaticIndex::standard();
        assert!(evaluate_mask(&BTreeMap::new(), "4412", &index, 1).is_included());
        assert!(evaluate_mask(&mask(&[("*any", true)]), "4412", &index, 1).is_included());
    }
}
