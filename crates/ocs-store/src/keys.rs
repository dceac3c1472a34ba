//! Storage key constants and builders
//!
//! Every stored entity lives under a short type prefix, so accounts,
//! destinations and rating subjects sharing an ID never collide.
//!
//! # Key Patterns
//!
//! - `acc:{tenant:account}` - Accounts
//! - `dst:{destination_id}` - Destinations by ID
//! - `rds:{prefix}` - Reverse index from prefix to destination IDs
//! - `shg:{shared_group_id}` - Shared groups
//! - `rsj:{tenant}:{category}:{subject}` - Rates of named rating subjects
//!
//! # Example
//!
//! ```
//! use ocs_store::keys;
//!
//! assert_eq!(keys::account_key("cgrates.org:rif"), "acc:cgrates.org:rif");
//! assert_eq!(keys::reverse_destination_key("0723"), "rds:0723");
//! ```

/// Prefix for accounts
///
/// Format: `acc:{tenant:account}`
pub const ACCOUNT_PREFIX: &str = "acc";

/// Prefix for destinations
///
/// Format: `dst:{destination_id}`
pub const DESTINATION_PREFIX: &str = "dst";

/// Prefix for the reverse destination index
///
/// Format: `rds:{prefix}`
pub const REVERSE_DESTINATION_PREFIX: &str = "rds";

/// Prefix for shared groups
///
/// Format: `shg:{shared_group_id}`
pub const SHARED_GROUP_PREFIX: &str = "shg";

/// Prefix for rating subject rates
///
/// Format: `rsj:{tenant}:{category}:{subject}`
pub const RATING_SUBJECT_PREFIX: &str = "rsj";

/// Build the key of an account
///
/// # Arguments
///
/// * `account_id` - The full `tenant:account` ID
pub fn account_key(account_id: &str) -> String {
    format!("{}:{}", ACCOUNT_PREFIX, account_id)
}

/// Build the key of a destination
pub fn destination_key(destination_id: &str) -> String {
    format!("{}:{}", DESTINATION_PREFIX, destination_id)
}

/// Build the reverse-index key of a dialed-number prefix
pub fn reverse_destination_key(prefix: &str) -> String {
    format!("{}:{}", REVERSE_DESTINATION_PREFIX, prefix)
}

/// Build the key of a shared group
pub fn shared_group_key(shared_group_id: &str) -> String {
    format!("{}:{}", SHARED_GROUP_PREFIX, shared_group_id)
}

/// Build the key of a rating subject's rates
///
/// # Arguments
///
/// * `tenant` - Tenant owning the subject, `*any` for every tenant
/// * `category` - Usage category, `*any` for every category
/// * `subject` - The rating subject named by a balance
pub fn rating_subject_key(tenant: &str, category: &str, subject: &str) -> String {
    format!("{}:{}:{}:{}", RATING_SUBJECT_PREFIX, tenant, category, subject)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_key() {
        assert_eq!(account_key("cgrates.org:rif"), "acc:cgrates.org:rif");
    }

    #[test]
    fn test_destination_keys() {
        assert_eq!(destination_key("NAT"), "dst:NAT");
        assert_eq!(reverse_destination_key("0723"), "rds:0723");
    }

    #[test]
    fn test_rating_subject_key() {
        assert_eq!(
            rating_subject_key("cgrates.org", "call", "minu"),
            "rsj:cgrates.org:call:minu"
        );
    }

    #[test]
    fn test_key_uniqueness() {
        let keys = [
            account_key("x"),
            destination_key("x"),
            reverse_destination_key("x"),
            shared_group_key("x"),
        ];
        for (i, a) in keys.iter().enumerate() {
            for b in keys.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
