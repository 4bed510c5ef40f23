use url::{Origin, Url};

/// Partitioning key for storage areas.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Default)]
pub enum PartitionKey {
    /// Unpartitioned: one area per origin
    #[default]
    None,
    /// Keyed by the origin of the top-level document
    TopLevel(Origin),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PartitionPolicy {
    /// Embedded documents share storage with their origin everywhere
    #[default]
    None,
    /// Embedded documents get storage per top-level origin
    TopLevelOrigin,
}

/// Computes the storage partition for a document embedded under `top_level`.
pub fn compute_partition_key(top_level: &Url, p: PartitionPolicy) -> PartitionKey {
    match p {
        PartitionPolicy::None => PartitionKey::None,
        PartitionPolicy::TopLevelOrigin => PartitionKey::TopLevel(top_level.origin()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn o(s: &str) -> Origin {
        Url::parse(s).expect("valid URL").origin()
    }

    #[test]
    fn partitionkey_default_is_none() {
        let pk: PartitionKey = Default::default();
        assert_eq!(pk, PartitionKey::None);
    }

    #[test]
    fn compute_none_policy_returns_none() {
        let u = Url::parse("https://shop.example/path?q=1#frag").unwrap();
        assert_eq!(compute_partition_key(&u, PartitionPolicy::None), PartitionKey::None);
    }

    #[test]
    fn compute_toplevel_keeps_non_default_port() {
        let u = Url::parse("https://sub.shop.example:8443/path?q=1#f").unwrap();
        match compute_partition_key(&u, PartitionPolicy::TopLevelOrigin) {
            PartitionKey::TopLevel(o) => {
                assert_eq!(o.ascii_serialization(), "https://sub.shop.example:8443");
            }
            _ => panic!("expected TopLevel origin"),
        }
    }

    #[test]
    fn compute_toplevel_elides_default_port() {
        let u = Url::parse("https://shop.example/anything").unwrap();
        let pk = compute_partition_key(&u, PartitionPolicy::TopLevelOrigin);
        assert_eq!(pk, PartitionKey::TopLevel(o("https://shop.example")));
    }
}
