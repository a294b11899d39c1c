use crate::error::CoordinatorError;

/// How many replica responses the coordinator waits for before answering
/// the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuorumPolicy {
    Any,
    All,
    N(usize),
}

impl QuorumPolicy {
    pub fn parse(s: &str) -> Result<Self, CoordinatorError> {
        match s {
            "any" => Ok(QuorumPolicy::Any),
            "all" => Ok(QuorumPolicy::All),
            other => other
                .parse::<usize>()
                .map(QuorumPolicy::N)
                .map_err(|_| CoordinatorError::InvalidQuorumPolicy(other.to_owned())),
        }
    }

    /// `vnode_fallback` stands in for the replica count in the `all` case,
    /// mirroring the source's use of the configured vnode count as a
    /// surrogate rather than the size of this particular replica set.
    pub fn threshold(self, vnode_fallback: usize) -> usize {
        match self {
            QuorumPolicy::Any => 1,
            QuorumPolicy::All => vnode_fallback.max(1),
            QuorumPolicy::N(n) => n.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_any_and_all() {
        assert_eq!(QuorumPolicy::parse("any").unwrap(), QuorumPolicy::Any);
        assert_eq!(QuorumPolicy::parse("all").unwrap(), QuorumPolicy::All);
    }

    #[test]
    fn parses_integer_threshold() {
        assert_eq!(QuorumPolicy::parse("2").unwrap(), QuorumPolicy::N(2));
    }

    #[test]
    fn rejects_garbage() {
        assert!(QuorumPolicy::parse("quorum").is_err());
    }

    #[test]
    fn thresholds_match_policy() {
        assert_eq!(QuorumPolicy::Any.threshold(3), 1);
        assert_eq!(QuorumPolicy::All.threshold(3), 3);
        assert_eq!(QuorumPolicy::N(2).threshold(3), 2);
    }
}
