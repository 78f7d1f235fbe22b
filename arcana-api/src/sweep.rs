use std::{fmt, str::FromStr};

use anyhow::anyhow;

/// The reconciliation jobs, each exposed as an admin route
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Sweep {
    Followers,
    CollectionActivity,
    CommentActivity,
    OrphanCollections,
}

impl Sweep {
    pub const ALL: [Sweep; 4] = [
        Sweep::Followers,
        Sweep::CollectionActivity,
        Sweep::CommentActivity,
        Sweep::OrphanCollections,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Sweep::Followers => "cleanup-followers",
            Sweep::CollectionActivity => "cleanup-collection-activity",
            Sweep::CommentActivity => "clean-orphan-comments-activity",
            Sweep::OrphanCollections => "cleanup-orphan-collections",
        }
    }

    pub fn path(&self) -> String {
        format!("/admin/{}", self.name())
    }
}

impl fmt::Display for Sweep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Sweep {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Sweep> {
        Sweep::ALL
            .into_iter()
            .find(|sweep| sweep.name() == s)
            .ok_or_else(|| anyhow!("unknown sweep {s:?}"))
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SweepReport {
    pub removed: u64,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentActivityReport {
    /// Comment activities carrying no comment reference at all
    pub missing_reference: u64,
    /// Comment activities whose comment is gone
    pub dangling_reference: u64,
    pub removed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_names_round_trip() {
        for s in Sweep::ALL {
            assert_eq!(s.name().parse::<Sweep>().unwrap(), s);
            assert!(s.path().starts_with("/admin/"));
        }
        assert!("cleanup-everything".parse::<Sweep>().is_err());
    }
}
