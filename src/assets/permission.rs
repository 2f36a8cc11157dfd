//! Privileges attached to models.

use serde::{Deserialize, Serialize};

/// Who may use an asset: everyone, or an explicit set of organisations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Privilege {
    pub public: bool,
    #[serde(default)]
    pub authorized_ids: Vec<String>,
}

impl Privilege {
    pub fn public() -> Self {
        Self {
            public: true,
            authorized_ids: Vec::new(),
        }
    }

    pub fn restricted<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut authorized_ids: Vec<String> = Vec::new();
        for id in ids {
            let id = id.into();
            if !authorized_ids.contains(&id) {
                authorized_ids.push(id);
            }
        }
        Self {
            public: false,
            authorized_ids,
        }
    }

    pub fn is_authorized(&self, node: &str) -> bool {
        self.public || self.authorized_ids.iter().any(|id| id == node)
    }

    /// Most restrictive combination of the two privileges.
    ///
    /// Any restriction wins; two restricted sides keep only the organisations
    /// both authorize.
    pub fn merge(&self, other: &Privilege) -> Privilege {
        match (self.public, other.public) {
            (true, true) => Privilege::public(),
            (true, false) => other.clone(),
            (false, true) => self.clone(),
            (false, false) => Privilege::restricted(
                self.authorized_ids
                    .iter()
                    .filter(|id| other.authorized_ids.contains(id))
                    .cloned(),
            ),
        }
    }

    /// Every principal allowed by `other` is also allowed by `self`.
    pub fn includes(&self, other: &Privilege) -> bool {
        if self.public {
            return true;
        }
        if other.public {
            return false;
        }
        other
            .authorized_ids
            .iter()
            .all(|id| self.authorized_ids.contains(id))
    }
}

impl Default for Privilege {
    fn default() -> Self {
        Self::public()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    pub process: Privilege,
}

impl Permissions {
    pub fn new(process: Privilege) -> Self {
        Self { process }
    }

    pub fn merge(&self, other: &Permissions) -> Permissions {
        Permissions {
            process: self.process.merge(&other.process),
        }
    }
}
