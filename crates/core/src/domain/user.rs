use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity pair stored inside ledger entries.
///
/// The display name is captured at write time so the ledger stays readable
/// even after the directory record changes or disappears.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: UserId,
    pub display_name: String,
}

impl UserRef {
    pub fn new(id: UserId, display_name: impl Into<String>) -> Self {
        Self { id, display_name: display_name.into() }
    }
}

/// A user as resolved from the host directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub id: UserId,
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    pub active: bool,
}

impl DirectoryUser {
    pub fn as_ref(&self) -> UserRef {
        UserRef::new(self.id, self.display_name.clone())
    }
}
