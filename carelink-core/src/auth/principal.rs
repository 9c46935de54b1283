//! Authenticated identities and their roles

use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of roles an account can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoleName {
    Admin,
    Doctor,
    Patient,
}

impl RoleName {
    pub const ALL: [RoleName; 3] = [RoleName::Admin, RoleName::Doctor, RoleName::Patient];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleName::Admin => "ADMIN",
            RoleName::Doctor => "DOCTOR",
            RoleName::Patient => "PATIENT",
        }
    }

    const fn bit(self) -> u8 {
        match self {
            RoleName::Admin => 0b001,
            RoleName::Doctor => 0b010,
            RoleName::Patient => 0b100,
        }
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts `ADMIN`, `ROLE_ADMIN`, `admin` and so on. Anything outside the
/// enumeration is rejected here so raw role strings never travel further.
impl FromStr for RoleName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        let bare = upper.strip_prefix("ROLE_").unwrap_or(&upper);
        match bare {
            "ADMIN" => Ok(RoleName::Admin),
            "DOCTOR" => Ok(RoleName::Doctor),
            "PATIENT" => Ok(RoleName::Patient),
            _ => Err(CoreError::UnknownRole(s.to_string())),
        }
    }
}

/// Small bit set of [`RoleName`]s.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<RoleName>", into = "Vec<RoleName>")]
pub struct RoleSet(u8);

impl RoleSet {
    pub const fn empty() -> Self {
        RoleSet(0)
    }

    pub const fn of(roles: &[RoleName]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < roles.len() {
            bits |= roles[i].bit();
            i += 1;
        }
        RoleSet(bits)
    }

    pub fn insert(&mut self, role: RoleName) {
        self.0 |= role.bit();
    }

    pub fn contains(&self, role: RoleName) -> bool {
        self.0 & role.bit() != 0
    }

    pub fn intersects(&self, other: &RoleSet) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = RoleName> + '_ {
        RoleName::ALL.into_iter().filter(move |r| self.contains(*r))
    }
}

impl fmt::Debug for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl From<Vec<RoleName>> for RoleSet {
    fn from(roles: Vec<RoleName>) -> Self {
        RoleSet::of(&roles)
    }
}

impl From<RoleSet> for Vec<RoleName> {
    fn from(set: RoleSet) -> Self {
        set.iter().collect()
    }
}

impl FromIterator<RoleName> for RoleSet {
    fn from_iter<I: IntoIterator<Item = RoleName>>(iter: I) -> Self {
        let mut set = RoleSet::empty();
        for role in iter {
            set.insert(role);
        }
        set
    }
}

/// The identity attached to a request. Built once after authentication and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    subject_id: String,
    roles: RoleSet,
}

impl Principal {
    pub fn new(subject_id: impl Into<String>, roles: RoleSet) -> Self {
        Principal {
            subject_id: subject_id.into(),
            roles,
        }
    }

    /// The account's verified contact address.
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn roles(&self) -> RoleSet {
        self.roles
    }

    pub fn has_role(&self, role: RoleName) -> bool {
        self.roles.contains(role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(RoleName::Admin)
    }
}
