//! In-memory model of one grant-table snapshot.
//!
//! A [`Snapshot`] is an ordered list of [`PermissionRecord`]s, one per
//! (host, scope, user) row. Every record carries all privileges; each
//! (record, privilege) pair becomes one published sample keyed by a
//! [`LabelKey`].

use std::collections::BTreeSet;
use std::fmt;

use crate::privilege::{PRIVILEGE_COUNT, Privilege};

/// Scope value used for global (`mysql.user`) grants.
pub const GLOBAL_SCOPE: &str = "*";

/// Decodes a grant-table `Y`/`N` flag. Only an exact `Y` counts as granted.
pub fn decode_flag(flag: Option<&str>) -> bool {
    matches!(flag, Some("Y"))
}

/// Granted/not-granted indicator for every [`Privilege`].
///
/// The default value has every privilege revoked, so a record is always
/// fully populated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrivilegeSet {
    flags: [bool; PRIVILEGE_COUNT]
}

impl PrivilegeSet {
    /// Builds a set with exactly the given privileges granted.
    pub fn granted(privileges: impl IntoIterator<Item = Privilege>) -> Self {
        let mut set = Self::default();
        for privilege in privileges {
            set.set(privilege, true);
        }
        set
    }

    pub fn set(&mut self, privilege: Privilege, granted: bool) {
        self.flags[privilege.index()] = granted;
    }

    pub fn is_granted(&self, privilege: Privilege) -> bool {
        self.flags[privilege.index()]
    }

    /// The 0/1 sample value for `privilege`.
    pub fn indicator(&self, privilege: Privilege) -> i64 {
        i64::from(self.is_granted(privilege))
    }

    /// All privileges in export order with their indicator.
    pub fn iter(&self) -> impl Iterator<Item = (Privilege, i64)> + '_ {
        Privilege::all().map(move |privilege| (privilege, self.indicator(privilege)))
    }

    pub fn granted_count(&self) -> usize {
        self.flags.iter().filter(|granted| **granted).count()
    }
}

/// One (host, scope, user) grant row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRecord {
    pub host: String,
    /// `*` for global grants, otherwise the database name.
    pub scope: String,
    pub user: String,
    pub privileges: PrivilegeSet
}

impl PermissionRecord {
    pub fn new(
        user: impl Into<String>,
        host: impl Into<String>,
        scope: impl Into<String>,
        privileges: PrivilegeSet
    ) -> Self {
        Self {
            host: host.into(),
            scope: scope.into(),
            user: user.into(),
            privileges
        }
    }

    pub fn is_global(&self) -> bool {
        self.scope == GLOBAL_SCOPE
    }

    /// The key of this record's sample for `privilege`.
    pub fn label_key(&self, privilege: Privilege) -> LabelKey {
        LabelKey {
            user: self.user.clone(),
            host: self.host.clone(),
            scope: self.scope.clone(),
            privilege
        }
    }

    /// Every sample this record publishes, zero-valued ones included.
    pub fn samples(&self) -> impl Iterator<Item = (LabelKey, i64)> + '_ {
        self.privileges
            .iter()
            .map(move |(privilege, value)| (self.label_key(privilege), value))
    }
}

/// Identity of one published series: `(user, host, scope, privilege)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelKey {
    pub user: String,
    pub host: String,
    pub scope: String,
    pub privilege: Privilege
}

impl LabelKey {
    /// Label values in exposition order: `user`, `host`, `db`, `permission`.
    pub fn label_values(&self) -> [&str; 4] {
        [
            self.user.as_str(),
            self.host.as_str(),
            self.scope.as_str(),
            self.privilege.label()
        ]
    }
}

impl fmt::Display for LabelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} on {} ({})",
            self.user, self.host, self.scope, self.privilege
        )
    }
}

/// One read cycle's complete view of the grant tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    records: Vec<PermissionRecord>
}

impl Snapshot {
    pub fn new(records: Vec<PermissionRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[PermissionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every (key, value) sample of the snapshot in record order.
    pub fn samples(&self) -> impl Iterator<Item = (LabelKey, i64)> + '_ {
        self.records.iter().flat_map(|record| record.samples())
    }

    /// The set of keys this snapshot publishes.
    pub fn label_keys(&self) -> BTreeSet<LabelKey> {
        self.samples().map(|(key, _)| key).collect()
    }
}

impl FromIterator<PermissionRecord> for Snapshot {
    fn from_iter<I: IntoIterator<Item = PermissionRecord>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
