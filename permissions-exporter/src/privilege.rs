//! The fixed set of MySQL grant-table privileges exported per principal.

use strum::{Display, EnumCount, EnumIter, IntoEnumIterator, IntoStaticStr};

/// Number of privilege columns read from the grant tables.
pub const PRIVILEGE_COUNT: usize = 19;

/// A privilege column of `mysql.db` / `mysql.user`.
///
/// The declaration order is the export order; `Display` yields the value
/// used for the `permission` label (`CREATE_TMP_TABLE`, `SHOW_VIEW`, ...).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumCount,
    EnumIter,
    IntoStaticStr
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Privilege {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Drop,
    Grant,
    References,
    Index,
    Alter,
    CreateTmpTable,
    LockTables,
    CreateView,
    ShowView,
    CreateRoutine,
    AlterRoutine,
    Execute,
    Event,
    Trigger
}

impl Privilege {
    /// Iterates all privileges in export order.
    pub fn all() -> impl Iterator<Item = Privilege> {
        Self::iter()
    }

    /// Value of the `permission` label for this privilege.
    pub fn label(self) -> &'static str {
        self.into()
    }

    /// Column alias used by the grants query for this privilege's Y/N flag.
    pub fn column(self) -> &'static str {
        match self {
            Self::Select => "select_priv",
            Self::Insert => "insert_priv",
            Self::Update => "update_priv",
            Self::Delete => "delete_priv",
            Self::Create => "create_priv",
            Self::Drop => "drop_priv",
            Self::Grant => "grant_priv",
            Self::References => "references_priv",
            Self::Index => "index_priv",
            Self::Alter => "alter_priv",
            Self::CreateTmpTable => "create_tmp_table_priv",
            Self::LockTables => "lock_tables_priv",
            Self::CreateView => "create_view_priv",
            Self::ShowView => "show_view_priv",
            Self::CreateRoutine => "create_routine_priv",
            Self::AlterRoutine => "alter_routine_priv",
            Self::Execute => "execute_priv",
            Self::Event => "event_priv",
            Self::Trigger => "trigger_priv"
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}
