//! Snapshot extraction from the MySQL grant tables.

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{FromRow, Row};

use crate::config::MySqlConfig;
use crate::error::{ExporterError, Result};
use crate::privilege::Privilege;
use crate::record::{PermissionRecord, PrivilegeSet, Snapshot, decode_flag};

/// Scoped grants from `mysql.db` followed by global grants from
/// `mysql.user`, whose scope is reported as `*`.
///
/// Every column is cast to a character string so binary collations decode as
/// text. Column aliases must match [`Privilege::column`].
pub const GRANTS_QUERY: &str = r"
    SELECT
        CAST(Host AS CHAR) AS host,
        CAST(Db AS CHAR) AS scope,
        CAST(User AS CHAR) AS `user`,
        CAST(Select_priv AS CHAR) AS select_priv,
        CAST(Insert_priv AS CHAR) AS insert_priv,
        CAST(Update_priv AS CHAR) AS update_priv,
        CAST(Delete_priv AS CHAR) AS delete_priv,
        CAST(Create_priv AS CHAR) AS create_priv,
        CAST(Drop_priv AS CHAR) AS drop_priv,
        CAST(Grant_priv AS CHAR) AS grant_priv,
        CAST(References_priv AS CHAR) AS references_priv,
        CAST(Index_priv AS CHAR) AS index_priv,
        CAST(Alter_priv AS CHAR) AS alter_priv,
        CAST(Create_tmp_table_priv AS CHAR) AS create_tmp_table_priv,
        CAST(Lock_tables_priv AS CHAR) AS lock_tables_priv,
        CAST(Create_view_priv AS CHAR) AS create_view_priv,
        CAST(Show_view_priv AS CHAR) AS show_view_priv,
        CAST(Create_routine_priv AS CHAR) AS create_routine_priv,
        CAST(Alter_routine_priv AS CHAR) AS alter_routine_priv,
        CAST(Execute_priv AS CHAR) AS execute_priv,
        CAST(Event_priv AS CHAR) AS event_priv,
        CAST(Trigger_priv AS CHAR) AS trigger_priv
    FROM mysql.db
    UNION ALL
    SELECT
        CAST(Host AS CHAR) AS host,
        '*' AS scope,
        CAST(User AS CHAR) AS `user`,
        CAST(Select_priv AS CHAR) AS select_priv,
        CAST(Insert_priv AS CHAR) AS insert_priv,
        CAST(Update_priv AS CHAR) AS update_priv,
        CAST(Delete_priv AS CHAR) AS delete_priv,
        CAST(Create_priv AS CHAR) AS create_priv,
        CAST(Drop_priv AS CHAR) AS drop_priv,
        CAST(Grant_priv AS CHAR) AS grant_priv,
        CAST(References_priv AS CHAR) AS references_priv,
        CAST(Index_priv AS CHAR) AS index_priv,
        CAST(Alter_priv AS CHAR) AS alter_priv,
        CAST(Create_tmp_table_priv AS CHAR) AS create_tmp_table_priv,
        CAST(Lock_tables_priv AS CHAR) AS lock_tables_priv,
        CAST(Create_view_priv AS CHAR) AS create_view_priv,
        CAST(Show_view_priv AS CHAR) AS show_view_priv,
        CAST(Create_routine_priv AS CHAR) AS create_routine_priv,
        CAST(Alter_routine_priv AS CHAR) AS alter_routine_priv,
        CAST(Execute_priv AS CHAR) AS execute_priv,
        CAST(Event_priv AS CHAR) AS event_priv,
        CAST(Trigger_priv AS CHAR) AS trigger_priv
    FROM mysql.user
";

/// Source of grant snapshots.
#[async_trait]
pub trait SnapshotReader: Send + Sync {
    /// Reads the complete current grant state.
    async fn read(&self) -> Result<Snapshot>;

    /// Checks that the backing store is reachable.
    async fn ping(&self) -> Result<()>;

    /// Where snapshots are read from, for diagnostics.
    fn endpoint(&self) -> String;
}

impl<'r> FromRow<'r, MySqlRow> for PermissionRecord {
    fn from_row(row: &'r MySqlRow) -> std::result::Result<Self, sqlx::Error> {
        let host: Option<String> = row.try_get("host")?;
        let scope: Option<String> = row.try_get("scope")?;
        let user: Option<String> = row.try_get("user")?;

        let mut privileges = PrivilegeSet::default();
        for privilege in Privilege::all() {
            let flag: Option<String> = row.try_get(privilege.column())?;
            privileges.set(privilege, decode_flag(flag.as_deref()));
        }

        Ok(Self {
            host: host.unwrap_or_default(),
            scope: scope.unwrap_or_default(),
            user: user.unwrap_or_default(),
            privileges
        })
    }
}

/// Reads snapshots from the `mysql` system schema.
#[derive(Clone, Debug)]
pub struct MySqlSnapshotReader {
    pool: MySqlPool,
    endpoint: String
}

impl MySqlSnapshotReader {
    /// Connects to the server described by `config`.
    ///
    /// A failure here is a startup error, reported as
    /// [`ExporterError::Connection`].
    pub async fn connect(config: &MySqlConfig) -> Result<Self> {
        let endpoint = endpoint(config);
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect_with(connect_options(config))
            .await
            .map_err(|e| ExporterError::connection(endpoint.clone(), e))?;

        Ok(Self { pool, endpoint })
    }

    /// Wraps an existing pool (useful for testing).
    #[must_use]
    pub fn with_pool(pool: MySqlPool, endpoint: impl Into<String>) -> Self {
        Self {
            pool,
            endpoint: endpoint.into()
        }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

#[async_trait]
impl SnapshotReader for MySqlSnapshotReader {
    async fn read(&self) -> Result<Snapshot> {
        let records: Vec<PermissionRecord> = sqlx::query_as(GRANTS_QUERY)
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!(row_count = records.len(), "Fetched grant rows");

        Ok(Snapshot::new(records))
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}

/// Human-readable server location: the hostname, or the socket path.
pub fn endpoint(config: &MySqlConfig) -> String {
    if config.mysql_use_socket {
        config.mysql_socket.display().to_string()
    } else {
        config.mysql_hostname.clone()
    }
}

/// Connection options for `config`, over TCP or the unix socket.
pub fn connect_options(config: &MySqlConfig) -> MySqlConnectOptions {
    let options = MySqlConnectOptions::new()
        .host(&config.mysql_hostname)
        .port(config.mysql_port)
        .username(&config.mysql_user)
        .database("mysql");

    let options = if config.mysql_password.is_empty() {
        options
    } else {
        options.password(&config.mysql_password)
    };

    if config.mysql_use_socket {
        options.socket(&config.mysql_socket)
    } else {
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_aliases_every_privilege_column() {
        for privilege in Privilege::all() {
            let alias = format!("AS {},", privilege.column());
            let last_alias = format!("AS {}\n", privilege.column());
            let occurrences =
                GRANTS_QUERY.matches(&alias).count() + GRANTS_QUERY.matches(&last_alias).count();
            assert_eq!(occurrences, 2, "{} must be selected from both tables", privilege.column());
        }
    }

    #[test]
    fn test_query_forces_global_scope() {
        assert!(GRANTS_QUERY.contains("'*' AS scope"));
        assert!(GRANTS_QUERY.contains("FROM mysql.db"));
        assert!(GRANTS_QUERY.contains("FROM mysql.user"));
        assert!(GRANTS_QUERY.contains("UNION ALL"));
    }

    #[test]
    fn test_connect_options_tcp() {
        let config = MySqlConfig {
            mysql_hostname: "db.internal".to_string(),
            mysql_port: 3307,
            ..MySqlConfig::default()
        };
        let options = connect_options(&config);
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 3307);
        assert_eq!(options.get_username(), "root");
        assert_eq!(options.get_database(), Some("mysql"));
        assert!(options.get_socket().is_none());
        assert_eq!(endpoint(&config), "db.internal");
    }

    #[test]
    fn test_connect_options_socket() {
        let config = MySqlConfig {
            mysql_use_socket: true,
            mysql_socket: "/run/mysqld/mysqld.sock".into(),
            ..MySqlConfig::default()
        };
        let options = connect_options(&config);
        assert_eq!(
            options.get_socket(),
            Some(std::path::Path::new("/run/mysqld/mysqld.sock").to_path_buf()).as_ref()
        );
        assert_eq!(endpoint(&config), "/run/mysqld/mysqld.sock");
    }
}
