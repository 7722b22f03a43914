//! Client facade
//!
//! [`Client`] is one live session: a provider, the profile it was opened with
//! and the schema it browses. [`Navigator`] wraps a client in an explicit
//! connection state machine so every operation fails fast with
//! [`Error::NoActiveConnection`] unless a session is established.

use crate::database::{connect, DatabaseProvider};
use crate::decoder::decode;
use crate::dialect::{render, DialectKind};
use crate::exporter::{self, FileExport};
use crate::query::{
    build_select_all, build_select_everything, build_update, page_offset, total_pages,
};
use crate::schema::{
    CellUpdate, Column, Connected, QueryResult, SchemaSize, SchemaSnapshot, Table,
    TableColumns, TablePage, TableSize,
};
use crate::{ConnectionProfile, Error, ErrorKind, PoolSettings, Result};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// A live database session
pub struct Client {
    provider: Arc<dyn DatabaseProvider>,
    profile: ConnectionProfile,
    schema: String,
    snapshot: RwLock<SchemaSnapshot>,
}

impl Client {
    /// Wrap an already connected provider
    pub fn new(provider: Arc<dyn DatabaseProvider>, profile: ConnectionProfile) -> Self {
        let dialect = provider.dialect();
        let schema = dialect.default_schema(&profile);
        let snapshot = SchemaSnapshot {
            name: display_name(&profile, &schema),
            ..Default::default()
        };

        Self {
            provider,
            profile,
            schema,
            snapshot: RwLock::new(snapshot),
        }
    }

    /// Connect, then load every table with its columns
    ///
    /// The pool is closed again if loading the schema fails.
    pub async fn open(
        profile: ConnectionProfile,
        settings: &PoolSettings,
    ) -> Result<(Self, Connected)> {
        let provider = connect(&profile, settings).await?;
        let client = Self::new(provider, profile);

        match client.load_schema().await {
            Ok(connected) => Ok((client, connected)),
            Err(error) => {
                if let Err(close_error) = client.close().await {
                    warn!(%close_error, "failed to close pool after schema load failure");
                }
                Err(error)
            }
        }
    }

    async fn load_schema(&self) -> Result<Connected> {
        let names = self.provider.list_tables(&self.schema).await?;

        let mut tables = Vec::with_capacity(names.len());
        for table_name in names {
            let columns = self.provider.get_columns(&self.schema, &table_name).await?;
            tables.push(TableColumns {
                table_name,
                columns,
            });
        }

        let mut snapshot = self.snapshot.write().await;
        snapshot.table_count = tables.len();
        snapshot.tables = tables.clone();

        Ok(Connected {
            schema: snapshot.name.clone(),
            tables,
        })
    }

    pub fn dialect(&self) -> DialectKind {
        self.provider.dialect()
    }

    pub fn profile(&self) -> &ConnectionProfile {
        &self.profile
    }

    /// Schema the session is scoped to (empty for SQLite)
    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn provider(&self) -> &Arc<dyn DatabaseProvider> {
        &self.provider
    }

    pub async fn snapshot(&self) -> SchemaSnapshot {
        self.snapshot.read().await.clone()
    }

    pub async fn close(&self) -> Result<()> {
        self.provider.close().await
    }

    pub async fn list_schemas(&self) -> Result<Vec<String>> {
        self.provider.list_schemas().await
    }

    pub async fn list_tables(&self) -> Result<Vec<String>> {
        self.provider.list_tables(&self.schema).await
    }

    pub async fn get_columns(&self, table: &str) -> Result<Vec<Column>> {
        self.provider.get_columns(&self.schema, table).await
    }

    /// One page of `table`
    ///
    /// `page` is 1-based and clamped to the first page; `per_page` is at least 1.
    pub async fn get_table(&self, table: &str, page: u64, per_page: u64) -> Result<TablePage> {
        let per_page = per_page.max(1);

        let columns = self.get_columns(table).await?;
        if columns.is_empty() {
            return Err(Error::introspection(format!("table {} not found", table)));
        }

        let sql = build_select_all(
            &columns,
            self.dialect(),
            &self.schema,
            table,
            per_page,
            page_offset(page, per_page),
        )?;
        let rows = decode(self.provider.fetch(&self.schema, &sql).await?);
        let total_rows = self.provider.count_rows(&self.schema, table).await?;
        let size_mb = self.optional_table_size(table).await?;

        Ok(TablePage {
            table: Table {
                name: table.to_string(),
                row_count: rows.len(),
                column_count: columns.len(),
                columns,
                rows,
                size_mb,
            },
            total_rows,
            total_pages: total_pages(total_rows, per_page),
        })
    }

    async fn optional_table_size(&self, table: &str) -> Result<Option<f64>> {
        match self.provider.table_size(&self.schema, table).await {
            Ok(size) => Ok(Some(size.size_mb)),
            Err(error) if error.kind() == ErrorKind::UnsupportedDialect => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Update a single cell, quoting literals according to the looked-up column types
    pub async fn update_cell(&self, update: &CellUpdate) -> Result<QueryResult> {
        let column_type = self
            .provider
            .column_data_type(&self.schema, &update.table, &update.column)
            .await?;
        let key_column_type = self
            .provider
            .column_data_type(&self.schema, &update.table, &update.key_column)
            .await?;

        let sql = build_update(update, &column_type, &key_column_type);
        let started = Instant::now();
        let execution = self.provider.run(&self.schema, &sql).await?;
        let elapsed_seconds = started.elapsed().as_secs_f64();

        Ok(QueryResult {
            affected_rows: execution.affected_rows,
            elapsed_seconds,
            rows: Vec::new(),
            message: format!(
                "Row update successfully ({} rows affected, time taken {:.3})",
                execution.affected_rows, elapsed_seconds
            ),
        })
    }

    /// Execute arbitrary SQL
    ///
    /// Statements that return rows report the row count as affected rows.
    pub async fn execute_raw_query(&self, sql: &str) -> Result<QueryResult> {
        let started = Instant::now();
        let execution = self.provider.run(&self.schema, sql).await?;
        let elapsed_seconds = started.elapsed().as_secs_f64();

        let rows = decode(execution.result);
        let affected_rows = if rows.is_empty() {
            execution.affected_rows
        } else {
            rows.len() as u64
        };

        Ok(QueryResult {
            affected_rows,
            elapsed_seconds,
            rows,
            message: format!(
                "Query executed successfully ({} rows affected, time taken {:.5})",
                affected_rows, elapsed_seconds
            ),
        })
    }

    async fn read_everything(&self, table: &str) -> Result<Vec<crate::Row>> {
        let sql = build_select_everything(self.dialect(), &self.schema, table)?;
        Ok(decode(self.provider.fetch(&self.schema, &sql).await?))
    }

    pub async fn export_json(&self, table: &str) -> Result<Vec<u8>> {
        let rows = self.read_everything(table).await?;
        exporter::to_json(&rows)
    }

    pub async fn export_csv(&self, table: &str) -> Result<String> {
        let rows = self.read_everything(table).await?;
        Ok(exporter::to_csv(&rows))
    }

    /// `CREATE TABLE` script for every table, in listing order
    pub async fn export_schema_ddl(&self) -> Result<String> {
        let tables = self.list_tables().await?;
        let definitions = self
            .provider
            .show_create_tables(&self.schema, &tables)
            .await?;

        Ok(definitions
            .iter()
            .map(|(table, ddl)| exporter::frame_ddl(table, ddl))
            .collect())
    }

    /// Write [`Client::export_json`] output to `directory/<table>.json`
    pub async fn export_json_to_file(&self, table: &str, directory: &Path) -> Result<FileExport> {
        let json = self.export_json(table).await?;
        exporter::write_file(directory, &format!("{}.json", table), &json).await
    }

    /// Write [`Client::export_csv`] output to `directory/<table>.csv`
    pub async fn export_csv_to_file(&self, table: &str, directory: &Path) -> Result<FileExport> {
        let csv = self.export_csv(table).await?;
        exporter::write_file(directory, &format!("{}.csv", table), csv.as_bytes()).await
    }

    /// Write [`Client::export_schema_ddl`] output to `directory/<schema>.sql`
    pub async fn export_schema_ddl_to_file(&self, directory: &Path) -> Result<FileExport> {
        let ddl = self.export_schema_ddl().await?;
        exporter::write_file(directory, &format!("{}.sql", self.schema), ddl.as_bytes()).await
    }

    pub async fn table_sizes(&self) -> Result<Vec<TableSize>> {
        self.provider.table_sizes(&self.schema).await
    }

    pub async fn table_size(&self, table: &str) -> Result<TableSize> {
        self.provider.table_size(&self.schema, table).await
    }

    /// Size of the connected schema; also recorded in the snapshot
    pub async fn schema_size(&self) -> Result<SchemaSize> {
        let size = self.provider.schema_size(&self.schema).await?;
        self.snapshot.write().await.size_mb = Some(size.size_mb);
        Ok(size)
    }

    pub async fn count_rows(&self, table: &str) -> Result<u64> {
        self.provider.count_rows(&self.schema, table).await
    }

    pub async fn count_columns(&self, table: &str) -> Result<u64> {
        self.provider.count_columns(&self.schema, table).await
    }

    pub async fn drop_table(&self, table: &str) -> Result<QueryResult> {
        let sql = self.render_table_statement("drop_table", table)?;
        let result = self
            .run_statement(&sql, |elapsed| {
                format!("Table '{}' dropped successfully ({:.3}s)", table, elapsed)
            })
            .await?;

        let mut snapshot = self.snapshot.write().await;
        snapshot.tables.retain(|entry| entry.table_name != table);
        snapshot.table_count = snapshot.tables.len();

        Ok(result)
    }

    pub async fn truncate_table(&self, table: &str) -> Result<QueryResult> {
        let sql = self.render_table_statement("truncate_table", table)?;
        self.run_statement(&sql, |elapsed| {
            format!("Table '{}' truncated successfully ({:.3}s)", table, elapsed)
        })
        .await
    }

    pub async fn create_database(&self, name: &str) -> Result<QueryResult> {
        let sql = self.render_database_statement("create_database", name)?;
        self.run_statement(&sql, |elapsed| {
            format!("Database '{}' created successfully ({:.3}s)", name, elapsed)
        })
        .await
    }

    pub async fn drop_database(&self, name: &str) -> Result<QueryResult> {
        let sql = self.render_database_statement("drop_database", name)?;
        self.run_statement(&sql, |elapsed| {
            format!("Database '{}' dropped successfully ({:.3}s)", name, elapsed)
        })
        .await
    }

    fn render_table_statement(&self, key: &str, table: &str) -> Result<String> {
        let dialect = self.dialect();
        let template = dialect.templates()?.require(key, dialect)?;
        Ok(render(
            template,
            &[
                ("schema", &dialect.quote_identifier(&self.schema)),
                ("table", &dialect.quote_identifier(table)),
            ],
        ))
    }

    fn render_database_statement(&self, key: &str, name: &str) -> Result<String> {
        let dialect = self.dialect();
        let template = dialect.templates()?.require(key, dialect)?;
        Ok(render(
            template,
            &[("database", &dialect.quote_identifier(name))],
        ))
    }

    async fn run_statement(
        &self,
        sql: &str,
        describe: impl FnOnce(f64) -> String,
    ) -> Result<QueryResult> {
        debug!(%sql, "running statement");
        let started = Instant::now();
        let execution = self.provider.run(&self.schema, sql).await?;
        let elapsed_seconds = started.elapsed().as_secs_f64();

        Ok(QueryResult {
            affected_rows: execution.affected_rows,
            elapsed_seconds,
            rows: Vec::new(),
            message: describe(elapsed_seconds),
        })
    }
}

/// Name reported for the connected schema
fn display_name(profile: &ConnectionProfile, schema: &str) -> String {
    if !schema.is_empty() {
        return schema.to_string();
    }

    profile
        .file_path
        .as_ref()
        .and_then(|path| path.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "main".to_string())
}

async fn close_replaced(client: &Client) {
    info!("closing replaced session");
    if let Err(error) = client.close().await {
        warn!(%error, "failed to close replaced session");
    }
}

/// Connection state of a [`Navigator`]
#[derive(Clone, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected(Arc<Client>),
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected(_))
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => formatter.write_str("Disconnected"),
            SessionState::Connecting => formatter.write_str("Connecting"),
            SessionState::Connected(client) => formatter
                .debug_tuple("Connected")
                .field(&client.dialect())
                .finish(),
        }
    }
}

/// Single entry point for one session
///
/// Every data operation requires [`SessionState::Connected`]; otherwise it
/// returns [`Error::NoActiveConnection`] without touching the network.
#[derive(Debug, Default)]
pub struct Navigator {
    state: RwLock<SessionState>,
    settings: PoolSettings,
}

impl Navigator {
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            state: RwLock::new(SessionState::Disconnected),
            settings,
        }
    }

    pub async fn state(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.state.read().await.is_connected()
    }

    /// The active client, if connected
    pub async fn client(&self) -> Result<Arc<Client>> {
        match &*self.state.read().await {
            SessionState::Connected(client) => Ok(Arc::clone(client)),
            SessionState::Disconnected | SessionState::Connecting => {
                Err(Error::NoActiveConnection)
            }
        }
    }

    /// Open a session, replacing any active one
    ///
    /// Every client displaced by this call is closed once the new state is in
    /// place, including one installed by a concurrent connect. On failure the
    /// navigator is left disconnected (unless a concurrent connect succeeded)
    /// and the originating error is returned.
    pub async fn connect(&self, profile: ConnectionProfile) -> Result<Connected> {
        let previous = std::mem::replace(&mut *self.state.write().await, SessionState::Connecting);

        let outcome = match Client::open(profile, &self.settings).await {
            Ok((client, connected)) => {
                info!(
                    dialect = %client.dialect(),
                    schema = %connected.schema,
                    tables = connected.tables.len(),
                    "session connected"
                );
                self.install(Arc::new(client)).await;
                Ok(connected)
            }
            Err(error) => {
                let mut state = self.state.write().await;
                if matches!(*state, SessionState::Connecting) {
                    *state = SessionState::Disconnected;
                }
                Err(error)
            }
        };

        if let SessionState::Connected(replaced) = previous {
            close_replaced(&replaced).await;
        }

        outcome
    }

    /// Make `client` the active session, closing whichever client it displaces
    async fn install(&self, client: Arc<Client>) {
        let displaced =
            std::mem::replace(&mut *self.state.write().await, SessionState::Connected(client));

        if let SessionState::Connected(displaced) = displaced {
            close_replaced(&displaced).await;
        }
    }

    /// Close the active session
    pub async fn disconnect(&self) -> Result<()> {
        let previous =
            std::mem::replace(&mut *self.state.write().await, SessionState::Disconnected);

        match previous {
            SessionState::Connected(client) => {
                client.close().await?;
                info!("session disconnected");
                Ok(())
            }
            SessionState::Disconnected | SessionState::Connecting => {
                Err(Error::NoActiveConnection)
            }
        }
    }

    pub async fn snapshot(&self) -> Result<SchemaSnapshot> {
        Ok(self.client().await?.snapshot().await)
    }

    pub async fn list_schemas(&self) -> Result<Vec<String>> {
        self.client().await?.list_schemas().await
    }

    pub async fn list_tables(&self) -> Result<Vec<String>> {
        self.client().await?.list_tables().await
    }

    pub async fn get_table(&self, table: &str, page: u64, per_page: u64) -> Result<TablePage> {
        self.client().await?.get_table(table, page, per_page).await
    }

    pub async fn get_columns(&self, table: &str) -> Result<Vec<Column>> {
        self.client().await?.get_columns(table).await
    }

    pub async fn update_cell(&self, update: &CellUpdate) -> Result<QueryResult> {
        self.client().await?.update_cell(update).await
    }

    pub async fn execute_raw_query(&self, sql: &str) -> Result<QueryResult> {
        self.client().await?.execute_raw_query(sql).await
    }

    pub async fn export_json(&self, table: &str) -> Result<Vec<u8>> {
        self.client().await?.export_json(table).await
    }

    pub async fn export_csv(&self, table: &str) -> Result<String> {
        self.client().await?.export_csv(table).await
    }

    pub async fn export_schema_ddl(&self) -> Result<String> {
        self.client().await?.export_schema_ddl().await
    }

    pub async fn export_json_to_file(&self, table: &str, directory: &Path) -> Result<FileExport> {
        self.client().await?.export_json_to_file(table, directory).await
    }

    pub async fn export_csv_to_file(&self, table: &str, directory: &Path) -> Result<FileExport> {
        self.client().await?.export_csv_to_file(table, directory).await
    }

    pub async fn export_schema_ddl_to_file(&self, directory: &Path) -> Result<FileExport> {
        self.client().await?.export_schema_ddl_to_file(directory).await
    }

    pub async fn table_sizes(&self) -> Result<Vec<TableSize>> {
        self.client().await?.table_sizes().await
    }

    pub async fn table_size(&self, table: &str) -> Result<TableSize> {
        self.client().await?.table_size(table).await
    }

    pub async fn schema_size(&self) -> Result<SchemaSize> {
        self.client().await?.schema_size().await
    }

    pub async fn count_rows(&self, table: &str) -> Result<u64> {
        self.client().await?.count_rows(table).await
    }

    pub async fn count_columns(&self, table: &str) -> Result<u64> {
        self.client().await?.count_columns(table).await
    }

    pub async fn drop_table(&self, table: &str) -> Result<QueryResult> {
        self.client().await?.drop_table(table).await
    }

    pub async fn truncate_table(&self, table: &str) -> Result<QueryResult> {
        self.client().await?.truncate_table(table).await
    }

    pub async fn create_database(&self, name: &str) -> Result<QueryResult> {
        self.client().await?.create_database(name).await
    }

    pub async fn drop_database(&self, name: &str) -> Result<QueryResult> {
        self.client().await?.drop_database(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn assert_no_connection<T: fmt::Debug>(result: Result<T>) {
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NoActiveConnection);
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let navigator = Navigator::default();
        assert!(!navigator.is_connected().await);

        assert_no_connection(navigator.list_schemas().await);
        assert_no_connection(navigator.list_tables().await);
        assert_no_connection(navigator.get_table("users", 1, 50).await);
        assert_no_connection(navigator.get_columns("users").await);
        assert_no_connection(navigator.execute_raw_query("SELECT 1").await);
        assert_no_connection(navigator.export_json("users").await);
        assert_no_connection(navigator.export_csv("users").await);
        assert_no_connection(navigator.export_schema_ddl().await);
        assert_no_connection(navigator.export_csv_to_file("users", Path::new("out")).await);
        assert_no_connection(navigator.table_sizes().await);
        assert_no_connection(navigator.table_size("users").await);
        assert_no_connection(navigator.schema_size().await);
        assert_no_connection(navigator.count_rows("users").await);
        assert_no_connection(navigator.snapshot().await);
        assert_no_connection(navigator.drop_table("users").await);
        assert_no_connection(navigator.disconnect().await);

        let update = CellUpdate {
            table: "users".to_string(),
            column: "name".to_string(),
            new_value: "x".to_string(),
            key_column: "id".to_string(),
            key_value: "1".to_string(),
        };
        assert_no_connection(navigator.update_cell(&update).await);
    }

    #[tokio::test]
    async fn test_failed_connect_reverts_to_disconnected() {
        let navigator = Navigator::default();
        let profile = ConnectionProfile {
            dialect: DialectKind::Unsupported,
            ..Default::default()
        };

        let error = navigator.connect(profile).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::UnsupportedDialect);
        assert!(matches!(navigator.state().await, SessionState::Disconnected));
    }

    #[cfg(feature = "sqlite")]
    async fn sqlite_client(directory: &std::path::Path, name: &str) -> Arc<Client> {
        let path = directory.join(name);
        let options = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        sqlx::SqlitePool::connect_with(options).await.unwrap().close().await;

        let profile = ConnectionProfile {
            dialect: DialectKind::Sqlite,
            file_path: Some(path),
            ..Default::default()
        };
        let (client, _) = Client::open(profile, &PoolSettings::default())
            .await
            .unwrap();
        Arc::new(client)
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_install_closes_displaced_client() {
        let directory = tempfile::tempdir().unwrap();
        let navigator = Navigator::default();

        let first = sqlite_client(directory.path(), "first.db").await;
        let second = sqlite_client(directory.path(), "second.db").await;

        // two connects racing: each installs without having seen the other
        navigator.install(Arc::clone(&first)).await;
        navigator.install(Arc::clone(&second)).await;

        let error = first.close().await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ConnectionFailed);
        assert!(navigator.is_connected().await);
        second.list_tables().await.unwrap();
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_concurrent_connects_leave_one_session() {
        let directory = tempfile::tempdir().unwrap();
        let navigator = Navigator::default();
        let mut profiles = Vec::new();
        for name in ["left.db", "right.db"] {
            let client = sqlite_client(directory.path(), name).await;
            profiles.push(client.profile().clone());
            client.close().await.unwrap();
        }

        let (left, right) = tokio::join!(
            navigator.connect(profiles[0].clone()),
            navigator.connect(profiles[1].clone())
        );
        left.unwrap();
        right.unwrap();

        let client = navigator.client().await.unwrap();
        assert!(["left.db", "right.db"].contains(&client.snapshot().await.name.as_str()));
    }

    #[test]
    fn test_display_name_falls_back_to_file_name() {
        let profile = ConnectionProfile {
            dialect: DialectKind::Sqlite,
            file_path: Some(PathBuf::from("/data/shop.db")),
            ..Default::default()
        };
        assert_eq!(display_name(&profile, ""), "shop.db");
        assert_eq!(display_name(&ConnectionProfile::default(), ""), "main");
        assert_eq!(display_name(&profile, "public"), "public");
    }
}
