//! Shared fixtures for scan pipeline tests.
//!
//! [`FakeWarehouse`] stands in for the remote engine: it answers schema
//! probes and counts, and serves `COPY INTO` by writing the configured staged
//! files below the directory the target URI maps to.

#![allow(dead_code)]

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use stagescan::{
    ColumnMetadata, ConnectionFactory, ConnectorError, ConnectorOptions, LocalStagedFiles,
    RemoteConnection, ResultSet, Result, StagedRelation,
};
use tempfile::TempDir;

pub const STAGING_ROOT: &str = "s3://test-bucket/stage";

/// Remote behaviour shared by every connection of one warehouse.
#[derive(Clone)]
pub struct WarehouseState {
    pub columns: Vec<ColumnMetadata>,
    /// Staged files written on unload: (file name, content).
    pub files: Vec<(String, String)>,
    /// Value reported in the `rows_unloaded` column.
    pub rows_unloaded: String,
    /// Value returned by count queries.
    pub count: String,
    /// Overrides the unload confirmation.
    pub confirmation: Option<ResultSet>,
    /// Never answers the unload statement.
    pub stall_unload: bool,
}

impl Default for WarehouseState {
    fn default() -> Self {
        Self {
            columns: orders_columns(),
            files: Vec::new(),
            rows_unloaded: "0".to_string(),
            count: "0".to_string(),
            confirmation: None,
            stall_unload: false,
        }
    }
}

pub struct FakeWarehouse {
    pub state: Mutex<WarehouseState>,
    pub statements: Mutex<Vec<String>>,
    pub connects: AtomicUsize,
    pub closes: Arc<AtomicUsize>,
    pub staging: LocalStagedFiles,
}

impl FakeWarehouse {
    pub fn new(state: WarehouseState, staging_dir: &TempDir) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            statements: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
            staging: LocalStagedFiles::new(STAGING_ROOT, staging_dir.path()),
        })
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn unload(&self, sql: &str) -> Result<ResultSet> {
        let state = self.state.lock().unwrap().clone();
        let uri = sql
            .strip_prefix("COPY INTO '")
            .and_then(|rest| rest.split('\'').next())
            .ok_or_else(|| ConnectorError::query("malformed COPY INTO"))?;
        let dir = self.staging.resolve(uri)?;
        std::fs::create_dir_all(&dir)?;

        for (name, content) in &state.files {
            let path = dir.join(name);
            if name.ends_with(".gz") {
                let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(content.as_bytes())?;
                std::fs::write(path, encoder.finish()?)?;
            } else {
                std::fs::write(path, content)?;
            }
        }

        Ok(state
            .confirmation
            .unwrap_or_else(|| confirmation(&state.rows_unloaded)))
    }
}

struct FakeConnection {
    warehouse: Arc<FakeWarehouse>,
}

#[async_trait]
impl RemoteConnection for FakeConnection {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        self.warehouse
            .statements
            .lock()
            .unwrap()
            .push(sql.to_string());
        Ok(())
    }

    async fn execute_query(&mut self, sql: &str) -> Result<ResultSet> {
        self.warehouse
            .statements
            .lock()
            .unwrap()
            .push(sql.to_string());

        if sql.starts_with("COPY INTO") {
            let stall = self.warehouse.state.lock().unwrap().stall_unload;
            if stall {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            return self.warehouse.unload(sql);
        }

        let state = self.warehouse.state.lock().unwrap().clone();
        if sql.starts_with("SELECT count(*)") {
            return Ok(ResultSet::new(
                vec![ColumnMetadata::new("COUNT(*)", "NUMBER").with_precision(18, 0)],
                vec![vec![Some(state.count)]],
            ));
        }
        if sql.ends_with("WHERE 1=0") {
            return Ok(ResultSet::new(state.columns, Vec::new()));
        }
        Err(ConnectorError::query(format!("unexpected statement: {sql}")))
    }

    async fn close(&mut self) -> Result<()> {
        self.warehouse.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory handing out connections to one shared [`FakeWarehouse`].
pub struct FakeFactory(pub Arc<FakeWarehouse>);

#[async_trait]
impl ConnectionFactory for FakeFactory {
    async fn connect(&self) -> Result<Box<dyn RemoteConnection>> {
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection {
            warehouse: Arc::clone(&self.0),
        }))
    }
}

pub fn confirmation(rows_unloaded: &str) -> ResultSet {
    ResultSet::new(
        vec![
            ColumnMetadata::new("rows_unloaded", "NUMBER").with_precision(38, 0),
            ColumnMetadata::new("input_bytes", "NUMBER").with_precision(38, 0),
            ColumnMetadata::new("output_bytes", "NUMBER").with_precision(38, 0),
        ],
        vec![vec![
            Some(rows_unloaded.to_string()),
            Some("100".to_string()),
            Some("40".to_string()),
        ]],
    )
}

/// ID NUMBER(10,0) NOT NULL, NAME VARCHAR, AMOUNT NUMBER(10,2), CREATED DATE
pub fn orders_columns() -> Vec<ColumnMetadata> {
    vec![
        ColumnMetadata::new("ID", "NUMBER")
            .with_precision(10, 0)
            .nullable(false),
        ColumnMetadata::new("NAME", "VARCHAR(100)"),
        ColumnMetadata::new("AMOUNT", "NUMBER")
            .with_precision(10, 2),
        ColumnMetadata::new("CREATED", "DATE"),
    ]
}

pub struct Fixture {
    pub dir: TempDir,
    pub warehouse: Arc<FakeWarehouse>,
    pub relation: StagedRelation,
}

pub fn fixture(state: WarehouseState, options: ConnectorOptions) -> Fixture {
    let dir = TempDir::new().unwrap();
    let warehouse = FakeWarehouse::new(state, &dir);
    let files = Arc::new(LocalStagedFiles::new(STAGING_ROOT, dir.path()));
    let relation = StagedRelation::builder(
        options.with_staging_root(STAGING_ROOT),
        Arc::new(FakeFactory(Arc::clone(&warehouse))),
        files,
    )
    .build()
    .unwrap();

    Fixture {
        dir,
        warehouse,
        relation,
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
