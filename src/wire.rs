use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::auth::CarlotAuthSource;
use crate::engine::{Engine, EngineError, ErrorKind};
use crate::model::*;
use crate::observability::{command_label, QUERIES_TOTAL, QUERY_DURATION_SECONDS};
use crate::sql::{self, Command, SqlError};

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
    auth: CarlotAuthSource,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    let factory = CarlotFactory::new(engine, auth);
    pgwire::tokio::process_socket(socket, tls, factory).await
}

pub struct CarlotHandler {
    engine: Arc<Engine>,
    query_parser: Arc<CarlotQueryParser>,
}

impl CarlotHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            query_parser: Arc::new(CarlotQueryParser),
        }
    }

    /// Parse, execute and record metrics for one statement.
    async fn run(&self, sql_text: &str) -> PgWireResult<Response> {
        let cmd = match sql::parse_sql(sql_text) {
            Ok(cmd) => cmd,
            Err(e) => {
                metrics::counter!(QUERIES_TOTAL, "command" => "parse", "status" => "error")
                    .increment(1);
                return Err(sql_err(e));
            }
        };
        let label = command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(cmd).await;
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        result
    }

    async fn execute_command(&self, cmd: Command) -> PgWireResult<Response> {
        let engine = &self.engine;
        match cmd {
            Command::InsertAgency { id, name } => {
                engine.register_agency(id, name).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::InsertUser { id, name } => {
                engine.register_user(id, name).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::InsertCar {
                id,
                agency_id,
                daily_rate,
                current_mileage,
                plate,
            } => {
                engine
                    .register_car(id, agency_id, daily_rate, current_mileage, plate)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::UpdateCar { id, patch } => {
                engine.update_car(id, patch).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::DeleteCar { id } => {
                engine.remove_car(id).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::InsertRental(req) => {
                engine.create_rental(req).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::UpdateRental { id, patch } => {
                engine.update_rental(id, patch).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::DeleteRental { id } => {
                engine.remove_rental(id).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectRental { id } => {
                let rental = engine.get_rental(id).await.map_err(engine_err)?;
                rental_rows(&[rental])
            }
            Command::SelectRentals { filter } => rental_rows(&engine.list_rentals(&filter).await),
            Command::SelectConflicts { car_id, start, end } => {
                let hits = engine
                    .find_conflicts(car_id, start, end)
                    .await
                    .map_err(engine_err)?;
                rental_rows(&hits)
            }
            Command::SelectCars { id: Some(id) } => {
                let car = engine.get_car(id).await.map_err(engine_err)?;
                car_rows(&[car])
            }
            Command::SelectCars { id: None } => car_rows(&engine.list_cars().await),
            Command::SelectAgencies => agency_rows(&engine.list_agencies()),
        }
    }
}

// ── Result sets ──────────────────────────────────────────────────

fn text_field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

/// Money travels as text so no precision is lost to floats.
fn rental_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("user_id", Type::VARCHAR),
        text_field("car_id", Type::VARCHAR),
        text_field("pickup_agency_id", Type::VARCHAR),
        text_field("return_agency_id", Type::VARCHAR),
        text_field("start_date", Type::INT8),
        text_field("end_date", Type::INT8),
        text_field("real_return_date", Type::INT8),
        text_field("daily_rate_snapshot", Type::VARCHAR),
        text_field("total_value", Type::VARCHAR),
        text_field("start_mileage", Type::INT8),
        text_field("end_mileage", Type::INT8),
        text_field("status", Type::VARCHAR),
        text_field("created_at", Type::INT8),
        text_field("updated_at", Type::INT8),
    ]
}

fn car_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("plate", Type::VARCHAR),
        text_field("agency_id", Type::VARCHAR),
        text_field("daily_rate", Type::VARCHAR),
        text_field("current_mileage", Type::INT8),
        text_field("status", Type::VARCHAR),
    ]
}

fn agency_schema() -> Vec<FieldInfo> {
    vec![text_field("id", Type::VARCHAR), text_field("name", Type::VARCHAR)]
}

/// Result columns for a statement, judged from its target table.
fn result_schema(sql_text: &str) -> Vec<FieldInfo> {
    let upper = sql_text.to_uppercase();
    if !upper.trim_start().starts_with("SELECT") {
        return vec![];
    }
    if upper.contains("RENTALS") || upper.contains("CONFLICTS") {
        rental_schema()
    } else if upper.contains("CARS") {
        car_schema()
    } else if upper.contains("AGENCIES") {
        agency_schema()
    } else {
        vec![]
    }
}

fn mileage(m: u64) -> i64 {
    i64::try_from(m).unwrap_or(i64::MAX)
}

fn rental_rows(rentals: &[Rental]) -> PgWireResult<Response> {
    let schema = Arc::new(rental_schema());
    let rows: Vec<PgWireResult<_>> = rentals
        .iter()
        .map(|r| {
            let mut enc = DataRowEncoder::new(schema.clone());
            enc.encode_field(&r.id.to_string())?;
            enc.encode_field(&r.user_id.to_string())?;
            enc.encode_field(&r.car_id.to_string())?;
            enc.encode_field(&r.pickup_agency_id.to_string())?;
            enc.encode_field(&r.return_agency_id.to_string())?;
            enc.encode_field(&r.span.start)?;
            enc.encode_field(&r.span.end)?;
            enc.encode_field(&r.real_return_date)?;
            enc.encode_field(&r.daily_rate_snapshot.to_string())?;
            enc.encode_field(&r.total_value.to_string())?;
            enc.encode_field(&mileage(r.start_mileage))?;
            enc.encode_field(&r.end_mileage.map(mileage))?;
            enc.encode_field(&r.status.as_str())?;
            enc.encode_field(&r.created_at)?;
            enc.encode_field(&r.updated_at)?;
            Ok(enc.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

fn car_rows(cars: &[Car]) -> PgWireResult<Response> {
    let schema = Arc::new(car_schema());
    let rows: Vec<PgWireResult<_>> = cars
        .iter()
        .map(|c| {
            let mut enc = DataRowEncoder::new(schema.clone());
            enc.encode_field(&c.id.to_string())?;
            enc.encode_field(&c.plate)?;
            enc.encode_field(&c.agency_id.to_string())?;
            enc.encode_field(&c.daily_rate.to_string())?;
            enc.encode_field(&mileage(c.current_mileage))?;
            enc.encode_field(&c.status.as_str())?;
            Ok(enc.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

fn agency_rows(agencies: &[Agency]) -> PgWireResult<Response> {
    let schema = Arc::new(agency_schema());
    let rows: Vec<PgWireResult<_>> = agencies
        .iter()
        .map(|a| {
            let mut enc = DataRowEncoder::new(schema.clone());
            enc.encode_field(&a.id.to_string())?;
            enc.encode_field(&a.name)?;
            Ok(enc.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

#[async_trait]
impl SimpleQueryHandler for CarlotHandler {
    async fn do_query<C>(&self, _client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(vec![self.run(query).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct CarlotQueryParser;

#[async_trait]
impl QueryParser for CarlotQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for CarlotHandler {
    type Statement = String;
    type QueryParser = CarlotQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        _client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        self.run(&substitute_params(portal)).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
        )))
    }
}

/// Highest `$N` placeholder in the statement.
fn count_params(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut max = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        i += 1;
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if let Ok(n) = sql[start..i].parse::<usize>() {
            max = max.max(n);
        }
    }
    max
}

/// Inline bound text parameters as quoted literals. Numeric columns accept
/// quoted values, so every parameter is quoted.
fn substitute_params(portal: &Portal<String>) -> String {
    let mut result = portal.statement.statement.clone();
    // Highest index first so $1 doesn't clobber the prefix of $10.
    for (i, param) in portal.parameters.iter().enumerate().rev() {
        let value = match param {
            Some(bytes) => format!("'{}'", String::from_utf8_lossy(bytes).replace('\'', "''")),
            None => "NULL".to_string(),
        };
        result = result.replace(&format!("${}", i + 1), &value);
    }
    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct CarlotFactory {
    handler: Arc<CarlotHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<CarlotAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl CarlotFactory {
    pub fn new(engine: Arc<Engine>, auth: CarlotAuthSource) -> Self {
        Self {
            handler: Arc::new(CarlotHandler::new(engine)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth,
                DefaultServerParameterProvider::default(),
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for CarlotFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

// ── Errors ───────────────────────────────────────────────────────

/// SQLSTATE for each engine error kind.
pub fn sqlstate(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Validation => "22023",
        ErrorKind::NotFound => "P0002",
        ErrorKind::Conflict => "23P01",
        ErrorKind::IllegalTransition => "55000",
        ErrorKind::Internal => "XX000",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        sqlstate(e.kind()).into(),
        e.to_string(),
    )))
}

fn sql_err(e: SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}
