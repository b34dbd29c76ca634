//! PostgreSQL transport over the synchronous `postgres` client.

use std::collections::VecDeque;
use std::sync::Arc;

use native_tls::TlsConnector;
use postgres::config::SslMode;
use postgres::error::SqlState;
use postgres::types::{ToSql, Type};
use postgres::{Client, Config, NoTls};
use postgres_native_tls::MakeTlsConnector;
use tracing::{debug, info};

use super::{DbError, Row, Transport, Value};

/// Rows of an executed statement, buffered client-side.
#[derive(Debug, Default)]
pub struct PgCursor {
    rows: VecDeque<Row>,
}

pub struct PgTransport {
    client: Option<Client>,
}

/// Opens a session from a libpq-style connection string or URL.
///
/// TLS is negotiated only for `sslmode=require`; certificates are not
/// verified, matching libpq's behaviour for that mode.
pub fn connect(dsn: &str) -> Result<PgTransport, DbError> {
    let config: Config = dsn
        .parse()
        .map_err(|e: postgres::Error| DbError::InvalidArgument(format!("connection string: {}", e)))?;

    let client = if wants_tls(&config) {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(|e| DbError::Connection(format!("TLS setup: {}", e)))?;
        config.connect(MakeTlsConnector::new(connector))
    } else {
        config.connect(NoTls)
    }
    .map_err(|e| DbError::Connection(format_postgres_error(&e)))?;

    info!(tls = wants_tls(&config), "connected to PostgreSQL");
    Ok(PgTransport {
        client: Some(client),
    })
}

fn wants_tls(config: &Config) -> bool {
    matches!(config.get_ssl_mode(), SslMode::Require)
}

impl PgTransport {
    fn client(&mut self) -> Result<&mut Client, DbError> {
        self.client.as_mut().ok_or(DbError::Closed)
    }

    fn batch(&mut self, sql: &str) -> Result<(), DbError> {
        self.client()?.batch_execute(sql).map_err(|e| classify(&e))
    }
}

impl Transport for PgTransport {
    type Cursor = PgCursor;

    fn begin(&mut self) -> Result<(), DbError> {
        self.batch("BEGIN")
    }

    fn commit(&mut self) -> Result<(), DbError> {
        self.batch("COMMIT")
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        self.batch("ROLLBACK")
    }

    fn cursor(&mut self) -> Result<PgCursor, DbError> {
        self.client()?;
        Ok(PgCursor::default())
    }

    fn execute(
        &mut self,
        cursor: &mut PgCursor,
        sql: &str,
        params: &[Value],
    ) -> Result<(), DbError> {
        let client = self.client()?;
        let statement = client.prepare(sql).map_err(|e| classify(&e))?;

        let expected = statement.params();
        if expected.len() != params.len() {
            return Err(DbError::InvalidArgument(format!(
                "statement expects {} parameters, got {}",
                expected.len(),
                params.len()
            )));
        }
        let bound = params
            .iter()
            .zip(expected)
            .map(|(value, ty)| bind_param(value, ty))
            .collect::<Result<Vec<_>, _>>()?;
        let refs: Vec<&(dyn ToSql + Sync)> = bound.iter().map(|b| &**b).collect();

        let rows = client.query(&statement, &refs).map_err(|e| classify(&e))?;

        let columns: Arc<[String]> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        cursor.rows = rows
            .iter()
            .map(|row| convert_row(row, &columns))
            .collect::<Result<_, _>>()?;
        Ok(())
    }

    fn fetch(&mut self, cursor: &mut PgCursor) -> Result<Option<Row>, DbError> {
        Ok(cursor.rows.pop_front())
    }

    fn close_cursor(&mut self, cursor: PgCursor) -> Result<(), DbError> {
        drop(cursor);
        Ok(())
    }

    fn close(&mut self) -> Result<(), DbError> {
        match self.client.take() {
            Some(client) => {
                debug!("closing PostgreSQL session");
                client.close().map_err(|e| classify(&e))
            }
            None => Ok(()),
        }
    }
}

fn is_text(ty: &Type) -> bool {
    [Type::TEXT, Type::VARCHAR, Type::BPCHAR, Type::NAME, Type::UNKNOWN].contains(ty)
}

/// Converts a driver-neutral value into the Rust type the server expects
/// for that parameter.
fn bind_param(value: &Value, ty: &Type) -> Result<Box<dyn ToSql + Sync>, DbError> {
    let mismatch = || DbError::InvalidArgument(format!("cannot bind {} as {}", value, ty));
    let out_of_range = || DbError::InvalidArgument(format!("{} out of range for {}", value, ty));

    let bound: Box<dyn ToSql + Sync> = match value {
        Value::Null => null_of(ty),
        Value::Bool(b) if *ty == Type::BOOL => Box::new(*b),
        Value::Int(v) if *ty == Type::INT2 => {
            Box::new(i16::try_from(*v).map_err(|_| out_of_range())?)
        }
        Value::Int(v) if *ty == Type::INT4 => {
            Box::new(i32::try_from(*v).map_err(|_| out_of_range())?)
        }
        Value::Int(v) if *ty == Type::INT8 => Box::new(*v),
        Value::Int(v) if *ty == Type::FLOAT8 => Box::new(*v as f64),
        Value::Float(v) if *ty == Type::FLOAT8 => Box::new(*v),
        Value::Float(v) if *ty == Type::FLOAT4 => Box::new(*v as f32),
        Value::Text(s) if is_text(ty) => Box::new(s.clone()),
        Value::Int(_) | Value::Float(_) | Value::Bool(_) if is_text(ty) => {
            Box::new(value.to_string())
        }
        _ => return Err(mismatch()),
    };
    Ok(bound)
}

fn null_of(ty: &Type) -> Box<dyn ToSql + Sync> {
    if *ty == Type::BOOL {
        Box::new(None::<bool>)
    } else if *ty == Type::INT2 {
        Box::new(None::<i16>)
    } else if *ty == Type::INT4 {
        Box::new(None::<i32>)
    } else if *ty == Type::INT8 {
        Box::new(None::<i64>)
    } else if *ty == Type::FLOAT4 {
        Box::new(None::<f32>)
    } else if *ty == Type::FLOAT8 {
        Box::new(None::<f64>)
    } else {
        Box::new(None::<String>)
    }
}

fn convert_row(row: &postgres::Row, columns: &Arc<[String]>) -> Result<Row, DbError> {
    let values = row
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| read_value(row, idx, column.type_()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Row::new(Arc::clone(columns), values))
}

fn read_value(row: &postgres::Row, idx: usize, ty: &Type) -> Result<Value, DbError> {
    let value = if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx).map(Value::from)
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)
            .map(|v| Value::from(v.map(i64::from)))
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx).map(Value::from)
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx).map(Value::from)
    } else if *ty == Type::OID {
        row.try_get::<_, Option<u32>>(idx)
            .map(|v| Value::from(v.map(i64::from)))
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx)
            .map(|v| Value::from(v.map(f64::from)))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx).map(Value::from)
    } else {
        row.try_get::<_, Option<String>>(idx).map(Value::from)
    };
    value.map_err(|e| DbError::Query(format!("column {}: {}", idx, e)))
}

/// Maps a driver error onto the connection/query split the rest of the
/// crate reasons about.
fn classify(e: &postgres::Error) -> DbError {
    let message = format_postgres_error(e);
    if e.is_closed() {
        return DbError::Connection(message);
    }
    match e.code() {
        Some(code) if is_connection_state(code) => DbError::Connection(message),
        Some(_) => DbError::Query(message),
        None => {
            let io = std::error::Error::source(e)
                .is_some_and(|source| source.downcast_ref::<std::io::Error>().is_some());
            if io {
                DbError::Connection(message)
            } else {
                DbError::Query(message)
            }
        }
    }
}

/// Class 08 (connection exception) and class 57P (operator intervention).
fn is_connection_state(code: &SqlState) -> bool {
    let code = code.code();
    code.starts_with("08") || code.starts_with("57P")
}

/// Extracts the server message, detail and hint from a driver error.
fn format_postgres_error(e: &postgres::Error) -> String {
    if let Some(db_err) = e.as_db_error() {
        let mut msg = db_err.message().to_string();
        if let Some(detail) = db_err.detail() {
            msg.push_str(&format!(" DETAIL: {}", detail));
        }
        if let Some(hint) = db_err.hint() {
            msg.push_str(&format!(" HINT: {}", hint));
        }
        msg
    } else {
        e.to_string()
    }
}
