/*
 * Created on Wed Jan 24 2024
 *
 * This file is a part of qmd
 * qmd is the query manager that fronts the game world, login and web
 * services with a typed query protocol over a shared SQL store.
 *
 * Copyright (c) 2024, The qmd developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! The networked backend. The session owns one PostgreSQL client and the
//! LRU of prepared statements bound to it. `checkpoint` notices a dead
//! connection, throws the cache away (its statements died with the
//! session) and reconnects. SQL arrives here with `?` placeholders and is
//! rewritten to the `$n` form the server expects at prepare time, so the
//! handler-facing SQL stays identical across backends.

use {
    super::{
        stmtcache::StatementCache,
        values::{Inet4, IntervalSecs, UnixTime},
        DbError, DbResult, Row, Value,
    },
    crate::config::PgParams,
    bytes::BytesMut,
    postgres::{
        types::{to_sql_checked, IsNull, ToSql, Type},
        Client, NoTls,
    },
    postgres_native_tls::MakeTlsConnector,
    std::error::Error as StdError,
};

pub struct PgSession {
    client: Client,
    params: PgParams,
    cache: StatementCache<postgres::Statement>,
}

fn build_client(params: &PgParams) -> DbResult<Client> {
    let mut config = postgres::Config::new();
    config
        .host(&params.host)
        .port(params.port)
        .user(&params.user)
        .password(&params.password)
        .dbname(&params.dbname)
        .application_name("qmd");
    if params.tls {
        let connector = native_tls::TlsConnector::new()?;
        Ok(config.connect(MakeTlsConnector::new(connector))?)
    } else {
        Ok(config.connect(NoTls)?)
    }
}

impl PgSession {
    pub fn connect(params: PgParams, max_cached_statements: usize) -> DbResult<Self> {
        let client = build_client(&params)?;
        Ok(Self {
            client,
            params,
            cache: StatementCache::new(max_cached_statements),
        })
    }
    pub fn checkpoint(&mut self) -> DbResult<()> {
        if self.client.is_closed() {
            log::warn!("database session lost, reconnecting to {}", self.params.host);
            // the server-side statements died with the old session
            self.cache.clear();
            self.client = build_client(&self.params)?;
        }
        Ok(())
    }
    fn prepare(&mut self, sql: &str) -> DbResult<postgres::Statement> {
        if let Some(stmt) = self.cache.lookup(sql) {
            return Ok(stmt.clone());
        }
        let stmt = self.client.prepare(&rewrite_placeholders(sql))?;
        // dropping the evicted handle closes the server-side statement
        drop(self.cache.insert(sql, stmt.clone()));
        Ok(stmt)
    }
    pub fn query(&mut self, sql: &str, params: &[Value]) -> DbResult<Vec<Row>> {
        let stmt = self.prepare(sql)?;
        let args: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let rows = self.client.query(&stmt, &args)?;
        rows.iter().map(read_row).collect()
    }
    pub fn execute(&mut self, sql: &str, params: &[Value]) -> DbResult<u64> {
        let stmt = self.prepare(sql)?;
        let args: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        Ok(self.client.execute(&stmt, &args)?)
    }
    pub fn batch(&mut self, sql: &str) -> DbResult<()> {
        self.client.batch_execute(sql)?;
        Ok(())
    }
    pub fn teardown(&mut self) {
        self.cache.clear();
        if !self.client.is_closed() {
            let _ = self.client.batch_execute("DEALLOCATE ALL");
        }
    }
}

/// Rewrite `?` placeholders to the `$n` form, skipping quoted literals
pub(super) fn rewrite_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut n = 0u32;
    let mut in_string = false;
    for ch in sql.chars() {
        match ch {
            '\'' => {
                in_string = !in_string;
                out.push(ch);
            }
            '?' if !in_string => {
                n += 1;
                out.push('$');
                out.push_str(&n.to_string());
            }
            _ => out.push(ch),
        }
    }
    out
}

fn read_row(row: &postgres::Row) -> DbResult<Row> {
    let mut values = Vec::with_capacity(row.len());
    for idx in 0..row.len() {
        values.push(read_value(row, idx)?);
    }
    Ok(Row(values))
}

fn read_value(row: &postgres::Row, idx: usize) -> DbResult<Value> {
    let ty = row.columns()[idx].type_().clone();
    let value = if ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx)?
            .map_or(Value::Null, Value::Bool)
    } else if ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)?
            .map_or(Value::Null, |v| Value::Int(v as i64))
    } else if ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)?
            .map_or(Value::Null, |v| Value::Int(v as i64))
    } else if ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx)?
            .map_or(Value::Null, Value::Int)
    } else if ty == Type::TEXT || ty == Type::VARCHAR || ty == Type::BPCHAR || ty == Type::NAME {
        row.try_get::<_, Option<String>>(idx)?
            .map_or(Value::Null, Value::Text)
    } else if ty == Type::BYTEA {
        row.try_get::<_, Option<Vec<u8>>>(idx)?
            .map_or(Value::Null, Value::Blob)
    } else if ty == Type::TIMESTAMP || ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<UnixTime>>(idx)?
            .map_or(Value::Null, |t| Value::Int(t.0))
    } else if ty == Type::INTERVAL {
        row.try_get::<_, Option<IntervalSecs>>(idx)?
            .map_or(Value::Null, |iv| Value::Int(iv.0))
    } else if ty == Type::INET || ty == Type::CIDR {
        row.try_get::<_, Option<Inet4>>(idx)?
            .map_or(Value::Null, |ip| Value::Int(ip.0 as i64))
    } else {
        return Err(DbError::BadValue("unsupported column type"));
    };
    Ok(value)
}

type BoxedError = Box<dyn StdError + Sync + Send>;

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxedError> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            // the bound column's type decides the wire encoding
            Value::Int(v) => {
                if *ty == Type::INT2 {
                    (*v as i16).to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    (*v as i32).to_sql(ty, out)
                } else if *ty == Type::INT8 {
                    v.to_sql(ty, out)
                } else if *ty == Type::BOOL {
                    (*v != 0).to_sql(ty, out)
                } else if *ty == Type::TIMESTAMP || *ty == Type::TIMESTAMPTZ {
                    UnixTime(*v).to_sql(ty, out)
                } else if *ty == Type::INET || *ty == Type::CIDR {
                    Inet4(*v as u32).to_sql(ty, out)
                } else {
                    Err("integer bound to an unsupported column type".into())
                }
            }
            Value::Text(s) => s.as_str().to_sql(ty, out),
            Value::Blob(b) => b.as_slice().to_sql(ty, out),
            Value::Bool(b) => {
                if *ty == Type::BOOL {
                    b.to_sql(ty, out)
                } else if *ty == Type::INT2 {
                    (*b as i16).to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    (*b as i32).to_sql(ty, out)
                } else if *ty == Type::INT8 {
                    (*b as i64).to_sql(ty, out)
                } else {
                    Err("boolean bound to an unsupported column type".into())
                }
            }
        }
    }
    fn accepts(_: &Type) -> bool {
        // acceptance is value-directed; mismatches surface in to_sql
        true
    }
    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::rewrite_placeholders;

    #[test]
    fn placeholders_are_numbered() {
        assert_eq!(
            rewrite_placeholders("SELECT a FROM t WHERE b = ? AND c = ?"),
            "SELECT a FROM t WHERE b = $1 AND c = $2"
        );
    }

    #[test]
    fn quoted_question_marks_survive() {
        assert_eq!(
            rewrite_placeholders("SELECT '?' FROM t WHERE a = ?"),
            "SELECT '?' FROM t WHERE a = $1"
        );
    }

    #[test]
    fn no_placeholders_is_identity() {
        assert_eq!(rewrite_placeholders("COMMIT"), "COMMIT");
    }
}
