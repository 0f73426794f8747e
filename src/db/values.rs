/*
 * Created on Mon Jan 22 2024
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

//! # Value conversion rules
//!
//! Time is seconds since the Unix epoch everywhere above the driver layer.
//! PostgreSQL stores timestamps as microseconds since 2000-01-01, so the
//! wrappers here add the epoch delta and divide by 1e6, saturating at the
//! 32-bit bounds. Intervals are seconds; the textual interval grammar
//! (`N unit [ago]` plus `HH:MM:SS[.ffffff]`) saturates out-of-range
//! values. IPv4 addresses are host-order `u32` above the driver and INET
//! on the networked backend.

use {
    bytes::{BufMut, BytesMut},
    postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type},
    std::error::Error as StdError,
};

/// Seconds between 1970-01-01 and 2000-01-01 (the PostgreSQL epoch)
pub const PG_EPOCH_DELTA: i64 = 946_684_800;

const SECS_MINUTE: i64 = 60;
const SECS_HOUR: i64 = 3600;
const SECS_DAY: i64 = 86_400;
const SECS_WEEK: i64 = 7 * SECS_DAY;
const SECS_MONTH: i64 = 30 * SECS_DAY;
const SECS_YEAR: i64 = 365 * SECS_DAY;

type BoxedError = Box<dyn StdError + Sync + Send>;

/// Clamp to the 32-bit range the wire protocol can carry
pub fn saturate_u32(v: i64) -> i64 {
    v.clamp(0, u32::MAX as i64)
}

/// Seconds since the Unix epoch, saturated to 32-bit bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnixTime(pub i64);

impl<'a> FromSql<'a> for UnixTime {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, BoxedError> {
        if raw.len() != 8 {
            return Err("timestamp with unexpected length".into());
        }
        let micros = i64::from_be_bytes(raw.try_into()?);
        let secs = micros.div_euclid(1_000_000).saturating_add(PG_EPOCH_DELTA);
        Ok(UnixTime(saturate_u32(secs)))
    }
    fn accepts(ty: &Type) -> bool {
        *ty == Type::TIMESTAMP || *ty == Type::TIMESTAMPTZ
    }
}

impl ToSql for UnixTime {
    fn to_sql(&self, _: &Type, out: &mut BytesMut) -> Result<IsNull, BoxedError> {
        let micros = self.0.saturating_sub(PG_EPOCH_DELTA).saturating_mul(1_000_000);
        out.put_i64(micros);
        Ok(IsNull::No)
    }
    fn accepts(ty: &Type) -> bool {
        *ty == Type::TIMESTAMP || *ty == Type::TIMESTAMPTZ
    }
    to_sql_checked!();
}

/// An interval as whole seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalSecs(pub i64);

impl<'a> FromSql<'a> for IntervalSecs {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, BoxedError> {
        // micros (8) + days (4) + months (4)
        if raw.len() != 16 {
            return Err("interval with unexpected length".into());
        }
        let micros = i64::from_be_bytes(raw[0..8].try_into()?);
        let days = i32::from_be_bytes(raw[8..12].try_into()?) as i64;
        let months = i32::from_be_bytes(raw[12..16].try_into()?) as i64;
        let secs = micros
            .div_euclid(1_000_000)
            .saturating_add(days.saturating_mul(SECS_DAY))
            .saturating_add(months.saturating_mul(SECS_MONTH));
        Ok(IntervalSecs(secs))
    }
    fn accepts(ty: &Type) -> bool {
        *ty == Type::INTERVAL
    }
}

/// An IPv4 address as a host-order `u32`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inet4(pub u32);

const AF_INET: u8 = 2;

impl<'a> FromSql<'a> for Inet4 {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, BoxedError> {
        // family, netmask bits, is_cidr, address length, address
        if raw.len() < 8 || raw[0] != AF_INET || raw[3] != 4 {
            return Err("inet value is not a plain IPv4 address".into());
        }
        Ok(Inet4(u32::from_be_bytes(raw[4..8].try_into()?)))
    }
    fn accepts(ty: &Type) -> bool {
        *ty == Type::INET || *ty == Type::CIDR
    }
}

impl ToSql for Inet4 {
    fn to_sql(&self, _: &Type, out: &mut BytesMut) -> Result<IsNull, BoxedError> {
        out.put_u8(AF_INET);
        out.put_u8(32);
        out.put_u8(0);
        out.put_u8(4);
        out.put_u32(self.0);
        Ok(IsNull::No)
    }
    fn accepts(ty: &Type) -> bool {
        *ty == Type::INET || *ty == Type::CIDR
    }
    to_sql_checked!();
}

fn unit_seconds(unit: &str) -> Option<i64> {
    let unit = unit.to_ascii_lowercase();
    let singular = match unit.as_str() {
        "centuries" => "century",
        "millennia" => "millennium",
        u => u.trim_end_matches('s'),
    };
    Some(match singular {
        "second" | "sec" => 1,
        "minute" | "min" => SECS_MINUTE,
        "hour" => SECS_HOUR,
        "day" => SECS_DAY,
        "week" => SECS_WEEK,
        "month" | "mon" => SECS_MONTH,
        "year" => SECS_YEAR,
        "decade" => 10 * SECS_YEAR,
        "century" => 100 * SECS_YEAR,
        "millennium" => 1000 * SECS_YEAR,
        _ => return None,
    })
}

fn parse_clock(tok: &str) -> Option<i64> {
    let (neg, tok) = match tok.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, tok),
    };
    // fractional seconds are truncated
    let tok = tok.split('.').next()?;
    let mut parts = tok.split(':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds: i64 = match parts.next() {
        Some(s) => s.parse().ok()?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }
    let total = hours
        .saturating_mul(SECS_HOUR)
        .saturating_add(minutes.saturating_mul(SECS_MINUTE))
        .saturating_add(seconds);
    Some(if neg { -total } else { total })
}

/// Parse a textual interval of `N unit` tokens (seconds through
/// millennium), an optional `HH:MM:SS[.ffffff]` clock part and an optional
/// trailing `ago` that negates the whole value. Returns `None` for text
/// that is not an interval; out-of-range values saturate.
pub fn parse_interval(text: &str) -> Option<i64> {
    let mut total: i64 = 0;
    let mut pending: Option<i64> = None;
    let mut seen = false;
    for tok in text.split_whitespace() {
        if tok.eq_ignore_ascii_case("ago") {
            return if seen && pending.is_none() {
                Some(total.saturating_neg())
            } else {
                None
            };
        }
        if tok.contains(':') {
            if pending.is_some() {
                return None;
            }
            total = total.saturating_add(parse_clock(tok)?);
            seen = true;
            continue;
        }
        match pending.take() {
            None => pending = Some(tok.parse().ok()?),
            Some(n) => {
                let mult = unit_seconds(tok)?;
                total = total.saturating_add(n.saturating_mul(mult));
                seen = true;
            }
        }
    }
    if pending.is_some() || !seen {
        return None;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_simple_units() {
        assert_eq!(parse_interval("42 seconds"), Some(42));
        assert_eq!(parse_interval("2 minutes"), Some(120));
        assert_eq!(parse_interval("1 hour"), Some(3600));
        assert_eq!(parse_interval("7 days"), Some(7 * 86_400));
        assert_eq!(parse_interval("2 weeks"), Some(14 * 86_400));
        assert_eq!(parse_interval("1 month"), Some(30 * 86_400));
        assert_eq!(parse_interval("1 year"), Some(365 * 86_400));
        assert_eq!(parse_interval("1 decade"), Some(3650 * 86_400));
        assert_eq!(parse_interval("1 century"), Some(36_500 * 86_400));
        assert_eq!(parse_interval("1 millennium"), Some(365_000 * 86_400));
    }

    #[test]
    fn interval_compound_and_clock() {
        assert_eq!(
            parse_interval("1 year 2 mons 3 days 04:05:06"),
            Some(365 * 86_400 + 2 * 30 * 86_400 + 3 * 86_400 + 4 * 3600 + 5 * 60 + 6)
        );
        assert_eq!(parse_interval("04:05:06.789123"), Some(4 * 3600 + 5 * 60 + 6));
        assert_eq!(parse_interval("-00:01:30"), Some(-90));
    }

    #[test]
    fn interval_ago_negates() {
        assert_eq!(parse_interval("3 days ago"), Some(-3 * 86_400));
        assert_eq!(parse_interval("1 hour 30 minutes ago"), Some(-5400));
    }

    #[test]
    fn interval_rejects_garbage() {
        assert_eq!(parse_interval(""), None);
        assert_eq!(parse_interval("soon"), None);
        assert_eq!(parse_interval("3"), None);
        assert_eq!(parse_interval("3 parsecs"), None);
        assert_eq!(parse_interval("ago"), None);
    }

    #[test]
    fn interval_saturates() {
        let v = parse_interval(&format!("{} millennia", i64::MAX)).unwrap();
        assert_eq!(v, i64::MAX);
        let v = parse_interval(&format!("{} millennia ago", i64::MAX)).unwrap();
        assert_eq!(v, -i64::MAX);
    }

    #[test]
    fn pg_timestamp_epoch_delta() {
        // 2000-01-01T00:00:10 in pg microseconds
        let raw = 10_000_000i64.to_be_bytes();
        let t = UnixTime::from_sql(&Type::TIMESTAMP, &raw).unwrap();
        assert_eq!(t, UnixTime(PG_EPOCH_DELTA + 10));
    }

    #[test]
    fn pg_timestamp_saturates_to_u32_bounds() {
        let raw = i64::MAX.to_be_bytes();
        let t = UnixTime::from_sql(&Type::TIMESTAMP, &raw).unwrap();
        assert_eq!(t, UnixTime(u32::MAX as i64));
        let raw = i64::MIN.to_be_bytes();
        let t = UnixTime::from_sql(&Type::TIMESTAMP, &raw).unwrap();
        assert_eq!(t, UnixTime(0));
    }

    #[test]
    fn pg_interval_binary_layout() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&2_000_000i64.to_be_bytes()); // 2s
        raw.extend_from_slice(&3i32.to_be_bytes()); // 3 days
        raw.extend_from_slice(&1i32.to_be_bytes()); // 1 month
        let iv = IntervalSecs::from_sql(&Type::INTERVAL, &raw).unwrap();
        assert_eq!(iv, IntervalSecs(2 + 3 * 86_400 + 30 * 86_400));
    }

    #[test]
    fn inet_roundtrip() {
        let ip = Inet4(u32::from(std::net::Ipv4Addr::new(10, 1, 2, 3)));
        let mut out = BytesMut::new();
        ip.to_sql(&Type::INET, &mut out).unwrap();
        let back = Inet4::from_sql(&Type::INET, &out).unwrap();
        assert_eq!(back, ip);
    }
}
