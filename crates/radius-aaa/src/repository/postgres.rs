//! PostgreSQL repository
//!
//! Tables:
//! - `radius_nas`: access devices and their shared secrets
//! - `radius_user`: subscribers
//! - `radius_online`: one row per active session
//! - `radius_accounting`: durable session history

use super::{RepositoryError, SessionRepository};
use crate::models::{
    AcctStop, Nas, RadiusAccounting, RadiusOnline, RadiusUser, UserField, UserStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use radius_proto::AcctCounters;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info};

pub struct PostgresRepository {
    pool: PgPool,
}

fn status_from(value: &str) -> UserStatus {
    if value.eq_ignore_ascii_case("disabled") {
        UserStatus::Disabled
    } else {
        UserStatus::Enabled
    }
}

fn as_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

fn as_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn nas_from_row(row: &PgRow) -> Result<Nas, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(Nas {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        ipaddr: row.try_get("ipaddr")?,
        identifier: row.try_get("identifier")?,
        secret: row.try_get("secret")?,
        vendor_code: as_u32(row.try_get::<i32, _>("vendor_code")?.into()),
        status: status_from(&status),
        coa_port: u16::try_from(row.try_get::<i32, _>("coa_port")?).unwrap_or(3799),
    })
}

fn user_from_row(row: &PgRow) -> Result<RadiusUser, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(RadiusUser {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password: row.try_get("password")?,
        status: status_from(&status),
        expire_time: row.try_get("expire_time")?,
        active_num: as_u32(row.try_get::<i32, _>("active_num")?.into()),
        bind_mac: row.try_get("bind_mac")?,
        bind_vlan: row.try_get("bind_vlan")?,
        mac_addr: row.try_get("mac_addr")?,
        vlanid1: as_u32(row.try_get::<i32, _>("vlanid1")?.into()),
        vlanid2: as_u32(row.try_get::<i32, _>("vlanid2")?.into()),
        ip_addr: row.try_get("ip_addr")?,
        addr_pool: row.try_get("addr_pool")?,
        up_rate: as_u32(row.try_get::<i32, _>("up_rate")?.into()),
        down_rate: as_u32(row.try_get::<i32, _>("down_rate")?.into()),
        otp_secret: row.try_get("otp_secret")?,
        last_online: row.try_get("last_online")?,
    })
}

fn online_from_row(row: &PgRow) -> Result<RadiusOnline, sqlx::Error> {
    Ok(RadiusOnline {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        nas_id: row.try_get("nas_id")?,
        nas_addr: row.try_get("nas_addr")?,
        nas_paddr: row.try_get("nas_paddr")?,
        session_timeout: as_u32(row.try_get("session_timeout")?),
        framed_ipaddr: row.try_get("framed_ipaddr")?,
        framed_netmask: row.try_get("framed_netmask")?,
        mac_addr: row.try_get("mac_addr")?,
        nas_port: as_u32(row.try_get("nas_port")?),
        nas_port_id: row.try_get("nas_port_id")?,
        acct_session_id: row.try_get("acct_session_id")?,
        acct_session_time: as_u32(row.try_get("acct_session_time")?),
        acct_input_total: u64::try_from(row.try_get::<i64, _>("acct_input_total")?).unwrap_or(0),
        acct_output_total: u64::try_from(row.try_get::<i64, _>("acct_output_total")?).unwrap_or(0),
        acct_input_packets: as_u32(row.try_get("acct_input_packets")?),
        acct_output_packets: as_u32(row.try_get("acct_output_packets")?),
        acct_start_time: row.try_get("acct_start_time")?,
        last_update: row.try_get("last_update")?,
    })
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        PostgresRepository { pool }
    }

    /// Connect a pool to `database_url`
    pub async fn from_url(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;
        info!(max_connections, "PostgreSQL connection pool created");
        Ok(Self::new(pool))
    }

    /// Create the tables if they don't exist
    pub async fn migrate(&self) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS radius_nas (
                id BIGSERIAL PRIMARY KEY,
                name VARCHAR(128) NOT NULL DEFAULT '',
                ipaddr VARCHAR(64) NOT NULL,
                identifier VARCHAR(128) NOT NULL DEFAULT '',
                secret VARCHAR(128) NOT NULL,
                vendor_code INTEGER NOT NULL DEFAULT 0,
                status VARCHAR(16) NOT NULL DEFAULT 'enabled',
                coa_port INTEGER NOT NULL DEFAULT 3799
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS radius_user (
                id BIGSERIAL PRIMARY KEY,
                username VARCHAR(255) NOT NULL UNIQUE,
                password VARCHAR(255) NOT NULL DEFAULT '',
                status VARCHAR(16) NOT NULL DEFAULT 'enabled',
                expire_time TIMESTAMPTZ,
                active_num INTEGER NOT NULL DEFAULT 0,
                bind_mac BOOLEAN NOT NULL DEFAULT false,
                bind_vlan BOOLEAN NOT NULL DEFAULT false,
                mac_addr VARCHAR(32) NOT NULL DEFAULT '',
                vlanid1 INTEGER NOT NULL DEFAULT 0,
                vlanid2 INTEGER NOT NULL DEFAULT 0,
                ip_addr VARCHAR(64) NOT NULL DEFAULT '',
                addr_pool VARCHAR(64) NOT NULL DEFAULT '',
                up_rate INTEGER NOT NULL DEFAULT 0,
                down_rate INTEGER NOT NULL DEFAULT 0,
                otp_secret VARCHAR(128) NOT NULL DEFAULT '',
                last_online TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS radius_online (
                id BIGSERIAL PRIMARY KEY,
                username VARCHAR(255) NOT NULL,
                nas_id VARCHAR(128) NOT NULL DEFAULT '',
                nas_addr VARCHAR(64) NOT NULL,
                nas_paddr VARCHAR(64) NOT NULL DEFAULT '',
                session_timeout BIGINT NOT NULL DEFAULT 0,
                framed_ipaddr VARCHAR(64) NOT NULL DEFAULT '',
                framed_netmask VARCHAR(64) NOT NULL DEFAULT '',
                mac_addr VARCHAR(32) NOT NULL DEFAULT '',
                nas_port BIGINT NOT NULL DEFAULT 0,
                nas_port_id VARCHAR(255) NOT NULL DEFAULT '',
                acct_session_id VARCHAR(255) NOT NULL UNIQUE,
                acct_session_time BIGINT NOT NULL DEFAULT 0,
                acct_input_total BIGINT NOT NULL DEFAULT 0,
                acct_output_total BIGINT NOT NULL DEFAULT 0,
                acct_input_packets BIGINT NOT NULL DEFAULT 0,
                acct_output_packets BIGINT NOT NULL DEFAULT 0,
                acct_start_time TIMESTAMPTZ NOT NULL,
                last_update TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS radius_accounting (
                id BIGSERIAL PRIMARY KEY,
                username VARCHAR(255) NOT NULL,
                acct_session_id VARCHAR(255) NOT NULL UNIQUE,
                nas_id VARCHAR(128) NOT NULL DEFAULT '',
                nas_addr VARCHAR(64) NOT NULL,
                nas_paddr VARCHAR(64) NOT NULL DEFAULT '',
                session_timeout BIGINT NOT NULL DEFAULT 0,
                framed_ipaddr VARCHAR(64) NOT NULL DEFAULT '',
                framed_netmask VARCHAR(64) NOT NULL DEFAULT '',
                mac_addr VARCHAR(32) NOT NULL DEFAULT '',
                nas_port BIGINT NOT NULL DEFAULT 0,
                nas_port_id VARCHAR(255) NOT NULL DEFAULT '',
                acct_session_time BIGINT NOT NULL DEFAULT 0,
                acct_input_total BIGINT NOT NULL DEFAULT 0,
                acct_output_total BIGINT NOT NULL DEFAULT 0,
                acct_input_packets BIGINT NOT NULL DEFAULT 0,
                acct_output_packets BIGINT NOT NULL DEFAULT 0,
                acct_start_time TIMESTAMPTZ,
                acct_stop_time TIMESTAMPTZ,
                acct_terminate_cause BIGINT NOT NULL DEFAULT 0,
                last_update TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_online_username ON radius_online(username);
            CREATE INDEX IF NOT EXISTS idx_online_nas_addr ON radius_online(nas_addr);
            CREATE INDEX IF NOT EXISTS idx_accounting_nas_addr ON radius_accounting(nas_addr);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl SessionRepository for PostgresRepository {
    async fn find_nas(
        &self,
        ip: IpAddr,
        identifier: &str,
    ) -> Result<Option<Nas>, RepositoryError> {
        // ipaddr holds a plain address or a CIDR range
        let row = sqlx::query(
            r#"
            SELECT * FROM radius_nas
            WHERE $1::inet <<= ipaddr::inet
               OR ($2 <> '' AND identifier = $2)
            ORDER BY ($1::inet <<= ipaddr::inet) DESC
            LIMIT 1
            "#,
        )
        .bind(ip.to_string())
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(nas_from_row).transpose()?)
    }

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<RadiusUser>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM radius_user WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn find_user_by_mac(&self, mac: &str) -> Result<Option<RadiusUser>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM radius_user WHERE lower(mac_addr) = lower($1) LIMIT 1")
            .bind(mac)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn update_user_field(
        &self,
        username: &str,
        field: UserField,
        value: &str,
    ) -> Result<(), RepositoryError> {
        let invalid = || RepositoryError::InvalidValue {
            field,
            value: value.to_string(),
        };

        let query = match field {
            UserField::MacAddr => {
                sqlx::query("UPDATE radius_user SET mac_addr = $1 WHERE username = $2").bind(value)
            }
            UserField::Vlanid1 | UserField::Vlanid2 => {
                let vlan: i32 = value.parse().map_err(|_| invalid())?;
                let sql = if field == UserField::Vlanid1 {
                    "UPDATE radius_user SET vlanid1 = $1 WHERE username = $2"
                } else {
                    "UPDATE radius_user SET vlanid2 = $1 WHERE username = $2"
                };
                sqlx::query(sql).bind(vlan)
            }
            UserField::LastOnline => {
                let at = DateTime::parse_from_rfc3339(value)
                    .map_err(|_| invalid())?
                    .with_timezone(&Utc);
                sqlx::query("UPDATE radius_user SET last_online = $1 WHERE username = $2").bind(at)
            }
        };

        query.bind(username).execute(&self.pool).await?;
        debug!(username, %field, "Updated user field");
        Ok(())
    }

    async fn count_active_sessions(&self, username: &str) -> Result<u32, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM radius_online WHERE username = $1")
            .bind(username)
            .fetch_one(&self.pool)
            .await?;
        Ok(as_u32(row.try_get("count")?))
    }

    async fn insert_online_session(&self, session: RadiusOnline) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO radius_online (
                username, nas_id, nas_addr, nas_paddr, session_timeout,
                framed_ipaddr, framed_netmask, mac_addr, nas_port, nas_port_id,
                acct_session_id, acct_session_time, acct_input_total, acct_output_total,
                acct_input_packets, acct_output_packets, acct_start_time, last_update
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (acct_session_id) DO NOTHING
            "#,
        )
        .bind(&session.username)
        .bind(&session.nas_id)
        .bind(&session.nas_addr)
        .bind(&session.nas_paddr)
        .bind(i64::from(session.session_timeout))
        .bind(&session.framed_ipaddr)
        .bind(&session.framed_netmask)
        .bind(&session.mac_addr)
        .bind(i64::from(session.nas_port))
        .bind(&session.nas_port_id)
        .bind(&session.acct_session_id)
        .bind(i64::from(session.acct_session_time))
        .bind(as_i64(session.acct_input_total))
        .bind(as_i64(session.acct_output_total))
        .bind(i64::from(session.acct_input_packets))
        .bind(i64::from(session.acct_output_packets))
        .bind(session.acct_start_time)
        .bind(session.last_update)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::DuplicateSession(session.acct_session_id));
        }
        Ok(())
    }

    async fn update_online_session(
        &self,
        session_id: &str,
        counters: &AcctCounters,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE radius_online
            SET acct_session_time = $1, acct_input_total = $2, acct_output_total = $3,
                acct_input_packets = $4, acct_output_packets = $5, last_update = $6
            WHERE acct_session_id = $7
            "#,
        )
        .bind(i64::from(counters.session_time))
        .bind(as_i64(counters.input_octets))
        .bind(as_i64(counters.output_octets))
        .bind(i64::from(counters.input_packets))
        .bind(i64::from(counters.output_packets))
        .bind(updated_at)
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_online_session(&self, session_id: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM radius_online WHERE acct_session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn exists_online_session(&self, session_id: &str) -> Result<bool, RepositoryError> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM radius_online WHERE acct_session_id = $1) AS found",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("found")?)
    }

    async fn find_online_session(
        &self,
        session_id: &str,
    ) -> Result<Option<RadiusOnline>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM radius_online WHERE acct_session_id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(online_from_row).transpose()?)
    }

    async fn insert_accounting_record(
        &self,
        record: RadiusAccounting,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO radius_accounting (
                username, acct_session_id, nas_id, nas_addr, nas_paddr, session_timeout,
                framed_ipaddr, framed_netmask, mac_addr, nas_port, nas_port_id,
                acct_session_time, acct_input_total, acct_output_total,
                acct_input_packets, acct_output_packets, acct_start_time, acct_stop_time,
                acct_terminate_cause, last_update
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19, $20
            )
            ON CONFLICT (acct_session_id) DO NOTHING
            "#,
        )
        .bind(&record.username)
        .bind(&record.acct_session_id)
        .bind(&record.nas_id)
        .bind(&record.nas_addr)
        .bind(&record.nas_paddr)
        .bind(i64::from(record.session_timeout))
        .bind(&record.framed_ipaddr)
        .bind(&record.framed_netmask)
        .bind(&record.mac_addr)
        .bind(i64::from(record.nas_port))
        .bind(&record.nas_port_id)
        .bind(i64::from(record.acct_session_time))
        .bind(as_i64(record.acct_input_total))
        .bind(as_i64(record.acct_output_total))
        .bind(i64::from(record.acct_input_packets))
        .bind(i64::from(record.acct_output_packets))
        .bind(record.acct_start_time)
        .bind(record.acct_stop_time)
        .bind(i64::from(record.acct_terminate_cause))
        .bind(record.last_update)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_accounting_record(
        &self,
        session_id: &str,
        counters: &AcctCounters,
        stop: Option<AcctStop>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE radius_accounting
            SET acct_session_time = $1, acct_input_total = $2, acct_output_total = $3,
                acct_input_packets = $4, acct_output_packets = $5,
                acct_stop_time = COALESCE($6, acct_stop_time),
                acct_terminate_cause = COALESCE($7, acct_terminate_cause),
                last_update = NOW()
            WHERE acct_session_id = $8
            "#,
        )
        .bind(i64::from(counters.session_time))
        .bind(as_i64(counters.input_octets))
        .bind(as_i64(counters.output_octets))
        .bind(i64::from(counters.input_packets))
        .bind(i64::from(counters.output_packets))
        .bind(stop.map(|s| s.at))
        .bind(stop.map(|s| i64::from(s.terminate_cause)))
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_online_sessions_for_nas(&self, nas_addr: &str) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM radius_online WHERE nas_addr = $1")
            .bind(nas_addr)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn close_accounting_records_for_nas(
        &self,
        nas_addr: &str,
        stop_time: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE radius_accounting SET acct_stop_time = $1 WHERE nas_addr = $2 AND acct_stop_time IS NULL",
        )
        .bind(stop_time)
        .bind(nas_addr)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
