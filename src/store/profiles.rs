//! Connection profile persistence.

use rusqlite::{params, OptionalExtension, Row};

use super::{
    unix_now, ConnectionProfile, ConnectionStatus, MetadataStore, NewProfile, ProfileId,
    StoreError, StoreResult,
};
use crate::config::{ConnectParams, SslOptions};

const PROFILE_COLUMNS: &str = "id, owner, name, engine, host, port, database, username, secret, \
                               ssl, status, last_sync_at, created_at";

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<(ConnectionProfile, String)> {
    let ssl_json: String = row.get(9)?;
    let profile = ConnectionProfile {
        id: row.get(0)?,
        owner: row.get(1)?,
        name: row.get(2)?,
        params: ConnectParams {
            engine: row.get(3)?,
            host: row.get(4)?,
            port: row.get(5)?,
            database: row.get(6)?,
            username: row.get(7)?,
            secret: row.get(8)?,
            ssl: SslOptions::default(),
        },
        status: row.get(10)?,
        last_sync_at: row.get(11)?,
        created_at: row.get(12)?,
    };
    Ok((profile, ssl_json))
}

fn attach_ssl((mut profile, ssl_json): (ConnectionProfile, String)) -> StoreResult<ConnectionProfile> {
    profile.params.ssl = serde_json::from_str(&ssl_json)?;
    Ok(profile)
}

impl MetadataStore {
    /// Register a new connection profile. Status starts as `disconnected`.
    pub fn create_profile(&self, profile: &NewProfile) -> StoreResult<ProfileId> {
        let ssl = serde_json::to_string(&profile.params.ssl)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO profiles (owner, name, engine, host, port, database, username, secret, ssl, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                profile.owner,
                profile.name,
                profile.params.engine,
                profile.params.host,
                profile.params.port,
                profile.params.database,
                profile.params.username,
                profile.params.secret,
                ssl,
                ConnectionStatus::Disconnected,
                unix_now(),
            ],
        )?;
        Ok(ProfileId(conn.last_insert_rowid()))
    }

    /// Fetch a profile by id.
    pub fn get_profile(&self, id: ProfileId) -> StoreResult<ConnectionProfile> {
        let raw = self
            .conn()?
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?"),
                params![id],
                profile_from_row,
            )
            .optional()?;

        match raw {
            Some(raw) => attach_ssl(raw),
            None => Err(StoreError::not_found("profile", id.0)),
        }
    }

    /// List profiles, optionally restricted to one owner.
    pub fn list_profiles(&self, owner: Option<&str>) -> StoreResult<Vec<ConnectionProfile>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles
             WHERE ?1 IS NULL OR owner = ?1
             ORDER BY id"
        ))?;

        let rows = stmt
            .query_map(params![owner], profile_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(attach_ssl).collect()
    }

    /// Delete a profile and, by cascade, all metadata derived from it.
    ///
    /// Returns true if a profile was deleted.
    pub fn delete_profile(&self, id: ProfileId) -> StoreResult<bool> {
        let rows = self
            .conn()?
            .execute("DELETE FROM profiles WHERE id = ?", params![id])?;
        Ok(rows > 0)
    }

    /// Record the outcome of a connection attempt.
    pub fn set_status(&self, id: ProfileId, status: ConnectionStatus) -> StoreResult<()> {
        let rows = self.conn()?.execute(
            "UPDATE profiles SET status = ? WHERE id = ?",
            params![status, id],
        )?;
        if rows == 0 {
            return Err(StoreError::not_found("profile", id.0));
        }
        Ok(())
    }

    /// Stamp the last successful sync time, returning the timestamp.
    pub fn stamp_last_sync(&self, id: ProfileId) -> StoreResult<i64> {
        let now = unix_now();
        let rows = self.conn()?.execute(
            "UPDATE profiles SET last_sync_at = ? WHERE id = ?",
            params![now, id],
        )?;
        if rows == 0 {
            return Err(StoreError::not_found("profile", id.0));
        }
        Ok(now)
    }
}
