//! Per-profile diagram snapshots, stored as JSON and overwritten wholesale.

use rusqlite::{params, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};

use super::{unix_now, MetadataStore, ProfileId, StoreResult};

impl MetadataStore {
    /// Load the stored diagram for a profile, if one has been built.
    pub fn load_diagram<T: DeserializeOwned>(&self, profile: ProfileId) -> StoreResult<Option<T>> {
        let data: Option<String> = self
            .conn()?
            .query_row(
                "SELECT data FROM diagrams WHERE profile_id = ?",
                params![profile],
                |row| row.get(0),
            )
            .optional()?;

        match data {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    /// Replace the stored diagram for a profile.
    pub fn save_diagram<T: Serialize>(&self, profile: ProfileId, diagram: &T) -> StoreResult<()> {
        let json = serde_json::to_string(diagram)?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO diagrams (profile_id, data, generated_at) VALUES (?, ?, ?)",
            params![profile, json, unix_now()],
        )?;
        Ok(())
    }

    pub fn delete_diagram(&self, profile: ProfileId) -> StoreResult<bool> {
        let rows = self
            .conn()?
            .execute("DELETE FROM diagrams WHERE profile_id = ?", params![profile])?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectParams;
    use crate::store::NewProfile;
    use serde_json::json;

    #[test]
    fn test_diagram_overwrite() {
        let store = MetadataStore::open_in_memory().unwrap();
        let profile = store
            .create_profile(&NewProfile {
                owner: "alice".into(),
                name: "shop".into(),
                params: ConnectParams::postgres("h", "d", "u", "p"),
            })
            .unwrap();

        assert!(store.load_diagram::<serde_json::Value>(profile).unwrap().is_none());

        store.save_diagram(profile, &json!({"nodes": [1]})).unwrap();
        store.save_diagram(profile, &json!({"nodes": [2]})).unwrap();
        let loaded: serde_json::Value = store.load_diagram(profile).unwrap().unwrap();
        assert_eq!(loaded, json!({"nodes": [2]}));

        assert!(store.delete_diagram(profile).unwrap());
        assert!(!store.delete_diagram(profile).unwrap());
    }
}
