//! Singleton deployment-state row.

use rusqlite::{Connection, OptionalExtension};

use odrive_types::user::DbState;

use crate::Result;

pub fn get(conn: &Connection) -> Result<Option<DbState>> {
    let state = conn
        .query_row(
            "SELECT schema_version, identifier, created_date, modified_date FROM dbstate WHERE id = 1",
            [],
            |row| {
                Ok(DbState {
                    schema_version: row.get(0)?,
                    identifier: row.get(1)?,
                    created_date: row.get(2)?,
                    modified_date: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(state)
}

pub fn insert(conn: &Connection, state: &DbState) -> Result<()> {
    conn.execute(
        "INSERT INTO dbstate (id, schema_version, identifier, created_date, modified_date)
         VALUES (1, ?1, ?2, ?3, ?4)",
        rusqlite::params![
            state.schema_version,
            state.identifier,
            state.created_date,
            state.modified_date,
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singleton() {
        let conn = crate::open_memory().expect("open");
        assert!(get(&conn).expect("get").is_none());
        let state = DbState {
            schema_version: "1".into(),
            identifier: "abc".into(),
            created_date: 1,
            modified_date: 1,
        };
        insert(&conn, &state).expect("insert");
        assert_eq!(get(&conn).expect("get"), Some(state.clone()));
        assert!(insert(&conn, &state).is_err());
    }
}
