//! Property query functions.

use rusqlite::Connection;

use odrive_types::object::Property;
use odrive_types::Id;

use crate::sql::get_id;
use crate::{not_found, Result};

const COLUMNS: &str = "p.id, p.created_date, p.created_by, p.modified_date, p.modified_by,
     p.is_deleted, p.deleted_date, p.deleted_by, p.change_count, p.change_token,
     p.name, p.value, p.classification_pm";

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Property> {
    Ok(Property {
        id: get_id(row, 0)?,
        created_date: row.get(1)?,
        created_by: row.get(2)?,
        modified_date: row.get(3)?,
        modified_by: row.get(4)?,
        is_deleted: row.get(5)?,
        deleted_date: row.get(6)?,
        deleted_by: row.get(7)?,
        change_count: row.get(8)?,
        change_token: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
        name: row.get(10)?,
        value: row.get(11)?,
        classification_pm: row.get(12)?,
    })
}

/// Insert a property and link it to `object_id`.
///
/// `object_change_count` is the object version this write belongs to.
pub fn add_to_object(
    conn: &Connection,
    object_id: &Id,
    property: &Property,
    object_change_count: i64,
    by: &str,
    now: i64,
) -> Result<Id> {
    conn.execute(
        "INSERT INTO property
         (created_date, created_by, modified_date, modified_by, name, value, classification_pm,
          object_change_count)
         VALUES (?1, ?2, ?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            now,
            by,
            property.name,
            property.value,
            property.classification_pm,
            object_change_count
        ],
    )?;
    let rowid = conn.last_insert_rowid();
    let property_id = conn
        .query_row("SELECT id FROM property WHERE rowid = ?1", [rowid], |row| {
            get_id(row, 0)
        })
        .map_err(not_found("property"))?;
    conn.execute(
        "INSERT INTO object_property (object_id, property_id, created_date, created_by)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![object_id.as_bytes(), property_id.as_bytes(), now, by],
    )?;
    Ok(property_id)
}

/// Current non-deleted properties of an object, ordered by name.
pub fn for_object(conn: &Connection, object_id: &Id) -> Result<Vec<Property>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {COLUMNS} FROM property p
         JOIN object_property op ON op.property_id = p.id
         WHERE op.object_id = ?1 AND op.is_deleted = 0 AND p.is_deleted = 0
         ORDER BY p.name, p.created_date"
    ))?;
    let rows = stmt
        .query_map([object_id.as_bytes()], from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Properties as they stood at object version `change_count`: the latest
/// archived row per property written at or before that version, dropped if
/// that row is deleted.
pub fn for_object_revision(
    conn: &Connection,
    object_id: &Id,
    change_count: i64,
) -> Result<Vec<Property>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {COLUMNS} FROM a_property p
         JOIN object_property op ON op.property_id = p.id
         WHERE op.object_id = ?1
           AND p.a_id = (SELECT MAX(x.a_id) FROM a_property x
                          WHERE x.id = p.id AND x.object_change_count <= ?2)
           AND p.is_deleted = 0
         ORDER BY p.name, p.created_date"
    ))?;
    let rows = stmt
        .query_map(rusqlite::params![object_id.as_bytes(), change_count], from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Change a property's value in place.
pub fn update_value(
    conn: &Connection,
    property_id: &Id,
    value: &str,
    classification_pm: &str,
    object_change_count: i64,
    by: &str,
    now: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE property SET value = ?1, classification_pm = ?2, modified_date = ?3, modified_by = ?4,
             object_change_count = ?5
         WHERE id = ?6",
        rusqlite::params![
            value,
            classification_pm,
            now,
            by,
            object_change_count,
            property_id.as_bytes()
        ],
    )?;
    Ok(())
}

/// Soft-delete a property and its link.
pub fn delete(
    conn: &Connection,
    property_id: &Id,
    object_change_count: i64,
    by: &str,
    now: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE property SET is_deleted = 1, deleted_date = ?1, deleted_by = ?2,
             modified_date = ?1, modified_by = ?2, object_change_count = ?3
         WHERE id = ?4",
        rusqlite::params![now, by, object_change_count, property_id.as_bytes()],
    )?;
    conn.execute(
        "UPDATE object_property SET is_deleted = 1, deleted_date = ?1, deleted_by = ?2
         WHERE property_id = ?3",
        rusqlite::params![now, by, property_id.as_bytes()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::{object_types, objects};
    use odrive_types::object::{ODObject, ObjectType};

    fn setup() -> (Connection, Id) {
        let conn = crate::open_memory().expect("open test db");
        let type_id = object_types::insert(
            &conn,
            &ObjectType {
                name: "File".into(),
                created_by: "cn=a".into(),
                ..ObjectType::default()
            },
            1,
        )
        .expect("type");
        let object_id = objects::insert(
            &conn,
            &ODObject {
                name: "doc".into(),
                type_id,
                created_by: "cn=a".into(),
                owned_by: "user/cn=a".into(),
                ..ODObject::default()
            },
            1,
        )
        .expect("object");
        (conn, object_id)
    }

    #[test]
    fn test_add_update_delete() {
        let (conn, object_id) = setup();
        let pid = add_to_object(&conn, &object_id, &Property::new("color", "red"), 0, "cn=a", 10)
            .expect("add");
        update_value(&conn, &pid, "blue", "", 1, "cn=a", 20).expect("update");
        let props = for_object(&conn, &object_id).expect("list");
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].value, "blue");
        assert_eq!(props[0].change_count, 1);

        delete(&conn, &pid, 2, "cn=a", 30).expect("delete");
        assert!(for_object(&conn, &object_id).expect("list").is_empty());
    }

    #[test]
    fn test_properties_at_revision() {
        let (conn, object_id) = setup();
        // Every write lands in the same millisecond.
        let pid = add_to_object(&conn, &object_id, &Property::new("color", "red"), 0, "cn=a", 10)
            .expect("add");
        update_value(&conn, &pid, "blue", "", 1, "cn=a", 10).expect("update");
        add_to_object(&conn, &object_id, &Property::new("size", "L"), 1, "cn=a", 10).expect("add");
        delete(&conn, &pid, 2, "cn=a", 10).expect("delete");

        let at = |version: i64| -> Vec<(String, String)> {
            for_object_revision(&conn, &object_id, version)
                .expect("revision")
                .into_iter()
                .map(|p| (p.name, p.value))
                .collect()
        };
        assert_eq!(at(0), vec![("color".to_string(), "red".to_string())]);
        assert_eq!(
            at(1),
            vec![
                ("color".to_string(), "blue".to_string()),
                ("size".to_string(), "L".to_string())
            ]
        );
        assert_eq!(at(2), vec![("size".to_string(), "L".to_string())]);
        assert_eq!(at(7), at(2));
    }
}
