//! SQL schema definitions.
//!
//! Archive tables (`a_*`) carry an `a_id` followed by exactly the columns of
//! the live table in the same order; triggers copy rows with `SELECT NULL, *`.
//!
//! Change-token triggers:
//! - AFTER INSERT sets `change_count = 0` and the first token.
//! - AFTER UPDATE sets `change_count = OLD.change_count + 1` and a fresh token.
//!   It is guarded on `OLD.change_token IS NOT NULL` so the insert trigger's
//!   own UPDATE does not count as a revision.

/// Complete schema for the v1 database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Deployment state and users
-- ============================================================

CREATE TABLE IF NOT EXISTS dbstate (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version TEXT NOT NULL,
    identifier TEXT NOT NULL,
    created_date INTEGER NOT NULL,
    modified_date INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS user (
    id BLOB NOT NULL UNIQUE DEFAULT (randomblob(16)),
    created_date INTEGER NOT NULL,
    created_by TEXT NOT NULL,
    modified_date INTEGER NOT NULL,
    modified_by TEXT NOT NULL,
    change_count INTEGER NOT NULL DEFAULT 0,
    change_token TEXT,
    distinguished_name TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL DEFAULT '',
    email TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS user_ao_cache (
    user_id BLOB PRIMARY KEY REFERENCES user(id),
    is_caching INTEGER NOT NULL DEFAULT 0,
    cache_date INTEGER,
    sha256_hash TEXT NOT NULL DEFAULT ''
);

-- ============================================================
-- Object types
-- ============================================================

CREATE TABLE IF NOT EXISTS object_type (
    id BLOB NOT NULL UNIQUE DEFAULT (randomblob(16)),
    created_date INTEGER NOT NULL,
    created_by TEXT NOT NULL,
    modified_date INTEGER NOT NULL,
    modified_by TEXT NOT NULL,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    deleted_date INTEGER,
    deleted_by TEXT,
    change_count INTEGER NOT NULL DEFAULT 0,
    change_token TEXT,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    content_connector TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_object_type_name ON object_type(name, is_deleted);

-- ============================================================
-- Objects
-- ============================================================

CREATE TABLE IF NOT EXISTS object (
    id BLOB NOT NULL UNIQUE DEFAULT (randomblob(16)),
    created_date INTEGER NOT NULL,
    created_by TEXT NOT NULL,
    modified_date INTEGER NOT NULL,
    modified_by TEXT NOT NULL,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    deleted_date INTEGER,
    deleted_by TEXT,
    is_ancestor_deleted INTEGER NOT NULL DEFAULT 0,
    is_expunged INTEGER NOT NULL DEFAULT 0,
    expunged_date INTEGER,
    expunged_by TEXT,
    change_count INTEGER NOT NULL DEFAULT 0,
    change_token TEXT,
    owned_by TEXT NOT NULL,
    type_id BLOB NOT NULL REFERENCES object_type(id),
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    parent_id BLOB REFERENCES object(id),
    content_connector TEXT NOT NULL DEFAULT '',
    raw_acm TEXT NOT NULL DEFAULT '',
    content_type TEXT NOT NULL DEFAULT '',
    content_size INTEGER NOT NULL DEFAULT 0,
    content_hash BLOB NOT NULL DEFAULT x'',
    encrypt_iv BLOB NOT NULL DEFAULT x'',
    is_us_persons_data INTEGER NOT NULL DEFAULT 0,
    is_foia_exempt INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_object_parent ON object(parent_id, id);
CREATE INDEX IF NOT EXISTS idx_object_owner ON object(owned_by);
CREATE INDEX IF NOT EXISTS idx_object_modified ON object(modified_date);

CREATE TABLE IF NOT EXISTS a_object (
    a_id INTEGER PRIMARY KEY AUTOINCREMENT,
    id BLOB NOT NULL,
    created_date INTEGER NOT NULL,
    created_by TEXT NOT NULL,
    modified_date INTEGER NOT NULL,
    modified_by TEXT NOT NULL,
    is_deleted INTEGER NOT NULL,
    deleted_date INTEGER,
    deleted_by TEXT,
    is_ancestor_deleted INTEGER NOT NULL,
    is_expunged INTEGER NOT NULL,
    expunged_date INTEGER,
    expunged_by TEXT,
    change_count INTEGER NOT NULL,
    change_token TEXT,
    owned_by TEXT NOT NULL,
    type_id BLOB NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    parent_id BLOB,
    content_connector TEXT NOT NULL,
    raw_acm TEXT NOT NULL,
    content_type TEXT NOT NULL,
    content_size INTEGER NOT NULL,
    content_hash BLOB NOT NULL,
    encrypt_iv BLOB NOT NULL,
    is_us_persons_data INTEGER NOT NULL,
    is_foia_exempt INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_a_object_id ON a_object(id, change_count);

-- ============================================================
-- Properties
-- ============================================================

CREATE TABLE IF NOT EXISTS property (
    id BLOB NOT NULL UNIQUE DEFAULT (randomblob(16)),
    created_date INTEGER NOT NULL,
    created_by TEXT NOT NULL,
    modified_date INTEGER NOT NULL,
    modified_by TEXT NOT NULL,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    deleted_date INTEGER,
    deleted_by TEXT,
    change_count INTEGER NOT NULL DEFAULT 0,
    change_token TEXT,
    name TEXT NOT NULL,
    value TEXT NOT NULL DEFAULT '',
    classification_pm TEXT NOT NULL DEFAULT '',
    object_change_count INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS a_property (
    a_id INTEGER PRIMARY KEY AUTOINCREMENT,
    id BLOB NOT NULL,
    created_date INTEGER NOT NULL,
    created_by TEXT NOT NULL,
    modified_date INTEGER NOT NULL,
    modified_by TEXT NOT NULL,
    is_deleted INTEGER NOT NULL,
    deleted_date INTEGER,
    deleted_by TEXT,
    change_count INTEGER NOT NULL,
    change_token TEXT,
    name TEXT NOT NULL,
    value TEXT NOT NULL,
    classification_pm TEXT NOT NULL,
    object_change_count INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_a_property_id ON a_property(id, object_change_count);

CREATE TABLE IF NOT EXISTS object_property (
    id BLOB NOT NULL UNIQUE DEFAULT (randomblob(16)),
    object_id BLOB NOT NULL REFERENCES object(id),
    property_id BLOB NOT NULL REFERENCES property(id),
    created_date INTEGER NOT NULL,
    created_by TEXT NOT NULL,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    deleted_date INTEGER,
    deleted_by TEXT
);

CREATE INDEX IF NOT EXISTS idx_object_property_object ON object_property(object_id);

-- ============================================================
-- Permissions
-- ============================================================

CREATE TABLE IF NOT EXISTS object_permission (
    id BLOB NOT NULL UNIQUE DEFAULT (randomblob(16)),
    created_date INTEGER NOT NULL,
    created_by TEXT NOT NULL,
    modified_date INTEGER NOT NULL,
    modified_by TEXT NOT NULL,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    deleted_date INTEGER,
    deleted_by TEXT,
    change_count INTEGER NOT NULL DEFAULT 0,
    change_token TEXT,
    object_id BLOB NOT NULL REFERENCES object(id),
    grantee TEXT NOT NULL,
    acm_share TEXT NOT NULL DEFAULT '',
    allow_create INTEGER NOT NULL DEFAULT 0,
    allow_read INTEGER NOT NULL DEFAULT 0,
    allow_update INTEGER NOT NULL DEFAULT 0,
    allow_delete INTEGER NOT NULL DEFAULT 0,
    allow_share INTEGER NOT NULL DEFAULT 0,
    explicit_share INTEGER NOT NULL DEFAULT 0,
    encrypt_key BLOB NOT NULL,
    permission_iv BLOB,
    permission_mac BLOB,
    user_distinguished_name TEXT,
    user_display_name TEXT,
    project_name TEXT,
    project_display_name TEXT,
    group_name TEXT
);

CREATE INDEX IF NOT EXISTS idx_object_permission_object ON object_permission(object_id, grantee);
CREATE INDEX IF NOT EXISTS idx_object_permission_grantee ON object_permission(grantee);

CREATE TABLE IF NOT EXISTS a_object_permission (
    a_id INTEGER PRIMARY KEY AUTOINCREMENT,
    id BLOB NOT NULL,
    created_date INTEGER NOT NULL,
    created_by TEXT NOT NULL,
    modified_date INTEGER NOT NULL,
    modified_by TEXT NOT NULL,
    is_deleted INTEGER NOT NULL,
    deleted_date INTEGER,
    deleted_by TEXT,
    change_count INTEGER NOT NULL,
    change_token TEXT,
    object_id BLOB NOT NULL,
    grantee TEXT NOT NULL,
    acm_share TEXT NOT NULL,
    allow_create INTEGER NOT NULL,
    allow_read INTEGER NOT NULL,
    allow_update INTEGER NOT NULL,
    allow_delete INTEGER NOT NULL,
    allow_share INTEGER NOT NULL,
    explicit_share INTEGER NOT NULL,
    encrypt_key BLOB NOT NULL,
    permission_iv BLOB,
    permission_mac BLOB,
    user_distinguished_name TEXT,
    user_display_name TEXT,
    project_name TEXT,
    project_display_name TEXT,
    group_name TEXT
);

-- ============================================================
-- ACM index
-- ============================================================

CREATE TABLE IF NOT EXISTS acmkey (
    id BLOB NOT NULL UNIQUE DEFAULT (randomblob(16)),
    created_date INTEGER NOT NULL,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    deleted_date INTEGER,
    name TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_acmkey_name ON acmkey(name, is_deleted);

CREATE TABLE IF NOT EXISTS acmvalue (
    id BLOB NOT NULL UNIQUE DEFAULT (randomblob(16)),
    created_date INTEGER NOT NULL,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    deleted_date INTEGER,
    name TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_acmvalue_name ON acmvalue(name, is_deleted);

CREATE TABLE IF NOT EXISTS object_acm (
    id BLOB NOT NULL UNIQUE DEFAULT (randomblob(16)),
    created_date INTEGER NOT NULL,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    deleted_date INTEGER,
    object_id BLOB NOT NULL REFERENCES object(id),
    acmkey_id BLOB NOT NULL REFERENCES acmkey(id),
    acmvalue_id BLOB NOT NULL REFERENCES acmvalue(id)
);

CREATE INDEX IF NOT EXISTS idx_object_acm_object ON object_acm(object_id, is_deleted);

-- ============================================================
-- Change-token and archive triggers
-- ============================================================

CREATE TRIGGER IF NOT EXISTS user_after_insert AFTER INSERT ON user
BEGIN
    UPDATE user SET change_count = 0,
        change_token = od_change_token(NEW.id, 0, NEW.modified_date)
    WHERE rowid = NEW.rowid;
END;

CREATE TRIGGER IF NOT EXISTS user_after_update AFTER UPDATE ON user
WHEN OLD.change_token IS NOT NULL
BEGIN
    UPDATE user SET change_count = OLD.change_count + 1,
        change_token = od_change_token(NEW.id, OLD.change_count + 1, NEW.modified_date)
    WHERE rowid = NEW.rowid;
END;

CREATE TRIGGER IF NOT EXISTS object_type_after_insert AFTER INSERT ON object_type
BEGIN
    UPDATE object_type SET change_count = 0,
        change_token = od_change_token(NEW.id, 0, NEW.modified_date)
    WHERE rowid = NEW.rowid;
END;

CREATE TRIGGER IF NOT EXISTS object_type_after_update AFTER UPDATE ON object_type
WHEN OLD.change_token IS NOT NULL
BEGIN
    UPDATE object_type SET change_count = OLD.change_count + 1,
        change_token = od_change_token(NEW.id, OLD.change_count + 1, NEW.modified_date)
    WHERE rowid = NEW.rowid;
END;

CREATE TRIGGER IF NOT EXISTS object_after_insert AFTER INSERT ON object
BEGIN
    UPDATE object SET change_count = 0,
        change_token = od_change_token(NEW.id, 0, NEW.modified_date)
    WHERE rowid = NEW.rowid;
    INSERT INTO a_object SELECT NULL, * FROM object WHERE rowid = NEW.rowid;
END;

CREATE TRIGGER IF NOT EXISTS object_after_update AFTER UPDATE ON object
WHEN OLD.change_token IS NOT NULL
BEGIN
    UPDATE object SET change_count = OLD.change_count + 1,
        change_token = od_change_token(NEW.id, OLD.change_count + 1, NEW.modified_date)
    WHERE rowid = NEW.rowid;
    INSERT INTO a_object SELECT NULL, * FROM object WHERE rowid = NEW.rowid;
END;

CREATE TRIGGER IF NOT EXISTS property_after_insert AFTER INSERT ON property
BEGIN
    UPDATE property SET change_count = 0,
        change_token = od_change_token(NEW.id, 0, NEW.modified_date)
    WHERE rowid = NEW.rowid;
    INSERT INTO a_property SELECT NULL, * FROM property WHERE rowid = NEW.rowid;
END;

CREATE TRIGGER IF NOT EXISTS property_after_update AFTER UPDATE ON property
WHEN OLD.change_token IS NOT NULL
BEGIN
    UPDATE property SET change_count = OLD.change_count + 1,
        change_token = od_change_token(NEW.id, OLD.change_count + 1, NEW.modified_date)
    WHERE rowid = NEW.rowid;
    INSERT INTO a_property SELECT NULL, * FROM property WHERE rowid = NEW.rowid;
END;

CREATE TRIGGER IF NOT EXISTS object_permission_after_insert AFTER INSERT ON object_permission
BEGIN
    UPDATE object_permission SET change_count = 0,
        change_token = od_change_token(NEW.id, 0, NEW.modified_date)
    WHERE rowid = NEW.rowid;
    INSERT INTO a_object_permission SELECT NULL, * FROM object_permission WHERE rowid = NEW.rowid;
END;

CREATE TRIGGER IF NOT EXISTS object_permission_after_update AFTER UPDATE ON object_permission
WHEN OLD.change_token IS NOT NULL
BEGIN
    UPDATE object_permission SET change_count = OLD.change_count + 1,
        change_token = od_change_token(NEW.id, OLD.change_count + 1, NEW.modified_date)
    WHERE rowid = NEW.rowid;
    INSERT INTO a_object_permission SELECT NULL, * FROM object_permission WHERE rowid = NEW.rowid;
END;
"#;
