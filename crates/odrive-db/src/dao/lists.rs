//! Paged listing variants.

use rusqlite::types::Value;
use rusqlite::Connection;

use odrive_types::caller::Caller;
use odrive_types::paging::{FilterSetting, ObjectResultset, PagingRequest};
use odrive_types::Id;

use super::{Dao, DaoContext, DaoResult};
use crate::filter::visibility;
use crate::listing::{self, map_field, Source};
use crate::queries::{objects, properties};
use crate::sql::{id_value, now_millis, SqlFragment};
use crate::Result;

const LIVE_ROOTS: &str = "o.is_deleted = 0 AND o.parent_id IS NULL";
const LIVE_CHILDREN: &str = "o.is_deleted = 0 AND o.parent_id = ?";

fn text(value: impl Into<String>) -> Value {
    Value::Text(value.into())
}

/// Name and description filters apply to both fields.
fn name_or_description(filters: &[FilterSetting]) -> Vec<FilterSetting> {
    let mut out = Vec::new();
    for f in filters {
        let textual =
            f.field.is_empty() || matches!(map_field(&f.field), Some("o.name" | "o.description"));
        if !textual {
            out.push(f.clone());
            continue;
        }
        for field in ["name", "description"] {
            out.push(FilterSetting {
                field: field.to_string(),
                ..f.clone()
            });
        }
    }
    out
}

impl Dao {
    /// Shared skeleton: base predicate, expunge exclusion, optional caller
    /// visibility, page-size cap, and hydration.
    fn list(
        &mut self,
        op: &'static str,
        caller: Option<&Caller>,
        source: Source,
        paging: &PagingRequest,
        load_properties: bool,
        base: impl FnOnce(&Connection, &DaoContext) -> Result<SqlFragment>,
    ) -> DaoResult<ObjectResultset> {
        self.read(op, |tx, ctx| {
            let now = now_millis();
            let mut predicate = base(tx, ctx)?.and(SqlFragment::new("o.is_expunged = 0"));
            if let Some(caller) = caller {
                predicate = predicate.and(visibility(
                    caller,
                    &ctx.settings.share_wildcards,
                    &ctx.master_key,
                ));
            }
            let mut paging = paging.clone();
            paging.page_size = paging
                .sanitized_page_size()
                .min(ctx.settings.max_page_size.max(1));

            let (total, rows) = listing::run(tx, source, predicate, &paging)?;
            let mut page = Vec::with_capacity(rows.len());
            for mut object in rows {
                object.permissions = ctx.valid_permissions(tx, &object.id, now)?;
                if load_properties {
                    object.properties = match source {
                        Source::Live => properties::for_object(tx, &object.id)?,
                        Source::Archive => {
                            properties::for_object_revision(tx, &object.id, object.change_count)?
                        }
                    };
                }
                page.push(object);
            }
            Ok(ObjectResultset::new(&paging, total, page))
        })
    }

    pub fn get_root_objects(
        &mut self,
        paging: &PagingRequest,
        load_properties: bool,
    ) -> DaoResult<ObjectResultset> {
        self.list("get_root_objects", None, Source::Live, paging, load_properties, |_, _| {
            Ok(SqlFragment::new(LIVE_ROOTS))
        })
    }

    pub fn get_root_objects_by_user(
        &mut self,
        caller: &Caller,
        paging: &PagingRequest,
        load_properties: bool,
    ) -> DaoResult<ObjectResultset> {
        self.list(
            "get_root_objects_by_user",
            Some(caller),
            Source::Live,
            paging,
            load_properties,
            |_, _| Ok(SqlFragment::new(LIVE_ROOTS)),
        )
    }

    /// Roots whose `owned_by` equals `owner` (a resource name such as `user/cn=alice`).
    pub fn get_root_objects_by_owner(
        &mut self,
        owner: &str,
        paging: &PagingRequest,
        load_properties: bool,
    ) -> DaoResult<ObjectResultset> {
        self.list(
            "get_root_objects_by_owner",
            None,
            Source::Live,
            paging,
            load_properties,
            |_, _| {
                Ok(SqlFragment::with(
                    format!("{LIVE_ROOTS} AND o.owned_by = ?"),
                    vec![text(owner)],
                ))
            },
        )
    }

    pub fn get_child_objects(
        &mut self,
        parent: &Id,
        paging: &PagingRequest,
        load_properties: bool,
    ) -> DaoResult<ObjectResultset> {
        self.list("get_child_objects", None, Source::Live, paging, load_properties, |_, _| {
            Ok(SqlFragment::with(LIVE_CHILDREN, vec![id_value(parent)]))
        })
    }

    pub fn get_child_objects_by_user(
        &mut self,
        caller: &Caller,
        parent: &Id,
        paging: &PagingRequest,
        load_properties: bool,
    ) -> DaoResult<ObjectResultset> {
        self.list(
            "get_child_objects_by_user",
            Some(caller),
            Source::Live,
            paging,
            load_properties,
            |_, _| Ok(SqlFragment::with(LIVE_CHILDREN, vec![id_value(parent)])),
        )
    }

    pub fn get_child_objects_by_owner(
        &mut self,
        owner: &str,
        parent: &Id,
        paging: &PagingRequest,
        load_properties: bool,
    ) -> DaoResult<ObjectResultset> {
        self.list(
            "get_child_objects_by_owner",
            None,
            Source::Live,
            paging,
            load_properties,
            |_, _| {
                Ok(SqlFragment::with(
                    format!("{LIVE_CHILDREN} AND o.owned_by = ?"),
                    vec![id_value(parent), text(owner)],
                ))
            },
        )
    }

    /// Objects on which the caller created a direct grant to someone else.
    pub fn get_objects_i_have_shared(
        &mut self,
        caller: &Caller,
        paging: &PagingRequest,
        load_properties: bool,
    ) -> DaoResult<ObjectResultset> {
        self.list(
            "get_objects_i_have_shared",
            Some(caller),
            Source::Live,
            paging,
            load_properties,
            |_, _| {
                Ok(SqlFragment::with(
                    "o.is_deleted = 0 AND EXISTS (SELECT 1 FROM object_permission sp
                         WHERE sp.object_id = o.id AND sp.is_deleted = 0 AND sp.explicit_share = 1
                           AND lower(sp.created_by) = lower(?) AND sp.grantee <> ?)",
                    vec![text(&caller.distinguished_name), text(caller.flattened())],
                ))
            },
        )
    }

    /// Objects the caller can see but does not own. Owner DNs compare
    /// case-insensitively.
    pub fn get_objects_shared_to_me(
        &mut self,
        caller: &Caller,
        paging: &PagingRequest,
        load_properties: bool,
    ) -> DaoResult<ObjectResultset> {
        self.list(
            "get_objects_shared_to_me",
            Some(caller),
            Source::Live,
            paging,
            load_properties,
            |_, _| {
                Ok(SqlFragment::with(
                    "o.is_deleted = 0 AND lower(o.owned_by) <> lower(?)",
                    vec![text(caller.owner_resource())],
                ))
            },
        )
    }

    /// Objects deleted directly; descendants deleted with them are not listed.
    pub fn get_trashed_objects_by_user(
        &mut self,
        caller: &Caller,
        paging: &PagingRequest,
        load_properties: bool,
    ) -> DaoResult<ObjectResultset> {
        self.list(
            "get_trashed_objects_by_user",
            Some(caller),
            Source::Live,
            paging,
            load_properties,
            |_, _| Ok(SqlFragment::new("o.is_deleted = 1 AND o.is_ancestor_deleted = 0")),
        )
    }

    /// Archived versions of one object, newest first by default.
    pub fn get_object_revisions_by_user(
        &mut self,
        caller: &Caller,
        id: &Id,
        paging: &PagingRequest,
        load_properties: bool,
    ) -> DaoResult<ObjectResultset> {
        self.list(
            "get_object_revisions_by_user",
            Some(caller),
            Source::Archive,
            paging,
            load_properties,
            |tx, _| {
                objects::get(tx, id)?;
                Ok(SqlFragment::with("o.id = ?", vec![id_value(id)]))
            },
        )
    }

    /// Live objects whose name or description matches the request filters.
    pub fn search_objects_by_name_or_description(
        &mut self,
        caller: &Caller,
        paging: &PagingRequest,
        load_properties: bool,
    ) -> DaoResult<ObjectResultset> {
        let mut paging = paging.clone();
        paging.filter_settings = name_or_description(&paging.filter_settings);
        self.list(
            "search_objects_by_name_or_description",
            Some(caller),
            Source::Live,
            &paging,
            load_properties,
            |_, _| Ok(SqlFragment::new("o.is_deleted = 0")),
        )
    }
}
