//! Database query functions organized by table.

pub mod acm;
pub mod dbstate;
pub mod object_types;
pub mod objects;
pub mod permissions;
pub mod properties;
pub mod users;
