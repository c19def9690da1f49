//! Domain model module declarations.

pub mod feed;
pub mod health;
pub mod identity;
pub mod lifecycle;
pub mod mail;
pub mod policy;
pub mod state;
pub mod work_item;
