pub mod align;
pub mod app;
pub mod compare;
pub mod config;
pub mod dicts;
pub mod domain;
pub mod error;
pub mod extend;
pub mod fs_util;
pub mod kvstore;
pub mod lookup;
pub mod normalize;
pub mod output;
pub mod popup;
pub mod resolver;
pub mod standoff;
