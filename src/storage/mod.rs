pub mod bplus_tree;
pub mod catalog;
pub mod database;
pub mod pager;
pub mod registry;
pub mod users;
